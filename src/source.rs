//! On-demand block access to a delta source file.

use std::io::{ErrorKind, Read, Result, Seek, SeekFrom};

use crate::BLOCK_SIZE;

/// Serves the delta reconstructor's requests for fixed-size windows of the
/// source without ever loading the whole file.
///
/// A single block-sized buffer is allocated lazily on the first request and
/// reused for the lifetime of the frame. Blocks may be re-requested in any
/// order; a miss is serviced by re-seeking.
pub struct SourceBlocks<S> {
    file: S,
    buf: Vec<u8>,
    filled: usize,
    current: Option<u64>,
}

impl<S: Read + Seek> SourceBlocks<S> {
    pub fn new(file: S) -> Self {
        SourceBlocks {
            file,
            buf: Vec::new(),
            filled: 0,
            current: None,
        }
    }

    /// Returns the bytes of block `blkno`. The last block of the file may be
    /// short; past the end of the file the slice is empty.
    pub fn block(&mut self, blkno: u64) -> Result<&[u8]> {
        if self.current != Some(blkno) {
            if self.buf.is_empty() {
                self.buf = vec![0u8; BLOCK_SIZE];
            }
            self.file.seek(SeekFrom::Start(blkno * BLOCK_SIZE as u64))?;
            self.filled = read_full(&mut self.file, &mut self.buf)?;
            self.current = Some(blkno);
        }
        Ok(&self.buf[..self.filled])
    }
}

/// Reads until `buf` is full or the reader hits end of file, returning the
/// number of bytes read.
pub(crate) fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut cnt = 0;
    while cnt < buf.len() {
        match r.read(&mut buf[cnt..]) {
            Ok(0) => break,
            Ok(n) => cnt += n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(cnt)
}
