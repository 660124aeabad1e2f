//! Binary delta reconstruction.
//!
//! The reconstructor pulls source data through a [`SourceBlocks`] fetcher
//! one 256 KiB block at a time, so only the delta payload itself has to be
//! resident. Instructions may copy from anywhere in the source in any
//! order; the fetcher re-seeks as needed.

use std::io::{Cursor, Read, Seek, Write};

use byteorder::{ReadBytesExt, LE};

use crate::delta::{OP_COPY, OP_INSERT};
use crate::error::{Error, Result};
use crate::report::Report;
use crate::source::SourceBlocks;
use crate::BLOCK_SIZE;

/// Applies one delta payload to a source file.
pub struct DeltaApply<'p> {
    payload: &'p [u8],
    target_size: u32,
}

impl<'p> DeltaApply<'p> {
    /// Parses the payload header.
    pub fn new(payload: &'p [u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(Error::CorruptStream("delta payload too short"));
        }
        let target_size = (&payload[..4]).read_u32::<LE>()?;
        Ok(DeltaApply {
            payload,
            target_size,
        })
    }

    /// The final target file size declared by the encoder.
    pub fn hint_target_size(&self) -> u64 {
        self.target_size as u64
    }

    /// Replays the instruction stream, writing each output burst to `out`
    /// and reporting cumulative progress. Returns the target size.
    pub fn apply<S, W>(
        &self,
        source: &mut SourceBlocks<S>,
        mut out: W,
        report: &mut dyn Report,
    ) -> Result<u64>
    where
        S: Read + Seek,
        W: Write,
    {
        let data = &self.payload[4..];
        let mut cur = Cursor::new(data);
        let mut total = 0u64;

        loop {
            let op = match cur.read_u8() {
                Ok(b) => b,
                Err(_) => break,
            };
            match op {
                OP_COPY => {
                    let off = cur.read_u64::<LE>().map_err(|_| TRUNCATED)?;
                    let len = cur.read_u32::<LE>().map_err(|_| TRUNCATED)?;
                    let mut pos = off;
                    let mut left = len as u64;
                    while left > 0 {
                        let blkno = pos / BLOCK_SIZE as u64;
                        let in_blk = (pos % BLOCK_SIZE as u64) as usize;
                        let block = source.block(blkno)?;
                        if in_blk >= block.len() {
                            return Err(Error::CorruptStream("copy past end of source"));
                        }
                        let n = Ord::min(block.len() - in_blk, left as usize);
                        out.write_all(&block[in_blk..in_blk + n])?;
                        pos += n as u64;
                        left -= n as u64;
                        total += n as u64;
                    }
                    let _ = report.progress(total as i64);
                }
                OP_INSERT => {
                    let len = cur.read_u32::<LE>().map_err(|_| TRUNCATED)? as usize;
                    let at = cur.position() as usize;
                    if at + len > data.len() {
                        return Err(Error::CorruptStream("truncated delta literal"));
                    }
                    out.write_all(&data[at..at + len])?;
                    cur.set_position((at + len) as u64);
                    total += len as u64;
                    let _ = report.progress(total as i64);
                }
                _ => return Err(Error::CorruptStream("unknown delta instruction")),
            }
        }

        if total != self.target_size as u64 {
            return Err(Error::CorruptStream("delta output size mismatch"));
        }
        out.flush()?;
        Ok(total)
    }
}

const TRUNCATED: Error = Error::CorruptStream("truncated delta instruction");
