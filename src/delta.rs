//! Binary delta encoder.
//!
//! The encoder holds the full source and target in memory (the window size
//! is effectively the whole target, a deliberate trade-off in the differ)
//! and walks the target looking up each position's longest match in a
//! suffix array over the source. Matched stretches become copy
//! instructions, the gaps between them insert instructions:
//!
//! ```text
//! target_size: u32
//! 0x00  src_off: u64  len: u32      copy from source
//! 0x01  len: u32  <len bytes>       insert literal
//! ```
//!
//! The stream has no terminator of its own; it ends with its enclosing
//! payload. Reconstruction lives in [`crate::apply`], which does not need
//! the source resident.

use std::io::{Error, ErrorKind, Result, Write};

use byteorder::{WriteBytesExt, LE};
use suffix_array::SuffixArray;

pub(crate) const OP_COPY: u8 = 0;
pub(crate) const OP_INSERT: u8 = 1;

/// Matches shorter than this are cheaper as literals than as copy
/// instructions.
pub const MIN_MATCH: usize = 16;

/// Delta compressor for one source buffer.
///
/// Prepares for delta compression and immediately sorts the suffix array,
/// so one `Delta` can be compared against several targets.
pub struct Delta<'s> {
    sa: SuffixArray<'s>,
    min_match: usize,
}

impl<'s> Delta<'s> {
    pub fn new(source: &'s [u8]) -> Self {
        Delta {
            sa: SuffixArray::new(source),
            min_match: MIN_MATCH,
        }
    }

    /// Sets the minimum match length worth a copy instruction
    /// (`n >= 14`, default is `MIN_MATCH`).
    pub fn min_match(mut self, mut n: usize) -> Self {
        if n < 14 {
            n = 14;
        }
        self.min_match = n;
        self
    }

    /// Searches matches in `target` and writes the instruction stream to
    /// `sink` in bursts. Returns the number of payload bytes written.
    pub fn compare<W: Write>(&self, target: &[u8], mut sink: W) -> Result<u64> {
        if target.len() > u32::MAX as usize {
            return Err(Error::new(ErrorKind::InvalidInput, "target data is too large"));
        }
        sink.write_u32::<LE>(target.len() as u32)?;
        let mut written = 4u64;

        let mut j = 0;
        let mut lit_start = 0;
        while j < target.len() {
            let found = self.sa.search_lcp(&target[j..]);
            let (i, n) = (found.start, found.end - found.start);
            if n >= self.min_match {
                written += write_insert(&mut sink, &target[lit_start..j])?;
                sink.write_u8(OP_COPY)?;
                sink.write_u64::<LE>(i as u64)?;
                sink.write_u32::<LE>(n as u32)?;
                written += 13;
                j += n;
                lit_start = j;
            } else {
                j += 1;
            }
        }
        written += write_insert(&mut sink, &target[lit_start..])?;
        sink.flush()?;
        Ok(written)
    }
}

fn write_insert<W: Write>(sink: &mut W, literal: &[u8]) -> Result<u64> {
    if literal.is_empty() {
        return Ok(0);
    }
    sink.write_u8(OP_INSERT)?;
    sink.write_u32::<LE>(literal.len() as u32)?;
    sink.write_all(literal)?;
    Ok(5 + literal.len() as u64)
}
