//! LZMA stream wrapping for compressed instruction payloads.
//!
//! A compressed payload looks like this on disk:
//!
//! ```text
//! payload_size: u32    bytes from here to the end of the frame
//! orig_size: u32       uncompressed byte count
//! <LZMA-alone stream>  13-byte property block, then an end-marker
//!                      terminated bit-stream
//! ```
//!
//! The compressor does not know `payload_size` up front, so the writer
//! leaves a placeholder, encodes, then seeks back and patches the real
//! value in. The decoder side never needs it for termination: the stream
//! carries its own end-marker, and `payload_size` only bounds how many
//! container bytes may be consumed.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use xz2::stream::{Action, LzmaOptions, Status, Stream};

use crate::error::{Error, Result};
use crate::report::Report;
use crate::source::read_full;
use crate::BLOCK_SIZE;

/// Dictionary size used by the differ. Large enough that any file below it
/// is matched against in full.
const DICT_SIZE: u32 = 1 << 26;

/// nice_len, biased far toward ratio over speed.
const NICE_LEN: u32 = 256;

fn encoder() -> Result<Stream> {
    let mut opts = LzmaOptions::new_preset(9)?;
    opts.dict_size(DICT_SIZE)
        .nice_len(NICE_LEN)
        .literal_context_bits(2)
        .literal_position_bits(2)
        .position_bits(2);
    Ok(Stream::new_lzma_encoder(&opts)?)
}

/// Compresses `input_size` bytes from `input` into `out` with the payload
/// framing described in the module docs, patching the final `payload_size`
/// back over its placeholder. Returns that payload size.
///
/// Progress is reported as input bytes consumed, against `input_size`.
pub fn compress_stream<R: Read, W: Write + Seek>(
    input: &mut R,
    input_size: u64,
    out: &mut W,
    report: &mut dyn Report,
) -> Result<u64> {
    if input_size > u32::MAX as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "payload exceeds 4 GiB frame limit",
        )
        .into());
    }
    let start = out.stream_position()?;
    out.write_u32::<LE>(0)?;
    out.write_u32::<LE>(input_size as u32)?;

    let mut strm = encoder()?;
    let mut inbuf = vec![0u8; BLOCK_SIZE];
    let mut outbuf = vec![0u8; BLOCK_SIZE];
    let mut in_len = 0usize;
    let mut in_pos = 0usize;
    let mut eof = false;

    loop {
        if in_pos == in_len && !eof {
            in_len = read_full(input, &mut inbuf)?;
            in_pos = 0;
            if in_len == 0 {
                eof = true;
            }
        }
        let action = if eof { Action::Finish } else { Action::Run };

        let before_in = strm.total_in();
        let before_out = strm.total_out();
        let status = strm.process(&inbuf[in_pos..in_len], &mut outbuf, action)?;
        in_pos += (strm.total_in() - before_in) as usize;
        let produced = (strm.total_out() - before_out) as usize;
        if produced > 0 {
            out.write_all(&outbuf[..produced])?;
        }
        let _ = report.progress(strm.total_in() as i64);

        if status == Status::StreamEnd {
            break;
        }
    }

    let end = out.stream_position()?;
    let payload_size = end - start - 4;
    out.seek(SeekFrom::Start(start))?;
    out.write_u32::<LE>(payload_size as u32)?;
    out.seek(SeekFrom::Start(end))?;
    Ok(payload_size)
}

/// Streams `compressed_len` bytes of LZMA-alone data from `input` into
/// `out` in bounded windows. The caller has already consumed the leading
/// `orig_size` field; `expected_size` is its value.
///
/// Fails with `CorruptStream` if the decoder errors, if the end-marker does
/// not arrive exactly when `compressed_len` input bytes have been consumed,
/// or if the output size disagrees with `expected_size`.
pub fn decompress_stream<R: Read, W: Write>(
    input: &mut R,
    compressed_len: u64,
    expected_size: u64,
    out: &mut W,
    report: &mut dyn Report,
) -> Result<u64> {
    let mut strm = Stream::new_lzma_decoder(u64::MAX)?;
    let mut inbuf = vec![0u8; BLOCK_SIZE];
    let mut outbuf = vec![0u8; BLOCK_SIZE];
    let mut left = compressed_len;
    let mut total_out = 0u64;
    let mut ended = false;

    'fill: while left > 0 {
        let want = Ord::min(left, BLOCK_SIZE as u64) as usize;
        let got = read_full(input, &mut inbuf[..want])?;
        if got == 0 {
            return Err(Error::CorruptStream("compressed payload truncated"));
        }
        left -= got as u64;

        let mut pos = 0usize;
        while pos < got {
            let before_in = strm.total_in();
            let before_out = strm.total_out();
            let status = strm
                .process(&inbuf[pos..got], &mut outbuf, Action::Run)
                .map_err(|_| Error::CorruptStream("decoder error"))?;
            let used = (strm.total_in() - before_in) as usize;
            let produced = (strm.total_out() - before_out) as usize;
            pos += used;
            if produced > 0 {
                out.write_all(&outbuf[..produced])?;
                total_out += produced as u64;
                let _ = report.progress(total_out as i64);
            }
            if status == Status::StreamEnd {
                if pos < got || left > 0 {
                    return Err(Error::CorruptStream("end-marker before declared payload size"));
                }
                ended = true;
                break 'fill;
            }
            if used == 0 && produced == 0 {
                return Err(Error::CorruptStream("decoder stalled"));
            }
        }
    }

    // The marker may still be buffered; give the decoder a finish pass.
    while !ended {
        let before_out = strm.total_out();
        let status = strm
            .process(&[], &mut outbuf, Action::Finish)
            .map_err(|_| Error::CorruptStream("decoder error"))?;
        let produced = (strm.total_out() - before_out) as usize;
        if produced > 0 {
            out.write_all(&outbuf[..produced])?;
            total_out += produced as u64;
            let _ = report.progress(total_out as i64);
        }
        if status == Status::StreamEnd {
            ended = true;
        } else if produced == 0 {
            return Err(Error::CorruptStream("missing end-marker"));
        }
    }

    if total_out != expected_size {
        return Err(Error::CorruptStream("decompressed size mismatch"));
    }
    Ok(total_out)
}

/// Decompresses a whole compressed payload held in memory, `orig_size`
/// field included. Used for change frames, whose delta input must be
/// resident anyway.
pub fn decompress_payload(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < 4 {
        return Err(Error::CorruptStream("compressed payload too short"));
    }
    let orig_size = (&payload[..4]).read_u32::<LE>()? as usize;
    let mut strm = Stream::new_lzma_decoder(u64::MAX)?;
    let mut out = Vec::with_capacity(orig_size);
    let mut outbuf = vec![0u8; BLOCK_SIZE];
    let mut pos = 4usize;

    loop {
        let action = if pos == payload.len() {
            Action::Finish
        } else {
            Action::Run
        };
        let before_in = strm.total_in();
        let before_out = strm.total_out();
        let status = strm
            .process(&payload[pos..], &mut outbuf, action)
            .map_err(|_| Error::CorruptStream("decoder error"))?;
        let used = (strm.total_in() - before_in) as usize;
        let produced = (strm.total_out() - before_out) as usize;
        pos += used;
        out.extend_from_slice(&outbuf[..produced]);
        if status == Status::StreamEnd {
            break;
        }
        if used == 0 && produced == 0 {
            return Err(Error::CorruptStream("missing end-marker"));
        }
    }

    if pos != payload.len() {
        return Err(Error::CorruptStream("end-marker before declared payload size"));
    }
    if out.len() != orig_size {
        return Err(Error::CorruptStream("decompressed size mismatch"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::NullReport;
    use std::io::Cursor;

    fn compress_to_vec(data: &[u8]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        compress_stream(&mut Cursor::new(data), data.len() as u64, &mut out, &mut NullReport).unwrap();
        out.into_inner()
    }

    #[test]
    fn payload_size_is_patched_back() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(64);
        let framed = compress_to_vec(&data);
        let payload_size = (&framed[..4]).read_u32::<LE>().unwrap() as usize;
        assert_eq!(framed.len(), 4 + payload_size);
        let orig_size = (&framed[4..8]).read_u32::<LE>().unwrap() as usize;
        assert_eq!(orig_size, data.len());
    }

    #[test]
    fn stream_roundtrip() {
        let data = b"abcdefgh".repeat(50_000);
        let framed = compress_to_vec(&data);
        let payload_size = (&framed[..4]).read_u32::<LE>().unwrap() as u64;
        let mut out = Vec::new();
        let n = decompress_stream(
            &mut Cursor::new(&framed[8..]),
            payload_size - 4,
            data.len() as u64,
            &mut out,
            &mut NullReport,
        )
        .unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn payload_roundtrip() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let framed = compress_to_vec(&data);
        assert_eq!(decompress_payload(&framed[4..]).unwrap(), data);
    }

    #[test]
    fn empty_input_roundtrips() {
        let framed = compress_to_vec(b"");
        let payload_size = (&framed[..4]).read_u32::<LE>().unwrap() as u64;
        let mut out = Vec::new();
        decompress_stream(
            &mut Cursor::new(&framed[8..]),
            payload_size - 4,
            0,
            &mut out,
            &mut NullReport,
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let data = b"repetitive repetitive repetitive".repeat(1000);
        let framed = compress_to_vec(&data);
        let cut = framed.len() - 8;
        let payload_size = (cut - 4) as u64;
        let mut out = Vec::new();
        let err = decompress_stream(
            &mut Cursor::new(&framed[8..cut]),
            payload_size - 4,
            data.len() as u64,
            &mut out,
            &mut NullReport,
        );
        assert!(matches!(err, Err(Error::CorruptStream(_))));
    }
}
