//! On-disk layout of the patch container: the per-instruction frame header
//! and the fixed trailer record at the end of the file.
//!
//! A frame is `name_length: u16`, `name_length` bytes of `/`-separated
//! relative path, one kind byte, and (except for deletes) a `u32` payload
//! size followed by that many payload bytes. Frames are concatenated with no
//! padding; boundaries are found purely by parsing.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::error::{Error, Result};

/// Sentinel identifying a valid container. The trailer sits at the very end
/// of the file, so the tag also works when the patch data is appended to an
/// arbitrary executable prologue.
pub const TRAILER_TAG: u64 = 0x0BAD_C0DE_DEAD_BEEF;

/// Byte width of the trailer record: two offsets and the tag.
pub const TRAILER_SIZE: u64 = 24;

/// Version written into the config record between the last frame and the
/// trailer.
pub const FORMAT_VERSION: u32 = 1;

/// Instruction kinds, persisted as a single byte. The values are part of
/// the container format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiffKind {
    Change = 0,
    ChangeLzma = 1,
    AddOrReplace = 2,
    AddOrReplaceLzma = 3,
    Delete = 4,
}

impl DiffKind {
    pub fn from_raw(raw: u8) -> Option<DiffKind> {
        match raw {
            0 => Some(DiffKind::Change),
            1 => Some(DiffKind::ChangeLzma),
            2 => Some(DiffKind::AddOrReplace),
            3 => Some(DiffKind::AddOrReplaceLzma),
            4 => Some(DiffKind::Delete),
            _ => None,
        }
    }

    /// Change kinds apply a delta against a named source file.
    pub fn is_change(self) -> bool {
        matches!(self, DiffKind::Change | DiffKind::ChangeLzma)
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, DiffKind::ChangeLzma | DiffKind::AddOrReplaceLzma)
    }

    /// Every kind except `Delete` is followed by a payload size and payload.
    pub fn has_payload(self) -> bool {
        self != DiffKind::Delete
    }
}

/// Parsed frame header: the relative path and the instruction kind.
#[derive(Debug)]
pub struct FrameHead {
    pub name: String,
    pub kind: DiffKind,
}

/// Writes a frame header. The payload size and payload, if any, follow
/// separately.
pub fn write_frame_head<W: Write>(out: &mut W, name: &str, kind: DiffKind) -> Result<()> {
    if name.is_empty() || name.len() > u16::MAX as usize {
        return Err(Error::BadPath(name.to_string()));
    }
    out.write_u16::<LE>(name.len() as u16)?;
    out.write_all(name.as_bytes())?;
    out.write_u8(kind as u8)?;
    Ok(())
}

/// Reads the next frame header.
///
/// Returns `Ok(None)` on a clean end of stream: running out of bytes while
/// reading the header is how the frame region ends, not an error.
pub fn read_frame_head<R: Read>(input: &mut R) -> Result<Option<FrameHead>> {
    let name_len = match input.read_u16::<LE>() {
        Ok(n) => n as usize,
        Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut name = vec![0u8; name_len];
    match input.read_exact(&mut name) {
        Ok(()) => (),
        Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let kind = match input.read_u8() {
        Ok(b) => b,
        Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let kind = DiffKind::from_raw(kind).ok_or(Error::CorruptStream("unknown instruction kind"))?;
    let name = String::from_utf8(name).map_err(|e| Error::BadPath(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
    Ok(Some(FrameHead { name, kind }))
}

/// Checks that a frame path is a well-formed `/`-separated relative path:
/// no leading `/`, no `.` or `..` components, no backslashes.
pub fn validate_name(name: &str) -> Result<()> {
    let well_formed = !name.is_empty()
        && !name.contains('\\')
        && !name.contains('\0')
        && name.split('/').all(|c| !c.is_empty() && c != "." && c != "..");
    if well_formed {
        Ok(())
    } else {
        Err(Error::BadPath(name.to_string()))
    }
}

/// The fixed record at the tail of every container.
///
/// `patch_offset` is where the framed data begins, `config_offset` is where
/// the config record sits (`<= 0` means no config record was written).
/// Keeping the offsets at the end, guarded by the tag, lets the patcher
/// locate the frames regardless of what precedes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub patch_offset: i64,
    pub config_offset: i64,
}

impl Trailer {
    pub fn write_into<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_i64::<LE>(self.patch_offset)?;
        out.write_i64::<LE>(self.config_offset)?;
        out.write_u64::<LE>(TRAILER_TAG)?;
        Ok(())
    }

    /// Seeks to the end of `input` and parses the trailer, returning it
    /// together with the total file size.
    ///
    /// Fails with [`Error::NotAPatch`] if the file is too short or the tag
    /// does not match.
    pub fn read_from<F: Read + Seek>(input: &mut F) -> Result<(Trailer, u64)> {
        let file_size = input.seek(SeekFrom::End(0))?;
        if file_size < TRAILER_SIZE {
            return Err(Error::NotAPatch);
        }
        input.seek(SeekFrom::End(-(TRAILER_SIZE as i64)))?;
        let patch_offset = input.read_i64::<LE>()?;
        let config_offset = input.read_i64::<LE>()?;
        let tag = input.read_u64::<LE>()?;
        if tag != TRAILER_TAG {
            return Err(Error::NotAPatch);
        }
        Ok((
            Trailer {
                patch_offset,
                config_offset,
            },
            file_size,
        ))
    }
}

/// Writes the config record (currently just the format version).
pub fn write_config<W: Write>(out: &mut W) -> Result<()> {
    out.write_u32::<LE>(FORMAT_VERSION)?;
    Ok(())
}

/// Reads the config record at `offset` and checks the format version.
pub fn read_config<F: Read + Seek>(input: &mut F, offset: i64) -> Result<()> {
    input.seek(SeekFrom::Start(offset as u64))?;
    let version = input.read_u32::<LE>()?;
    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    Ok(())
}
