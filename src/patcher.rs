//! The patcher engine: locates the frame region via the trailer, then
//! replays frames one at a time.
//!
//! Before a frame overwrites an existing target file, the file is renamed
//! aside to `{name}.sbk.{i}`; the backup is removed once the frame
//! succeeds and restored if it fails, so an interrupted run never loses
//! the original content. In tree mode without a source root that backup
//! doubles as the delta source, which is what makes in-place upgrades
//! work when source and destination are the same directory.

#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{ReadBytesExt, LE};

use crate::apply::DeltaApply;
use crate::error::{Error, Result};
use crate::format::{self, DiffKind, FrameHead, Trailer, TRAILER_SIZE};
use crate::lzma;
use crate::report::Report;
use crate::source::{read_full, SourceBlocks};
use crate::BLOCK_SIZE;

/// Patch container consumer.
pub struct Patcher {
    source_root: Option<PathBuf>,
    continue_on_missing: bool,
}

enum FrameOutcome {
    Done,
    End,
}

impl Patcher {
    pub fn new() -> Self {
        Patcher {
            source_root: None,
            continue_on_missing: false,
        }
    }

    /// Source location for change frames. In tree mode `None` means
    /// in-place: the existing target file, renamed aside, becomes the
    /// delta source. In single mode `None` falls back to the frame name.
    pub fn source<P: Into<PathBuf>>(mut self, source: Option<P>) -> Self {
        self.source_root = source.map(Into::into);
        self
    }

    /// Keep patching after a change frame whose source file cannot be
    /// opened (default is to abort).
    pub fn continue_on_missing_source(mut self, yes: bool) -> Self {
        self.continue_on_missing = yes;
        self
    }

    /// Applies a tree-mode container: every frame path is resolved under
    /// `output_root`, creating intermediate directories as needed.
    pub fn apply_tree<F: Read + Seek>(
        &self,
        patch: &mut F,
        output_root: &Path,
        report: &mut dyn Report,
    ) -> Result<()> {
        self.run(patch, output_root, true, report)
    }

    /// Applies a single-file container: the first frame is applied to
    /// `output_path` exactly as supplied.
    pub fn apply_file<F: Read + Seek>(
        &self,
        patch: &mut F,
        output_path: &Path,
        report: &mut dyn Report,
    ) -> Result<()> {
        self.run(patch, output_path, false, report)
    }

    fn run<F: Read + Seek>(
        &self,
        patch: &mut F,
        output: &Path,
        tree: bool,
        report: &mut dyn Report,
    ) -> Result<()> {
        let (trailer, file_size) = Trailer::read_from(patch)?;

        let patch_offset = trailer.patch_offset;
        if patch_offset < 0 || patch_offset as u64 > file_size {
            return Err(Error::CorruptStream("trailer offsets out of range"));
        }
        if trailer.config_offset > 0 {
            if trailer.config_offset as u64 > file_size.saturating_sub(TRAILER_SIZE + 4) {
                return Err(Error::CorruptStream("trailer offsets out of range"));
            }
            format::read_config(patch, trailer.config_offset)?;
        }

        let bytes_left = if trailer.config_offset > 0 {
            trailer.config_offset - patch_offset
        } else {
            file_size as i64 - patch_offset - TRAILER_SIZE as i64
        };
        if bytes_left < 0 {
            return Err(Error::CorruptStream("trailer offsets out of range"));
        }

        patch.seek(SeekFrom::Start(patch_offset as u64))?;
        let end = (patch_offset + bytes_left) as u64;
        while patch.stream_position()? < end {
            match self.frame(patch, output, tree, report) {
                Ok(FrameOutcome::End) => break,
                Ok(FrameOutcome::Done) => {
                    if !report.progress(-1) {
                        return Err(Error::Cancelled);
                    }
                }
                Err(Error::SourceMissing(name)) if self.continue_on_missing && tree => {
                    report.message(-1, &format!("unable to open source file `{}`", name));
                }
                Err(e) => return Err(e),
            }
            if !tree {
                break;
            }
        }
        Ok(())
    }

    /// Processes one frame, rolling back the output file on failure.
    fn frame<F: Read + Seek>(
        &self,
        patch: &mut F,
        output: &Path,
        tree: bool,
        report: &mut dyn Report,
    ) -> Result<FrameOutcome> {
        let head = match format::read_frame_head(patch)? {
            Some(head) => head,
            None => return Ok(FrameOutcome::End),
        };
        if tree {
            format::validate_name(&head.name)?;
        }

        let out_path = if tree {
            rel_path(output, &head.name)
        } else {
            output.to_path_buf()
        };

        if head.kind == DiffKind::Delete {
            report.info(&out_path.to_string_lossy(), 0, DiffKind::Delete);
            fs::remove_file(&out_path)?;
            return Ok(FrameOutcome::Done);
        }

        let payload_size = patch
            .read_u32::<LE>()
            .map_err(|e| truncated(e, "truncated frame header"))? as u64;

        let mut backup = None;
        let result = self.write_frame(patch, &head, payload_size, &out_path, tree, &mut backup, report);
        match result {
            Ok(()) => {
                if let Some(bak) = backup {
                    let _ = fs::remove_file(bak);
                }
                Ok(FrameOutcome::Done)
            }
            Err(e) => {
                if let Some(bak) = &backup {
                    let _ = fs::remove_file(&out_path);
                    let _ = fs::rename(bak, &out_path);
                } else if !matches!(e, Error::SourceMissing(_)) {
                    let _ = fs::remove_file(&out_path);
                }
                Err(e)
            }
        }
    }

    /// Produces the output file for one non-delete frame. `backup` is left
    /// pointing at the renamed-aside original, if there was one, so the
    /// caller can commit or roll back.
    fn write_frame<F: Read + Seek>(
        &self,
        patch: &mut F,
        head: &FrameHead,
        payload_size: u64,
        out_path: &Path,
        tree: bool,
        backup: &mut Option<PathBuf>,
        report: &mut dyn Report,
    ) -> Result<()> {
        let path_text = out_path.to_string_lossy().into_owned();

        if head.kind.is_change() {
            // Resolve the delta source first; its payload must stay
            // skippable when the source is missing.
            let source_path = if tree {
                match &self.source_root {
                    Some(root) => rel_path(root, &head.name),
                    None => {
                        *backup = backup_aside(out_path)?;
                        match backup {
                            Some(bak) => bak.clone(),
                            None => {
                                skip_payload(patch, payload_size)?;
                                return Err(Error::SourceMissing(head.name.clone()));
                            }
                        }
                    }
                }
            } else {
                match &self.source_root {
                    Some(root) => root.clone(),
                    None => PathBuf::from(&head.name),
                }
            };
            let source_file = match File::open(&source_path) {
                Ok(f) => f,
                Err(_) => {
                    skip_payload(patch, payload_size)?;
                    return Err(Error::SourceMissing(source_path.to_string_lossy().into_owned()));
                }
            };

            let mut payload = read_payload(patch, payload_size)?;
            if head.kind.is_compressed() {
                payload = lzma::decompress_payload(&payload)?;
            }

            if backup.is_none() {
                *backup = backup_aside(out_path)?;
            }
            make_parent_dirs(out_path)?;
            let mut out = BufWriter::new(File::create(out_path)?);

            report.info(&path_text, -1, head.kind);
            let _ = report.progress(0);
            let delta = DeltaApply::new(&payload)?;
            let mut blocks = SourceBlocks::new(source_file);
            delta.apply(&mut blocks, &mut out, report)?;
            out.flush()?;
        } else {
            *backup = backup_aside(out_path)?;
            make_parent_dirs(out_path)?;
            let mut out = File::create(out_path)?;

            if head.kind.is_compressed() {
                if payload_size < 4 {
                    return Err(Error::CorruptStream("compressed payload too short"));
                }
                let orig_size = patch
                    .read_u32::<LE>()
                    .map_err(|e| truncated(e, "truncated frame payload"))? as u64;
                report.info(&path_text, orig_size as i64, head.kind);
                let _ = report.progress(0);
                lzma::decompress_stream(patch, payload_size - 4, orig_size, &mut out, report)?;
            } else {
                report.info(&path_text, payload_size as i64, head.kind);
                let _ = report.progress(0);
                let mut buf = vec![0u8; BLOCK_SIZE];
                let mut left = payload_size;
                while left > 0 {
                    let want = Ord::min(left, BLOCK_SIZE as u64) as usize;
                    let got = read_full(patch, &mut buf[..want])?;
                    if got == 0 {
                        return Err(Error::CorruptStream("truncated add payload"));
                    }
                    out.write_all(&buf[..got])?;
                    left -= got as u64;
                    let _ = report.progress((payload_size - left) as i64);
                }
            }
            out.flush()?;
        }
        Ok(())
    }
}

impl Default for Patcher {
    fn default() -> Self {
        Patcher::new()
    }
}

/// Resolves a `/`-separated container path under `root`.
fn rel_path(root: &Path, name: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in name.split('/') {
        path.push(component);
    }
    path
}

fn make_parent_dirs(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Renames an existing file to its lowest free `.sbk.{i}` sibling.
/// Returns `None` when there is nothing to back up.
fn backup_aside(path: &Path) -> io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    for i in 0..999 {
        let mut candidate = path.as_os_str().to_os_string();
        candidate.push(format!(".sbk.{}", i));
        let candidate = PathBuf::from(candidate);
        if candidate.exists() {
            continue;
        }
        if fs::rename(path, &candidate).is_ok() {
            return Ok(Some(candidate));
        }
    }
    Err(io::Error::new(
        ErrorKind::Other,
        "no free backup slot next to the target file",
    ))
}

fn skip_payload<F: Seek>(patch: &mut F, payload_size: u64) -> Result<()> {
    patch.seek(SeekFrom::Current(payload_size as i64))?;
    Ok(())
}

fn read_payload<F: Read>(patch: &mut F, size: u64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; size as usize];
    patch
        .read_exact(&mut buf)
        .map_err(|e| truncated(e, "truncated frame payload"))?;
    Ok(buf)
}

fn truncated(e: io::Error, what: &'static str) -> Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        Error::CorruptStream(what)
    } else {
        Error::Io(e)
    }
}
