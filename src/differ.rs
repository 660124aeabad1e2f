//! The differ engine: walks source and target, classifies every target
//! path, and appends one frame per path to the container.
//!
//! Two passes over the target tree produce change and add frames, then one
//! pass over the source tree produces deletes, so that an observer of a
//! live run always sees additions before removals. The trailer is written
//! last; if the differ fails, no trailer exists and the patcher will reject
//! the partial container cleanly.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Seek, Write};
use std::path::Path;

use byteorder::{WriteBytesExt, LE};

use crate::delta::Delta;
use crate::error::{Error, Result};
use crate::format::{self, DiffKind, Trailer};
use crate::lzma;
use crate::memstream::MemStream;
use crate::report::Report;
use crate::BLOCK_SIZE;

/// Patch container producer.
///
/// The output stream only needs `Write + Seek`; the differ captures the
/// current position as the patch offset, so a prologue (such as a
/// self-extracting launcher) may already have been written to it.
pub struct Differ {
    compress: bool,
}

impl Differ {
    pub fn new() -> Self {
        Differ { compress: false }
    }

    /// Wraps every payload in an LZMA stream (default is off).
    pub fn compress(mut self, yes: bool) -> Self {
        self.compress = yes;
        self
    }

    /// Diffs two directory trees into `out`. `source_root` of `None` means
    /// "no source": every target file becomes an add frame and no delete
    /// frames are produced.
    pub fn diff_trees<W: Write + Seek>(
        &self,
        source_root: Option<&Path>,
        target_root: &Path,
        out: W,
        report: &mut dyn Report,
    ) -> Result<()> {
        let mut session = Session {
            out,
            compress: self.compress,
            report,
        };
        let patch_offset = session.out.stream_position()?;
        session.walk_changes("", source_root, target_root)?;
        if let Some(source_root) = source_root {
            session.walk_deletes("", source_root, target_root)?;
        }
        session.finish(patch_offset)
    }

    /// Diffs two single files into `out`, emitting exactly one frame:
    /// a change frame named after the source if it is readable, an add
    /// frame named after the target otherwise.
    pub fn diff_file<W: Write + Seek>(
        &self,
        source: Option<&Path>,
        target: &Path,
        out: W,
        report: &mut dyn Report,
    ) -> Result<()> {
        let mut session = Session {
            out,
            compress: self.compress,
            report,
        };
        let patch_offset = session.out.stream_position()?;
        let source_bytes = source.and_then(|p| fs::read(p).ok().map(|b| (p, b)));
        match source_bytes {
            Some((source_path, bytes)) => {
                let name = path_name(source_path)?;
                let target_bytes = fs::read(target)?;
                session.change_frame(&name, &bytes, &target_bytes)?;
            }
            None => {
                let name = path_name(target)?;
                session.add_frame(&name, target)?;
            }
        }
        session.finish(patch_offset)
    }
}

impl Default for Differ {
    fn default() -> Self {
        Differ::new()
    }
}

struct Session<'r, W> {
    out: W,
    compress: bool,
    report: &'r mut dyn Report,
}

impl<'r, W: Write + Seek> Session<'r, W> {
    /// Additions/changes pass: depth-first over the target tree, hidden
    /// entries skipped, order fixed by sorting directory entries by name.
    fn walk_changes(
        &mut self,
        rel: &str,
        source_dir: Option<&Path>,
        target_dir: &Path,
    ) -> Result<()> {
        for entry in sorted_entries(target_dir)? {
            let name = entry_name(&entry)?;
            if name.starts_with('.') {
                continue;
            }
            let rel_child = join_rel(rel, &name);
            let source_child = source_dir.map(|d| d.join(&name));
            if entry.file_type()?.is_dir() {
                self.walk_changes(&rel_child, source_child.as_deref(), &entry.path())?;
            } else {
                self.file_frame(&rel_child, source_child.as_deref(), &entry.path())?;
            }
        }
        Ok(())
    }

    /// Deletions pass: every source file without a target counterpart gets
    /// a delete frame. Walk failures abort the differ.
    fn walk_deletes(&mut self, rel: &str, source_dir: &Path, target_dir: &Path) -> Result<()> {
        for entry in sorted_entries(source_dir)? {
            let name = entry_name(&entry)?;
            if name.starts_with('.') {
                continue;
            }
            let rel_child = join_rel(rel, &name);
            if entry.file_type()?.is_dir() {
                self.walk_deletes(&rel_child, &entry.path(), &target_dir.join(&name))?;
            } else if !target_dir.join(&name).exists() {
                self.delete_frame(&rel_child)?;
            }
        }
        Ok(())
    }

    /// A target file is a change if its source counterpart is readable, an
    /// add otherwise. Byte-identical pairs produce no frame at all: the
    /// patcher leaves unmentioned paths untouched.
    fn file_frame(&mut self, rel: &str, source: Option<&Path>, target: &Path) -> Result<()> {
        let source_bytes = source.and_then(|p| fs::read(p).ok());
        match source_bytes {
            Some(bytes) => {
                let target = fs::read(target)?;
                if bytes == target {
                    self.report.message(0, &format!("skip {} (unchanged)", rel));
                    return Ok(());
                }
                self.change_frame(rel, &bytes, &target)
            }
            None => self.add_frame(rel, target),
        }
    }

    fn change_frame(&mut self, rel: &str, source: &[u8], target: &[u8]) -> Result<()> {
        self.report.message(
            0,
            &format!("diff {} ({} -> {} bytes)", rel, source.len(), target.len()),
        );

        let mut payload = MemStream::new();
        Delta::new(source).compare(target, &mut payload)?;
        self.report
            .message(0, &format!("  patch data size: {}", payload.len()));

        let kind = if self.compress {
            DiffKind::ChangeLzma
        } else {
            DiffKind::Change
        };
        format::write_frame_head(&mut self.out, rel, kind)?;
        self.report.info(rel, target.len() as i64, kind);
        if self.compress {
            let total = payload.len() as u64;
            lzma::compress_stream(&mut payload, total, &mut self.out, &mut *self.report)?;
        } else {
            self.raw_payload(payload)?;
        }
        self.frame_done()
    }

    fn add_frame(&mut self, rel: &str, target_path: &Path) -> Result<()> {
        let mut file = File::open(target_path)?;
        let size = file.metadata()?.len();
        self.report
            .message(0, &format!("add {} ({} bytes)", rel, size));

        let kind = if self.compress {
            DiffKind::AddOrReplaceLzma
        } else {
            DiffKind::AddOrReplace
        };
        format::write_frame_head(&mut self.out, rel, kind)?;
        self.report.info(rel, size as i64, kind);
        if self.compress {
            lzma::compress_stream(&mut file, size, &mut self.out, &mut *self.report)?;
        } else {
            payload_size_guard(size)?;
            self.out.write_u32::<LE>(size as u32)?;
            let mut buf = vec![0u8; BLOCK_SIZE];
            let mut left = size;
            while left > 0 {
                let want = Ord::min(left, BLOCK_SIZE as u64) as usize;
                let got = crate::source::read_full(&mut file, &mut buf[..want])?;
                if got == 0 {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "target file shrank during diff",
                    )
                    .into());
                }
                self.out.write_all(&buf[..got])?;
                left -= got as u64;
                let _ = self.report.progress((size - left) as i64);
            }
        }
        self.frame_done()
    }

    fn delete_frame(&mut self, rel: &str) -> Result<()> {
        self.report.message(0, &format!("delete {}", rel));
        format::write_frame_head(&mut self.out, rel, DiffKind::Delete)?;
        self.report.info(rel, 0, DiffKind::Delete);
        self.frame_done()
    }

    /// Uncompressed payload: size word, then the buffered bursts.
    fn raw_payload(&mut self, mut payload: MemStream) -> Result<()> {
        let total = payload.len();
        payload_size_guard(total as u64)?;
        self.out.write_u32::<LE>(total as u32)?;
        let mut buf = vec![0u8; BLOCK_SIZE];
        let mut done = 0usize;
        loop {
            let n = payload.read_into(&mut buf);
            if n == 0 {
                break;
            }
            self.out.write_all(&buf[..n])?;
            done += n;
            let _ = self.report.progress(done as i64);
        }
        Ok(())
    }

    fn frame_done(&mut self) -> Result<()> {
        if self.report.progress(-1) {
            Ok(())
        } else {
            Err(Error::Cancelled)
        }
    }

    /// Config record, then the trailer. Written only on success, so a
    /// failed diff leaves a tagless file behind.
    ///
    /// `config_offset > 0` is the patcher's presence condition, so an empty
    /// frame region at the very start of the file gets no config record.
    fn finish(&mut self, patch_offset: u64) -> Result<()> {
        let position = self.out.stream_position()?;
        let config_offset = if position > 0 {
            format::write_config(&mut self.out)?;
            position as i64
        } else {
            0
        };
        Trailer {
            patch_offset: patch_offset as i64,
            config_offset,
        }
        .write_into(&mut self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

fn entry_name(entry: &fs::DirEntry) -> Result<String> {
    let name = entry.file_name();
    match name.to_str() {
        Some(s) => Ok(s.to_string()),
        None => Err(Error::BadPath(name.to_string_lossy().into_owned())),
    }
}

fn join_rel(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", rel, name)
    }
}

/// Container paths always use `/`.
fn path_name(path: &Path) -> Result<String> {
    match path.to_str() {
        Some(s) => Ok(s.replace('\\', "/")),
        None => Err(Error::BadPath(path.to_string_lossy().into_owned())),
    }
}

fn payload_size_guard(size: u64) -> Result<()> {
    if size > u32::MAX as u64 {
        Err(io::Error::new(ErrorKind::InvalidInput, "payload exceeds 4 GiB frame limit").into())
    } else {
        Ok(())
    }
}
