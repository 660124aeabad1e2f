#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use spatch::format::read_frame_head;
use spatch::{DiffKind, Differ, NullReport, Patcher, Trailer, TRAILER_SIZE};

/// Creates the given `relative path -> bytes` files under `root`.
pub fn build_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (rel, bytes) in files {
        let mut path = root.to_path_buf();
        for component in rel.split('/') {
            path.push(component);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }
}

/// Reads a whole tree back as `relative path -> bytes`.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut map = BTreeMap::new();
    collect(root, "", &mut map);
    map
}

fn collect(dir: &Path, rel: &str, map: &mut BTreeMap<String, Vec<u8>>) {
    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().into_string().unwrap();
        let child = if rel.is_empty() {
            name
        } else {
            format!("{}/{}", rel, name)
        };
        if entry.file_type().unwrap().is_dir() {
            collect(&entry.path(), &child, map);
        } else {
            map.insert(child, fs::read(entry.path()).unwrap());
        }
    }
}

pub fn diff_trees(source: Option<&Path>, target: &Path, compress: bool) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    Differ::new()
        .compress(compress)
        .diff_trees(source, target, &mut out, &mut NullReport)
        .unwrap();
    out.into_inner()
}

pub fn diff_file(source: Option<&Path>, target: &Path, compress: bool) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    Differ::new()
        .compress(compress)
        .diff_file(source, target, &mut out, &mut NullReport)
        .unwrap();
    out.into_inner()
}

pub fn patch_tree(container: &[u8], source: Option<&Path>, output: &Path) -> spatch::Result<()> {
    let mut cur = Cursor::new(container.to_vec());
    Patcher::new()
        .source(source)
        .apply_tree(&mut cur, output, &mut NullReport)
}

pub fn patch_file(container: &[u8], source: Option<&Path>, output: &Path) -> spatch::Result<()> {
    let mut cur = Cursor::new(container.to_vec());
    Patcher::new()
        .source(source)
        .apply_file(&mut cur, output, &mut NullReport)
}

/// One parsed container frame.
pub struct Frame {
    pub name: String,
    pub kind: DiffKind,
    pub payload: Vec<u8>,
}

/// A container pulled apart for structural assertions.
pub struct Parsed {
    pub frames: Vec<Frame>,
    pub trailer: Trailer,
    /// Frame-region length announced by the trailer.
    pub bytes_left: u64,
    /// Bytes actually consumed by summing frame lengths.
    pub consumed: u64,
}

pub fn parse_container(container: &[u8]) -> Parsed {
    let mut cur = Cursor::new(container);
    let (trailer, size) = Trailer::read_from(&mut cur).unwrap();
    let bytes_left = if trailer.config_offset > 0 {
        trailer.config_offset - trailer.patch_offset
    } else {
        size as i64 - trailer.patch_offset - TRAILER_SIZE as i64
    } as u64;

    let start = trailer.patch_offset as usize;
    let end = start + bytes_left as usize;
    let mut pos = start;
    let mut frames = Vec::new();
    while pos < end {
        let region = &container[pos..end];
        let mut rcur = Cursor::new(region);
        let head = match read_frame_head(&mut rcur).unwrap() {
            Some(head) => head,
            None => break,
        };
        let mut consumed = rcur.position() as usize;
        let payload = if head.kind.has_payload() {
            let psize =
                u32::from_le_bytes(region[consumed..consumed + 4].try_into().unwrap()) as usize;
            consumed += 4;
            let payload = region[consumed..consumed + psize].to_vec();
            consumed += psize;
            payload
        } else {
            Vec::new()
        };
        frames.push(Frame {
            name: head.name,
            kind: head.kind,
            payload,
        });
        pos += consumed;
    }

    Parsed {
        frames,
        trailer,
        bytes_left,
        consumed: (pos - start) as u64,
    }
}
