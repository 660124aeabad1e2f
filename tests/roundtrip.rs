mod common;

extern crate quickcheck;
extern crate quickcheck_macros;

use std::fs;

use common::*;
use quickcheck_macros::*;
use spatch::DiffKind;
use tempfile::tempdir;

#[test]
fn identity_single_file() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("src.bin");
    let target = dir.path().join("tgt.bin");
    fs::write(&source, b"hello world").unwrap();
    fs::write(&target, b"hello world").unwrap();

    let container = diff_file(Some(&source), &target, false);
    let parsed = parse_container(&container);
    assert_eq!(parsed.frames.len(), 1);
    assert_eq!(parsed.frames[0].kind, DiffKind::Change);
    assert_eq!(parsed.frames[0].name, source.to_str().unwrap());
    assert!(!parsed.frames[0].payload.is_empty());
    assert!(parsed.frames[0].payload.len() < 64);

    let output = dir.path().join("out.bin");
    patch_file(&container, Some(&source), &output).unwrap();
    assert_eq!(fs::read(&output).unwrap(), b"hello world");
}

#[test]
fn pure_add_single_file() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("fresh.bin");
    fs::write(&target, [0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

    let container = diff_file(None, &target, false);
    let parsed = parse_container(&container);
    assert_eq!(parsed.frames.len(), 1);
    assert_eq!(parsed.frames[0].kind, DiffKind::AddOrReplace);
    assert_eq!(parsed.frames[0].payload, [0xDE, 0xAD, 0xBE, 0xEF]);

    let output = dir.path().join("out.bin");
    patch_file(&container, None, &output).unwrap();
    assert_eq!(fs::read(&output).unwrap(), [0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn deletion_tree() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let target = dir.path().join("target");
    build_tree(&source, &[("a.txt", b"x"), ("b.txt", b"y")]);
    build_tree(&target, &[("a.txt", b"x")]);

    let container = diff_trees(Some(&source), &target, false);
    let parsed = parse_container(&container);
    assert_eq!(parsed.frames.len(), 1);
    assert_eq!(parsed.frames[0].kind, DiffKind::Delete);
    assert_eq!(parsed.frames[0].name, "b.txt");

    // apply onto the source tree itself (in-place upgrade)
    patch_tree(&container, None, &source).unwrap();
    assert_eq!(read_tree(&source), read_tree(&target));
}

#[test]
fn compressed_add_stays_small() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("big.bin");
    fs::write(&target, vec![b'A'; 65536]).unwrap();

    let container = diff_file(None, &target, true);
    let parsed = parse_container(&container);
    assert_eq!(parsed.frames.len(), 1);
    assert_eq!(parsed.frames[0].kind, DiffKind::AddOrReplaceLzma);
    assert!(parsed.frames[0].payload.len() < 4096);

    let output = dir.path().join("out.bin");
    patch_file(&container, None, &output).unwrap();
    assert_eq!(fs::read(&output).unwrap(), vec![b'A'; 65536]);
}

#[test]
fn tree_roundtrip() {
    let dir = tempdir().unwrap();
    let v1 = dir.path().join("v1");
    let v2 = dir.path().join("v2");
    build_tree(
        &v1,
        &[
            ("app.bin", &[1u8; 40_000][..]),
            ("data/strings.txt", b"one\ntwo\nthree\n"),
            ("data/obsolete.dat", b"gone soon"),
            ("same.cfg", b"untouched"),
        ],
    );
    build_tree(
        &v2,
        &[
            ("app.bin", &{
                let mut v = vec![1u8; 40_000];
                v[20_000..20_016].copy_from_slice(b"patched-section!");
                v
            }),
            ("data/strings.txt", b"one\ntwo\nthree\nfour\n"),
            ("data/new.dat", b"brand new"),
            ("same.cfg", b"untouched"),
        ],
    );

    for compress in [false, true] {
        let container = diff_trees(Some(&v1), &v2, compress);

        // replay over a copy of v1, the way an in-place upgrade runs
        let work = dir.path().join(format!("work-{}", compress));
        for (rel, bytes) in read_tree(&v1) {
            build_tree(&work, &[(rel.as_str(), bytes.as_slice())]);
        }
        patch_tree(&container, None, &work).unwrap();
        assert_eq!(read_tree(&work), read_tree(&v2));
    }
}

#[test]
fn hidden_entries_are_skipped() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("tree");
    build_tree(&target, &[("visible.txt", b"v"), (".hidden", b"h"), (".git/config", b"c")]);

    let container = diff_trees(None, &target, false);
    let parsed = parse_container(&container);
    assert_eq!(parsed.frames.len(), 1);
    assert_eq!(parsed.frames[0].name, "visible.txt");
}

#[test]
fn compression_is_observably_neutral() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let target = dir.path().join("target");
    build_tree(&source, &[("blob.bin", &[7u8; 10_000][..])]);
    build_tree(
        &target,
        &[("blob.bin", &[8u8; 10_000][..]), ("extra.bin", &[9u8; 3_000][..])],
    );

    let plain = diff_trees(Some(&source), &target, false);
    let packed = diff_trees(Some(&source), &target, true);

    let out_plain = dir.path().join("out-plain");
    let out_packed = dir.path().join("out-packed");
    patch_tree(&plain, Some(&source), &out_plain).unwrap();
    patch_tree(&packed, Some(&source), &out_packed).unwrap();
    assert_eq!(read_tree(&out_plain), read_tree(&out_packed));
}

#[test]
fn scattered_edits_roundtrip_compressed() {
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut source = vec![0u8; 300_000];
    rng.fill_bytes(&mut source);
    let mut target = source.clone();
    for i in 0..40usize {
        let at = (i * 7013) % (target.len() - 64);
        rng.fill_bytes(&mut target[at..at + 48]);
    }

    let dir = tempdir().unwrap();
    let source_path = dir.path().join("s.bin");
    let target_path = dir.path().join("t.bin");
    let output = dir.path().join("o.bin");
    fs::write(&source_path, &source).unwrap();
    fs::write(&target_path, &target).unwrap();

    let container = diff_file(Some(&source_path), &target_path, true);
    let parsed = parse_container(&container);
    assert_eq!(parsed.frames[0].kind, DiffKind::ChangeLzma);
    // mostly copies, so the frame is far smaller than the file
    assert!(container.len() < target.len() / 2);

    patch_file(&container, Some(&source_path), &output).unwrap();
    assert_eq!(fs::read(&output).unwrap(), target);
}

#[quickcheck]
fn single_file_roundtrip(s: Vec<u8>, t: Vec<u8>) -> bool {
    let dir = tempdir().unwrap();
    let source = dir.path().join("s");
    let target = dir.path().join("t");
    let output = dir.path().join("o");
    fs::write(&source, &s).unwrap();
    fs::write(&target, &t).unwrap();

    let container = diff_file(Some(&source), &target, false);
    patch_file(&container, Some(&source), &output).unwrap();
    fs::read(&output).unwrap() == t
}
