/*!
Directory tree differ and patcher built around a self-locating binary patch
container.

The differ walks a source and a target tree (or compares two single files),
classifies every target path as change, add or delete, and appends one framed
instruction per path to the container. Change payloads are binary deltas
against the source file; add payloads carry the target bytes verbatim; both
can optionally be wrapped in an LZMA stream. A fixed trailer at the end of
the file carries the offsets needed to find the patch data again, so the
container may be concatenated onto an arbitrary prologue (for example a
self-extracting launcher).

The patcher reads the trailer, iterates the frames and rebuilds each target
file, fetching delta source data in 256 KiB blocks so that source files are
never fully resident. Existing target files are renamed aside before being
overwritten and restored if the frame fails.

Build commands
--------------

The commands `sdiffer` and `spatcher` could be compiled with:
```shell
$ cargo build --release --bins --features cmd
$ target/release/sdiffer -h
$ target/release/spatcher -h
```

Examples
--------

Produce a patch container from two directory trees, then apply it:
```no_run
use std::fs::File;
use std::path::Path;
use spatch::{Differ, NullReport, Patcher};

fn upgrade() -> spatch::Result<()> {
    let out = File::create("update.spatch")?;
    Differ::new()
        .compress(true)
        .diff_trees(Some(Path::new("v1")), Path::new("v2"), out, &mut NullReport)?;

    let mut patch = File::open("update.spatch")?;
    Patcher::new()
        .source(Some("v1"))
        .apply_tree(&mut patch, Path::new("v2-rebuilt"), &mut NullReport)
}
```
*/

pub mod apply;
pub mod config;
pub mod delta;
pub mod differ;
pub mod error;
pub mod format;
pub mod lzma;
pub mod memstream;
pub mod patcher;
pub mod report;
pub mod source;

pub use apply::DeltaApply;
pub use config::DiffConfig;
pub use delta::Delta;
pub use differ::Differ;
pub use error::{Error, Result};
pub use format::{DiffKind, Trailer, FORMAT_VERSION, TRAILER_SIZE, TRAILER_TAG};
pub use memstream::MemStream;
pub use patcher::Patcher;
pub use report::{NullReport, Report};
pub use source::SourceBlocks;

/// I/O window used throughout: delta source blocks, copy loops and
/// decompression passes all move data in chunks of this size.
pub const BLOCK_SIZE: usize = 256 * 1024;
