use std::io;

use thiserror::Error;

/// Everything that can go wrong while producing or applying a patch
/// container.
///
/// Only a few variants are interesting to callers: [`Error::NotAPatch`] and
/// [`Error::UnsupportedVersion`] identify inputs that are not (usable)
/// containers at all, and [`Error::SourceMissing`] is the one per-frame
/// failure the patcher can optionally skip over.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// Truncated frame, bad property block, or a decoder that disagreed
    /// with the sizes declared in the container.
    #[error("corrupt patch stream: {0}")]
    CorruptStream(&'static str),

    /// The trailer tag was absent or wrong.
    #[error("not a patch file")]
    NotAPatch,

    /// The config record carried a format version this build does not know.
    #[error("unsupported patch format version {0}")]
    UnsupportedVersion(u32),

    /// A change frame referenced a source file that could not be opened.
    #[error("unable to open source file `{0}`")]
    SourceMissing(String),

    /// A frame carried a path that is not a well-formed relative path.
    #[error("malformed path in patch stream: `{0}`")]
    BadPath(String),

    #[error("bad configuration: {0}")]
    Config(String),

    /// The compressor itself failed, as opposed to the file it writes to.
    #[error("compression failure: {0}")]
    Compress(#[from] xz2::stream::Error),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
