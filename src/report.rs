//! Progress and diagnostics surface shared by the differ and the patcher.

use crate::format::DiffKind;

/// Observer callbacks. All methods have no-op defaults, so an
/// implementation only overrides what it cares about.
///
/// The engines pass a `&mut dyn Report` through every operation instead of
/// registering process-wide callbacks; [`NullReport`] is the convenience
/// default for callers that want silence.
pub trait Report {
    /// Called once per frame just before it is processed. `size` is the
    /// expected output byte count, `-1` when unknown (change frames) and
    /// `0` for deletes.
    fn info(&mut self, _path: &str, _size: i64, _kind: DiffKind) {}

    /// Called one or more times per frame with output bytes produced so
    /// far; `-1` marks frame completion.
    ///
    /// Returning `false` requests cancellation. Cancellation is honored at
    /// frame granularity: the current frame runs to completion (including
    /// its backup cleanup) and the engine then stops with
    /// [`crate::Error::Cancelled`].
    fn progress(&mut self, _done: i64) -> bool {
        true
    }

    /// Diagnostics. Negative `severity` means error.
    fn message(&mut self, _severity: i32, _text: &str) {}
}

/// A [`Report`] that ignores everything.
pub struct NullReport;

impl Report for NullReport {}
