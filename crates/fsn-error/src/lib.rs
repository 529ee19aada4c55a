#![forbid(unsafe_code)]
//! Error types for FrankenSnap.
//!
//! # Error Taxonomy
//!
//! FrankenSnap uses a two-layer error model:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Naming | `NameError` | `fsn-types` | Directory entries that are not snapshot names; filtered, never fatal |
//! | Runtime | `FsnError` | `fsn-error` (this crate) | Run-failing conditions surfaced to the CLI and schedulers |
//!
//! `fsn-error` is intentionally independent of `fsn-types`: `NameError`
//! never crosses a crate boundary as a failure (non-matching names are
//! excluded from consideration, not reported), so no conversion exists.
//! The one exception — a clock instant that cannot be placed on the
//! calendar — is converted to [`FsnError::ClockRange`] in `fsn-engine`.
//!
//! Note that "candidate name collides with the chain pointer" is *not* an
//! error. It is ordinary contention between two runs in the same second and
//! is modeled as a distinct non-error outcome (`ExitOutcome::TryLater` in
//! `fsn-engine`) so a scheduler can simply retry without alarm.
//!
//! ## Exit-Code Mapping
//!
//! Every `FsnError` variant maps to exactly one process exit code via
//! [`FsnError::exit_code`]. The mapping is exhaustive (no wildcard arms) so
//! adding a variant without assigning its code is a compile error. A
//! scheduler invoking the binary repeatedly can thereby distinguish
//! "done", "retry later", and "needs operator attention":
//!
//! | Outcome | Code |
//! |---------|------|
//! | Success | 0 |
//! | `Io` / `Driver` | 1 |
//! | TryLater (not an error) | 2 |
//! | `FutureSnapshot` / `ClockRange` | 3 |
//! | `Inconsistent` | 4 |

use thiserror::Error;

/// Unified error type for all FrankenSnap run failures.
///
/// Every failure is terminal for the run (fail-fast, rerun-later); no error
/// is silently swallowed and none triggers an automatic retry.
#[derive(Debug, Error)]
pub enum FsnError {
    /// Operating system I/O error from the production drivers' plumbing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot dated in the future relative to "now" was observed.
    ///
    /// Clock skew anomaly: retention windows would silently misclassify
    /// such a snapshot, so the whole run aborts before any deletion.
    #[error("future-dated snapshot {name} is newer than now ({now}); aborting before any deletion")]
    FutureSnapshot { name: String, now: i64 },

    /// The clock produced an instant that cannot be placed on the calendar.
    #[error("clock anomaly: instant {epoch} is outside the representable calendar range")]
    ClockRange { epoch: i64 },

    /// An external driver operation (snapshot, transfer, scrub) failed.
    ///
    /// Fatal for the run; compensation happens only where defined (the
    /// post-transfer snapshot cleanup).
    #[error("{op} failed on {volume} volume: {detail}")]
    Driver {
        op: &'static str,
        volume: String,
        detail: String,
    },

    /// A mutation failed after prior steps already succeeded (chain-pointer
    /// advance, prune deletion).
    ///
    /// Automatic compensation could itself be unsafe here; surfaced
    /// distinctly as requiring manual inspection.
    #[error("inconsistent volume state, manual inspection required: {detail}")]
    Inconsistent { detail: String },
}

impl FsnError {
    /// Process exit code for this failure.
    ///
    /// Exhaustive — adding a variant without updating this function is a
    /// compile error. Code 2 is reserved for the non-error "try later"
    /// outcome and is never produced here.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) | Self::Driver { .. } => 1,
            Self::FutureSnapshot { .. } | Self::ClockRange { .. } => 3,
            Self::Inconsistent { .. } => 4,
        }
    }
}

/// Result alias using `FsnError`.
pub type Result<T> = std::result::Result<T, FsnError>;
