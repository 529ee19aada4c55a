#![forbid(unsafe_code)]
//! FrankenSnap engine: snapshot lifecycle, GFS retention, scrub scheduling,
//! and the backup orchestrator.
//!
//! The engine owns the decisions — when to scrub, what to name a snapshot,
//! which transfer to request, which snapshots survive a cleanup pass — and
//! delegates every filesystem primitive to the capability traits in
//! [`driver`]. Persisted state is entirely the snapshot set and the
//! chain-pointer marker on each volume; there is no separate metadata
//! store.

pub mod chain;
pub mod driver;
pub mod orchestrator;
pub mod retention;
pub mod scrub;

pub use driver::{Clock, ScrubDriver, ScrubState, ScrubStatus, SnapshotDriver, SystemClock,
    TransferDriver, VolumeRole};
pub use orchestrator::{BackupConfig, ExitOutcome, Orchestrator};
pub use retention::{EvaluationContext, RetentionConfig, RetentionPlan};
