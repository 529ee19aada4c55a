//! Capability traits for the external collaborators.
//!
//! The engine never touches the copy-on-write filesystem primitives
//! directly. It decides *when* and *on what* to act, and interprets
//! success/failure and status; the actual snapshot creation, block-level
//! transfer, and integrity scanning live behind these seams. Production
//! implementations shell out to the filesystem tooling; tests substitute
//! in-memory volumes.

use chrono::Utc;
use fsn_error::Result;
use fsn_types::{EpochSeconds, SnapshotName};
use std::fmt;

/// One of the two volumes in a mirror pair.
///
/// The engine supports exactly two: `Main` originates snapshots, `Mirror`
/// only ever receives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeRole {
    Main,
    Mirror,
}

impl fmt::Display for VolumeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Mirror => write!(f, "mirror"),
        }
    }
}

/// Externally-reported scrub state for one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubState {
    /// A scan is in progress.
    Running,
    /// A scan was interrupted (e.g., unclean shutdown) and can be resumed.
    Interrupted,
    /// A scan was aborted by an operator and can be resumed.
    Aborted,
    /// The last scan ran to completion.
    Finished,
    /// The driver could not classify the state.
    Unknown,
}

impl fmt::Display for ScrubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::Aborted => write!(f, "aborted"),
            Self::Finished => write!(f, "finished"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Point-in-time scrub status for one volume. Read-only input to the
/// scheduler apart from the state-transition commands it issues.
#[derive(Debug, Clone, Copy)]
pub struct ScrubStatus {
    pub state: ScrubState,
    /// Instant the last scrub completed, if any ever has.
    pub last_completed: Option<EpochSeconds>,
    /// Whether the reported statistics include uncorrected errors.
    pub errors_found: bool,
}

/// Snapshot lifecycle operations plus the chain-pointer marker.
///
/// The marker is volume-resident state (e.g., a `latest` symlink next to
/// the snapshots); there is no separate metadata store. `list_snapshot_names`
/// returns raw directory entries — callers decode and filter.
pub trait SnapshotDriver: Send + Sync {
    fn create_readonly_snapshot(&self, volume: VolumeRole, name: &SnapshotName) -> Result<()>;
    fn delete_snapshot(&self, volume: VolumeRole, name: &str) -> Result<()>;
    fn list_snapshot_names(&self, volume: VolumeRole) -> Result<Vec<String>>;
    /// Raw chain-pointer marker target, if a marker exists.
    fn read_marker(&self, volume: VolumeRole) -> Result<Option<String>>;
    /// Atomically replace the chain-pointer marker.
    fn write_marker(&self, volume: VolumeRole, name: &SnapshotName) -> Result<()>;
}

/// Block-level replication between the volumes.
pub trait TransferDriver: Send + Sync {
    /// Replicate `snapshot` wholesale into `destination`.
    fn transfer_full(&self, snapshot: &SnapshotName, destination: VolumeRole) -> Result<()>;
    /// Replicate only the differences between `basis` and `snapshot` into
    /// `destination`. `basis` must be present on both volumes.
    fn transfer_incremental(
        &self,
        basis: &SnapshotName,
        snapshot: &SnapshotName,
        destination: VolumeRole,
    ) -> Result<()>;
}

/// Integrity-scan control for one volume. `start`/`resume` launch the scan
/// in background mode; the driver call returns once the operation has been
/// accepted.
pub trait ScrubDriver: Send + Sync {
    fn status(&self, volume: VolumeRole) -> Result<ScrubStatus>;
    fn start(&self, volume: VolumeRole) -> Result<()>;
    fn resume(&self, volume: VolumeRole) -> Result<()>;
    fn cancel(&self, volume: VolumeRole) -> Result<()>;
}

/// Time source, second precision.
pub trait Clock: Send + Sync {
    fn now(&self) -> EpochSeconds;
}

/// Production clock reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> EpochSeconds {
        EpochSeconds(Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_roles_render_for_logging() {
        assert_eq!(VolumeRole::Main.to_string(), "main");
        assert_eq!(VolumeRole::Mirror.to_string(), "mirror");
    }

    #[test]
    fn system_clock_is_past_2020() {
        let now = SystemClock.now();
        assert!(now.0 > 1_577_836_800, "system clock reports {now}");
    }
}
