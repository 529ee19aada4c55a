//! Chain pointer: the per-volume basis marker for incremental transfers.
//!
//! Each volume carries exactly one marker naming "the snapshot most
//! recently confirmed present and consistent on both volumes". The marker
//! is a weak reference: it is resolved against the live snapshot set on
//! every use, and an absent, unparseable, or dangling marker yields the
//! meaningful "no basis" signal (the next transfer must be full), never an
//! error. Advancing the marker is strictly the last step of a confirmed
//! transfer; a failed advance is an inconsistent-state failure with no
//! automatic compensation.

use crate::driver::{SnapshotDriver, VolumeRole};
use fsn_error::{FsnError, Result};
use fsn_types::SnapshotName;
use tracing::{debug, warn};

/// Resolve the current incremental-transfer basis on `volume`.
///
/// Returns `None` ("no basis") when no marker exists, when the marker
/// target is not a snapshot name, or when the named snapshot is no longer
/// present on the volume.
pub fn read_basis(
    driver: &dyn SnapshotDriver,
    volume: VolumeRole,
) -> Result<Option<SnapshotName>> {
    let Some(raw) = driver.read_marker(volume)? else {
        debug!(%volume, "no chain marker; next transfer will be full");
        return Ok(None);
    };

    let Ok(name) = SnapshotName::parse(&raw) else {
        warn!(%volume, marker = %raw, "chain marker target is not a snapshot name; treating as no basis");
        return Ok(None);
    };

    let live = driver.list_snapshot_names(volume)?;
    if live.iter().any(|entry| entry == &raw) {
        Ok(Some(name))
    } else {
        warn!(%volume, marker = %raw, "chain marker dangles; treating as no basis");
        Ok(None)
    }
}

/// Advance the marker on `volume` to `name`.
///
/// Must be called only after the transfer of `name` is confirmed. Failure
/// leaves the volume pair inconsistent and is surfaced as such.
pub fn advance(driver: &dyn SnapshotDriver, volume: VolumeRole, name: &SnapshotName) -> Result<()> {
    driver.write_marker(volume, name).map_err(|err| FsnError::Inconsistent {
        detail: format!("chain marker advance to {name} on {volume} failed after successful transfer: {err}"),
    })?;
    debug!(%volume, basis = %name, "chain marker advanced");
    Ok(())
}
