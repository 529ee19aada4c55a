//! The backup orchestrator: one run of the snapshot lifecycle.
//!
//! Phases, in order, with `Fail` reachable from every one:
//!
//! ```text
//! ScrubCheck -> (ScrubMain ∥ ScrubMirror) -> Snapshot -> Transfer
//!            -> PointerAdvance -> Prune -> Done
//! ```
//!
//! The orchestrator itself is single-threaded and cooperative; the only
//! internal concurrency is the scoped scrub pair. No operation is retried:
//! every failure is terminal for the run (fail-fast, rerun-later — safe
//! because each operation is idempotent or compensated). The one defined
//! compensation is phase one of the transfer two-phase commit: a snapshot
//! whose replication failed is deleted so the next run starts from a clean
//! state. There is intentionally no rollback for the pointer advance or for
//! prune deletions; failures there are surfaced as inconsistent state for
//! manual inspection.
//!
//! External serialization of runs against the same volume pair is a
//! documented precondition; this engine takes no lock.

use crate::chain;
use crate::driver::{Clock, ScrubDriver, SnapshotDriver, TransferDriver, VolumeRole};
use crate::retention::{self, EvaluationContext, RetentionConfig, MIN_PRUNABLE_NAME_LEN};
use crate::scrub;
use fsn_error::{FsnError, Result};
use fsn_types::SnapshotName;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Per-run configuration: retention tiers plus the scrub cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub retention: RetentionConfig,
    /// Days between integrity scrubs of the pair.
    pub scrub_interval_days: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retention: RetentionConfig::default(),
            scrub_interval_days: 30,
        }
    }
}

/// Terminal outcome of one run, mapped onto process exit codes so a
/// scheduler can distinguish "done", "retry later", and "operator needed".
#[derive(Debug)]
pub enum ExitOutcome {
    /// The full cycle completed.
    Success,
    /// The candidate name collided with the current chain marker (two runs
    /// in the same second). Nothing was mutated; simply retry later.
    TryLater,
    /// The run failed; see the error for the taxonomy.
    Fatal(FsnError),
}

impl ExitOutcome {
    /// Process exit code: 0 success, 2 try-later, error-specific otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::TryLater => 2,
            Self::Fatal(err) => err.exit_code(),
        }
    }
}

/// One backup cycle against a main/mirror volume pair.
pub struct Orchestrator<'a> {
    snapshots: &'a dyn SnapshotDriver,
    transfer: &'a dyn TransferDriver,
    scrub: &'a dyn ScrubDriver,
    clock: &'a dyn Clock,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        snapshots: &'a dyn SnapshotDriver,
        transfer: &'a dyn TransferDriver,
        scrub: &'a dyn ScrubDriver,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            snapshots,
            transfer,
            scrub,
            clock,
        }
    }

    /// Run one full cycle. Never panics; every failure becomes a
    /// [`ExitOutcome::Fatal`] with its taxonomy preserved.
    pub fn run(&self, config: &BackupConfig) -> ExitOutcome {
        match self.try_run(config) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "backup run failed");
                ExitOutcome::Fatal(err)
            }
        }
    }

    fn try_run(&self, config: &BackupConfig) -> Result<ExitOutcome> {
        let now = self.clock.now();
        let candidate = SnapshotName::at(now)
            .map_err(|_| FsnError::ClockRange { epoch: now.0 })?;
        info!(%now, %candidate, "starting backup cycle");

        // ── ScrubCheck ──────────────────────────────────────────────────
        let main_scrub = self.scrub.status(VolumeRole::Main)?;
        if scrub::is_due(main_scrub.last_completed, now, config.scrub_interval_days) {
            info!(
                interval_days = config.scrub_interval_days,
                "scrub interval elapsed; scrubbing both volumes"
            );
            scrub::run_pair(self.scrub)?;
        } else {
            debug!("scrub not due");
        }

        // Pre-mutation anomaly check: a future-dated snapshot must abort
        // the run before anything is created or deleted.
        let existing = self.decode_volume(VolumeRole::Main)?;
        if let Some(future) = existing.iter().find(|s| s.epoch() > now) {
            return Err(FsnError::FutureSnapshot {
                name: future.to_string(),
                now: now.0,
            });
        }

        // ── Snapshot ────────────────────────────────────────────────────
        let marker = self.snapshots.read_marker(VolumeRole::Main)?;
        if marker.as_deref() == Some(candidate.to_string().as_str()) {
            info!(%candidate, "candidate equals current chain marker; try again later");
            return Ok(ExitOutcome::TryLater);
        }
        let basis = chain::read_basis(self.snapshots, VolumeRole::Main)?;

        self.snapshots
            .create_readonly_snapshot(VolumeRole::Main, &candidate)?;
        info!(snapshot = %candidate, "created read-only snapshot on main");

        // ── Transfer (two-phase commit, phase one) ──────────────────────
        let transferred = match &basis {
            Some(basis) => {
                info!(%basis, snapshot = %candidate, "incremental transfer to mirror");
                self.transfer
                    .transfer_incremental(basis, &candidate, VolumeRole::Mirror)
            }
            None => {
                info!(snapshot = %candidate, "no basis; full transfer to mirror");
                self.transfer.transfer_full(&candidate, VolumeRole::Mirror)
            }
        };
        if let Err(err) = transferred {
            warn!(snapshot = %candidate, error = %err, "transfer failed; deleting un-replicated snapshot");
            self.snapshots
                .delete_snapshot(VolumeRole::Main, &candidate.to_string())
                .map_err(|cleanup| FsnError::Inconsistent {
                    detail: format!(
                        "could not delete {candidate} from main after failed transfer: {cleanup}"
                    ),
                })?;
            return Err(err);
        }

        // ── PointerAdvance (no rollback from here on) ───────────────────
        chain::advance(self.snapshots, VolumeRole::Main, &candidate)?;
        chain::advance(self.snapshots, VolumeRole::Mirror, &candidate)?;

        // ── Prune ───────────────────────────────────────────────────────
        let ctx = EvaluationContext::new(now, config.retention)?;
        let all_main = self.decode_volume(VolumeRole::Main)?;
        let plan = retention::plan(&ctx, &all_main)?;
        let on_mirror = self.snapshots.list_snapshot_names(VolumeRole::Mirror)?;

        for victim in &plan.remove {
            let raw = victim.to_string();
            if raw.len() < MIN_PRUNABLE_NAME_LEN {
                warn!(entry = %raw, "refusing to prune suspiciously short name");
                continue;
            }
            self.prune_one(VolumeRole::Main, &raw)?;
            // The mirror is a subset of main; a snapshot it never received
            // (e.g., predating the mirror) is simply not there to delete.
            if on_mirror.iter().any(|entry| entry == &raw) {
                self.prune_one(VolumeRole::Mirror, &raw)?;
            }
            debug!(snapshot = %raw, "pruned");
        }

        info!(
            kept = plan.keep.len(),
            removed = plan.remove.len(),
            "backup cycle complete"
        );
        Ok(ExitOutcome::Success)
    }

    /// Delete one snapshot during prune. Failure after the pointer advance
    /// is inconsistent state; partial pruning is left for the next run.
    fn prune_one(&self, volume: VolumeRole, raw: &str) -> Result<()> {
        self.snapshots
            .delete_snapshot(volume, raw)
            .map_err(|err| FsnError::Inconsistent {
                detail: format!("prune of {raw} on {volume} failed: {err}"),
            })
    }

    /// List a volume and decode, silently filtering non-snapshot entries.
    fn decode_volume(&self, volume: VolumeRole) -> Result<Vec<SnapshotName>> {
        let raw = self.snapshots.list_snapshot_names(volume)?;
        let mut decoded: Vec<SnapshotName> = raw
            .iter()
            .filter_map(|entry| match SnapshotName::parse(entry) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    debug!(%volume, %entry, error = %err, "ignoring non-snapshot entry");
                    None
                }
            })
            .collect();
        decoded.sort_unstable();
        Ok(decoded)
    }
}
