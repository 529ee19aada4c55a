//! GFS retention policy: which snapshots survive a cleanup pass.
//!
//! Five tiers are evaluated independently against the full ordered snapshot
//! set and unioned into the keep-set; everything else is the remove-set.
//!
//! | Tier | Window shape | Classification |
//! |------|--------------|----------------|
//! | Last-N-days | `[now - keep_last_days d, now + 1 d)` | embedded instant |
//! | Daily | `keep_daily` sliding 24h windows back from `now` | embedded instant |
//! | Weekly | `keep_weekly` 8-day spans back from the Monday anchor | embedded instant |
//! | Monthly | `keep_monthly` calendar months back from the current month | embedded month/year |
//! | Yearly | every year from the earliest observed through the current | embedded year |
//!
//! Within a window the first match in ascending chronological order wins;
//! later candidates in the same window are ignored by that tier (another
//! tier may still keep them). The instant-window tiers use the embedded
//! epoch; the calendar tiers trust the embedded month/year fields, since
//! the timezone regime at creation time may differ from the one at
//! evaluation time.
//!
//! A snapshot strictly newer than `now` is a clock-skew anomaly: the entire
//! evaluation aborts with an error and no remove-set, rather than silently
//! excluding the snapshot.

use fsn_error::{FsnError, Result};
use fsn_types::{EpochSeconds, SnapshotName};
use chrono::{Datelike, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Raw names shorter than this can never have come from the codec and are
/// never eligible for deletion. Decoding failure is the primary guard
/// against pruning unrelated entries; this is the secondary one.
pub const MIN_PRUNABLE_NAME_LEN: usize = 11;

/// GFS tier counts. Read once per run, immutable for the run's duration.
///
/// The yearly tier is implicit and unlimited: one survivor per calendar
/// year from the oldest observed year through the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Days of *all* snapshots kept unconditionally.
    pub keep_last_days: u32,
    /// Number of daily windows with one survivor each.
    pub keep_daily: u32,
    /// Number of weekly windows with one survivor each.
    pub keep_weekly: u32,
    /// Number of monthly windows with one survivor each.
    pub keep_monthly: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_last_days: 2,
            keep_daily: 7,
            keep_weekly: 4,
            keep_monthly: 24,
        }
    }
}

/// Immutable per-run evaluation anchors, computed once at run start and
/// passed explicitly wherever retention decisions are made.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext {
    now: EpochSeconds,
    /// Most recent Monday 00:00 UTC at or before `now`.
    week_anchor: EpochSeconds,
    /// (year, month) of the first day of the current calendar month.
    month_anchor: (i32, u32),
    config: RetentionConfig,
}

impl EvaluationContext {
    pub fn new(now: EpochSeconds, config: RetentionConfig) -> Result<Self> {
        let dt = now
            .to_datetime()
            .ok_or(FsnError::ClockRange { epoch: now.0 })?;
        let date = dt.date_naive();
        let monday = date - chrono::Days::new(u64::from(date.weekday().num_days_from_monday()));
        let week_anchor = EpochSeconds(monday.and_time(NaiveTime::MIN).and_utc().timestamp());
        Ok(Self {
            now,
            week_anchor,
            month_anchor: (date.year(), date.month()),
            config,
        })
    }

    #[must_use]
    pub fn now(&self) -> EpochSeconds {
        self.now
    }

    #[must_use]
    pub fn week_anchor(&self) -> EpochSeconds {
        self.week_anchor
    }

    #[must_use]
    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }
}

/// Partition of a snapshot set into survivors and victims, both ascending.
#[derive(Debug, Clone, Default)]
pub struct RetentionPlan {
    pub keep: Vec<SnapshotName>,
    pub remove: Vec<SnapshotName>,
}

/// Compute the keep/remove partition for `snapshots` under `ctx`.
///
/// Input order does not matter; the plan is computed over an ascending
/// copy. Errors with [`FsnError::FutureSnapshot`] — and performs no
/// further evaluation — if any snapshot is strictly newer than `now`.
pub fn plan(ctx: &EvaluationContext, snapshots: &[SnapshotName]) -> Result<RetentionPlan> {
    let mut ascending: Vec<SnapshotName> = snapshots.to_vec();
    ascending.sort_unstable();

    if let Some(future) = ascending.iter().find(|s| s.epoch() > ctx.now) {
        return Err(FsnError::FutureSnapshot {
            name: future.to_string(),
            now: ctx.now.0,
        });
    }

    let cfg = &ctx.config;
    let mut keep: BTreeSet<SnapshotName> = BTreeSet::new();

    // Last-N-days: everything in the window, unconditionally.
    let last_lo = ctx.now.add_days(-i64::from(cfg.keep_last_days));
    let last_hi = ctx.now.add_days(1);
    for snap in &ascending {
        if in_window(snap, last_lo, last_hi) {
            keep.insert(*snap);
        }
    }

    // Daily: sliding 24h windows back from now, oldest match per window.
    for j in 0..cfg.keep_daily {
        let start = ctx.now.add_days(-i64::from(j));
        let end = start.add_days(1);
        if let Some(snap) = ascending.iter().find(|s| in_window(s, start, end)) {
            keep.insert(*snap);
        }
    }

    // Weekly: 8-day spans stepping back 7 days from the Monday anchor, so
    // adjacent windows share one boundary day.
    for j in 0..cfg.keep_weekly {
        let start = ctx.week_anchor.add_days(-7 * i64::from(j));
        let end = start.add_days(8);
        if let Some(snap) = ascending.iter().find(|s| in_window(s, start, end)) {
            keep.insert(*snap);
        }
    }

    // Monthly: calendar months back from the current month, classified by
    // the snapshot's embedded month/year.
    for j in 0..cfg.keep_monthly {
        let (year, month) = months_back(ctx.month_anchor, j);
        if let Some(snap) = ascending
            .iter()
            .find(|s| i32::from(s.year()) == year && u32::from(s.month()) == month)
        {
            keep.insert(*snap);
        }
    }

    // Yearly: unlimited, one survivor per observed calendar year through
    // the current one, classified by the embedded year.
    if let Some(earliest_year) = ascending.iter().map(|s| i32::from(s.year())).min() {
        for year in earliest_year..=ctx.month_anchor.0 {
            if let Some(snap) = ascending.iter().find(|s| i32::from(s.year()) == year) {
                keep.insert(*snap);
            }
        }
    }

    let remove: Vec<SnapshotName> = ascending
        .iter()
        .filter(|s| !keep.contains(*s))
        .copied()
        .collect();
    debug!(
        total = ascending.len(),
        keep = keep.len(),
        remove = remove.len(),
        "retention plan computed"
    );
    Ok(RetentionPlan {
        keep: keep.into_iter().collect(),
        remove,
    })
}

fn in_window(snap: &SnapshotName, start: EpochSeconds, end: EpochSeconds) -> bool {
    snap.epoch() >= start && snap.epoch() < end
}

/// The (year, month) label `j` whole months before `anchor`.
fn months_back(anchor: (i32, u32), j: u32) -> (i32, u32) {
    let total = i64::from(anchor.0) * 12 + i64::from(anchor.1) - 1 - i64::from(j);
    (
        total.div_euclid(12) as i32,
        (total.rem_euclid(12) + 1) as u32,
    )
}
