#![forbid(unsafe_code)]
//! Snapshot identity codec and shared newtypes for FrankenSnap.
//!
//! A snapshot's identity is its creation instant (epoch seconds, second
//! precision) plus four calendar fields derived once at creation time:
//! day-of-month, month, year, and ISO week number. All five fields are
//! embedded in the textual name:
//!
//! ```text
//! {epoch:010}_{day:02}_{month:02}_{year:04}_{week:02}
//! ```
//!
//! The zero-padded epoch field leads, so lexicographic order of rendered
//! names equals chronological order. The embedded calendar fields are
//! authoritative for an existing snapshot's own classification — they are
//! never re-derived at evaluation time, since the wall clock at creation may
//! have sat in a different timezone/DST regime than the evaluating one.
//!
//! Parsing is deliberately strict and deliberately non-fatal: anything that
//! does not match the five-field pattern is a [`NameError`], and callers
//! filter such entries out rather than failing (a snapshot directory may
//! contain unrelated entries).

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Seconds since the Unix epoch, second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpochSeconds(pub i64);

impl EpochSeconds {
    /// Seconds in one day.
    pub const DAY: i64 = 86_400;

    /// Shift by a (possibly negative) number of whole days.
    #[must_use]
    pub fn add_days(self, days: i64) -> Self {
        Self(self.0.saturating_add(days.saturating_mul(Self::DAY)))
    }

    /// Calendar view of this instant, UTC. `None` outside chrono's
    /// representable range.
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.0, 0)
    }
}

impl fmt::Display for EpochSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rendered length of every valid snapshot name.
pub const SNAPSHOT_NAME_LEN: usize = 24;

/// Errors from [`SnapshotName::parse`] and [`SnapshotName::at`].
///
/// Parse failures classify a directory entry as "not a snapshot"; they are
/// filtered by callers, never propagated as run failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("not a snapshot name: expected 5 '_'-separated fields, got {got}")]
    FieldCount { got: usize },
    #[error("not a snapshot name: {field} field is {got} chars, expected {expected}")]
    FieldWidth {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("not a snapshot name: {field} field is not numeric")]
    NonNumeric { field: &'static str },
    #[error("not a snapshot name: {field} field value {value} is out of range")]
    FieldRange { field: &'static str, value: u64 },
    #[error("instant {epoch} is outside the representable calendar range")]
    OutOfCalendarRange { epoch: i64 },
}

/// A decoded snapshot identity.
///
/// Ordering is by creation instant; the calendar fields ride along and never
/// participate in comparisons beyond tie-breaking identical instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotName {
    epoch: EpochSeconds,
    day: u8,
    month: u8,
    year: u16,
    week: u8,
}

impl SnapshotName {
    /// Build the snapshot identity for an instant, deriving the four
    /// calendar fields from `now` in UTC.
    pub fn at(now: EpochSeconds) -> Result<Self, NameError> {
        let dt = now
            .to_datetime()
            .ok_or(NameError::OutOfCalendarRange { epoch: now.0 })?;
        if !(0..=9_999_999_999).contains(&now.0) || dt.year() > 9999 {
            return Err(NameError::OutOfCalendarRange { epoch: now.0 });
        }
        Ok(Self {
            epoch: now,
            day: dt.day() as u8,
            month: dt.month() as u8,
            year: dt.year() as u16,
            week: dt.iso_week().week() as u8,
        })
    }

    /// Parse the fixed five-field pattern. Any deviation is a [`NameError`].
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let fields: Vec<&str> = name.split('_').collect();
        if fields.len() != 5 {
            return Err(NameError::FieldCount { got: fields.len() });
        }
        let epoch = parse_field(fields[0], "epoch", 10)?;
        let day = parse_field(fields[1], "day", 2)?;
        let month = parse_field(fields[2], "month", 2)?;
        let year = parse_field(fields[3], "year", 4)?;
        let week = parse_field(fields[4], "week", 2)?;

        check_range("day", day, 1, 31)?;
        check_range("month", month, 1, 12)?;
        check_range("week", week, 1, 53)?;

        Ok(Self {
            epoch: EpochSeconds(epoch as i64),
            day: day as u8,
            month: month as u8,
            year: year as u16,
            week: week as u8,
        })
    }

    /// Creation instant.
    #[must_use]
    pub fn epoch(&self) -> EpochSeconds {
        self.epoch
    }

    /// Embedded day-of-month (1..=31).
    #[must_use]
    pub fn day(&self) -> u8 {
        self.day
    }

    /// Embedded calendar month (1..=12).
    #[must_use]
    pub fn month(&self) -> u8 {
        self.month
    }

    /// Embedded calendar year.
    #[must_use]
    pub fn year(&self) -> u16 {
        self.year
    }

    /// Embedded ISO week number (1..=53).
    #[must_use]
    pub fn iso_week(&self) -> u8 {
        self.week
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:010}_{:02}_{:02}_{:04}_{:02}",
            self.epoch.0, self.day, self.month, self.year, self.week
        )
    }
}

impl FromStr for SnapshotName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_field(raw: &str, field: &'static str, width: usize) -> Result<u64, NameError> {
    if raw.len() != width {
        return Err(NameError::FieldWidth {
            field,
            expected: width,
            got: raw.len(),
        });
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NameError::NonNumeric { field });
    }
    raw.parse::<u64>()
        .map_err(|_| NameError::NonNumeric { field })
}

fn check_range(field: &'static str, value: u64, lo: u64, hi: u64) -> Result<(), NameError> {
    if (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(NameError::FieldRange { field, value })
    }
}
