//! Date-based snapshot labels.
//!
//! Labels are `YYYY-MM-DD`, so lexical order is chronological order.
//!
//! Snapshots are taken on one schedule and replicated or checked on
//! another. The offset says how far behind the wall-clock date the newest
//! snapshot is expected to be when replication runs:
//!
//! - `0`: snapshots and replication happen on the same calendar date
//! - `24`: snapshots are taken before midnight, replication runs after
//!
//! Only whole days count; an offset of 36 hours moves labels back one day.

use chrono::{Days, Local, NaiveDate};

/// `strftime` format of snapshot labels.
pub const LABEL_FORMAT: &str = "%Y-%m-%d";

/// Generates snapshot labels for a given day-boundary offset.
///
/// Every `*_on` method is pure. The argument-free forms read the local date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotNamer {
    offset_hours: u32,
}

impl SnapshotNamer {
    /// Creates a namer with the given offset in hours.
    #[must_use]
    pub const fn new(offset_hours: u32) -> Self {
        Self { offset_hours }
    }

    /// Returns the offset in whole days.
    #[must_use]
    pub const fn offset_days(&self) -> u64 {
        (self.offset_hours / 24) as u64
    }

    /// Label to give a snapshot created on `date`.
    #[must_use]
    pub fn creation_label_on(&self, date: NaiveDate) -> String {
        format_label(date)
    }

    /// Latest label expected at replication time on `date`.
    #[must_use]
    pub fn today_label_on(&self, date: NaiveDate) -> String {
        format_label(days_before(date, self.offset_days()))
    }

    /// Label expected one period before [`SnapshotNamer::today_label_on`].
    #[must_use]
    pub fn anchor_label_on(&self, date: NaiveDate) -> String {
        format_label(days_before(date, self.offset_days() + 1))
    }

    /// Label to give a snapshot created now.
    #[must_use]
    pub fn creation_label(&self) -> String {
        self.creation_label_on(local_today())
    }

    /// Latest label expected now.
    #[must_use]
    pub fn today_label(&self) -> String {
        self.today_label_on(local_today())
    }

    /// Label expected as of the previous period.
    #[must_use]
    pub fn anchor_label(&self) -> String {
        self.anchor_label_on(local_today())
    }

    /// Returns true if `s` is a well-formed label.
    #[must_use]
    pub fn is_label(s: &str) -> bool {
        s.len() == 10 && NaiveDate::parse_from_str(s, LABEL_FORMAT).is_ok()
    }
}

fn format_label(date: NaiveDate) -> String {
    date.format(LABEL_FORMAT).to_string()
}

fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
