//! Aggregated results of a multi-volume run.

use crate::error::BackupError;
use std::time::Duration;

/// Per-volume outcomes and failures of one run.
///
/// A run never stops on a per-volume failure; the error is recorded here and
/// the next volume is processed.
#[derive(Debug)]
pub struct RunReport<T> {
    /// Volumes processed successfully, with their outcome, in run order.
    pub completed: Vec<(String, T)>,
    /// Volumes deliberately not processed, such as unmounted volumes.
    pub skipped: Vec<String>,
    /// Per-volume failures, in run order.
    pub errors: Vec<BackupError>,
    /// Wall-clock time of the run.
    pub duration: Duration,
}

impl<T> Default for RunReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }
}

impl<T> RunReport<T> {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if any volume failed.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns the number of volumes the run looked at.
    pub fn total(&self) -> usize {
        self.completed.len() + self.skipped.len() + self.errors.len()
    }

    /// Returns the outcome recorded for `image`, if it completed.
    pub fn outcome(&self, image: &str) -> Option<&T> {
        self.completed
            .iter()
            .find(|(name, _)| name == image)
            .map(|(_, outcome)| outcome)
    }

    /// Returns the error recorded for `image`, if it failed.
    pub fn error_for(&self, image: &str) -> Option<&BackupError> {
        self.errors.iter().find(|e| e.image() == Some(image))
    }

    pub(crate) fn record(&mut self, image: &str, result: Result<T, BackupError>) {
        match result {
            Ok(outcome) => self.completed.push((image.to_string(), outcome)),
            Err(e) => self.errors.push(e),
        }
    }

    /// Suffix for the final log line.
    pub(crate) fn suffix(&self) -> &'static str {
        if self.has_errors() {
            " (completed with errors)"
        } else {
            ""
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VolumeFailure;

    #[test]
    fn report_records_outcomes_and_errors() {
        let mut report: RunReport<u32> = RunReport::new();
        report.record("a", Ok(1));
        report.record(
            "b",
            Err(BackupError::volume("b", VolumeFailure::NoSourceSnapshots)),
        );
        report.skipped.push("c".into());

        assert!(report.has_errors());
        assert_eq!(report.total(), 3);
        assert_eq!(report.outcome("a"), Some(&1));
        assert!(report.outcome("b").is_none());
        assert!(report.error_for("b").is_some());
        assert_eq!(report.suffix(), " (completed with errors)");
    }

    #[test]
    fn empty_report_has_no_errors() {
        let report: RunReport<()> = RunReport::default();
        assert!(!report.has_errors());
        assert_eq!(report.suffix(), "");
    }
}
