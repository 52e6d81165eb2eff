//! Full versus incremental strategy selection.
//!
//! Selection is a pure function of two snapshot histories, evaluated fresh on
//! every run:
//!
//! | Destination | Latest label | Decision |
//! |-------------|--------------|----------|
//! | empty | - | Full to source latest |
//! | non-empty | equals source latest | up to date, no transfer |
//! | non-empty | absent from source | Full to source latest (diverged) |
//! | non-empty | older, in source | Incremental from destination latest |
//!
//! A missing destination image is created by the engine and then treated as
//! empty.

use crate::error::VolumeFailure;
use std::fmt;

/// How a volume is transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The complete image state up to the target snapshot.
    Full,
    /// Only the changes between the base and target snapshots.
    Incremental,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Full => f.write_str("full"),
            Strategy::Incremental => f.write_str("incremental"),
        }
    }
}

/// One transfer to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationPlan {
    /// Transfer strategy.
    pub strategy: Strategy,
    /// Start snapshot; set exactly when the strategy is incremental.
    pub base: Option<String>,
    /// End snapshot, always the source's latest.
    pub target: String,
}

impl ReplicationPlan {
    /// A full transfer to `target`.
    pub fn full(target: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::Full,
            base: None,
            target: target.into(),
        }
    }

    /// An incremental transfer from `base` to `target`.
    pub fn incremental(base: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::Incremental,
            base: Some(base.into()),
            target: target.into(),
        }
    }
}

impl fmt::Display for ReplicationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            Some(base) => write!(f, "{} {}..{}", self.strategy, base, self.target),
            None => write!(f, "{} to {}", self.strategy, self.target),
        }
    }
}

/// Where the destination stands relative to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    /// The destination image does not exist.
    DestinationMissing,
    /// The destination image exists with no snapshots.
    DestinationEmpty,
    /// The destination's latest snapshot is the source's latest.
    DestinationUpToDate,
    /// The destination's latest snapshot is not in the source history.
    DestinationDiverged,
    /// The destination's latest snapshot is an older source snapshot.
    DestinationBehind,
}

impl VolumeState {
    /// Classifies a destination history against a source history.
    ///
    /// `destination` is `None` when the destination image does not exist.
    pub fn classify(source: &[String], destination: Option<&[String]>) -> Self {
        let Some(destination) = destination else {
            return VolumeState::DestinationMissing;
        };
        let Some(dest_latest) = destination.last() else {
            return VolumeState::DestinationEmpty;
        };
        if source.last() == Some(dest_latest) {
            VolumeState::DestinationUpToDate
        } else if source.contains(dest_latest) {
            VolumeState::DestinationBehind
        } else {
            VolumeState::DestinationDiverged
        }
    }
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeState::DestinationMissing => "destination missing",
            VolumeState::DestinationEmpty => "destination empty",
            VolumeState::DestinationUpToDate => "destination up to date",
            VolumeState::DestinationDiverged => "destination diverged",
            VolumeState::DestinationBehind => "destination behind",
        };
        f.write_str(s)
    }
}

/// What to do with one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to transfer.
    UpToDate {
        /// The latest snapshot both sides share.
        snapshot: String,
    },
    /// Transfer according to the plan.
    Transfer(ReplicationPlan),
}

/// Selects the transfer for a volume whose destination image exists.
///
/// # Errors
///
/// Returns [`VolumeFailure::NoSourceSnapshots`] if `source` is empty.
pub fn select_strategy(source: &[String], destination: &[String]) -> Result<Decision, VolumeFailure> {
    let source_latest = source.last().ok_or(VolumeFailure::NoSourceSnapshots)?;

    let decision = match VolumeState::classify(source, Some(destination)) {
        VolumeState::DestinationUpToDate => Decision::UpToDate {
            snapshot: source_latest.clone(),
        },
        VolumeState::DestinationBehind => match destination.last() {
            Some(base) => Decision::Transfer(ReplicationPlan::incremental(base, source_latest)),
            None => Decision::Transfer(ReplicationPlan::full(source_latest)),
        },
        VolumeState::DestinationMissing
        | VolumeState::DestinationEmpty
        | VolumeState::DestinationDiverged => {
            Decision::Transfer(ReplicationPlan::full(source_latest))
        }
    };
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_destination_is_full() {
        let decision = select_strategy(&labels(&["2024-01-01"]), &[]).unwrap();
        assert_eq!(decision, Decision::Transfer(ReplicationPlan::full("2024-01-01")));
    }

    #[test]
    fn behind_destination_is_incremental() {
        let decision = select_strategy(
            &labels(&["2024-01-01", "2024-01-02"]),
            &labels(&["2024-01-01"]),
        )
        .unwrap();
        assert_eq!(
            decision,
            Decision::Transfer(ReplicationPlan::incremental("2024-01-01", "2024-01-02"))
        );
    }

    #[test]
    fn several_behind_uses_destination_latest_as_base() {
        let decision = select_strategy(
            &labels(&["2024-01-01", "2024-01-02", "2024-01-03"]),
            &labels(&["2024-01-01", "2024-01-02"]),
        )
        .unwrap();
        assert_eq!(
            decision,
            Decision::Transfer(ReplicationPlan::incremental("2024-01-02", "2024-01-03"))
        );
    }

    #[test]
    fn diverged_destination_is_full() {
        let decision = select_strategy(
            &labels(&["2024-01-01", "2024-01-02"]),
            &labels(&["2023-12-25"]),
        )
        .unwrap();
        assert_eq!(decision, Decision::Transfer(ReplicationPlan::full("2024-01-02")));
    }

    #[test]
    fn matching_latest_is_up_to_date() {
        let decision = select_strategy(
            &labels(&["2024-01-01", "2024-01-02"]),
            &labels(&["2024-01-02"]),
        )
        .unwrap();
        assert_eq!(
            decision,
            Decision::UpToDate {
                snapshot: "2024-01-02".into()
            }
        );
    }

    #[test]
    fn empty_source_is_an_error() {
        let result = select_strategy(&[], &labels(&["2024-01-01"]));
        assert!(matches!(result, Err(VolumeFailure::NoSourceSnapshots)));
    }

    #[test]
    fn classify_states() {
        let source = labels(&["a", "b"]);
        assert_eq!(VolumeState::classify(&source, None), VolumeState::DestinationMissing);
        assert_eq!(VolumeState::classify(&source, Some(&[][..])), VolumeState::DestinationEmpty);
        assert_eq!(
            VolumeState::classify(&source, Some(labels(&["b"]).as_slice())),
            VolumeState::DestinationUpToDate
        );
        assert_eq!(
            VolumeState::classify(&source, Some(labels(&["a"]).as_slice())),
            VolumeState::DestinationBehind
        );
        assert_eq!(
            VolumeState::classify(&source, Some(labels(&["z"]).as_slice())),
            VolumeState::DestinationDiverged
        );
    }

    #[test]
    fn plan_display() {
        assert_eq!(ReplicationPlan::full("b").to_string(), "full to b");
        assert_eq!(
            ReplicationPlan::incremental("a", "b").to_string(),
            "incremental a..b"
        );
    }
}
