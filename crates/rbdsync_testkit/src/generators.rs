//! Property-based test generators using proptest.
//!
//! Provides strategies for snapshot histories that keep the label
//! invariants: `YYYY-MM-DD`, unique, strictly increasing.

use chrono::{Days, NaiveDate};
use proptest::prelude::*;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).expect("Invalid date")
}

fn label(offset: u64) -> String {
    epoch()
        .checked_add_days(Days::new(offset))
        .expect("Date out of range")
        .format("%Y-%m-%d")
        .to_string()
}

/// Strategy for a single valid snapshot label.
pub fn label_strategy() -> impl Strategy<Value = String> {
    (0u64..3650).prop_map(label)
}

/// Strategy for a snapshot history of `0..max_len` labels, oldest first.
pub fn history_strategy(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(0u64..3650, 0..max_len)
        .prop_map(|days| days.into_iter().map(label).collect())
}

/// Strategy for a non-empty snapshot history, oldest first.
pub fn non_empty_history_strategy(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(0u64..3650, 1..max_len.max(2))
        .prop_map(|days| days.into_iter().map(label).collect())
}

/// Strategy for a `(source, destination)` pair where the destination is a
/// prefix of the source, possibly empty or complete.
pub fn prefix_pair_strategy(max_len: usize) -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    non_empty_history_strategy(max_len).prop_flat_map(|source| {
        let len = source.len();
        (Just(source), 0..=len).prop_map(|(source, cut)| {
            let destination = source[..cut].to_vec();
            (source, destination)
        })
    })
}

/// Strategy for a `(source, destination)` pair whose destination latest
/// label is not in the source history.
pub fn diverged_pair_strategy(max_len: usize) -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    (
        non_empty_history_strategy(max_len),
        non_empty_history_strategy(max_len),
    )
        .prop_filter("destination latest must be absent from source", |(s, d)| {
            d.last().is_some_and(|latest| !s.contains(latest))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn histories_are_sorted_and_unique(history in history_strategy(20)) {
            let mut sorted = history.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(sorted, history);
        }

        #[test]
        fn labels_are_well_formed(l in label_strategy()) {
            prop_assert_eq!(l.len(), 10);
            prop_assert!(NaiveDate::parse_from_str(&l, "%Y-%m-%d").is_ok());
        }

        #[test]
        fn prefix_pairs_are_prefixes((source, destination) in prefix_pair_strategy(10)) {
            prop_assert!(source.starts_with(&destination));
        }
    }
}
