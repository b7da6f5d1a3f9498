//! Last-submission-wins reduction over cached vote records.
//!
//! The store keeps one row per submission event. A voter who re-submits
//! produces a second row under the same nullifier, and only the newest row
//! counts. Legacy rows carrying no nullifier predate nullifier tracking and
//! each tallies as its own singleton group.

use std::collections::HashMap;

use velum_core::VoteRecord;

/// Reduces raw records to at most one logical vote per nullifier.
///
/// For each nullifier the record with the greatest `confirmed_at_ms` wins;
/// on a timestamp tie the record seen first in `records` wins, which for
/// store output (newest first) keeps the newest row. Records without a
/// nullifier pass through untouched. Output order is unspecified.
pub fn valid_votes(records: &[VoteRecord]) -> Vec<VoteRecord> {
    let mut latest: HashMap<String, &VoteRecord> = HashMap::new();
    let mut legacy: Vec<VoteRecord> = Vec::new();

    for record in records {
        match &record.nullifier {
            Some(n) => {
                let key = n.to_string();
                match latest.get(&key) {
                    Some(existing) if existing.confirmed_at_ms >= record.confirmed_at_ms => {}
                    _ => {
                        latest.insert(key, record);
                    }
                }
            }
            None => legacy.push(record.clone()),
        }
    }

    legacy.extend(latest.into_values().cloned());
    legacy
}

/// Tallies valid votes into per-candidate counts.
///
/// Records pointing at a candidate index outside `candidate_count` are
/// dropped rather than panicking; the contract enforces the bound but
/// cached rows may predate a definition change.
pub fn tally(records: &[VoteRecord], candidate_count: usize) -> Vec<u64> {
    let mut counts = vec![0u64; candidate_count];
    for record in valid_votes(records) {
        if let Some(slot) = counts.get_mut(record.candidate_index as usize) {
            *slot += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use velum_core::{Digest, VoteStatus};

    fn record(nullifier: Option<u64>, candidate: u32, at_ms: i64) -> VoteRecord {
        VoteRecord {
            poll_id: "p1".to_string(),
            candidate_index: candidate,
            nullifier: nullifier.map(Digest::from_u64),
            tx_hash: Digest::from_u64(at_ms as u64),
            eligibility_root: Digest::zero(),
            vote_commitment: Digest::from_u64(1),
            status: VoteStatus::Confirmed,
            confirmed_at_ms: at_ms,
        }
    }

    #[test]
    fn newest_record_wins_per_nullifier() {
        let records = vec![
            record(Some(7), 0, 100),
            record(Some(7), 1, 200),
            record(Some(7), 2, 300),
        ];
        let valid = valid_votes(&records);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].candidate_index, 2);
        assert_eq!(valid[0].confirmed_at_ms, 300);
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let records = vec![
            record(Some(7), 2, 300),
            record(Some(7), 0, 100),
            record(Some(7), 1, 200),
        ];
        let valid = valid_votes(&records);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].candidate_index, 2);
    }

    #[test]
    fn distinct_nullifiers_each_count() {
        let records = vec![
            record(Some(1), 0, 100),
            record(Some(2), 0, 100),
            record(Some(3), 1, 100),
        ];
        assert_eq!(valid_votes(&records).len(), 3);
        assert_eq!(tally(&records, 2), vec![2, 1]);
    }

    #[test]
    fn legacy_rows_are_singletons() {
        let records = vec![
            record(None, 0, 100),
            record(None, 0, 200),
            record(Some(5), 1, 50),
        ];
        let valid = valid_votes(&records);
        assert_eq!(valid.len(), 3);
        assert_eq!(tally(&records, 2), vec![2, 1]);
    }

    #[test]
    fn out_of_range_candidate_is_dropped() {
        let records = vec![record(Some(1), 9, 100), record(Some(2), 0, 100)];
        assert_eq!(tally(&records, 2), vec![1, 0]);
    }

    #[test]
    fn empty_input_tallies_zero() {
        assert!(valid_votes(&[]).is_empty());
        assert_eq!(tally(&[], 3), vec![0, 0, 0]);
    }
}
