//! Cross-shard round matching
//!
//! Shards are started on an incremental schedule, so at any moment a
//! different number of shards is generating load. A round is the global time
//! bucket that starts when one more shard joined. Each shard seeds one round
//! boundary at its first matched check-in minus [`SEED_LEAD_MS`]; every
//! matched event of every shard is then assigned to the round whose interval
//! contains its `sentAt`, regardless of which shard produced it.
//!
//! ```text
//! shard 1  |--x--x--x--x--x--x--x--x--x--|
//! shard 2           |--x--x--x--x--x--x--|
//! shard 3                    |--x--x--x--|
//!          ^ round 1         ^ round 3
//!                   ^ round 2
//! ```
//!
//! A shard with no matches produces a round with every field zero. It takes
//! no part in the boundaries, so it never captures another shard's events.
//! Seeds are sorted before intervals are cut, so targets listed out of time
//! order still produce disjoint, complete intervals.

use crate::job::cross_shard::MatchedEvent;
use crate::util::time::round_to;
use serde::{Deserialize, Serialize};

/// How far before a shard's first check-in its round starts
pub const SEED_LEAD_MS: u64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub start_time: u64,
    pub finish_time: u64,
    pub average_of_finalization_time: f64,
    pub checkin_tx_count: u64,
    pub total_of_finalization_time: i64,
    pub matched_list: Vec<MatchedEvent>,
}

impl Round {
    /// Build a round from its assigned events (sorted by `sentAt`)
    fn from_matched(matched_list: Vec<MatchedEvent>) -> Self {
        let (first, last) = match (matched_list.first(), matched_list.last()) {
            (Some(first), Some(last)) => (first.sent_at, last.sent_at),
            _ => return Self::default(),
        };
        let total: i64 = matched_list.iter().map(|e| e.duration_of_finalization).sum();
        let count = matched_list.len() as u64;

        Self {
            start_time: first,
            finish_time: last,
            average_of_finalization_time: round_to(total as f64 / count as f64, 2),
            checkin_tx_count: count,
            total_of_finalization_time: total,
            matched_list,
        }
    }
}

/// Rebuild rounds from every shard's matched list, one round per shard
///
/// `shards[i]` is the matched list of shard `i + 1`; the returned events carry
/// their `shardNumber`.
pub fn make_round_list(shards: &[Vec<MatchedEvent>]) -> Vec<Round> {
    let mut pool: Vec<MatchedEvent> = shards
        .iter()
        .enumerate()
        .flat_map(|(index, matched)| {
            matched.iter().cloned().map(move |mut event| {
                event.shard_number = Some(index + 1);
                event
            })
        })
        .collect();
    pool.sort_by_key(|event| event.sent_at);

    let mut seeds: Vec<(u64, usize)> = shards
        .iter()
        .enumerate()
        .filter_map(|(index, matched)| {
            matched
                .iter()
                .map(|event| event.sent_at)
                .min()
                .map(|first| (first.saturating_sub(SEED_LEAD_MS), index))
        })
        .collect();
    seeds.sort_unstable();

    let mut rounds = vec![Round::default(); shards.len()];
    for (position, &(start, index)) in seeds.iter().enumerate() {
        let end = seeds.get(position + 1).map(|&(next, _)| next);
        let assigned: Vec<MatchedEvent> = pool
            .iter()
            .filter(|event| event.sent_at >= start && end.map_or(true, |end| event.sent_at < end))
            .cloned()
            .collect();
        rounds[index] = Round::from_matched(assigned);
    }
    rounds
}

/// Weighted mean latency over all rounds, 2 decimals; 0 without check-ins
pub fn total_average_of_finalization_time(rounds: &[Round]) -> f64 {
    let total: i64 = rounds.iter().map(|r| r.total_of_finalization_time).sum();
    let count: u64 = rounds.iter().map(|r| r.checkin_tx_count).sum();
    if count == 0 {
        return 0.0;
    }
    round_to(total as f64 / count as f64, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainTransaction;
    use serde_json::json;

    fn event(sent_at: u64, duration: i64) -> MatchedEvent {
        MatchedEvent {
            checkin_tx: json!({"timestamp": sent_at}),
            transfer_tx: ChainTransaction {
                hash: format!("0x{:x}", sent_at),
                nonce: -1,
                timestamp: sent_at,
                operation: json!({}),
                address: None,
            },
            sent_at,
            finalized_at: sent_at + duration as u64,
            duration_of_finalization: duration,
            shard_number: None,
        }
    }

    fn round_with(count: u64, total: i64) -> Round {
        Round {
            checkin_tx_count: count,
            total_of_finalization_time: total,
            average_of_finalization_time: if count == 0 { 0.0 } else { total as f64 / count as f64 },
            ..Default::default()
        }
    }

    #[test]
    fn test_weighted_average() {
        let rounds = vec![round_with(2, 200), round_with(3, 450)];
        // 650 / 5, not the mean of 100 and 150
        assert_eq!(total_average_of_finalization_time(&rounds), 130.0);
    }

    #[test]
    fn test_empty_average_is_zero() {
        assert_eq!(total_average_of_finalization_time(&[]), 0.0);
        assert_eq!(total_average_of_finalization_time(&[Round::default()]), 0.0);
    }

    #[test]
    fn test_events_reassigned_by_time() {
        // shard 1 starts at 10_000, shard 2 joins at 20_000
        let shard1 = vec![event(10_000, 100), event(15_000, 100), event(21_000, 300)];
        let shard2 = vec![event(20_000, 500), event(22_000, 700)];
        let rounds = make_round_list(&[shard1, shard2]);

        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].checkin_tx_count, 2);
        assert_eq!(rounds[0].start_time, 10_000);
        assert_eq!(rounds[0].finish_time, 15_000);
        assert_eq!(rounds[0].average_of_finalization_time, 100.0);

        // round 2 starts at 19_000 and holds the late shard 1 event
        assert_eq!(rounds[1].checkin_tx_count, 3);
        assert_eq!(rounds[1].start_time, 20_000);
        assert_eq!(rounds[1].finish_time, 22_000);
        assert_eq!(rounds[1].total_of_finalization_time, 1500);
        assert_eq!(rounds[1].average_of_finalization_time, 500.0);
        let shards: Vec<_> = rounds[1].matched_list.iter().map(|e| e.shard_number).collect();
        assert_eq!(shards, vec![Some(2), Some(1), Some(2)]);

        assert_eq!(total_average_of_finalization_time(&rounds), 340.0);
    }

    #[test]
    fn test_degenerate_shard() {
        let shard1 = vec![event(10_000, 100), event(12_000, 200)];
        let shard3 = vec![event(30_000, 400)];
        let rounds = make_round_list(&[shard1, Vec::new(), shard3]);

        assert_eq!(rounds[1], Round::default());
        assert_eq!(rounds[0].checkin_tx_count, 2);
        assert_eq!(rounds[2].checkin_tx_count, 1);
        // the empty shard adds to neither side of the weighted mean
        assert_eq!(total_average_of_finalization_time(&rounds), round_to(700.0 / 3.0, 2));
    }

    #[test]
    fn test_out_of_order_targets() {
        // target 1 started after target 2
        let late = vec![event(50_000, 10), event(51_000, 10)];
        let early = vec![event(10_000, 20), event(11_000, 20)];
        let rounds = make_round_list(&[late, early]);

        assert_eq!(rounds[0].checkin_tx_count, 2);
        assert_eq!(rounds[0].start_time, 50_000);
        assert_eq!(rounds[1].checkin_tx_count, 2);
        assert_eq!(rounds[1].finish_time, 11_000);

        let assigned: u64 = rounds.iter().map(|r| r.checkin_tx_count).sum();
        assert_eq!(assigned, 4);
    }

    #[test]
    fn test_unsorted_shard_list_uses_earliest_event() {
        let shard = vec![event(5_000, 1), event(3_000, 3)];
        let rounds = make_round_list(&[shard]);
        assert_eq!(rounds[0].start_time, 3_000);
        assert_eq!(rounds[0].finish_time, 5_000);
        assert_eq!(rounds[0].average_of_finalization_time, 2.0);
    }

    #[test]
    fn test_no_shards() {
        assert!(make_round_list(&[]).is_empty());
    }
}
