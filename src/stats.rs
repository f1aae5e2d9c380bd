//! Vote aggregation for a date group: per-slot tallies, percentages and
//! the children behind each choice bucket.

use crate::db::connection::DbPool;
use crate::db::models::{Choice, DateOption, Period, TimeSlot};
use crate::db::repositories::{VoterRecord, date_options_of, time_slots_of, votes_for_slot};
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Every date option of a group with its slots and their votes, in display
/// order (dates ascending, periods morning/lunch/afternoon).
pub type GroupBallots = Vec<(DateOption, Vec<(TimeSlot, Vec<VoterRecord>)>)>;

/// Materialize the full ballot tree for one group.
pub async fn load_group_ballots(pool: &DbPool, group_id: Uuid) -> Result<GroupBallots, sqlx::Error> {
    let mut ballots = Vec::new();
    for option in date_options_of(pool, group_id).await? {
        let mut slots = Vec::new();
        for slot in time_slots_of(pool, option.id).await? {
            let votes = votes_for_slot(pool, slot.id).await?;
            slots.push((slot, votes));
        }
        ballots.push((option, slots));
    }
    Ok(ballots)
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotStatistics {
    pub date: NaiveDate,
    pub period: Period,
    pub yes: usize,
    pub no: usize,
    pub maybe: usize,
    pub total: usize,
    pub yes_percent: f64,
    pub no_percent: f64,
    pub maybe_percent: f64,
    pub yes_children: Vec<String>,
    pub no_children: Vec<String>,
    pub maybe_children: Vec<String>,
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn bucket_names(votes: &[VoterRecord], choice: Choice) -> Vec<String> {
    let mut voters: Vec<&VoterRecord> = votes.iter().filter(|v| v.choice == choice).collect();
    voters.sort_by(|a, b| {
        (a.last_name.as_str(), a.first_name.as_str())
            .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
    });
    voters
        .into_iter()
        .map(|v| format!("{} {}", v.first_name, v.last_name))
        .collect()
}

/// Tally one time slot. A slot with no votes yields all-zero counts and
/// 0.0 for every percentage.
pub fn slot_statistics(date: NaiveDate, period: Period, votes: &[VoterRecord]) -> SlotStatistics {
    let yes = votes.iter().filter(|v| v.choice == Choice::Yes).count();
    let no = votes.iter().filter(|v| v.choice == Choice::No).count();
    let maybe = votes.iter().filter(|v| v.choice == Choice::Maybe).count();
    let total = yes + no + maybe;

    SlotStatistics {
        date,
        period,
        yes,
        no,
        maybe,
        total,
        yes_percent: percent(yes, total),
        no_percent: percent(no, total),
        maybe_percent: percent(maybe, total),
        yes_children: bucket_names(votes, Choice::Yes),
        no_children: bucket_names(votes, Choice::No),
        maybe_children: bucket_names(votes, Choice::Maybe),
    }
}

/// One record per (date option, time slot), in display order. Materialized
/// eagerly; the CSV and spreadsheet writers need the whole table up front.
pub fn group_statistics(ballots: &GroupBallots) -> Vec<SlotStatistics> {
    let mut stats = Vec::new();
    for (option, slots) in ballots {
        for (slot, votes) in slots {
            stats.push(slot_statistics(option.date, slot.period, votes));
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn voter(first: &str, last: &str, choice: Choice) -> VoterRecord {
        VoterRecord {
            child_id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            birth_date: date(2020, 1, 1),
            choice,
        }
    }

    #[test]
    fn christmas_week_example() {
        // Three yes and one no on the morning slot of 2025-12-24.
        let votes = vec![
            voter("Léa", "Martin", Choice::Yes),
            voter("Noah", "Bernard", Choice::Yes),
            voter("Emma", "Petit", Choice::Yes),
            voter("Louis", "Durand", Choice::No),
        ];
        let stats = slot_statistics(date(2025, 12, 24), Period::Morning, &votes);

        assert_eq!(stats.yes, 3);
        assert_eq!(stats.no, 1);
        assert_eq!(stats.maybe, 0);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.yes_percent, 75.0);
        assert_eq!(stats.no_percent, 25.0);
        assert_eq!(stats.maybe_percent, 0.0);
    }

    #[test]
    fn empty_slot_has_zero_percentages() {
        let stats = slot_statistics(date(2025, 12, 24), Period::Lunch, &[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.yes_percent, 0.0);
        assert_eq!(stats.no_percent, 0.0);
        assert_eq!(stats.maybe_percent, 0.0);
        assert!(stats.yes_children.is_empty());
    }

    #[test]
    fn counts_sum_to_total_and_percentages_to_hundred() {
        let votes = vec![
            voter("A", "A", Choice::Yes),
            voter("B", "B", Choice::No),
            voter("C", "C", Choice::No),
            voter("D", "D", Choice::Maybe),
            voter("E", "E", Choice::Maybe),
            voter("F", "F", Choice::Maybe),
            voter("G", "G", Choice::Maybe),
        ];
        let stats = slot_statistics(date(2026, 1, 5), Period::Afternoon, &votes);
        assert_eq!(stats.yes + stats.no + stats.maybe, stats.total);
        let sum = stats.yes_percent + stats.no_percent + stats.maybe_percent;
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn buckets_are_ordered_by_last_then_first_name() {
        let votes = vec![
            voter("Zoé", "Martin", Choice::Yes),
            voter("Anna", "Martin", Choice::Yes),
            voter("Jules", "Albert", Choice::Yes),
        ];
        let stats = slot_statistics(date(2026, 1, 5), Period::Morning, &votes);
        assert_eq!(
            stats.yes_children,
            vec!["Jules Albert", "Anna Martin", "Zoé Martin"]
        );
    }

    #[test]
    fn group_statistics_walks_options_then_slots() {
        let option = DateOption {
            id: Uuid::new_v4(),
            date_group_id: Uuid::new_v4(),
            date: date(2025, 12, 24),
        };
        let slots = Period::ALL
            .iter()
            .map(|&period| {
                (
                    TimeSlot {
                        id: Uuid::new_v4(),
                        date_option_id: option.id,
                        period,
                    },
                    vec![voter("Léa", "Martin", Choice::Yes)],
                )
            })
            .collect();
        let ballots: GroupBallots = vec![(option, slots)];

        let stats = group_statistics(&ballots);
        assert_eq!(stats.len(), 3);
        let periods: Vec<Period> = stats.iter().map(|s| s.period).collect();
        assert_eq!(periods, Period::ALL.to_vec());
    }
}
