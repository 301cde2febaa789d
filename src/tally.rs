//! Vote counting over availability entries.
//!
//! Every entry is one vote for its `(day, start)` slot and one vote for its
//! location. The two tallies are independent: the winning location need not
//! come from the same entries as the winning slot.
//!
//! Ties are settled without regard to input order:
//! - slots: earliest start time, then earliest weekday (Sunday first)
//! - locations: lexicographic order

use std::cmp::Reverse;
use std::collections::HashMap;

use serde::Serialize;

use crate::db::DbAvailability;
use crate::time_math::{ClockTime, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    pub day: Weekday,
    pub start_time: ClockTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotVotes {
    #[serde(flatten)]
    pub slot: SlotKey,
    pub votes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationVotes {
    pub location: String,
    pub votes: usize,
}

/// Full ranking plus the winners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub slots: Vec<SlotVotes>,
    pub locations: Vec<LocationVotes>,
}

impl Tally {
    pub fn best_slot(&self) -> Option<&SlotVotes> {
        self.slots.first()
    }

    pub fn best_location(&self) -> Option<&LocationVotes> {
        self.locations.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Suggestion {
    NoSuggestion,
    #[serde(rename_all = "camelCase")]
    Suggested {
        best_slot: SlotVotes,
        best_location: LocationVotes,
        tally: Tally,
    },
}

/// Anything that carries a vote.
pub trait Ballot {
    fn slot(&self) -> SlotKey;
    fn location(&self) -> &str;
}

impl Ballot for DbAvailability {
    fn slot(&self) -> SlotKey {
        SlotKey {
            day: self.day,
            start_time: self.start_time,
        }
    }

    fn location(&self) -> &str {
        &self.location
    }
}

/// Rank every slot and location by vote count.
pub fn tally<B: Ballot>(entries: &[B]) -> Tally {
    let mut slot_counts: HashMap<SlotKey, usize> = HashMap::new();
    let mut location_counts: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        *slot_counts.entry(entry.slot()).or_default() += 1;
        *location_counts.entry(entry.location()).or_default() += 1;
    }

    let mut slots: Vec<SlotVotes> = slot_counts
        .into_iter()
        .map(|(slot, votes)| SlotVotes { slot, votes })
        .collect();
    slots.sort_by_key(|s| (Reverse(s.votes), s.slot.start_time, s.slot.day));

    let mut locations: Vec<LocationVotes> = location_counts
        .into_iter()
        .map(|(location, votes)| LocationVotes {
            location: location.to_string(),
            votes,
        })
        .collect();
    locations.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.location.cmp(&b.location)));

    Tally { slots, locations }
}

/// Suggest the most-voted slot and location, or `NoSuggestion` with no entries.
pub fn compute_suggestion<B: Ballot>(entries: &[B]) -> Suggestion {
    let tally = tally(entries);
    match (tally.best_slot().cloned(), tally.best_location().cloned()) {
        (Some(best_slot), Some(best_location)) => Suggestion::Suggested {
            best_slot,
            best_location,
            tally,
        },
        _ => Suggestion::NoSuggestion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Vote(Weekday, &'static str, &'static str);

    impl Ballot for Vote {
        fn slot(&self) -> SlotKey {
            SlotKey {
                day: self.0,
                start_time: self.1.parse().unwrap(),
            }
        }

        fn location(&self) -> &str {
            self.2
        }
    }

    fn best(votes: &[Vote]) -> (SlotVotes, LocationVotes) {
        match compute_suggestion(votes) {
            Suggestion::Suggested {
                best_slot,
                best_location,
                ..
            } => (best_slot, best_location),
            Suggestion::NoSuggestion => panic!("expected a suggestion"),
        }
    }

    #[test]
    fn test_empty_yields_no_suggestion() {
        let votes: Vec<Vote> = Vec::new();
        assert_eq!(compute_suggestion(&votes), Suggestion::NoSuggestion);
    }

    #[test]
    fn test_majority_slot_and_location() {
        let votes = vec![
            Vote(Weekday::Wednesday, "10:00", "Library"),
            Vote(Weekday::Wednesday, "10:00", "Library"),
            Vote(Weekday::Wednesday, "14:00", "Park"),
        ];
        let (slot, location) = best(&votes);
        assert_eq!(slot.slot.day, Weekday::Wednesday);
        assert_eq!(slot.slot.start_time.to_string(), "10:00");
        assert_eq!(slot.votes, 2);
        assert_eq!(location.location, "Library");
        assert_eq!(location.votes, 2);
    }

    #[test]
    fn test_dominant_slot_wins_in_any_order() {
        let mut votes = vec![
            Vote(Weekday::Monday, "08:00", "Cafe"),
            Vote(Weekday::Monday, "16:00", "Lab"),
            Vote(Weekday::Monday, "16:00", "Lab"),
            Vote(Weekday::Monday, "16:00", "Cafe"),
        ];
        for _ in 0..votes.len() {
            votes.rotate_left(1);
            let (slot, _) = best(&votes);
            assert_eq!(slot.slot.start_time.to_string(), "16:00");
            assert_eq!(slot.votes, 3);
        }
        votes.reverse();
        assert_eq!(best(&votes).0.votes, 3);
    }

    #[test]
    fn test_slot_tie_prefers_earliest_time_then_day() {
        let votes = vec![
            Vote(Weekday::Friday, "15:00", "A"),
            Vote(Weekday::Friday, "09:00", "B"),
            Vote(Weekday::Tuesday, "09:00", "C"),
        ];
        let (slot, _) = best(&votes);
        assert_eq!(slot.slot.day, Weekday::Tuesday);
        assert_eq!(slot.slot.start_time.to_string(), "09:00");
    }

    #[test]
    fn test_location_tie_is_lexicographic() {
        let forward = vec![
            Vote(Weekday::Monday, "10:00", "Park"),
            Vote(Weekday::Monday, "10:00", "Cafe"),
        ];
        let backward = vec![
            Vote(Weekday::Monday, "10:00", "Cafe"),
            Vote(Weekday::Monday, "10:00", "Park"),
        ];
        assert_eq!(best(&forward).1.location, "Cafe");
        assert_eq!(best(&backward).1.location, "Cafe");
    }

    #[test]
    fn test_full_ranking_is_ordered() {
        let votes = vec![
            Vote(Weekday::Monday, "11:00", "Lab"),
            Vote(Weekday::Monday, "10:00", "Lab"),
            Vote(Weekday::Monday, "11:00", "Cafe"),
        ];
        let ranking = tally(&votes);
        let counts: Vec<usize> = ranking.slots.iter().map(|s| s.votes).collect();
        assert_eq!(counts, vec![2, 1]);
        assert_eq!(ranking.locations[0].location, "Lab");
        assert_eq!(ranking.locations[1].location, "Cafe");
    }
}
