//! Planned matches, opening pairs, and slot arithmetic.

use crate::tournament::TeamId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Days between consecutive rounds / legs.
pub const ROUND_SPACING_DAYS: i64 = 7;

/// Hours between kickoffs within one round.
pub const SLOT_SPACING_HOURS: i64 = 2;

/// Stage label for group-phase matches.
pub const GROUP_STAGE: &str = "Group Stage";

/// Stage label for league (all-play-all) matches.
pub const LEAGUE_STAGE: &str = "League";

/// The designated marquee pairing, forced to open its scheduling scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningPair {
    pub team_a: TeamId,
    pub team_b: TeamId,
}

impl OpeningPair {
    pub fn contains(&self, team: TeamId) -> bool {
        self.team_a == team || self.team_b == team
    }

    /// Unordered comparison against a home/away pairing.
    pub fn matches(&self, home: TeamId, away: TeamId) -> bool {
        (self.team_a == home && self.team_b == away)
            || (self.team_a == away && self.team_b == home)
    }
}

/// A match computed by the engine, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMatch {
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub group_index: Option<u32>,
    pub round_number: u32,
    pub stage: String,
    pub kickoff_at: DateTime<Utc>,
    pub is_opening_match: bool,
}

/// Deterministic kickoff slot: rounds advance by whole weeks, slots within a
/// round by fixed hours. No two (round, slot) pairs collide.
pub fn slot_time(anchor: DateTime<Utc>, round_offset: u32, slot: u32) -> DateTime<Utc> {
    anchor
        + Duration::days(i64::from(round_offset) * ROUND_SPACING_DAYS)
        + Duration::hours(i64::from(slot) * SLOT_SPACING_HOURS)
}

/// Conventional stage name for a knockout round with `entrants` teams left.
pub fn knockout_stage_name(entrants: usize) -> String {
    match entrants {
        2 => "Final".to_string(),
        4 => "Semi-final".to_string(),
        8 => "Quarter-final".to_string(),
        n => format!("Round of {n}"),
    }
}

/// Relocate the opening match to the earliest kickoff in `matches`, swapping
/// times with whatever was originally earliest, and flag it. Returns whether
/// an opening match was found.
pub(crate) fn promote_opening_match(matches: &mut [PlannedMatch], pair: &OpeningPair) -> bool {
    let Some(opening_idx) = matches
        .iter()
        .position(|m| pair.matches(m.home_team_id, m.away_team_id))
    else {
        return false;
    };

    if let Some(earliest_idx) = matches
        .iter()
        .enumerate()
        .min_by_key(|(_, m)| m.kickoff_at)
        .map(|(i, _)| i)
    {
        if earliest_idx != opening_idx {
            let earliest_time = matches[earliest_idx].kickoff_at;
            matches[earliest_idx].kickoff_at = matches[opening_idx].kickoff_at;
            matches[opening_idx].kickoff_at = earliest_time;
            // The opening match may have inherited a slot from a later
            // round; it keeps its own round number, only the date moves.
        }
    }
    matches[opening_idx].is_opening_match = true;
    true
}
