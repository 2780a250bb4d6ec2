//! Knockout bracket pairing.

use super::groups::check_opening_pair;
use super::plan::{OpeningPair, PlannedMatch, knockout_stage_name, promote_opening_match, slot_time};
use super::{ScheduleError, ScheduleResult};
use crate::tournament::TeamId;
use chrono::{DateTime, Utc};

/// Pair `entrants` sequentially by index into one knockout round: slots
/// (0,1), (2,3), and so on. The caller controls the order — shuffled for a
/// fresh draw, winners-in-bracket-order for a progression round. An odd
/// entrant count is a hard error; byes are never invented here.
///
/// With `two_legged` set, each pairing produces a home leg and a mirrored
/// return leg one round-spacing later, sharing the same round number.
pub fn knockout_round(
    entrants: &[TeamId],
    round_number: u32,
    two_legged: bool,
    opening_pair: Option<&OpeningPair>,
    anchor: DateTime<Utc>,
) -> ScheduleResult<Vec<PlannedMatch>> {
    if entrants.len() < 2 {
        return Err(ScheduleError::TooFewTeams {
            min: 2,
            got: entrants.len(),
        });
    }
    if entrants.len() % 2 != 0 {
        return Err(ScheduleError::UnevenBracket(entrants.len()));
    }

    let mut ordered: Vec<TeamId> = entrants.to_vec();
    if let Some(pair) = opening_pair {
        check_opening_pair(pair, entrants)?;
        // Force the marquee pairing into slots 0 and 1.
        ordered.retain(|t| !pair.contains(*t));
        ordered.insert(0, pair.team_b);
        ordered.insert(0, pair.team_a);
    }

    let stage = knockout_stage_name(ordered.len());
    let mut matches = Vec::with_capacity(if two_legged {
        ordered.len()
    } else {
        ordered.len() / 2
    });

    for (slot, pairing) in ordered.chunks(2).enumerate() {
        let (home, away) = (pairing[0], pairing[1]);
        matches.push(PlannedMatch {
            home_team_id: home,
            away_team_id: away,
            group_index: None,
            round_number,
            stage: stage.clone(),
            kickoff_at: slot_time(anchor, 0, slot as u32),
            is_opening_match: false,
        });
        if two_legged {
            matches.push(PlannedMatch {
                home_team_id: away,
                away_team_id: home,
                group_index: None,
                round_number,
                stage: stage.clone(),
                kickoff_at: slot_time(anchor, 1, slot as u32),
                is_opening_match: false,
            });
        }
    }

    if let Some(pair) = opening_pair {
        promote_opening_match(&mut matches, pair);
    }

    Ok(matches)
}
