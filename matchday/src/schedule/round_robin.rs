//! Round-robin pairing (circle method).

use super::groups::check_opening_pair;
use super::plan::{OpeningPair, PlannedMatch, promote_opening_match, slot_time};
use super::{ScheduleError, ScheduleResult};
use crate::tournament::TeamId;
use chrono::{DateTime, Utc};

/// All-play-all schedule over `teams`, in the order given (shuffle upstream
/// for a randomized draw). Every unordered pair meets once, or twice with
/// home/away mirrored when `double_round` is set. Odd team counts get a bye
/// slot per round.
///
/// If an opening pair is designated, its match is relocated to the earliest
/// kickoff, swapping times with whatever was originally earliest.
pub fn round_robin(
    teams: &[TeamId],
    double_round: bool,
    opening_pair: Option<&OpeningPair>,
    anchor: DateTime<Utc>,
    group_index: Option<u32>,
    stage: &str,
) -> ScheduleResult<Vec<PlannedMatch>> {
    if teams.len() < 2 {
        return Err(ScheduleError::TooFewTeams {
            min: 2,
            got: teams.len(),
        });
    }
    if let Some(pair) = opening_pair {
        check_opening_pair(pair, teams)?;
    }

    // Circle method: fix slot 0, rotate the rest each round. A None slot is
    // the bye for odd team counts.
    let mut slots: Vec<Option<TeamId>> = teams.iter().copied().map(Some).collect();
    if slots.len() % 2 != 0 {
        slots.push(None);
    }
    let rounds = slots.len() - 1;
    let half = slots.len() / 2;

    let mut matches = Vec::new();
    for round in 0..rounds {
        let mut slot_in_round: u32 = 0;
        for i in 0..half {
            let (first, second) = (slots[i], slots[slots.len() - 1 - i]);
            if let (Some(a), Some(b)) = (first, second) {
                // Alternate sides per round so home counts stay balanced.
                let (home, away) = if round % 2 == 0 { (a, b) } else { (b, a) };
                matches.push(PlannedMatch {
                    home_team_id: home,
                    away_team_id: away,
                    group_index,
                    round_number: (round + 1) as u32,
                    stage: stage.to_string(),
                    kickoff_at: slot_time(anchor, round as u32, slot_in_round),
                    is_opening_match: false,
                });
                slot_in_round += 1;
            }
        }
        slots[1..].rotate_right(1);
    }

    if double_round {
        let single: Vec<PlannedMatch> = matches.clone();
        for m in single {
            let return_round = m.round_number + rounds as u32;
            matches.push(PlannedMatch {
                home_team_id: m.away_team_id,
                away_team_id: m.home_team_id,
                group_index,
                round_number: return_round,
                stage: stage.to_string(),
                kickoff_at: m.kickoff_at + chrono::Duration::days(
                    rounds as i64 * super::plan::ROUND_SPACING_DAYS,
                ),
                is_opening_match: false,
            });
        }
    }

    if let Some(pair) = opening_pair {
        promote_opening_match(&mut matches, pair);
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn anchor() -> DateTime<Utc> {
        "2026-03-01T15:00:00Z".parse().expect("valid anchor")
    }

    fn pair_set(matches: &[PlannedMatch]) -> HashSet<(TeamId, TeamId)> {
        matches
            .iter()
            .map(|m| {
                let (a, b) = (m.home_team_id, m.away_team_id);
                (a.min(b), a.max(b))
            })
            .collect()
    }

    #[test]
    fn test_single_round_every_pair_once() {
        let teams: Vec<TeamId> = (1..=6).collect();
        let matches = round_robin(&teams, false, None, anchor(), None, "League").unwrap();
        assert_eq!(matches.len(), 15);
        assert_eq!(pair_set(&matches).len(), 15);
        assert!(matches.iter().all(|m| m.home_team_id != m.away_team_id));
    }

    #[test]
    fn test_odd_team_count_gets_byes() {
        let teams: Vec<TeamId> = (1..=5).collect();
        let matches = round_robin(&teams, false, None, anchor(), None, "League").unwrap();
        assert_eq!(matches.len(), 10);
        assert_eq!(pair_set(&matches).len(), 10);
        // Five rounds of two matches each.
        let max_round = matches.iter().map(|m| m.round_number).max().unwrap();
        assert_eq!(max_round, 5);
    }

    #[test]
    fn test_double_round_mirrors_home_and_away() {
        let teams: Vec<TeamId> = (1..=4).collect();
        let matches = round_robin(&teams, true, None, anchor(), None, "League").unwrap();
        assert_eq!(matches.len(), 12);

        let ordered: HashSet<(TeamId, TeamId)> = matches
            .iter()
            .map(|m| (m.home_team_id, m.away_team_id))
            .collect();
        // Every ordered pair appears exactly once.
        assert_eq!(ordered.len(), 12);
        for m in &matches {
            assert!(ordered.contains(&(m.away_team_id, m.home_team_id)));
        }
    }

    #[test]
    fn test_kickoffs_unique_within_schedule() {
        let teams: Vec<TeamId> = (1..=8).collect();
        let matches = round_robin(&teams, true, None, anchor(), None, "League").unwrap();
        let kickoffs: HashSet<_> = matches.iter().map(|m| m.kickoff_at).collect();
        assert_eq!(kickoffs.len(), matches.len());
    }

    #[test]
    fn test_opening_match_is_earliest_and_unique() {
        let teams: Vec<TeamId> = (1..=8).collect();
        let pair = OpeningPair {
            team_a: 3,
            team_b: 7,
        };
        let matches = round_robin(&teams, false, Some(&pair), anchor(), None, "League").unwrap();

        let opening: Vec<&PlannedMatch> =
            matches.iter().filter(|m| m.is_opening_match).collect();
        assert_eq!(opening.len(), 1);
        assert!(pair.matches(opening[0].home_team_id, opening[0].away_team_id));

        let earliest = matches.iter().map(|m| m.kickoff_at).min().unwrap();
        assert_eq!(opening[0].kickoff_at, earliest);
    }

    #[test]
    fn test_generation_is_reproducible_for_same_order() {
        let teams: Vec<TeamId> = (1..=7).collect();
        let a = round_robin(&teams, false, None, anchor(), Some(2), "Group Stage").unwrap();
        let b = round_robin(&teams, false, None, anchor(), Some(2), "Group Stage").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_teams_rejected() {
        assert!(matches!(
            round_robin(&[1], false, None, anchor(), None, "League"),
            Err(ScheduleError::TooFewTeams { .. })
        ));
    }
}
