//! Organiser-supplied draw validation and acceptance.

use super::plan::{OpeningPair, PlannedMatch, promote_opening_match, slot_time};
use super::round_robin::round_robin;
use super::{GROUP_STAGE, ScheduleError, ScheduleResult};
use crate::tournament::TeamId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One group's membership as submitted by the organiser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAssignment {
    pub group_index: u32,
    pub team_ids: Vec<TeamId>,
}

/// One knockout pairing as submitted by the organiser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnockoutPairing {
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub round_number: u32,
    pub stage_name: String,
}

/// A manual draw carries exactly one of the two shapes per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualDraw {
    Groups(Vec<GroupAssignment>),
    Knockout(Vec<KnockoutPairing>),
}

/// Validate a group draw: exact group count, every eligible team exactly
/// once, nothing extra, sizes spreading by at most one. Rejected before any
/// mutation; no partial application.
pub fn validate_group_draw(
    assignments: &[GroupAssignment],
    eligible: &[TeamId],
    expected_groups: u32,
) -> ScheduleResult<()> {
    if assignments.is_empty() {
        return Err(ScheduleError::EmptyDraw);
    }
    if assignments.len() as u32 != expected_groups {
        return Err(ScheduleError::GroupCountMismatch {
            expected: expected_groups,
            got: assignments.len() as u32,
        });
    }

    let eligible_set: HashSet<TeamId> = eligible.iter().copied().collect();
    let mut seen: HashSet<TeamId> = HashSet::new();
    for assignment in assignments {
        for team in &assignment.team_ids {
            if !eligible_set.contains(team) {
                return Err(ScheduleError::IneligibleTeam(*team));
            }
            if !seen.insert(*team) {
                return Err(ScheduleError::DuplicateTeamInDraw(*team));
            }
        }
    }
    for team in eligible {
        if !seen.contains(team) {
            return Err(ScheduleError::MissingTeam(*team));
        }
    }

    let sizes: Vec<usize> = assignments.iter().map(|a| a.team_ids.len()).collect();
    let min = sizes.iter().min().copied().unwrap_or(0);
    let max = sizes.iter().max().copied().unwrap_or(0);
    if min < 2 {
        return Err(ScheduleError::TooFewTeams { min: 2, got: min });
    }
    if max - min > 1 {
        return Err(ScheduleError::InvalidDistribution(format!(
            "group sizes spread from {min} to {max}"
        )));
    }

    Ok(())
}

/// Validate a knockout draw: one round per call, no duplicate participant, no
/// team playing itself, full coverage of the eligible teams.
pub fn validate_knockout_draw(
    pairings: &[KnockoutPairing],
    eligible: &[TeamId],
) -> ScheduleResult<()> {
    let Some(first) = pairings.first() else {
        return Err(ScheduleError::EmptyDraw);
    };
    for pairing in pairings {
        if pairing.round_number != first.round_number {
            return Err(ScheduleError::MixedRounds(
                first.round_number,
                pairing.round_number,
            ));
        }
    }

    let eligible_set: HashSet<TeamId> = eligible.iter().copied().collect();
    let mut seen: HashSet<TeamId> = HashSet::new();
    for pairing in pairings {
        if pairing.home_team_id == pairing.away_team_id {
            return Err(ScheduleError::TeamPlaysItself(pairing.home_team_id));
        }
        for team in [pairing.home_team_id, pairing.away_team_id] {
            if !eligible_set.contains(&team) {
                return Err(ScheduleError::IneligibleTeam(team));
            }
            if !seen.insert(team) {
                return Err(ScheduleError::DuplicateTeamInDraw(team));
            }
        }
    }
    for team in eligible {
        if !seen.contains(team) {
            return Err(ScheduleError::MissingTeam(*team));
        }
    }

    Ok(())
}

/// Build the group-stage schedule from an accepted group draw. Memberships
/// are kept in the submitted order; the opening pair is honored when both its
/// teams share a group.
pub fn plan_from_group_draw(
    assignments: &[GroupAssignment],
    double_round: bool,
    opening_pair: Option<&OpeningPair>,
    anchor: DateTime<Utc>,
) -> ScheduleResult<Vec<PlannedMatch>> {
    let mut matches = Vec::new();
    for assignment in assignments {
        let pair_here = opening_pair.filter(|p| {
            assignment.team_ids.contains(&p.team_a) && assignment.team_ids.contains(&p.team_b)
        });
        matches.extend(round_robin(
            &assignment.team_ids,
            double_round,
            pair_here,
            anchor,
            Some(assignment.group_index),
            GROUP_STAGE,
        )?);
    }
    Ok(matches)
}

/// Build knockout rows from an accepted knockout draw, preserving the
/// organiser's pairing order for slot assignment.
pub fn plan_from_knockout_draw(
    pairings: &[KnockoutPairing],
    two_legged: bool,
    opening_pair: Option<&OpeningPair>,
    anchor: DateTime<Utc>,
) -> Vec<PlannedMatch> {
    let mut matches = Vec::new();
    for (slot, pairing) in pairings.iter().enumerate() {
        matches.push(PlannedMatch {
            home_team_id: pairing.home_team_id,
            away_team_id: pairing.away_team_id,
            group_index: None,
            round_number: pairing.round_number,
            stage: pairing.stage_name.clone(),
            kickoff_at: slot_time(anchor, 0, slot as u32),
            is_opening_match: false,
        });
        if two_legged {
            matches.push(PlannedMatch {
                home_team_id: pairing.away_team_id,
                away_team_id: pairing.home_team_id,
                group_index: None,
                round_number: pairing.round_number,
                stage: pairing.stage_name.clone(),
                kickoff_at: slot_time(anchor, 1, slot as u32),
                is_opening_match: false,
            });
        }
    }

    if let Some(pair) = opening_pair {
        promote_opening_match(&mut matches, pair);
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> DateTime<Utc> {
        "2026-04-04T12:00:00Z".parse().expect("valid anchor")
    }

    fn pairing(home: TeamId, away: TeamId) -> KnockoutPairing {
        KnockoutPairing {
            home_team_id: home,
            away_team_id: away,
            round_number: 1,
            stage_name: "Semi-final".to_string(),
        }
    }

    #[test]
    fn test_valid_group_draw_accepted() {
        let assignments = vec![
            GroupAssignment {
                group_index: 0,
                team_ids: vec![1, 2, 3],
            },
            GroupAssignment {
                group_index: 1,
                team_ids: vec![4, 5, 6],
            },
        ];
        assert!(validate_group_draw(&assignments, &[1, 2, 3, 4, 5, 6], 2).is_ok());
    }

    #[test]
    fn test_group_draw_rejects_wrong_group_count() {
        let assignments = vec![GroupAssignment {
            group_index: 0,
            team_ids: vec![1, 2, 3, 4],
        }];
        assert_eq!(
            validate_group_draw(&assignments, &[1, 2, 3, 4], 2),
            Err(ScheduleError::GroupCountMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn test_group_draw_rejects_duplicate_and_missing() {
        let dup = vec![
            GroupAssignment {
                group_index: 0,
                team_ids: vec![1, 2],
            },
            GroupAssignment {
                group_index: 1,
                team_ids: vec![2, 3],
            },
        ];
        assert_eq!(
            validate_group_draw(&dup, &[1, 2, 3, 4], 2),
            Err(ScheduleError::DuplicateTeamInDraw(2))
        );

        let missing = vec![
            GroupAssignment {
                group_index: 0,
                team_ids: vec![1, 2],
            },
            GroupAssignment {
                group_index: 1,
                team_ids: vec![3, 4],
            },
        ];
        assert_eq!(
            validate_group_draw(&missing, &[1, 2, 3, 4, 5], 2),
            Err(ScheduleError::MissingTeam(5))
        );
    }

    #[test]
    fn test_knockout_draw_rejects_self_play_and_strangers() {
        assert_eq!(
            validate_knockout_draw(&[pairing(1, 1)], &[1, 2]),
            Err(ScheduleError::TeamPlaysItself(1))
        );
        assert_eq!(
            validate_knockout_draw(&[pairing(1, 9)], &[1, 2]),
            Err(ScheduleError::IneligibleTeam(9))
        );
        assert_eq!(
            validate_knockout_draw(&[], &[1, 2]),
            Err(ScheduleError::EmptyDraw)
        );
    }

    #[test]
    fn test_knockout_draw_requires_full_coverage_and_one_round() {
        assert_eq!(
            validate_knockout_draw(&[pairing(1, 2)], &[1, 2, 3, 4]),
            Err(ScheduleError::MissingTeam(3))
        );

        let mut mixed = vec![pairing(1, 2), pairing(3, 4)];
        mixed[1].round_number = 2;
        assert_eq!(
            validate_knockout_draw(&mixed, &[1, 2, 3, 4]),
            Err(ScheduleError::MixedRounds(1, 2))
        );

        assert!(validate_knockout_draw(&[pairing(1, 2), pairing(3, 4)], &[1, 2, 3, 4]).is_ok());
    }

    #[test]
    fn test_plan_from_knockout_draw_preserves_pairings() {
        let pairings = vec![pairing(1, 2), pairing(3, 4)];
        let matches = plan_from_knockout_draw(&pairings, false, None, anchor());
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].home_team_id, 1);
        assert_eq!(matches[1].home_team_id, 3);
        assert!(matches[0].kickoff_at < matches[1].kickoff_at);
    }

    #[test]
    fn test_plan_from_group_draw_schedules_each_group() {
        let assignments = vec![
            GroupAssignment {
                group_index: 0,
                team_ids: vec![1, 2, 3],
            },
            GroupAssignment {
                group_index: 1,
                team_ids: vec![4, 5, 6],
            },
        ];
        let matches = plan_from_group_draw(&assignments, false, None, anchor()).unwrap();
        assert_eq!(matches.len(), 6);
        assert_eq!(
            matches.iter().filter(|m| m.group_index == Some(0)).count(),
            3
        );
        assert_eq!(
            matches.iter().filter(|m| m.group_index == Some(1)).count(),
            3
        );
        assert!(matches.iter().all(|m| m.stage == GROUP_STAGE));
    }
}
