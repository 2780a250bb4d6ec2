//! Group distribution.

use super::plan::OpeningPair;
use super::{ScheduleError, ScheduleResult};
use crate::tournament::TeamId;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

/// Partition `teams` into `group_count` groups as evenly as possible, in a
/// random order drawn from `rng`. A designated opening pair is forced into
/// the same group (the first one).
///
/// The result is re-validated before it is returned; a distribution that
/// loses or duplicates a team, or spreads group sizes by more than one, is a
/// hard error, never silently corrected.
pub fn distribute_into_groups(
    teams: &[TeamId],
    group_count: u32,
    opening_pair: Option<&OpeningPair>,
    rng: &mut impl Rng,
) -> ScheduleResult<Vec<Vec<TeamId>>> {
    if teams.len() < 2 {
        return Err(ScheduleError::TooFewTeams {
            min: 2,
            got: teams.len(),
        });
    }
    if group_count == 0 || group_count as usize > teams.len() {
        return Err(ScheduleError::InvalidGroupCount {
            groups: group_count,
            teams: teams.len(),
        });
    }
    if let Some(pair) = opening_pair {
        check_opening_pair(pair, teams)?;
    }

    let mut pool: Vec<TeamId> = teams.to_vec();
    pool.shuffle(rng);

    let mut groups: Vec<Vec<TeamId>> = vec![Vec::new(); group_count as usize];

    if let Some(pair) = opening_pair {
        pool.retain(|t| !pair.contains(*t));
        groups[0].push(pair.team_a);
        groups[0].push(pair.team_b);
    }

    // Always fill the currently-smallest group; first match wins ties so the
    // fill order is stable for a given shuffle.
    for team in pool {
        let smallest = groups
            .iter()
            .enumerate()
            .min_by_key(|(i, g)| (g.len(), *i))
            .map(|(i, _)| i)
            .unwrap_or(0);
        groups[smallest].push(team);
    }

    validate_distribution(teams, &groups)?;
    Ok(groups)
}

/// Confirm every team appears exactly once and group sizes differ by at most
/// one.
pub fn validate_distribution(teams: &[TeamId], groups: &[Vec<TeamId>]) -> ScheduleResult<()> {
    let mut seen: HashSet<TeamId> = HashSet::new();
    for group in groups {
        for team in group {
            if !seen.insert(*team) {
                return Err(ScheduleError::InvalidDistribution(format!(
                    "team {team} assigned twice"
                )));
            }
        }
    }

    let expected: HashSet<TeamId> = teams.iter().copied().collect();
    if seen != expected {
        for team in &expected {
            if !seen.contains(team) {
                return Err(ScheduleError::InvalidDistribution(format!(
                    "team {team} left unassigned"
                )));
            }
        }
        return Err(ScheduleError::InvalidDistribution(
            "distribution contains unknown teams".to_string(),
        ));
    }

    let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
    let min = sizes.iter().min().copied().unwrap_or(0);
    let max = sizes.iter().max().copied().unwrap_or(0);
    if max - min > 1 {
        return Err(ScheduleError::InvalidDistribution(format!(
            "group sizes spread from {min} to {max}"
        )));
    }

    Ok(())
}

pub(crate) fn check_opening_pair(pair: &OpeningPair, teams: &[TeamId]) -> ScheduleResult<()> {
    if pair.team_a == pair.team_b {
        return Err(ScheduleError::OpeningPairSameTeam);
    }
    for team in [pair.team_a, pair.team_b] {
        if !teams.contains(&team) {
            return Err(ScheduleError::OpeningTeamUnknown(team));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_even_split() {
        let teams: Vec<TeamId> = (1..=12).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let groups = distribute_into_groups(&teams, 4, None, &mut rng).unwrap();
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 3));
    }

    #[test]
    fn test_uneven_split_spreads_by_at_most_one() {
        let teams: Vec<TeamId> = (1..=10).collect();
        let mut rng = StdRng::seed_from_u64(2);
        let groups = distribute_into_groups(&teams, 3, None, &mut rng).unwrap();
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 10);
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
    }

    #[test]
    fn test_opening_pair_lands_in_same_group() {
        let teams: Vec<TeamId> = (1..=16).collect();
        let pair = OpeningPair {
            team_a: 5,
            team_b: 11,
        };
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let groups = distribute_into_groups(&teams, 4, Some(&pair), &mut rng).unwrap();
            let group_of = |team| groups.iter().position(|g| g.contains(&team));
            assert_eq!(group_of(5), group_of(11));
        }
    }

    #[test]
    fn test_same_seed_same_distribution() {
        let teams: Vec<TeamId> = (1..=9).collect();
        let a = distribute_into_groups(&teams, 3, None, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = distribute_into_groups(&teams, 3, None, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_group_count_rejected() {
        let teams: Vec<TeamId> = (1..=4).collect();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            distribute_into_groups(&teams, 0, None, &mut rng),
            Err(ScheduleError::InvalidGroupCount { .. })
        ));
        assert!(matches!(
            distribute_into_groups(&teams, 5, None, &mut rng),
            Err(ScheduleError::InvalidGroupCount { .. })
        ));
    }

    #[test]
    fn test_unknown_opening_team_rejected() {
        let teams: Vec<TeamId> = (1..=4).collect();
        let pair = OpeningPair {
            team_a: 1,
            team_b: 99,
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            distribute_into_groups(&teams, 2, Some(&pair), &mut rng),
            Err(ScheduleError::OpeningTeamUnknown(99))
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_and_missing() {
        let teams: Vec<TeamId> = vec![1, 2, 3, 4];
        assert!(validate_distribution(&teams, &[vec![1, 2], vec![3, 4]]).is_ok());
        assert!(validate_distribution(&teams, &[vec![1, 2], vec![2, 4]]).is_err());
        assert!(validate_distribution(&teams, &[vec![1, 2], vec![3]]).is_err());
        assert!(validate_distribution(&teams, &[vec![1, 2, 3, 4], vec![]]).is_err());
    }
}
