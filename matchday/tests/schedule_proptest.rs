//! Property-based tests for the match generation engine.
//!
//! These verify the distribution and pairing invariants across a wide range
//! of team counts, group counts, and seeds.

use matchday::schedule::{
    OpeningPair, distribute_into_groups, knockout_round, round_robin, validate_distribution,
};
use matchday::tournament::TeamId;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;

fn team_list(n: usize) -> Vec<TeamId> {
    (1..=n as TeamId).collect()
}

fn anchor() -> chrono::DateTime<chrono::Utc> {
    "2026-03-01T15:00:00Z".parse().expect("valid anchor")
}

proptest! {
    #[test]
    fn distribution_covers_every_team_exactly_once(
        n in 2usize..40,
        groups_raw in 1u32..8,
        seed in any::<u64>(),
    ) {
        let group_count = groups_raw.min(n as u32);
        let teams = team_list(n);
        let mut rng = StdRng::seed_from_u64(seed);

        let groups = distribute_into_groups(&teams, group_count, None, &mut rng).unwrap();

        let mut seen: Vec<TeamId> = groups.iter().flatten().copied().collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, teams.clone());

        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        let spread = sizes.iter().max().unwrap() - sizes.iter().min().unwrap();
        prop_assert!(spread <= 1, "sizes {:?} spread more than 1", sizes);

        // The engine's own validator agrees.
        prop_assert!(validate_distribution(&teams, &groups).is_ok());
    }

    #[test]
    fn opening_pair_always_shares_a_group(
        n in 4usize..32,
        groups_raw in 1u32..6,
        seed in any::<u64>(),
        a_idx in 0usize..32,
        b_idx in 0usize..32,
    ) {
        let group_count = groups_raw.min((n / 2) as u32).max(1);
        let teams = team_list(n);
        let team_a = teams[a_idx % n];
        let team_b = teams[b_idx % n];
        prop_assume!(team_a != team_b);

        let pair = OpeningPair { team_a, team_b };
        let mut rng = StdRng::seed_from_u64(seed);
        let groups = distribute_into_groups(&teams, group_count, Some(&pair), &mut rng).unwrap();

        let group_of = |team: TeamId| groups.iter().position(|g| g.contains(&team));
        prop_assert_eq!(group_of(team_a), group_of(team_b));
    }

    #[test]
    fn round_robin_covers_every_pair(
        n in 2usize..16,
        double in any::<bool>(),
    ) {
        let teams = team_list(n);
        let matches = round_robin(&teams, double, None, anchor(), None, "League").unwrap();

        let expected_single = n * (n - 1) / 2;
        let expected = if double { expected_single * 2 } else { expected_single };
        prop_assert_eq!(matches.len(), expected);

        let unordered: HashSet<(TeamId, TeamId)> = matches
            .iter()
            .map(|m| {
                let (a, b) = (m.home_team_id, m.away_team_id);
                (a.min(b), a.max(b))
            })
            .collect();
        prop_assert_eq!(unordered.len(), expected_single);
        prop_assert!(matches.iter().all(|m| m.home_team_id != m.away_team_id));
    }

    #[test]
    fn round_robin_opening_match_unique_and_earliest(
        n in 2usize..14,
        a_idx in 0usize..16,
        b_idx in 0usize..16,
    ) {
        let teams = team_list(n);
        let team_a = teams[a_idx % n];
        let team_b = teams[b_idx % n];
        prop_assume!(team_a != team_b);
        let pair = OpeningPair { team_a, team_b };

        let matches = round_robin(&teams, false, Some(&pair), anchor(), None, "League").unwrap();

        let flagged: Vec<_> = matches.iter().filter(|m| m.is_opening_match).collect();
        prop_assert_eq!(flagged.len(), 1);
        prop_assert!(pair.matches(flagged[0].home_team_id, flagged[0].away_team_id));

        let earliest = matches.iter().map(|m| m.kickoff_at).min().unwrap();
        prop_assert_eq!(flagged[0].kickoff_at, earliest);
    }

    #[test]
    fn knockout_round_pairs_everyone_once(
        half in 1usize..16,
        two_legged in any::<bool>(),
    ) {
        let teams = team_list(half * 2);
        let matches = knockout_round(&teams, 1, two_legged, None, anchor()).unwrap();

        let expected = if two_legged { half * 2 } else { half };
        prop_assert_eq!(matches.len(), expected);

        // Each team appears in exactly one tie.
        let mut tie_of: std::collections::HashMap<TeamId, (TeamId, TeamId)> = Default::default();
        for m in &matches {
            let key = (
                m.home_team_id.min(m.away_team_id),
                m.home_team_id.max(m.away_team_id),
            );
            for team in [m.home_team_id, m.away_team_id] {
                if let Some(existing) = tie_of.insert(team, key) {
                    prop_assert_eq!(existing, key, "team {} in two different ties", team);
                }
            }
        }
        prop_assert_eq!(tie_of.len(), half * 2);
    }
}
