//! League and group tables computed from finished matches.

use super::models::{Match, MatchStatus, TeamId};

const WIN_POINTS: i64 = 3;
const DRAW_POINTS: i64 = 1;

/// One row of a standings table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamStanding {
    pub team_id: TeamId,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: i64,
    pub goals_against: i64,
    pub points: i64,
}

impl TeamStanding {
    fn new(team_id: TeamId) -> Self {
        Self {
            team_id,
            played: 0,
            won: 0,
            drawn: 0,
            lost: 0,
            goals_for: 0,
            goals_against: 0,
            points: 0,
        }
    }

    pub fn goal_difference(&self) -> i64 {
        self.goals_for - self.goals_against
    }
}

/// Rank `teams` by completed matches: points, then goal difference, then
/// goals for, then team id — fully deterministic so two sweeps never disagree
/// on who advances.
pub fn standings(matches: &[Match], teams: &[TeamId]) -> Vec<TeamStanding> {
    let mut rows: Vec<TeamStanding> = teams.iter().copied().map(TeamStanding::new).collect();

    for m in matches {
        if m.status != MatchStatus::Completed {
            continue;
        }
        let (Some(home_score), Some(away_score)) = (m.home_score, m.away_score) else {
            continue;
        };
        apply_result(&mut rows, m.home_team_id, home_score, away_score);
        apply_result(&mut rows, m.away_team_id, away_score, home_score);
    }

    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.goal_difference().cmp(&a.goal_difference()))
            .then(b.goals_for.cmp(&a.goals_for))
            .then(a.team_id.cmp(&b.team_id))
    });
    rows
}

/// Standings restricted to one group's matches.
pub fn group_standings(matches: &[Match], group_index: u32, teams: &[TeamId]) -> Vec<TeamStanding> {
    let group_matches: Vec<Match> = matches
        .iter()
        .filter(|m| m.group_index == Some(group_index))
        .cloned()
        .collect();
    standings(&group_matches, teams)
}

fn apply_result(rows: &mut [TeamStanding], team: TeamId, scored: i32, conceded: i32) {
    let Some(row) = rows.iter_mut().find(|r| r.team_id == team) else {
        return;
    };
    row.played += 1;
    row.goals_for += i64::from(scored);
    row.goals_against += i64::from(conceded);
    if scored > conceded {
        row.won += 1;
        row.points += WIN_POINTS;
    } else if scored == conceded {
        row.drawn += 1;
        row.points += DRAW_POINTS;
    } else {
        row.lost += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn completed(home: TeamId, away: TeamId, hs: i32, aws: i32, group: Option<u32>) -> Match {
        Match {
            id: 0,
            tournament_id: 1,
            home_team_id: home,
            away_team_id: away,
            group_index: group,
            round_number: 1,
            stage: "League".to_string(),
            status: MatchStatus::Completed,
            home_score: Some(hs),
            away_score: Some(aws),
            kickoff_at: Utc::now(),
            is_opening_match: false,
        }
    }

    #[test]
    fn test_points_and_ordering() {
        let matches = vec![
            completed(1, 2, 2, 0, None), // 1 wins
            completed(3, 1, 1, 1, None), // draw
            completed(2, 3, 0, 1, None), // 3 wins
        ];
        let table = standings(&matches, &[1, 2, 3]);

        assert_eq!(table[0].team_id, 1); // 4 pts
        assert_eq!(table[0].points, 4);
        assert_eq!(table[1].team_id, 3); // 4 pts but worse goal difference
        assert_eq!(table[1].points, 4);
        assert_eq!(table[2].team_id, 2); // 0 pts
        assert_eq!(table[2].lost, 2);
    }

    #[test]
    fn test_tie_breaks_are_deterministic() {
        // Identical records: lower team id ranks first.
        let matches = vec![
            completed(1, 3, 1, 0, None),
            completed(2, 4, 1, 0, None),
        ];
        let table = standings(&matches, &[4, 3, 2, 1]);
        assert_eq!(table[0].team_id, 1);
        assert_eq!(table[1].team_id, 2);
    }

    #[test]
    fn test_unfinished_matches_do_not_count() {
        let mut pending = completed(1, 2, 3, 0, None);
        pending.status = MatchStatus::Scheduled;
        let table = standings(&[pending], &[1, 2]);
        assert!(table.iter().all(|r| r.played == 0 && r.points == 0));
    }

    #[test]
    fn test_group_scoping() {
        let matches = vec![
            completed(1, 2, 1, 0, Some(0)),
            completed(3, 4, 5, 0, Some(1)),
        ];
        let table = group_standings(&matches, 0, &[1, 2]);
        assert_eq!(table[0].team_id, 1);
        assert_eq!(table[0].played, 1);
        // The other group's rout is invisible here.
        assert_eq!(table[0].goals_for, 1);
    }
}
