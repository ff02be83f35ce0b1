use std::collections::{HashMap, HashSet};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::types::*;

/// Ranked table for one (stage, group): every declared participant gets a
/// row even with zero games played, so a knockout seeded from "top 2 of an
/// unplayed group" still has a deterministic fallback. Pure; callers fetch
/// inputs and persist the output.
///
/// With no finished matches the ranking follows declared seed order so
/// downstream seeding has something to read before a ball is kicked.
pub fn compute_standings(
    stage: StageId,
    group: GroupIndex,
    participants: &[Participant],
    matches: &[Match],
    config: &EngineConfig,
) -> EngineResult<Vec<StandingRow>> {
    let mut declared: Vec<&Participant> = participants
        .iter()
        .filter(|p| p.group.unwrap_or(0) == group)
        .collect();
    declared.sort_by_key(|p| (p.seed, p.team));
    // A team declared twice keeps its earliest seed; adjacency-based dedup
    // would miss duplicates split across different seeds.
    let mut seen = HashSet::new();
    declared.retain(|p| seen.insert(p.team));

    // No participants declared: no rows. The seeding step upstream treats
    // an empty table as "cannot seed downstream".
    if declared.is_empty() {
        return Ok(Vec::new());
    }

    let mut rows: HashMap<TeamId, StandingRow> = declared
        .iter()
        .map(|p| (p.team, StandingRow::zeroed(stage, group, p.team)))
        .collect();
    let seed_of: HashMap<TeamId, u32> = declared.iter().map(|p| (p.team, p.seed)).collect();

    let mut any_finished = false;
    for m in matches {
        if m.group.unwrap_or(0) != group || !m.is_finished() {
            continue;
        }
        let (Some(home), Some(away)) = (m.home, m.away) else {
            continue;
        };
        let (Some(home_score), Some(away_score)) = (m.home_score, m.away_score) else {
            continue;
        };
        if !rows.contains_key(&home) || !rows.contains_key(&away) {
            continue;
        }
        any_finished = true;

        {
            let row = rows.get_mut(&home).unwrap();
            row.played += 1;
            row.goals_for += home_score;
            row.goals_against += away_score;
        }
        {
            let row = rows.get_mut(&away).unwrap();
            row.played += 1;
            row.goals_for += away_score;
            row.goals_against += home_score;
        }

        if home_score > away_score {
            rows.get_mut(&home).unwrap().won += 1;
            rows.get_mut(&home).unwrap().points += config.points_win;
            rows.get_mut(&away).unwrap().lost += 1;
        } else if away_score > home_score {
            rows.get_mut(&away).unwrap().won += 1;
            rows.get_mut(&away).unwrap().points += config.points_win;
            rows.get_mut(&home).unwrap().lost += 1;
        } else {
            for team in [home, away] {
                let row = rows.get_mut(&team).unwrap();
                row.drawn += 1;
                row.points += config.points_draw;
            }
        }
    }

    let mut table: Vec<StandingRow> = rows.into_values().collect();
    if any_finished {
        // Last key is team id purely to make the ordering deterministic,
        // not a sporting rule.
        table.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then(b.goal_difference().cmp(&a.goal_difference()))
                .then(b.goals_for.cmp(&a.goals_for))
                .then(a.team.cmp(&b.team))
        });
    } else {
        table.sort_by_key(|row| (seed_of.get(&row.team).copied().unwrap_or(u32::MAX), row.team));
    }

    for (i, row) in table.iter_mut().enumerate() {
        row.rank = (i + 1) as u32;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn league_participants(stage: StageId, teams: &[(TeamId, u32)]) -> Vec<Participant> {
        teams
            .iter()
            .map(|&(team, seed)| Participant {
                stage,
                team,
                group: None,
                seed,
            })
            .collect()
    }

    fn finished(stage: StageId, id: MatchId, home: TeamId, away: TeamId, hs: u32, aws: u32) -> Match {
        Match {
            id,
            stage,
            group: None,
            round: None,
            bracket_pos: None,
            matchday: Some(1),
            home: Some(home),
            away: Some(away),
            home_score: Some(hs),
            away_score: Some(aws),
            status: MatchStatus::Finished,
            home_source: None,
            away_source: None,
            finished_at: None,
        }
    }

    #[test]
    fn unplayed_league_ranks_by_seed() {
        let participants = league_participants(1, &[(30, 3), (10, 1), (40, 4), (20, 2)]);
        let table =
            compute_standings(1, 0, &participants, &[], &EngineConfig::default()).unwrap();

        assert_eq!(table.len(), 4);
        assert!(table.iter().all(|row| row.played == 0 && row.points == 0));
        let order: Vec<TeamId> = table.iter().map(|r| r.team).collect();
        assert_eq!(order, vec![10, 20, 30, 40]);
        assert_eq!(table[0].rank, 1);
        assert_eq!(table[3].rank, 4);
    }

    #[test]
    fn points_and_tiebreakers() {
        let participants = league_participants(1, &[(1, 1), (2, 2), (3, 3)]);
        let matches = vec![
            finished(1, 1, 1, 2, 2, 0),
            finished(1, 2, 2, 3, 1, 1),
            finished(1, 3, 3, 1, 0, 3),
        ];
        let table =
            compute_standings(1, 0, &participants, &matches, &EngineConfig::default()).unwrap();

        assert_eq!(table[0].team, 1);
        assert_eq!(table[0].points, 6);
        assert_eq!(table[0].goals_for, 5);
        // Teams 2 and 3 both hold one point; goal difference splits them.
        assert_eq!(table[1].team, 2);
        assert_eq!(table[2].team, 3);
    }

    #[test]
    fn soundness_sums() {
        let participants = league_participants(1, &[(1, 1), (2, 2), (3, 3), (4, 4)]);
        let matches = vec![
            finished(1, 1, 1, 2, 3, 1),
            finished(1, 2, 3, 4, 2, 2),
            finished(1, 3, 1, 3, 0, 0),
            finished(1, 4, 2, 4, 1, 0),
        ];
        let table =
            compute_standings(1, 0, &participants, &matches, &EngineConfig::default()).unwrap();

        let decisive = 2u32;
        let drawn_matches = 2u32;
        let played: u32 = table.iter().map(|r| r.played).sum();
        let won: u32 = table.iter().map(|r| r.won).sum();
        let drawn: u32 = table.iter().map(|r| r.drawn).sum();
        assert_eq!(played, 2 * (decisive + drawn_matches));
        assert_eq!(won, decisive);
        assert_eq!(drawn % 2, 0);
    }

    #[test]
    fn duplicate_declarations_collapse_to_one_row() {
        let mut participants = league_participants(1, &[(10, 1), (20, 2)]);
        // Same team declared again under a different seed.
        participants.push(Participant {
            stage: 1,
            team: 10,
            group: None,
            seed: 5,
        });
        let table =
            compute_standings(1, 0, &participants, &[], &EngineConfig::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].team, 10);
        assert_eq!(table[0].rank, 1);
    }

    #[test]
    fn no_participants_yields_no_rows() {
        let table = compute_standings(1, 0, &[], &[], &EngineConfig::default()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn deterministic_output() {
        let participants = league_participants(1, &[(5, 2), (9, 1), (7, 3)]);
        let matches = vec![finished(1, 1, 5, 9, 2, 2), finished(1, 2, 7, 5, 1, 0)];
        let first =
            compute_standings(1, 0, &participants, &matches, &EngineConfig::default()).unwrap();
        for _ in 0..10 {
            let again =
                compute_standings(1, 0, &participants, &matches, &EngineConfig::default())
                    .unwrap();
            assert_eq!(first, again);
        }
    }
}
