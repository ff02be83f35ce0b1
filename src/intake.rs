use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::storage::TournamentStore;
use crate::types::*;

/// Ensure intake mappings exist for a finished knockout match: the winner
/// routes into group 0 of the nearest later groups stage, the loser into
/// group 1 when that stage has at least two groups. Created at most once
/// per (source stage, round, bracket_pos, outcome) and immutable after.
///
/// Returns the mappings created by this call (empty on re-entry).
pub fn ensure_mappings<S: TournamentStore>(
    store: &mut S,
    config: &EngineConfig,
    source: &Match,
) -> EngineResult<Vec<IntakeMapping>> {
    let stage = store.stage(source.stage)?;
    if stage.kind() != StageKind::Knockout {
        return Ok(Vec::new());
    }
    let (Some(round), Some(bracket_pos)) = (source.round, source.bracket_pos) else {
        return Ok(Vec::new());
    };

    let Some(target) = find_target_stage(store, &stage)? else {
        debug!(stage = stage.id, "no downstream groups stage; skipping intake");
        return Ok(Vec::new());
    };
    let group_count = store.groups(target.id)?.len().max(1);

    let mut created = Vec::new();
    let mut routes = vec![(OutcomeTag::Winner, 0u32)];
    if config.route_losers && group_count >= 2 {
        routes.push((OutcomeTag::Loser, 1));
    }

    for (outcome, target_group) in routes {
        if store
            .intake_mapping(stage.id, round, bracket_pos, outcome)?
            .is_some()
        {
            continue;
        }
        let target_slot = next_free_slot(store, target.id, target_group)?;
        let mapping = IntakeMapping {
            source_stage: stage.id,
            round,
            bracket_pos,
            outcome,
            target_stage: target.id,
            target_group,
            target_slot,
        };
        store.insert_intake_mapping(mapping.clone())?;
        debug!(
            source = stage.id,
            round,
            bracket_pos,
            target = target.id,
            target_group,
            target_slot,
            "intake mapping created"
        );
        created.push(mapping);
    }
    Ok(created)
}

/// Apply any stored mappings for this match. Writes the resolved team into
/// the target stage slot only when the match has a decisive winner; a drawn
/// knockout match writes nothing and is a no-op, not an error.
pub fn apply_mappings<S: TournamentStore>(store: &mut S, source: &Match) -> EngineResult<bool> {
    let (Some(round), Some(bracket_pos)) = (source.round, source.bracket_pos) else {
        return Ok(false);
    };
    let mut wrote = false;
    for outcome in [OutcomeTag::Winner, OutcomeTag::Loser] {
        let Some(mapping) = store.intake_mapping(source.stage, round, bracket_pos, outcome)?
        else {
            continue;
        };
        let team = match outcome {
            OutcomeTag::Winner => source.winner(),
            OutcomeTag::Loser => source.loser(),
        };
        let Some(team) = team else {
            continue;
        };
        store.upsert_stage_slot(StageSlot {
            stage: mapping.target_stage,
            group: mapping.target_group,
            slot: mapping.target_slot,
            team,
            provenance: SlotProvenance::Intake,
        })?;
        wrote = true;
    }
    Ok(wrote)
}

/// Nearest later groups stage: an explicit config link back to the source
/// wins; otherwise the first groups stage after it in tournament ordering.
fn find_target_stage<S: TournamentStore>(
    store: &S,
    source: &Stage,
) -> EngineResult<Option<Stage>> {
    let stages = store.stages(source.tournament)?;
    let linked = stages.iter().find(|s| {
        s.kind() == StageKind::Groups && s.config.source_stage() == Some(source.id)
    });
    if let Some(stage) = linked {
        return Ok(Some(stage.clone()));
    }
    Ok(stages
        .into_iter()
        .find(|s| s.kind() == StageKind::Groups && s.ordering > source.ordering))
}

/// Max occupied slot index plus one, also counting slots already promised
/// to other mappings, so indices climb monotonically and are never reused.
fn next_free_slot<S: TournamentStore>(
    store: &S,
    stage: StageId,
    group: GroupIndex,
) -> EngineResult<u32> {
    let occupied = store
        .stage_slots(stage, group)?
        .iter()
        .map(|s| s.slot + 1)
        .max()
        .unwrap_or(0);
    let promised = store
        .intake_mappings_for_target(stage, group)?
        .iter()
        .map(|m| m.target_slot + 1)
        .max()
        .unwrap_or(0);
    Ok(occupied.max(promised))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn knockout_match(stage: StageId, round: u32, pos: u32, scores: (u32, u32)) -> Match {
        Match {
            id: 1,
            stage,
            group: None,
            round: Some(round),
            bracket_pos: Some(pos),
            matchday: None,
            home: Some(100),
            away: Some(200),
            home_score: Some(scores.0),
            away_score: Some(scores.1),
            status: MatchStatus::Finished,
            home_source: None,
            away_source: None,
            finished_at: None,
        }
    }

    fn store_with_groups_target() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_tournament(1, "Cup");
        store.add_stage(Stage {
            id: 1,
            tournament: 1,
            name: "Qualifier".to_string(),
            ordering: 0,
            config: StageConfig::Knockout { source_stage: None },
        });
        store.add_stage(Stage {
            id: 2,
            tournament: 1,
            name: "Group stage".to_string(),
            ordering: 1,
            config: StageConfig::Groups {
                advancers_per_group: 2,
                pairing: Pairing::CrossGroup,
                source_stage: Some(1),
            },
        });
        store.add_group(2, 0, "Group A");
        store.add_group(2, 1, "Group B");
        store
    }

    #[test]
    fn mapping_created_once_then_reused() {
        let mut store = store_with_groups_target();
        let config = EngineConfig::default();
        let m = knockout_match(1, 1, 1, (2, 0));

        let created = ensure_mappings(&mut store, &config, &m).unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].target_group, 0);
        assert_eq!(created[1].target_group, 1);

        let again = ensure_mappings(&mut store, &config, &m).unwrap();
        assert!(again.is_empty());
        assert_eq!(store.intake_rows.len(), 2);
    }

    #[test]
    fn winner_and_loser_routed_into_slots() {
        let mut store = store_with_groups_target();
        let config = EngineConfig::default();
        let m = knockout_match(1, 1, 1, (2, 0));

        ensure_mappings(&mut store, &config, &m).unwrap();
        assert!(apply_mappings(&mut store, &m).unwrap());

        let group0 = store.stage_slots(2, 0).unwrap();
        let group1 = store.stage_slots(2, 1).unwrap();
        assert_eq!(group0.len(), 1);
        assert_eq!(group0[0].team, 100);
        assert_eq!(group0[0].provenance, SlotProvenance::Intake);
        assert_eq!(group1[0].team, 200);
    }

    #[test]
    fn slots_climb_monotonically() {
        let mut store = store_with_groups_target();
        let config = EngineConfig::default();

        let first = knockout_match(1, 1, 1, (2, 0));
        ensure_mappings(&mut store, &config, &first).unwrap();
        apply_mappings(&mut store, &first).unwrap();

        let mut second = knockout_match(1, 1, 2, (1, 0));
        second.id = 2;
        second.home = Some(300);
        second.away = Some(400);
        let created = ensure_mappings(&mut store, &config, &second).unwrap();
        assert_eq!(created[0].target_slot, 1);
        assert_eq!(created[1].target_slot, 1);
    }

    #[test]
    fn drawn_match_applies_nothing() {
        let mut store = store_with_groups_target();
        let config = EngineConfig::default();
        let m = knockout_match(1, 1, 1, (1, 1));

        ensure_mappings(&mut store, &config, &m).unwrap();
        assert!(!apply_mappings(&mut store, &m).unwrap());
        assert!(store.stage_slots(2, 0).unwrap().is_empty());
        assert!(store.stage_slots(2, 1).unwrap().is_empty());
    }

    #[test]
    fn single_group_target_skips_loser_route() {
        let mut store = store_with_groups_target();
        store.group_rows.retain(|g| g.index == 0);
        let config = EngineConfig::default();
        let m = knockout_match(1, 1, 1, (2, 0));

        let created = ensure_mappings(&mut store, &config, &m).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].outcome, OutcomeTag::Winner);
    }

    #[test]
    fn league_source_match_is_ignored() {
        let mut store = store_with_groups_target();
        store.add_stage(Stage {
            id: 3,
            tournament: 1,
            name: "League".to_string(),
            ordering: 2,
            config: StageConfig::League { total_advancers: 4 },
        });
        let config = EngineConfig::default();
        let mut m = knockout_match(3, 1, 1, (2, 0));
        m.round = None;
        m.bracket_pos = None;

        let created = ensure_mappings(&mut store, &config, &m).unwrap();
        assert!(created.is_empty());
    }
}
