use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::types::*;

// ── Storage contract ───────────────────────────────────────────────────

/// The engine's only boundary: plain reads and writes against whatever
/// persistence the surrounding application owns. The engine keys every
/// access by stage/group/round/position and never assumes exclusive access
/// to the whole tournament; callers serialize concurrent triggers for the
/// same match.
pub trait TournamentStore {
    // Reads
    fn tournament(&self, id: TournamentId) -> EngineResult<Tournament>;
    fn stage(&self, id: StageId) -> EngineResult<Stage>;
    fn stages(&self, tournament: TournamentId) -> EngineResult<Vec<Stage>>;
    fn groups(&self, stage: StageId) -> EngineResult<Vec<Group>>;
    fn participants(&self, stage: StageId) -> EngineResult<Vec<Participant>>;
    fn matches(&self, stage: StageId) -> EngineResult<Vec<Match>>;
    fn match_by_id(&self, id: MatchId) -> EngineResult<Match>;
    fn standings(&self, stage: StageId, group: GroupIndex) -> EngineResult<Vec<StandingRow>>;
    fn stage_slots(&self, stage: StageId, group: GroupIndex) -> EngineResult<Vec<StageSlot>>;
    fn intake_mapping(
        &self,
        source_stage: StageId,
        round: u32,
        bracket_pos: u32,
        outcome: OutcomeTag,
    ) -> EngineResult<Option<IntakeMapping>>;
    fn intake_mappings_for_target(
        &self,
        target_stage: StageId,
        target_group: GroupIndex,
    ) -> EngineResult<Vec<IntakeMapping>>;

    // Writes
    fn replace_standings(
        &mut self,
        stage: StageId,
        group: GroupIndex,
        rows: Vec<StandingRow>,
    ) -> EngineResult<()>;
    fn insert_matches(&mut self, rows: Vec<Match>) -> EngineResult<()>;
    fn delete_stage_matches(&mut self, stage: StageId) -> EngineResult<()>;
    fn update_match(&mut self, row: Match) -> EngineResult<()>;
    fn delete_match(&mut self, id: MatchId) -> EngineResult<()>;
    fn upsert_stage_slot(&mut self, slot: StageSlot) -> EngineResult<()>;
    fn insert_intake_mapping(&mut self, mapping: IntakeMapping) -> EngineResult<()>;
    fn set_tournament_complete(&mut self, tournament: TournamentId) -> EngineResult<()>;
    fn next_match_id(&mut self) -> EngineResult<MatchId>;
}

// ── In-memory store ────────────────────────────────────────────────────

/// HashMap-backed store used by the test suite and by embedders without a
/// database. Reads come back in deterministic id/index order so engine
/// output never depends on map iteration.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub tournaments: HashMap<TournamentId, Tournament>,
    pub stage_rows: HashMap<StageId, Stage>,
    pub group_rows: Vec<Group>,
    pub participant_rows: Vec<Participant>,
    pub match_rows: HashMap<MatchId, Match>,
    pub standing_rows: Vec<StandingRow>,
    pub slot_rows: Vec<StageSlot>,
    pub intake_rows: Vec<IntakeMapping>,
    next_id: MatchId,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            next_id: 1,
            ..MemoryStore::default()
        }
    }

    pub fn add_tournament(&mut self, id: TournamentId, name: &str) {
        self.tournaments.insert(
            id,
            Tournament {
                id,
                name: name.to_string(),
                complete: false,
            },
        );
    }

    pub fn add_stage(&mut self, stage: Stage) {
        self.stage_rows.insert(stage.id, stage);
    }

    pub fn add_group(&mut self, stage: StageId, index: GroupIndex, label: &str) {
        self.group_rows.push(Group {
            stage,
            index,
            label: label.to_string(),
        });
    }

    pub fn add_participant(
        &mut self,
        stage: StageId,
        team: TeamId,
        group: Option<GroupIndex>,
        seed: u32,
    ) {
        self.participant_rows.push(Participant {
            stage,
            team,
            group,
            seed,
        });
    }

    pub fn add_match(&mut self, row: Match) {
        self.next_id = self.next_id.max(row.id + 1);
        self.match_rows.insert(row.id, row);
    }
}

impl TournamentStore for MemoryStore {
    fn tournament(&self, id: TournamentId) -> EngineResult<Tournament> {
        self.tournaments
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("tournament {id}")))
    }

    fn stage(&self, id: StageId) -> EngineResult<Stage> {
        self.stage_rows
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("stage {id}")))
    }

    fn stages(&self, tournament: TournamentId) -> EngineResult<Vec<Stage>> {
        let mut out: Vec<Stage> = self
            .stage_rows
            .values()
            .filter(|s| s.tournament == tournament)
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.ordering, s.id));
        Ok(out)
    }

    fn groups(&self, stage: StageId) -> EngineResult<Vec<Group>> {
        let mut out: Vec<Group> = self
            .group_rows
            .iter()
            .filter(|g| g.stage == stage)
            .cloned()
            .collect();
        out.sort_by_key(|g| g.index);
        Ok(out)
    }

    fn participants(&self, stage: StageId) -> EngineResult<Vec<Participant>> {
        let mut out: Vec<Participant> = self
            .participant_rows
            .iter()
            .filter(|p| p.stage == stage)
            .cloned()
            .collect();
        out.sort_by_key(|p| (p.group, p.seed, p.team));
        Ok(out)
    }

    fn matches(&self, stage: StageId) -> EngineResult<Vec<Match>> {
        let mut out: Vec<Match> = self
            .match_rows
            .values()
            .filter(|m| m.stage == stage)
            .cloned()
            .collect();
        out.sort_by_key(|m| m.id);
        Ok(out)
    }

    fn match_by_id(&self, id: MatchId) -> EngineResult<Match> {
        self.match_rows
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("match {id}")))
    }

    fn standings(&self, stage: StageId, group: GroupIndex) -> EngineResult<Vec<StandingRow>> {
        let mut out: Vec<StandingRow> = self
            .standing_rows
            .iter()
            .filter(|r| r.stage == stage && r.group == group)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.rank);
        Ok(out)
    }

    fn stage_slots(&self, stage: StageId, group: GroupIndex) -> EngineResult<Vec<StageSlot>> {
        let mut out: Vec<StageSlot> = self
            .slot_rows
            .iter()
            .filter(|s| s.stage == stage && s.group == group)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.slot);
        Ok(out)
    }

    fn intake_mapping(
        &self,
        source_stage: StageId,
        round: u32,
        bracket_pos: u32,
        outcome: OutcomeTag,
    ) -> EngineResult<Option<IntakeMapping>> {
        Ok(self
            .intake_rows
            .iter()
            .find(|m| {
                m.source_stage == source_stage
                    && m.round == round
                    && m.bracket_pos == bracket_pos
                    && m.outcome == outcome
            })
            .cloned())
    }

    fn intake_mappings_for_target(
        &self,
        target_stage: StageId,
        target_group: GroupIndex,
    ) -> EngineResult<Vec<IntakeMapping>> {
        let mut out: Vec<IntakeMapping> = self
            .intake_rows
            .iter()
            .filter(|m| m.target_stage == target_stage && m.target_group == target_group)
            .cloned()
            .collect();
        out.sort_by_key(|m| m.target_slot);
        Ok(out)
    }

    fn replace_standings(
        &mut self,
        stage: StageId,
        group: GroupIndex,
        rows: Vec<StandingRow>,
    ) -> EngineResult<()> {
        self.standing_rows
            .retain(|r| !(r.stage == stage && r.group == group));
        self.standing_rows.extend(rows);
        Ok(())
    }

    fn insert_matches(&mut self, rows: Vec<Match>) -> EngineResult<()> {
        for row in rows {
            self.add_match(row);
        }
        Ok(())
    }

    fn delete_stage_matches(&mut self, stage: StageId) -> EngineResult<()> {
        self.match_rows.retain(|_, m| m.stage != stage);
        Ok(())
    }

    fn update_match(&mut self, row: Match) -> EngineResult<()> {
        if !self.match_rows.contains_key(&row.id) {
            return Err(EngineError::NotFound(format!("match {}", row.id)));
        }
        self.match_rows.insert(row.id, row);
        Ok(())
    }

    fn delete_match(&mut self, id: MatchId) -> EngineResult<()> {
        self.match_rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(format!("match {id}")))
    }

    fn upsert_stage_slot(&mut self, slot: StageSlot) -> EngineResult<()> {
        if let Some(existing) = self
            .slot_rows
            .iter_mut()
            .find(|s| s.stage == slot.stage && s.group == slot.group && s.slot == slot.slot)
        {
            *existing = slot;
        } else {
            self.slot_rows.push(slot);
        }
        Ok(())
    }

    fn insert_intake_mapping(&mut self, mapping: IntakeMapping) -> EngineResult<()> {
        let duplicate = self.intake_rows.iter().any(|m| {
            m.source_stage == mapping.source_stage
                && m.round == mapping.round
                && m.bracket_pos == mapping.bracket_pos
                && m.outcome == mapping.outcome
        });
        if duplicate {
            return Err(EngineError::GuardViolated(format!(
                "intake mapping for stage {} ({}, {}) already exists",
                mapping.source_stage, mapping.round, mapping.bracket_pos
            )));
        }
        self.intake_rows.push(mapping);
        Ok(())
    }

    fn set_tournament_complete(&mut self, tournament: TournamentId) -> EngineResult<()> {
        let row = self
            .tournaments
            .get_mut(&tournament)
            .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament}")))?;
        row.complete = true;
        Ok(())
    }

    fn next_match_id(&mut self) -> EngineResult<MatchId> {
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }
}
