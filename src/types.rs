use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identifiers ────────────────────────────────────────────────────────

pub type TournamentId = u32;
pub type StageId = u32;
pub type GroupIndex = u32;
pub type MatchId = u64;
pub type TeamId = u32;

// ── Tournament & stages ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageKind {
    League,
    Groups,
    Knockout,
}

/// How advancers from a groups stage are ordered before bracket placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Pairing {
    /// Rank-major order (all group winners first, then runners-up), so the
    /// canonical seeding pairs 1st of A against 2nd of B.
    #[default]
    CrossGroup,
    /// Strict rank order across the merged table.
    Ranked,
}

/// Kind-specific stage parameters. One variant per stage kind instead of a
/// loosely-typed blob; the variant tag doubles as the stage kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum StageConfig {
    #[serde(rename_all = "camelCase")]
    League { total_advancers: u32 },
    #[serde(rename_all = "camelCase")]
    Groups {
        advancers_per_group: u32,
        #[serde(default)]
        pairing: Pairing,
        source_stage: Option<StageId>,
    },
    #[serde(rename_all = "camelCase")]
    Knockout { source_stage: Option<StageId> },
}

impl StageConfig {
    pub fn kind(&self) -> StageKind {
        match self {
            StageConfig::League { .. } => StageKind::League,
            StageConfig::Groups { .. } => StageKind::Groups,
            StageConfig::Knockout { .. } => StageKind::Knockout,
        }
    }

    pub fn source_stage(&self) -> Option<StageId> {
        match self {
            StageConfig::League { .. } => None,
            StageConfig::Groups { source_stage, .. } => *source_stage,
            StageConfig::Knockout { source_stage } => *source_stage,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: StageId,
    pub tournament: TournamentId,
    pub name: String,
    /// Tournament-wide sequence; lower comes first.
    pub ordering: i32,
    pub config: StageConfig,
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        self.config.kind()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub stage: StageId,
    pub index: GroupIndex,
    pub label: String,
}

/// Declares a team as eligible in a stage. League stages carry no group;
/// they are treated as group 0 throughout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub stage: StageId,
    pub team: TeamId,
    pub group: Option<GroupIndex>,
    pub seed: u32,
}

// ── Matches & stable pointers ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStatus {
    Scheduled,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeTag {
    #[serde(rename = "W")]
    Winner,
    #[serde(rename = "L")]
    Loser,
}

/// "Whoever wins/loses the match at (round, bracket_pos)" — resolved lazily
/// when that match finishes. This indirection lets a bracket be built and
/// edited before all prerequisite matches exist; never collapse it into a
/// match-id foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StablePointer {
    pub round: u32,
    pub bracket_pos: u32,
    pub outcome: OutcomeTag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub stage: StageId,
    pub group: Option<GroupIndex>,
    /// Knockout coordinates. Bracket positions are pair-indexed per round,
    /// so a position stays valid even when neighbouring pairs were byes.
    pub round: Option<u32>,
    pub bracket_pos: Option<u32>,
    /// League/groups scheduling coordinate.
    pub matchday: Option<u32>,
    pub home: Option<TeamId>,
    pub away: Option<TeamId>,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub status: MatchStatus,
    pub home_source: Option<StablePointer>,
    pub away_source: Option<StablePointer>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    /// Winner derived from scores; None while scheduled, drawn, or missing a team.
    pub fn winner(&self) -> Option<TeamId> {
        if !self.is_finished() {
            return None;
        }
        let (home, away) = (self.home?, self.away?);
        let (home_score, away_score) = (self.home_score?, self.away_score?);
        if home_score > away_score {
            Some(home)
        } else if away_score > home_score {
            Some(away)
        } else {
            None
        }
    }

    pub fn loser(&self) -> Option<TeamId> {
        let winner = self.winner()?;
        if winner == self.home? {
            self.away
        } else {
            self.home
        }
    }

    pub fn is_draw(&self) -> bool {
        self.is_finished()
            && self.home_score.is_some()
            && self.home_score == self.away_score
    }
}

// ── Standings ──────────────────────────────────────────────────────────

/// Fully derived; recomputed and replaced wholesale on every trigger,
/// never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingRow {
    pub stage: StageId,
    pub group: GroupIndex,
    pub team: TeamId,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub points: u32,
    /// 1-based sort position.
    pub rank: u32,
}

impl StandingRow {
    pub fn zeroed(stage: StageId, group: GroupIndex, team: TeamId) -> Self {
        StandingRow {
            stage,
            group,
            team,
            played: 0,
            won: 0,
            drawn: 0,
            lost: 0,
            goals_for: 0,
            goals_against: 0,
            points: 0,
            rank: 0,
        }
    }

    pub fn goal_difference(&self) -> i64 {
        self.goals_for as i64 - self.goals_against as i64
    }
}

// ── Intake routing & stage slots ───────────────────────────────────────

/// Persisted rule routing a knockout outcome into a slot of a later stage.
/// Created lazily, at most once per (source stage, round, pos, outcome);
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeMapping {
    pub source_stage: StageId,
    pub round: u32,
    pub bracket_pos: u32,
    pub outcome: OutcomeTag,
    pub target_stage: StageId,
    pub target_group: GroupIndex,
    pub target_slot: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotProvenance {
    Intake,
    Seeded,
}

/// An addressable (stage, group, index) position a team occupies,
/// independent of any specific match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSlot {
    pub stage: StageId,
    pub group: GroupIndex,
    pub slot: u32,
    pub team: TeamId,
    pub provenance: SlotProvenance,
}
