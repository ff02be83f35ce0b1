use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::storage::TournamentStore;
use crate::types::*;

// ── Canvas grid ────────────────────────────────────────────────────────

pub const GRID_COL_WIDTH: f64 = 260.0;
pub const GRID_ROW_HEIGHT: f64 = 140.0;

// ── Graph model ────────────────────────────────────────────────────────

/// One box on the manual bracket-editor canvas. Node ids are UUIDs owned
/// by the graph itself, never a shared process-wide counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketNode {
    pub id: Uuid,
    /// Explicit bracket coordinates; trusted when present.
    pub round: Option<u32>,
    pub bracket_pos: Option<u32>,
    pub x: f64,
    pub y: f64,
    pub home: Option<TeamId>,
    pub away: Option<TeamId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketEdge {
    pub from: Uuid,
    pub to: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketGraph {
    pub nodes: Vec<BracketNode>,
    pub edges: Vec<BracketEdge>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub links_written: usize,
    pub edges_rejected: usize,
}

// ── Synchronizer ───────────────────────────────────────────────────────

/// Bidirectional translator between the free-form node/edge canvas and the
/// canonical (round, position)-indexed bracket model. Loads place nodes on
/// a fixed grid; commits re-derive stable pointers from the drawn
/// connections and persist only the links that actually changed.
pub struct GraphSynchronizer<'a, S: TournamentStore> {
    store: &'a mut S,
    stage: StageId,
    loading: bool,
}

impl<'a, S: TournamentStore> GraphSynchronizer<'a, S> {
    pub fn new(store: &'a mut S, stage: StageId) -> Self {
        GraphSynchronizer {
            store,
            stage,
            loading: false,
        }
    }

    /// Canvas-change events fired while a load is still laying out nodes
    /// must not write back; the editor brackets its load with these.
    pub fn begin_load(&mut self) {
        self.loading = true;
    }

    pub fn end_load(&mut self) {
        self.loading = false;
    }

    /// Canonical matches → grid-positioned nodes plus one edge per stored
    /// stable pointer.
    pub fn load(&mut self) -> EngineResult<BracketGraph> {
        self.begin_load();
        let result = self.build_graph();
        self.end_load();
        result
    }

    fn build_graph(&self) -> EngineResult<BracketGraph> {
        let matches = self.knockout_matches()?;
        let mut nodes = Vec::with_capacity(matches.len());
        let mut node_at = std::collections::HashMap::new();
        for (m, round, pos) in &matches {
            let id = Uuid::new_v4();
            node_at.insert((*round, *pos), id);
            nodes.push(BracketNode {
                id,
                round: Some(*round),
                bracket_pos: Some(*pos),
                x: (*round as f64 - 1.0) * GRID_COL_WIDTH,
                y: (*pos as f64 - 1.0) * GRID_ROW_HEIGHT,
                home: m.home,
                away: m.away,
            });
        }

        let mut edges = Vec::new();
        for (m, round, pos) in &matches {
            let target = node_at[&(*round, *pos)];
            for ptr in [m.home_source, m.away_source].into_iter().flatten() {
                if let Some(source) = node_at.get(&(ptr.round, ptr.bracket_pos)) {
                    edges.push(BracketEdge {
                        from: *source,
                        to: target,
                    });
                }
            }
        }
        Ok(BracketGraph { nodes, edges })
    }

    /// Re-derive every node's home/away pointers from its first two
    /// predecessors (lowest position = home) and persist the diff against
    /// the stored model. Connections that skip a round are rejected, not
    /// silently accepted; writes are suppressed while a load is running.
    pub fn commit(&mut self, graph: &BracketGraph) -> EngineResult<CommitSummary> {
        if self.loading {
            return Ok(CommitSummary::default());
        }

        let mut coords = std::collections::HashMap::new();
        for node in &graph.nodes {
            coords.insert(node.id, effective_coords(node));
        }

        let mut summary = CommitSummary::default();
        let matches = self.knockout_matches()?;

        for node in &graph.nodes {
            let (round, pos) = coords[&node.id];
            let Some((m, _, _)) = matches
                .iter()
                .find(|(_, r, p)| *r == round && *p == pos)
            else {
                continue;
            };

            // Predecessors, validated and ordered by source position.
            let mut preds: Vec<(u32, u32)> = Vec::new();
            for edge in graph.edges.iter().filter(|e| e.to == node.id) {
                let Some(&(src_round, src_pos)) = coords.get(&edge.from) else {
                    continue;
                };
                if src_round + 1 != round {
                    warn!(
                        stage = self.stage,
                        src_round, src_pos, round, pos, "cross-round connection rejected"
                    );
                    summary.edges_rejected += 1;
                    continue;
                }
                preds.push((src_round, src_pos));
            }
            preds.sort();
            preds.dedup();

            let new_home = preds.first().map(|&(r, p)| derive_pointer(m.home_source, r, p));
            let new_away = preds.get(1).map(|&(r, p)| derive_pointer(m.away_source, r, p));

            if m.home_source != new_home || m.away_source != new_away {
                let mut updated = m.clone();
                updated.home_source = new_home;
                updated.away_source = new_away;
                debug!(match_id = updated.id, round, pos, "bracket links rewritten");
                self.store.update_match(updated)?;
                summary.links_written += 1;
            }
        }
        Ok(summary)
    }

    /// Step one of node deletion: blank the slot's team and pointer data
    /// but keep the row, preserving its identity for relinking.
    pub fn soft_delete(&mut self, round: u32, bracket_pos: u32) -> EngineResult<()> {
        let mut m = self.match_at(round, bracket_pos)?;
        m.home = None;
        m.away = None;
        m.home_score = None;
        m.away_score = None;
        m.home_source = None;
        m.away_source = None;
        self.store.update_match(m)
    }

    /// Step two: remove the row entirely. Refused until the slot data has
    /// been soft-cleared.
    pub fn hard_delete(&mut self, round: u32, bracket_pos: u32) -> EngineResult<()> {
        let m = self.match_at(round, bracket_pos)?;
        if m.home.is_some()
            || m.away.is_some()
            || m.home_source.is_some()
            || m.away_source.is_some()
        {
            return Err(EngineError::GuardViolated(format!(
                "match at ({round}, {bracket_pos}) still carries slot data; soft-delete first"
            )));
        }
        self.store.delete_match(m.id)
    }

    fn match_at(&self, round: u32, bracket_pos: u32) -> EngineResult<Match> {
        self.knockout_matches()?
            .into_iter()
            .find(|(_, r, p)| *r == round && *p == bracket_pos)
            .map(|(m, _, _)| m)
            .ok_or_else(|| {
                EngineError::NotFound(format!("match at ({round}, {bracket_pos})"))
            })
    }

    fn knockout_matches(&self) -> EngineResult<Vec<(Match, u32, u32)>> {
        let mut out: Vec<(Match, u32, u32)> = self
            .store
            .matches(self.stage)?
            .into_iter()
            .filter_map(|m| {
                let round = m.round?;
                let pos = m.bracket_pos?;
                Some((m, round, pos))
            })
            .collect();
        out.sort_by_key(|(_, r, p)| (*r, *p));
        Ok(out)
    }
}

/// Explicit metadata wins; otherwise the canvas x/y bucket decides where
/// the node sits in the bracket.
fn effective_coords(node: &BracketNode) -> (u32, u32) {
    let round = node
        .round
        .unwrap_or_else(|| (node.x / GRID_COL_WIDTH).floor().max(0.0) as u32 + 1);
    let pos = node
        .bracket_pos
        .unwrap_or_else(|| (node.y / GRID_ROW_HEIGHT).floor().max(0.0) as u32 + 1);
    (round, pos)
}

/// Keep the stored outcome tag when the link still points at the same
/// source match; a freshly drawn connection takes the winner.
fn derive_pointer(existing: Option<StablePointer>, round: u32, bracket_pos: u32) -> StablePointer {
    match existing {
        Some(ptr) if ptr.round == round && ptr.bracket_pos == bracket_pos => ptr,
        _ => StablePointer {
            round,
            bracket_pos,
            outcome: OutcomeTag::Winner,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn bracket_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_tournament(1, "Cup");
        store.add_stage(Stage {
            id: 1,
            tournament: 1,
            name: "Knockout".to_string(),
            ordering: 0,
            config: StageConfig::Knockout { source_stage: None },
        });
        let stub = |id: MatchId, round: u32, pos: u32| Match {
            id,
            stage: 1,
            group: None,
            round: Some(round),
            bracket_pos: Some(pos),
            matchday: None,
            home: None,
            away: None,
            home_score: None,
            away_score: None,
            status: MatchStatus::Scheduled,
            home_source: None,
            away_source: None,
            finished_at: None,
        };
        let mut semi1 = stub(1, 1, 1);
        semi1.home = Some(10);
        semi1.away = Some(40);
        let mut semi2 = stub(2, 1, 2);
        semi2.home = Some(20);
        semi2.away = Some(30);
        let mut final_match = stub(3, 2, 1);
        final_match.home_source = Some(StablePointer {
            round: 1,
            bracket_pos: 1,
            outcome: OutcomeTag::Winner,
        });
        final_match.away_source = Some(StablePointer {
            round: 1,
            bracket_pos: 2,
            outcome: OutcomeTag::Winner,
        });
        store.add_match(semi1);
        store.add_match(semi2);
        store.add_match(final_match);
        store
    }

    fn node_at(graph: &BracketGraph, round: u32, pos: u32) -> &BracketNode {
        graph
            .nodes
            .iter()
            .find(|n| n.round == Some(round) && n.bracket_pos == Some(pos))
            .unwrap()
    }

    #[test]
    fn load_places_nodes_on_grid_with_pointer_edges() {
        let mut store = bracket_store();
        let graph = GraphSynchronizer::new(&mut store, 1).load().unwrap();

        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);

        let semi2 = node_at(&graph, 1, 2);
        assert_eq!(semi2.x, 0.0);
        assert_eq!(semi2.y, GRID_ROW_HEIGHT);
        let final_node = node_at(&graph, 2, 1);
        assert_eq!(final_node.x, GRID_COL_WIDTH);
        assert!(graph
            .edges
            .iter()
            .all(|e| e.to == final_node.id));
    }

    #[test]
    fn unchanged_graph_commits_no_writes() {
        let mut store = bracket_store();
        let mut sync = GraphSynchronizer::new(&mut store, 1);
        let graph = sync.load().unwrap();
        let summary = sync.commit(&graph).unwrap();
        assert_eq!(summary, CommitSummary::default());
    }

    #[test]
    fn redrawn_edges_rewrite_pointers() {
        let mut store = bracket_store();
        let mut sync = GraphSynchronizer::new(&mut store, 1);
        let mut graph = sync.load().unwrap();

        // Drop the edge from semi 2; only the semi-1 link should remain.
        let semi2_id = node_at(&graph, 1, 2).id;
        graph.edges.retain(|e| e.from != semi2_id);
        let summary = sync.commit(&graph).unwrap();
        assert_eq!(summary.links_written, 1);

        let final_match = store.match_by_id(3).unwrap();
        assert_eq!(
            final_match.home_source,
            Some(StablePointer {
                round: 1,
                bracket_pos: 1,
                outcome: OutcomeTag::Winner
            })
        );
        assert_eq!(final_match.away_source, None);
    }

    #[test]
    fn inferred_coordinates_from_canvas_buckets() {
        let mut store = bracket_store();
        let mut sync = GraphSynchronizer::new(&mut store, 1);
        let mut graph = sync.load().unwrap();

        // Strip metadata from the final node; its canvas position alone
        // must still resolve it to (2, 1).
        for node in &mut graph.nodes {
            if node.round == Some(2) {
                node.round = None;
                node.bracket_pos = None;
            }
        }
        let summary = sync.commit(&graph).unwrap();
        assert_eq!(summary.links_written, 0);
        assert_eq!(summary.edges_rejected, 0);
    }

    #[test]
    fn cross_round_connection_is_rejected() {
        let mut store = bracket_store();
        store.add_match(Match {
            id: 4,
            stage: 1,
            group: None,
            round: Some(3),
            bracket_pos: Some(1),
            matchday: None,
            home: None,
            away: None,
            home_score: None,
            away_score: None,
            status: MatchStatus::Scheduled,
            home_source: None,
            away_source: None,
            finished_at: None,
        });
        let mut sync = GraphSynchronizer::new(&mut store, 1);
        let mut graph = sync.load().unwrap();

        // Round 1 straight into round 3 skips a round.
        let from = node_at(&graph, 1, 1).id;
        let to = node_at(&graph, 3, 1).id;
        graph.edges.push(BracketEdge { from, to });
        let summary = sync.commit(&graph).unwrap();
        assert_eq!(summary.edges_rejected, 1);
        assert_eq!(store.match_by_id(4).unwrap().home_source, None);
    }

    #[test]
    fn commit_suppressed_while_loading() {
        let mut store = bracket_store();
        let mut sync = GraphSynchronizer::new(&mut store, 1);
        let mut graph = sync.load().unwrap();
        graph.edges.clear();

        sync.begin_load();
        let summary = sync.commit(&graph).unwrap();
        assert_eq!(summary, CommitSummary::default());
        sync.end_load();

        // Stored pointers were left alone.
        assert!(store.match_by_id(3).unwrap().home_source.is_some());
    }

    #[test]
    fn delete_is_soft_then_hard() {
        let mut store = bracket_store();
        let mut sync = GraphSynchronizer::new(&mut store, 1);

        let err = sync.hard_delete(2, 1).unwrap_err();
        assert!(matches!(err, EngineError::GuardViolated(_)));

        sync.soft_delete(2, 1).unwrap();
        let cleared = store.match_by_id(3).unwrap();
        assert_eq!(cleared.home_source, None);

        let mut sync = GraphSynchronizer::new(&mut store, 1);
        sync.hard_delete(2, 1).unwrap();
        assert!(store.match_by_id(3).is_err());
    }
}
