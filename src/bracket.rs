use serde::{Deserialize, Serialize};

use crate::types::{OutcomeTag, StablePointer, TeamId};

// ── Builder output ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotFill {
    /// A literal team, propagated through a bye.
    Team(TeamId),
    /// Whoever comes out of the match at (round, pos) one round earlier.
    Pointer(StablePointer),
    /// Degenerate bye-vs-bye input; nothing advances into this slot.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStub {
    pub round: u32,
    pub bracket_pos: u32,
    pub home: SlotFill,
    pub away: SlotFill,
}

/// What a resolved pair feeds into the next round.
#[derive(Debug, Clone, Copy)]
enum Carry {
    Team(TeamId),
    Match(u32),
    Empty,
}

// ── Seeding permutation ────────────────────────────────────────────────

/// Canonical bracket placement for a power-of-two size: seed(1) = [1], and
/// each doubling follows every seed s with 2n+1-s. Keeps top seeds apart as
/// long as possible (1 vs 16, 2 vs 15, ...).
pub fn seed_order(size: u32) -> Vec<u32> {
    let mut seeds = vec![1u32];
    while (seeds.len() as u32) < size {
        let n = seeds.len() as u32;
        let mut next = Vec::with_capacity(seeds.len() * 2);
        for seed in seeds.iter().copied() {
            next.push(seed);
            next.push(n * 2 + 1 - seed);
        }
        seeds = next;
    }
    seeds
}

pub fn round_count(entrants: usize) -> u32 {
    if entrants < 2 {
        return 0;
    }
    let size = next_power_of_two(entrants);
    size.trailing_zeros()
}

fn next_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

// ── Bracket construction ───────────────────────────────────────────────

/// Seeded single-elimination bracket for any entrant count. Index 0 of
/// `entrants` is seed 1. Byes never get a match row: the real entrant is
/// carried into the next round as a literal team id. Positions are
/// pair-indexed (1-based) per round, so pointers stay valid across byes.
///
/// Pure and order-sensitive: identical input always yields identical output.
pub fn build_bracket(entrants: &[TeamId]) -> Vec<MatchStub> {
    let n = entrants.len();
    if n < 2 {
        return Vec::new();
    }
    let size = next_power_of_two(n);
    let order = seed_order(size as u32);

    let mut stubs = Vec::new();

    // Round 1: adjacent permutation slots pair off. Exactly one real
    // entrant means a bye; both empty means nothing advances.
    let mut carries: Vec<Carry> = Vec::with_capacity(size / 2);
    for pair in 0..size / 2 {
        let a = entrant_for_seed(entrants, order[pair * 2]);
        let b = entrant_for_seed(entrants, order[pair * 2 + 1]);
        let pos = (pair + 1) as u32;
        match (a, b) {
            (Some(home), Some(away)) => {
                stubs.push(MatchStub {
                    round: 1,
                    bracket_pos: pos,
                    home: SlotFill::Team(home),
                    away: SlotFill::Team(away),
                });
                carries.push(Carry::Match(pos));
            }
            (Some(team), None) | (None, Some(team)) => carries.push(Carry::Team(team)),
            (None, None) => carries.push(Carry::Empty),
        }
    }

    let rounds = round_count(n);
    for round in 2..=rounds {
        let mut next: Vec<Carry> = Vec::with_capacity(carries.len() / 2);
        for pair in 0..carries.len() / 2 {
            let a = carries[pair * 2];
            let b = carries[pair * 2 + 1];
            let pos = (pair + 1) as u32;
            match (a, b) {
                // Two byes met earlier; keep advancing nothing.
                (Carry::Empty, Carry::Empty) => next.push(Carry::Empty),
                // A carried team against nothing advances again without a
                // match, same as the round-1 bye rule.
                (Carry::Team(team), Carry::Empty) | (Carry::Empty, Carry::Team(team)) => {
                    next.push(Carry::Team(team))
                }
                _ => {
                    stubs.push(MatchStub {
                        round,
                        bracket_pos: pos,
                        home: fill_from(a, round),
                        away: fill_from(b, round),
                    });
                    next.push(Carry::Match(pos));
                }
            }
        }
        carries = next;
    }

    stubs
}

fn entrant_for_seed(entrants: &[TeamId], seed: u32) -> Option<TeamId> {
    entrants.get(seed as usize - 1).copied()
}

fn fill_from(carry: Carry, round: u32) -> SlotFill {
    match carry {
        Carry::Team(team) => SlotFill::Team(team),
        // Internally generated pointers always take the winner.
        Carry::Match(pos) => SlotFill::Pointer(StablePointer {
            round: round - 1,
            bracket_pos: pos,
            outcome: OutcomeTag::Winner,
        }),
        Carry::Empty => SlotFill::Empty,
    }
}
