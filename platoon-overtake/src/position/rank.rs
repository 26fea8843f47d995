/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Relative rank of the overtaker and the abort band it falls into.
//!
//! Ranks are slot indices into a platoon of `N` followers plus the leader:
//!
//! ```text
//!  rank:   0        1        2        3   ...   N        N+1
//!        ──┼── L ───┼── F1 ──┼── F2 ──┼── ... ──┼── FN ───┼──
//!       ahead                                           behind
//! ```
//!
//! Rank `i` (1 ≤ i ≤ N) means the overtaker sits between slot `i-1` and
//! slot `i`; `0` is ahead of the leader; `N+1` is behind the last follower.

use serde::Serialize;

// ── RelativeRank ──────────────────────────────────────────────────────────────

/// The overtaker's slot index relative to the platoon members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RelativeRank(usize);

impl RelativeRank {
    pub fn new(rank: usize) -> Self {
        Self(rank)
    }

    pub fn value(self) -> usize {
        self.0
    }

    /// Ahead of every member, including the leader.
    pub fn is_front(self) -> bool {
        self.0 == 0
    }

    /// Behind every member of a platoon with `followers` followers.
    pub fn is_behind_all(self, followers: usize) -> bool {
        self.0 > followers
    }
}

impl std::fmt::Display for RelativeRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rank {}", self.0)
    }
}

/// Scan `positions` (slot 0 = leader, front to back) and return the smallest
/// slot `i` such that `positions[i] < overtaker <= positions[i-1]`.
///
/// Returns `0` when the overtaker is ahead of the leader and `len` (i.e.
/// `N+1`) when it is at or behind the last member.  `positions` must be
/// non-empty.
pub fn scan_rank(positions: &[f64], overtaker: f64) -> RelativeRank {
    match positions.first() {
        Some(&leader) if overtaker > leader => return RelativeRank(0),
        None => return RelativeRank(0),
        _ => {}
    }

    for i in 1..positions.len() {
        if positions[i] < overtaker && overtaker <= positions[i - 1] {
            return RelativeRank(i);
        }
    }

    RelativeRank(positions.len())
}

// ── RankBand ──────────────────────────────────────────────────────────────────

/// How the leader handles a hazard for a given rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RankBand {
    /// The overtaker is alongside the head of the platoon; the whole platoon
    /// decelerates and lets it pass.  No pause message is sent.
    NearFront,

    /// The overtaker merges into a gap opened by the member at `gap_opener_slot`.
    Mid { gap_opener_slot: usize },

    /// The overtaker retreats to the rear of the platoon.
    Tail,
}

/// Thresholds that split ranks into [`RankBand`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandThresholds {
    /// Ranks `<=` this value are [`RankBand::NearFront`].
    pub near_front_max_rank: usize,

    /// The gap-opener is the member at `rank - gap_opener_offset`.
    pub gap_opener_offset: usize,

    /// Width of the tail band counted back from `N+1`: ranks
    /// `> N + 1 - tail_band` are [`RankBand::Tail`].
    pub tail_band: usize,
}

impl RankBand {
    /// Classify `rank` for a platoon with `followers` followers.
    ///
    /// Order of checks:
    /// 1. near-front threshold;
    /// 2. tail band;
    /// 3. the gap-opener slot must name a follower (`1..=followers`).  A
    ///    slot that falls on the leader is handled as near-front, one past
    ///    the last follower as tail.
    pub fn classify(rank: RelativeRank, followers: usize, t: &BandThresholds) -> Self {
        let r = rank.value();

        if r <= t.near_front_max_rank {
            return RankBand::NearFront;
        }
        if t.tail_band > 0 && r + t.tail_band > followers + 1 {
            return RankBand::Tail;
        }

        match r.checked_sub(t.gap_opener_offset) {
            None | Some(0) => RankBand::NearFront,
            Some(slot) if slot > followers => RankBand::Tail,
            Some(slot) => RankBand::Mid {
                gap_opener_slot: slot,
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
