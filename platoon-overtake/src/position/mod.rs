/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Leader-side table of platoon member positions.
//!
//! The leader records the longitudinal position of every member from their
//! beacons (slot 0 is its own position) while it waits for the overtaker's
//! position reports.  A rank is always computed on a [`PositionSnapshot`], a
//! copy of the whole table taken at one instant, never on the live table.
//!
//! | Concern | Handling |
//! |---|---|
//! | Table size | Sized from the platoon formation, bounds-checked on every write |
//! | Out-of-range slot | `Err(PositionError::SlotOutOfRange)`, table untouched |
//! | Member never heard from | `Err(PositionError::Incomplete)` at snapshot time |
//! | Restart after a pause | Caller must [`clear`](PositionTable::clear) explicitly |

pub mod rank;

pub use rank::{BandThresholds, RankBand, RelativeRank};

use thiserror::Error;
use tracing::trace;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures when writing to or reading from a [`PositionTable`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    /// A beacon claimed a slot outside the platoon formation.
    #[error("slot {slot} is outside the position table (size {size})")]
    SlotOutOfRange { slot: usize, size: usize },

    /// A position was not finite (NaN or infinity).
    #[error("position for slot {slot} is not a finite number")]
    NonFinite { slot: usize },

    /// A reported overtaker position was not finite.
    #[error("reported overtaker position is not a finite number")]
    NonFiniteReport,

    /// At least one slot has not been observed since the table was (re)armed.
    #[error("position table incomplete: slot {missing} has no observation")]
    Incomplete { missing: usize },
}

// ── PositionTable ─────────────────────────────────────────────────────────────

/// Ordered record of member positions, slot 0 = leader.
#[derive(Debug, Clone)]
pub struct PositionTable {
    slots: Vec<Option<f64>>,
}

impl PositionTable {
    /// A table for a platoon of `size` vehicles (leader included), with no
    /// observations yet.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    /// Number of slots (leader + followers).
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of followers covered by the table.
    pub fn followers(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }

    /// Record `position` for `slot`, overwriting any previous observation.
    pub fn record(&mut self, slot: usize, position: f64) -> Result<(), PositionError> {
        let size = self.slots.len();
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(PositionError::SlotOutOfRange { slot, size })?;

        if !position.is_finite() {
            return Err(PositionError::NonFinite { slot });
        }

        *entry = Some(position);
        trace!(slot, position, "position recorded");
        Ok(())
    }

    /// Last observation for `slot`, if any.
    pub fn get(&self, slot: usize) -> Option<f64> {
        self.slots.get(slot).copied().flatten()
    }

    /// Forget every observation.  Required when position tracking is re-armed
    /// after a pause.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    /// `true` once every slot has at least one observation.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Copy the whole table at this instant.
    ///
    /// # Errors
    /// [`PositionError::Incomplete`] naming the first slot without an
    /// observation.
    pub fn snapshot(&self) -> Result<PositionSnapshot, PositionError> {
        let positions = self
            .slots
            .iter()
            .enumerate()
            .map(|(slot, p)| p.ok_or(PositionError::Incomplete { missing: slot }))
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(PositionSnapshot { positions })
    }
}

// ── PositionSnapshot ──────────────────────────────────────────────────────────

/// Immutable, fully-populated copy of a [`PositionTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    positions: Vec<f64>,
}

impl PositionSnapshot {
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn followers(&self) -> usize {
        self.positions.len().saturating_sub(1)
    }

    /// Rank of an overtaker at `overtaker_position` against this snapshot.
    ///
    /// See [`rank::scan_rank`] for the exact rule.
    pub fn relative_rank(&self, overtaker_position: f64) -> RelativeRank {
        rank::scan_rank(&self.positions, overtaker_position)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
