/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Vehicle roles and platoon membership.

use serde::Serialize;

use crate::message::{PlatoonId, VehicleId};

// ── VehicleRole ───────────────────────────────────────────────────────────────

/// Exactly one role per vehicle at a time, set and cleared only by its
/// coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum VehicleRole {
    /// Not part of any platoon and not maneuvering.
    #[default]
    None,
    Leader,
    Follower,
    /// Passing a platoon.
    Overtaker,
    /// Platoon member promoted to open a gap for the overtaker.
    TemporaryLeader,
}

impl std::fmt::Display for VehicleRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VehicleRole::None => "none",
            VehicleRole::Leader => "leader",
            VehicleRole::Follower => "follower",
            VehicleRole::Overtaker => "overtaker",
            VehicleRole::TemporaryLeader => "temporary-leader",
        };
        f.write_str(name)
    }
}

// ── PlatoonMembership ─────────────────────────────────────────────────────────

/// The platoon a vehicle belongs to and its formation, front to back.
///
/// `formation[0]` is the leader; `formation[i]` sits in slot `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatoonMembership {
    platoon_id: PlatoonId,
    formation: Vec<VehicleId>,
}

impl PlatoonMembership {
    /// Returns `None` for an empty formation: a platoon always has a leader.
    pub fn new(platoon_id: PlatoonId, formation: Vec<VehicleId>) -> Option<Self> {
        if formation.is_empty() {
            return None;
        }
        Some(Self {
            platoon_id,
            formation,
        })
    }

    pub fn platoon_id(&self) -> PlatoonId {
        self.platoon_id
    }

    pub fn leader_id(&self) -> VehicleId {
        self.formation[0]
    }

    pub fn formation(&self) -> &[VehicleId] {
        &self.formation
    }

    /// Leader plus followers.
    pub fn size(&self) -> usize {
        self.formation.len()
    }

    pub fn followers(&self) -> usize {
        self.formation.len() - 1
    }

    pub fn slot_of(&self, id: VehicleId) -> Option<usize> {
        self.formation.iter().position(|&v| v == id)
    }

    pub fn member_at(&self, slot: usize) -> Option<VehicleId> {
        self.formation.get(slot).copied()
    }

    /// Role `id` holds in this platoon when no maneuver is running.
    pub fn base_role(&self, id: VehicleId) -> VehicleRole {
        match self.slot_of(id) {
            Some(0) => VehicleRole::Leader,
            Some(_) => VehicleRole::Follower,
            None => VehicleRole::None,
        }
    }
}
