/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scenario description for the simulator.
//!
//! One platoon (leader in slot 0, followers behind it) drives in lane 0 at
//! the configured platoon speed.  A single free vehicle starts
//! `overtaker_gap` metres behind the last follower and requests the overtake
//! at `maneuver_start_ms`.  An optional hazard window raises and then clears
//! the leader's hazard flag.
//!
//! ```yaml
//! platoon_id: 0
//! followers: 6
//! vehicle_length: 4.0
//! leader_start: 500.0
//! overtaker_id: 8
//! overtaker_gap: 20.0
//! maneuver_start_ms: 2000
//! hazard:
//!   start_ms: 10300
//!   end_ms: 14000
//! admission: true
//! network:
//!   loss_probability: 0.0
//!   max_retries: 3
//!   latency_ms: 10
//! seed: 42
//! duration_ms: 60000
//! step_ms: 100
//! maneuver:
//!   gap_target: 20.0
//! ```

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use platoon_overtake::config::ManeuverConfig;
use platoon_overtake::message::{PlatoonId, VehicleId};

// ── Sub-sections ──────────────────────────────────────────────────────────────

/// Interval during which the leader's hazard flag is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HazardWindow {
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Behaviour of the simulated unicast channel.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Probability that a single transmission attempt is lost.
    pub loss_probability: f64,

    /// Retransmissions after the first attempt before the sender is told
    /// the message is undeliverable.
    pub max_retries: u32,

    /// One-way latency of every attempt.
    pub latency_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            loss_probability: 0.0,
            max_retries: 3,
            latency_ms: 10,
        }
    }
}

// ── ScenarioConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub platoon_id: PlatoonId,

    /// Platoon members behind the leader.
    pub followers: usize,

    pub vehicle_length: f64,

    /// Initial front-bumper position of the leader, metres.
    pub leader_start: f64,

    pub overtaker_id: VehicleId,

    /// Bumper-to-bumper distance between the last follower and the overtaker
    /// at start.  Also the overtaker's following distance while it is in
    /// the platoon lane.
    pub overtaker_gap: f64,

    pub maneuver_start_ms: u64,

    pub hazard: Option<HazardWindow>,

    /// Answer of the leader's admission policy.
    pub admission: bool,

    pub network: NetworkConfig,

    /// Seed of the network loss generator.
    pub seed: u64,

    pub duration_ms: u64,

    /// Kinematics and beacon period.
    pub step_ms: u64,

    pub maneuver: ManeuverConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            platoon_id: 0,
            followers: 6,
            vehicle_length: 4.0,
            leader_start: 500.0,
            overtaker_id: 8,
            overtaker_gap: 20.0,
            maneuver_start_ms: 2_000,
            hazard: None,
            admission: true,
            network: NetworkConfig::default(),
            seed: 42,
            duration_ms: 60_000,
            step_ms: 100,
            maneuver: ManeuverConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Parse and validate a scenario file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading scenario from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open scenario file: {}", path.display()))?;

        let scenario = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid scenario: {}", path.display()))?;

        debug!(?scenario, "scenario loaded");
        Ok(scenario)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let scenario: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.followers >= 1, "a platoon needs at least one follower");
        ensure!(
            self.vehicle_length.is_finite() && self.vehicle_length > 0.0,
            "vehicle_length must be positive (got {})",
            self.vehicle_length
        );
        ensure!(
            self.overtaker_gap.is_finite() && self.overtaker_gap > 0.0,
            "overtaker_gap must be positive (got {})",
            self.overtaker_gap
        );
        ensure!(
            self.overtaker_id as usize > self.followers,
            "overtaker_id {} collides with a platoon member id (0..={})",
            self.overtaker_id,
            self.followers
        );
        ensure!(self.step_ms > 0, "step_ms must be > 0");
        ensure!(
            (0.0..=1.0).contains(&self.network.loss_probability),
            "network.loss_probability must be within [0, 1] (got {})",
            self.network.loss_probability
        );
        if let Some(h) = self.hazard {
            ensure!(
                h.end_ms > h.start_ms,
                "hazard.end_ms ({}) must be after hazard.start_ms ({})",
                h.end_ms,
                h.start_ms
            );
        }
        self.maneuver
            .validate()
            .context("Invalid maneuver section")?;
        Ok(())
    }

    /// Leader id followed by the follower ids, front to back.
    pub fn formation(&self) -> Vec<VehicleId> {
        (0..=self.followers as VehicleId).collect()
    }

    pub fn leader_id(&self) -> VehicleId {
        0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
