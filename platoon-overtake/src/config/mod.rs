//! Maneuver configuration loading.
//!
//! Every numeric threshold of the protocol (clearance distance, gap target,
//! timer periods, rank bands, commanded speeds) is a configuration value.
//! Nothing here is a fixed protocol constant.
//!
//! The expected YAML structure is:
//! ```yaml
//! clearance_distance: 10.0
//! gap_target: 20.0
//! nominal_spacing: 5.0
//! watchdog_period_ms: 500
//! gap_poll_period_ms: 100
//! report_timeout_ms: 5000
//! near_front_max_rank: 1
//! gap_opener_offset: 0
//! tail_band: 1
//! speeds:
//!   platoon: 27.78
//!   overtake: 36.11
//!   hold: 27.78
//!   retreat: 22.22
//!   platoon_yield: 22.22
//! ```
//!
//! Every field is optional; missing values fall back to [`ManeuverConfig::default`].

use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::position::BandThresholds;

// ── Speeds ────────────────────────────────────────────────────────────────────

/// Desired speeds commanded during the maneuver, in m/s.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeedConfig {
    /// Nominal platoon cruise speed (leader's desired speed).
    pub platoon: f64,

    /// Overtaker speed while passing.
    pub overtake: f64,

    /// Overtaker speed while paused alongside the platoon, waiting for a gap.
    pub hold: f64,

    /// Overtaker speed while retreating to the rear of the platoon.
    pub retreat: f64,

    /// Leader speed while letting a near-front overtaker through.
    pub platoon_yield: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            platoon: 100.0 / 3.6,
            overtake: 130.0 / 3.6,
            hold: 100.0 / 3.6,
            retreat: 80.0 / 3.6,
            platoon_yield: 80.0 / 3.6,
        }
    }
}

// ── ManeuverConfig ────────────────────────────────────────────────────────────

/// Tunable parameters of the overtake protocol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManeuverConfig {
    /// The overtaker is clear of the platoon once it is more than this many
    /// metres ahead of the leader.
    pub clearance_distance: f64,

    /// Spacing (m) a temporary leader opens before acknowledging the gap.
    pub gap_target: f64,

    /// Spacing (m) a temporary leader returns to when the maneuver resumes.
    pub nominal_spacing: f64,

    /// Hazard watchdog period.
    pub watchdog_period_ms: u64,

    /// Temporary leader gap sampling period.
    pub gap_poll_period_ms: u64,

    /// A leader tracking positions gives the maneuver up after this long
    /// without a PositionReport from its overtaker.  Counted in watchdog
    /// ticks.
    pub report_timeout_ms: u64,

    /// Ranks up to and including this value only slow the platoon down.
    pub near_front_max_rank: usize,

    /// The gap-opener is the member at `rank - gap_opener_offset`.
    pub gap_opener_offset: usize,

    /// Ranks within this distance of `N+1` send the overtaker to the tail.
    pub tail_band: usize,

    pub speeds: SpeedConfig,
}

impl Default for ManeuverConfig {
    fn default() -> Self {
        Self {
            clearance_distance: 10.0,
            gap_target: 20.0,
            nominal_spacing: 5.0,
            watchdog_period_ms: 500,
            gap_poll_period_ms: 100,
            report_timeout_ms: 5_000,
            near_front_max_rank: 1,
            gap_opener_offset: 0,
            tail_band: 1,
            speeds: SpeedConfig::default(),
        }
    }
}

impl ManeuverConfig {
    /// Parse and validate a YAML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid YAML for
    /// this structure, or fails [`validate`](Self::validate).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading maneuver configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid maneuver configuration: {}", path.display()))?;

        debug!(?config, "maneuver configuration loaded");
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty document means "all defaults".
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the protocol cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.clearance_distance.is_finite() && self.clearance_distance >= 0.0,
            "clearance_distance must be a non-negative number (got {})",
            self.clearance_distance
        );
        ensure!(
            self.nominal_spacing.is_finite() && self.nominal_spacing > 0.0,
            "nominal_spacing must be positive (got {})",
            self.nominal_spacing
        );
        ensure!(
            self.gap_target.is_finite() && self.gap_target > self.nominal_spacing,
            "gap_target ({}) must exceed nominal_spacing ({})",
            self.gap_target,
            self.nominal_spacing
        );
        ensure!(self.watchdog_period_ms > 0, "watchdog_period_ms must be > 0");
        ensure!(self.gap_poll_period_ms > 0, "gap_poll_period_ms must be > 0");
        ensure!(
            self.report_timeout_ms >= self.watchdog_period_ms,
            "report_timeout_ms ({}) must be at least one watchdog period ({})",
            self.report_timeout_ms,
            self.watchdog_period_ms
        );

        let s = &self.speeds;
        for (name, v) in [
            ("platoon", s.platoon),
            ("overtake", s.overtake),
            ("hold", s.hold),
            ("retreat", s.retreat),
            ("platoon_yield", s.platoon_yield),
        ] {
            ensure!(
                v.is_finite() && v > 0.0,
                "speeds.{name} must be positive (got {v})"
            );
        }
        Ok(())
    }

    pub fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms)
    }

    pub fn gap_poll_period(&self) -> Duration {
        Duration::from_millis(self.gap_poll_period_ms)
    }

    /// The rank-band thresholds used by the leader on abort.
    pub fn band_thresholds(&self) -> BandThresholds {
        BandThresholds {
            near_front_max_rank: self.near_front_max_rank,
            gap_opener_offset: self.gap_opener_offset,
            tail_band: self.tail_band,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
