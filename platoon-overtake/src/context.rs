/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Collaborators the maneuver coordinator consumes.
//!
//! The coordinator never talks to a radio, a vehicle controller or a clock
//! directly.  It owns one value implementing [`VehicleContext`] and calls
//! through these traits synchronously from inside its handlers:
//!
//! ```text
//!                 ┌────────────────────────┐
//!  events ──────► │   ManeuverCoordinator  │ ──► Transport     (unicast out)
//!                 │                        │ ──► Actuation     (lane / speed / gap)
//!                 │                        │ ──► TimerService  (arm / cancel)
//!                 └────────────────────────┘ ◄── AdmissionPolicy, Positioning
//! ```
//!
//! Failed deliveries come back asynchronously as a separate event
//! ([`on_failed_delivery`](crate::coordinator::ManeuverCoordinator::on_failed_delivery)),
//! never as a return value of [`Transport::send_unicast`].

use std::time::Duration;

use serde::Serialize;

use crate::message::{ManeuverMessage, VehicleId};
use crate::timer::TimerToken;

// ── Transport ─────────────────────────────────────────────────────────────────

/// Unreliable point-to-point delivery with its own retry budget.
pub trait Transport {
    fn send_unicast(&mut self, message: ManeuverMessage, destination: VehicleId);
}

// ── Actuation ─────────────────────────────────────────────────────────────────

/// Lateral direction of a lane change.  Lane indices grow to the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LaneDirection {
    Left,
    Right,
}

impl LaneDirection {
    /// Signed lane-index delta for `lanes` lanes in this direction.
    pub fn signed(self, lanes: u8) -> i32 {
        match self {
            LaneDirection::Left => i32::from(lanes),
            LaneDirection::Right => -i32::from(lanes),
        }
    }
}

/// One radar sample of the vehicle ahead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GapReading {
    /// Bumper-to-bumper distance in metres.
    pub distance: f64,

    /// Front vehicle speed minus own speed, m/s.
    pub relative_speed: f64,
}

/// Longitudinal / lateral control of the own vehicle.
pub trait Actuation {
    fn change_lane_relative(&mut self, offset: u8, direction: LaneDirection);

    fn set_desired_speed(&mut self, speed: f64);

    fn set_gap_spacing(&mut self, distance: f64);

    fn sense_gap(&self) -> GapReading;
}

// ── Admission ─────────────────────────────────────────────────────────────────

/// Leader-side decision whether an overtake may start now.
pub trait AdmissionPolicy {
    fn is_overtake_allowed(&self) -> bool;
}

// ── Identity / position ───────────────────────────────────────────────────────

pub trait Positioning {
    fn self_id(&self) -> VehicleId;

    /// Name of this vehicle in the surrounding traffic simulation / fleet.
    fn external_id(&self) -> String;

    /// Absolute longitudinal position (front bumper), metres.
    fn current_position(&self) -> f64;
}

// ── Timers ────────────────────────────────────────────────────────────────────

/// One-shot timers.  The coordinator re-schedules periodic timers itself
/// after each fire.
pub trait TimerService {
    /// Fire `token` after `delay`.  Scheduling an already pending token
    /// replaces the pending fire.
    fn schedule(&mut self, token: TimerToken, delay: Duration);

    /// Drop a pending fire of `token`, if any.
    fn cancel(&mut self, token: TimerToken);
}

// ── VehicleContext ────────────────────────────────────────────────────────────

/// Everything a coordinator needs from its vehicle.
pub trait VehicleContext:
    Transport + Actuation + AdmissionPolicy + Positioning + TimerService
{
}

impl<T> VehicleContext for T where
    T: Transport + Actuation + AdmissionPolicy + Positioning + TimerService
{
}
