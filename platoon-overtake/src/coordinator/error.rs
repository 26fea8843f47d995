/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the maneuver coordinator.
//!
//! Two layers:
//!
//! * [`MismatchReason`]: why one message, timer fire or call did not match
//!   the coordinator's state/identity guards.  Carries the exact values that
//!   failed the guard.
//! * [`ManeuverError`]: the error kinds a coordinator surfaces.
//!
//! | Kind | Origin | Effect |
//! |---|---|---|
//! | `AlreadyInManeuver` | local start while busy | rejected, nothing sent, no state change |
//! | `ProtocolMismatch` | message/timer/call not matching guards | ignored, logged at `debug` |
//! | `DeliveryFailure` | transport retry budget exhausted | local rollback to Idle |
//!
//! An admission denial is a negotiated outcome, not an error, and has no
//! variant here.  No error crosses a vehicle boundary except as a catalog
//! message.

use thiserror::Error;

use super::OvertakeState;
use crate::message::{PlatoonId, VehicleId};
use crate::position::PositionError;
use crate::timer::TimerToken;
use crate::vehicle::VehicleRole;

// ── Guard mismatches ──────────────────────────────────────────────────────────

/// Why an event was ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum MismatchReason {
    /// The message is addressed to another vehicle.
    NotAddressed { destination: VehicleId },

    /// The handler does not run in the current state.
    WrongState { state: OvertakeState },

    /// The handler does not run for the current role.
    WrongRole { role: VehicleRole },

    /// The message names a different platoon than the one the handler
    /// expects (or the vehicle is in no platoon: `expected == None`).
    WrongPlatoon {
        expected: Option<PlatoonId>,
        actual: PlatoonId,
    },

    /// The message comes from a vehicle other than the maneuver counterpart.
    UnexpectedSender {
        expected: VehicleId,
        actual: VehicleId,
    },

    /// A beacon from a vehicle outside any platoon formation.
    NotMember { vehicle: VehicleId },

    /// A timer fired that is no longer armed.
    StaleTimer { token: TimerToken },

    /// A beacon or report could not be applied to the position table.
    Position(PositionError),

    /// The vehicle is already a party to another maneuver.
    Busy,
}

impl std::fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchReason::NotAddressed { destination } => {
                write!(f, "addressed to vehicle {}", destination)
            }
            MismatchReason::WrongState { state } => {
                write!(f, "not expected in state {:?}", state)
            }
            MismatchReason::WrongRole { role } => {
                write!(f, "not expected for role {}", role)
            }
            MismatchReason::WrongPlatoon {
                expected: Some(expected),
                actual,
            } => write!(f, "platoon {} does not match own platoon {}", actual, expected),
            MismatchReason::WrongPlatoon {
                expected: None,
                actual,
            } => write!(f, "refers to platoon {} but vehicle is in no platoon", actual),
            MismatchReason::UnexpectedSender { expected, actual } => write!(
                f,
                "sent by vehicle {} but maneuver counterpart is {}",
                actual, expected
            ),
            MismatchReason::NotMember { vehicle } => {
                write!(f, "vehicle {} is not a platoon member", vehicle)
            }
            MismatchReason::StaleTimer { token } => {
                write!(f, "timer {} is no longer armed", token)
            }
            MismatchReason::Position(e) => write!(f, "{}", e),
            MismatchReason::Busy => write!(f, "vehicle already involved in a maneuver"),
        }
    }
}

impl From<PositionError> for MismatchReason {
    fn from(e: PositionError) -> Self {
        MismatchReason::Position(e)
    }
}

// ── Top-level errors ──────────────────────────────────────────────────────────

/// Errors surfaced by the coordinator's public operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManeuverError {
    /// `request_overtake` while a maneuver is already running on this vehicle.
    #[error("cannot begin the maneuver: already involved in another one (state {state:?})")]
    AlreadyInManeuver { state: OvertakeState },

    /// An event did not match the coordinator's guards and was ignored.
    #[error("{event} ignored: {reason}")]
    ProtocolMismatch {
        event: &'static str,
        reason: MismatchReason,
    },

    /// The transport gave up on an outbound message.
    #[error("{kind} to vehicle {destination} undeliverable: retry budget exhausted")]
    DeliveryFailure {
        kind: &'static str,
        destination: VehicleId,
    },
}

impl ManeuverError {
    pub fn mismatch(event: &'static str, reason: MismatchReason) -> Self {
        ManeuverError::ProtocolMismatch { event, reason }
    }
}
