/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Message catalog exchanged between vehicles during an overtake maneuver.
//!
//! Two kinds of traffic reach a coordinator:
//!
//! ```text
//! every vehicle ──(Beacon, periodic broadcast)──►  every vehicle
//! vehicle A     ──(ManeuverMessage, unicast)────►  vehicle B
//!                   ↑ Envelope + Payload
//! ```
//!
//! A [`ManeuverMessage`] is one tagged union: the common [`Envelope`] plus a
//! [`Payload`] variant.  The coordinator dispatches on the payload with a
//! single exhaustive `match`, so adding a message kind without handling it is
//! a compile error.
//!
//! All types are plain data with no behavior beyond constructors and accessors.

use serde::{Deserialize, Serialize};

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Numeric vehicle identifier, unique within one simulation / deployment.
pub type VehicleId = u32;

/// Numeric platoon identifier.
pub type PlatoonId = u32;

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Fields shared by every unicast maneuver message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Numeric id of the sending vehicle.
    pub sender_id: VehicleId,

    /// External (traffic-simulator / fleet) name of the sender, e.g. `"platoon.3"`.
    pub sender_external_id: String,

    /// Platoon the message refers to.  For a Request this is the platoon the
    /// sender wants to overtake; for everything else it is the platoon of the
    /// maneuver in progress.
    pub platoon_id: PlatoonId,

    /// Vehicle the message is addressed to.
    pub destination_id: VehicleId,
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// Message-specific content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Overtaker → leader: ask for permission to overtake.
    Request,

    /// Leader → overtaker: admission outcome.
    Response { permitted: bool },

    /// Overtaker → leader: current absolute longitudinal position.
    PositionReport { position: f64 },

    /// Overtaker → leader: clear of the platoon, back in the platoon lane.
    FinishAck,

    /// Leader → overtaker or gap-opener: pause the maneuver.
    ///
    /// `overtaker_id` equal to the receiver means "you are the overtaker";
    /// any other value designates the receiver as temporary gap-opener for
    /// that overtaker.
    PauseOrder {
        overtaker_id: VehicleId,
        is_tail_case: bool,
    },

    /// Temporary leader → overtaker: the requested gap is open.
    OpenGapAck,

    /// Overtaker → leader: merged into the opened gap.
    JoinAck,

    /// Leader → overtaker and temporary leader: hazard cleared, resume.
    RestartNotice,
}

impl Payload {
    /// Short, stable name used in log fields and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Request => "Request",
            Payload::Response { .. } => "Response",
            Payload::PositionReport { .. } => "PositionReport",
            Payload::FinishAck => "FinishAck",
            Payload::PauseOrder { .. } => "PauseOrder",
            Payload::OpenGapAck => "OpenGapAck",
            Payload::JoinAck => "JoinAck",
            Payload::RestartNotice => "RestartNotice",
        }
    }
}

// ── ManeuverMessage ───────────────────────────────────────────────────────────

/// A complete unicast message: envelope plus payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManeuverMessage {
    pub envelope: Envelope,
    pub payload: Payload,
}

impl ManeuverMessage {
    pub fn new(envelope: Envelope, payload: Payload) -> Self {
        Self { envelope, payload }
    }

    pub fn sender(&self) -> VehicleId {
        self.envelope.sender_id
    }

    pub fn destination(&self) -> VehicleId {
        self.envelope.destination_id
    }

    pub fn platoon_id(&self) -> PlatoonId {
        self.envelope.platoon_id
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

// ── Beacon ────────────────────────────────────────────────────────────────────

/// Periodic kinematic broadcast.
///
/// Beacons are not part of the maneuver catalog: every vehicle sends one per
/// beacon period regardless of maneuver state, and every coordinator sees all
/// of them.  Vehicles outside any platoon carry `platoon_id == None` and
/// `slot == None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    pub sender_id: VehicleId,
    pub platoon_id: Option<PlatoonId>,

    /// Sender's index in its platoon formation (0 = leader).
    pub slot: Option<usize>,

    /// Absolute longitudinal position (front bumper), in metres.
    pub position: f64,

    /// Speed in m/s.
    pub speed: f64,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
