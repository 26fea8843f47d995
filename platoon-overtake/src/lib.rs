/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Platoon overtake: coordination protocol letting a free vehicle pass a
//! platoon on a multi-lane road, with hazard abort and restart.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── message       – typed message catalog and beacons
//! ├── vehicle       – roles and platoon membership
//! ├── position/     – leader position table and rank bands
//! ├── timer         – generation-stamped timer tokens
//! ├── context       – collaborator traits (transport, actuation, timers, ...)
//! ├── config/       – YAML maneuver configuration
//! └── coordinator/  – per-vehicle state machine and hazard watchdog
//! ```
//!
//! The crate does no I/O of its own.  A host (see the `overtake-sim` crate)
//! implements [`context::VehicleContext`] for each vehicle and feeds
//! messages, beacons and timer fires into a
//! [`coordinator::ManeuverCoordinator`].

pub mod config;
pub mod context;
pub mod coordinator;
pub mod message;
pub mod position;
pub mod timer;
pub mod vehicle;

pub use config::ManeuverConfig;
pub use coordinator::{ManeuverCoordinator, ManeuverError, OvertakeState};
pub use message::{Beacon, ManeuverMessage, Payload, PlatoonId, VehicleId};
