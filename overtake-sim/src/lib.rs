/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Overtake-sim – scenario simulator for the platoon overtake maneuver
//!
//! ```text
//! lib.rs
//! ├── scenario  – YAML scenario description
//! ├── world     – 1-D multi-lane kinematics
//! ├── network   – lossy unicast with a retry budget
//! ├── ports     – VehicleContext backed by the world
//! └── engine    – discrete-event loop and run report
//! ```

pub mod engine;
pub mod network;
pub mod ports;
pub mod scenario;
pub mod world;

pub use engine::{Simulation, SimulationReport};
pub use scenario::ScenarioConfig;
