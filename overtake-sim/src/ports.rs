/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! [`VehicleContext`](platoon_overtake::context::VehicleContext) for a
//! simulated vehicle.
//!
//! A coordinator's calls are recorded as [`Command`]s and applied by the
//! engine after the handler returns.  Sensor values (position, gap) are a
//! snapshot the engine refreshes from the world before every event.

use std::time::Duration;

use platoon_overtake::context::{
    Actuation, AdmissionPolicy, GapReading, LaneDirection, Positioning, TimerService, Transport,
};
use platoon_overtake::message::{ManeuverMessage, VehicleId};
use platoon_overtake::timer::TimerToken;

use crate::world::World;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(ManeuverMessage),
    ChangeLane(i32),
    CruiseSpeed(f64),
    Spacing(f64),
    Schedule(TimerToken, Duration),
    Cancel(TimerToken),
}

#[derive(Debug)]
pub struct SimVehicle {
    id: VehicleId,
    external_id: String,
    admission: bool,
    position: f64,
    gap: GapReading,
    commands: Vec<Command>,
}

impl SimVehicle {
    pub fn new(id: VehicleId, external_id: impl Into<String>, admission: bool) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            admission,
            position: 0.0,
            gap: GapReading {
                distance: f64::INFINITY,
                relative_speed: 0.0,
            },
            commands: Vec::new(),
        }
    }

    pub fn refresh(&mut self, world: &World) {
        if let Some(body) = world.body(self.id) {
            self.position = body.position;
        }
        self.gap = world.gap_reading(self.id);
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

impl Transport for SimVehicle {
    fn send_unicast(&mut self, message: ManeuverMessage, _destination: VehicleId) {
        self.commands.push(Command::Send(message));
    }
}

impl Actuation for SimVehicle {
    fn change_lane_relative(&mut self, offset: u8, direction: LaneDirection) {
        self.commands
            .push(Command::ChangeLane(direction.signed(offset)));
    }

    fn set_desired_speed(&mut self, speed: f64) {
        self.commands.push(Command::CruiseSpeed(speed));
    }

    fn set_gap_spacing(&mut self, distance: f64) {
        self.commands.push(Command::Spacing(distance));
    }

    fn sense_gap(&self) -> GapReading {
        self.gap
    }
}

impl AdmissionPolicy for SimVehicle {
    fn is_overtake_allowed(&self) -> bool {
        self.admission
    }
}

impl Positioning for SimVehicle {
    fn self_id(&self) -> VehicleId {
        self.id
    }

    fn external_id(&self) -> String {
        self.external_id.clone()
    }

    fn current_position(&self) -> f64 {
        self.position
    }
}

impl TimerService for SimVehicle {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        self.commands.push(Command::Schedule(token, delay));
    }

    fn cancel(&mut self, token: TimerToken) {
        self.commands.push(Command::Cancel(token));
    }
}
