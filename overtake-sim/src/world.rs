/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! One-dimensional multi-lane road.
//!
//! Every vehicle runs the same adaptive cruise controller: drive at the
//! commanded cruise speed unless a vehicle ahead in the same lane is closer
//! than the commanded spacing, in which case track that vehicle.
//! Acceleration and deceleration are bounded; lane changes are instantaneous
//! and collisions are not modelled.
//!
//! Lane 0 is the platoon lane; indices grow to the left.

use std::collections::BTreeMap;

use serde::Serialize;

use platoon_overtake::context::GapReading;
use platoon_overtake::message::VehicleId;

const MAX_ACCEL: f64 = 2.5;
const MAX_DECEL: f64 = 6.0;
/// Speed correction (m/s) per metre of spacing error.
const GAP_GAIN: f64 = 0.5;
/// Controllers settle this far above the commanded spacing.
const SPACING_MARGIN: f64 = 0.5;

/// Gap a controller converges to when commanded `spacing`.
pub fn settled_gap(spacing: f64) -> f64 {
    spacing + SPACING_MARGIN
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Body {
    pub id: VehicleId,
    pub lane: i32,
    /// Front bumper, metres.
    pub position: f64,
    pub speed: f64,
    pub cruise_speed: f64,
    /// Bumper-to-bumper distance kept to the vehicle ahead.
    pub spacing: f64,
}

#[derive(Debug, Clone)]
pub struct World {
    bodies: BTreeMap<VehicleId, Body>,
    vehicle_length: f64,
}

impl World {
    pub fn new(vehicle_length: f64) -> Self {
        Self {
            bodies: BTreeMap::new(),
            vehicle_length,
        }
    }

    pub fn spawn(&mut self, body: Body) {
        self.bodies.insert(body.id, body);
    }

    pub fn body(&self, id: VehicleId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    /// Nearest vehicle ahead of `id` in the same lane.
    pub fn ahead_of(&self, id: VehicleId) -> Option<&Body> {
        let me = self.bodies.get(&id)?;
        self.bodies
            .values()
            .filter(|b| b.id != id && b.lane == me.lane && b.position > me.position)
            .min_by(|a, b| a.position.total_cmp(&b.position))
    }

    /// Radar view from `id`.  An empty lane ahead reads as an infinite gap.
    pub fn gap_reading(&self, id: VehicleId) -> GapReading {
        match (self.bodies.get(&id), self.ahead_of(id)) {
            (Some(me), Some(ahead)) => GapReading {
                distance: ahead.position - self.vehicle_length - me.position,
                relative_speed: ahead.speed - me.speed,
            },
            _ => GapReading {
                distance: f64::INFINITY,
                relative_speed: 0.0,
            },
        }
    }

    pub fn change_lane(&mut self, id: VehicleId, delta: i32) {
        if let Some(b) = self.bodies.get_mut(&id) {
            b.lane += delta;
        }
    }

    pub fn set_cruise_speed(&mut self, id: VehicleId, speed: f64) {
        if let Some(b) = self.bodies.get_mut(&id) {
            b.cruise_speed = speed;
        }
    }

    pub fn set_spacing(&mut self, id: VehicleId, spacing: f64) {
        if let Some(b) = self.bodies.get_mut(&id) {
            b.spacing = spacing;
        }
    }

    /// Advance every vehicle by `dt` seconds.  Targets are computed from the
    /// state at the start of the step.
    pub fn advance(&mut self, dt: f64) {
        let targets: Vec<(VehicleId, f64)> = self
            .bodies
            .values()
            .map(|b| (b.id, self.target_speed(b)))
            .collect();

        for (id, target) in targets {
            if let Some(b) = self.bodies.get_mut(&id) {
                let dv = (target - b.speed).clamp(-MAX_DECEL * dt, MAX_ACCEL * dt);
                b.speed = (b.speed + dv).max(0.0);
                b.position += b.speed * dt;
            }
        }
    }

    fn target_speed(&self, body: &Body) -> f64 {
        let mut target = body.cruise_speed;
        if let Some(ahead) = self.ahead_of(body.id) {
            let gap = ahead.position - self.vehicle_length - body.position;
            target = target.min(ahead.speed + GAP_GAIN * (gap - settled_gap(body.spacing)));
        }
        target.max(0.0)
    }
}
