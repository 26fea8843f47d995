/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Discrete-event runner driving one coordinator per simulated vehicle.
//!
//! ```text
//!            ┌──────────── event queue (time, seq) ────────────┐
//!            │ Step │ Start │ Hazard │ Deliver │ Failed │ Timer │
//!            └──┬────────────────────────────────────────────────┘
//!               ▼
//!   refresh SimVehicle from World ─► coordinator handler ─► Commands
//!                                                              │
//!        World (lane / speed / spacing) ◄──────────────────────┤
//!        LossyNetwork ─► Deliver / Failed events ◄──────────────┤
//!        Timer events ◄─────────────────────────────────────────┘
//! ```
//!
//! Events with the same timestamp run in scheduling order.  Every step
//! advances the kinematics and broadcasts one beacon per vehicle.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use platoon_overtake::context::Positioning;
use platoon_overtake::coordinator::{ManeuverCoordinator, OvertakeState};
use platoon_overtake::message::{Beacon, ManeuverMessage, VehicleId};
use platoon_overtake::timer::TimerToken;
use platoon_overtake::vehicle::{PlatoonMembership, VehicleRole};

use crate::network::{LossyNetwork, NetworkStats, Transmission};
use crate::ports::{Command, SimVehicle};
use crate::scenario::ScenarioConfig;
use crate::world::{settled_gap, Body, World};

type Coordinator = ManeuverCoordinator<SimVehicle>;

#[derive(Debug, Clone)]
enum Event {
    Step,
    StartManeuver,
    Hazard(bool),
    Deliver(ManeuverMessage),
    DeliveryFailed(ManeuverMessage),
    Timer { vehicle: VehicleId, token: TimerToken },
}

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimStats {
    pub events: u64,
    /// Delivered unicast messages by kind.
    pub delivered: BTreeMap<&'static str, u64>,
    /// Delivered messages the receiver ignored.
    pub ignored: u64,
    /// Maneuvers rolled back after a delivery failure.
    pub rollbacks: u64,
    pub invariant_checks: u64,
    pub invariant_violations: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleReport {
    pub id: VehicleId,
    pub external_id: String,
    pub role: VehicleRole,
    pub state: OvertakeState,
    pub lane: i32,
    pub position: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub elapsed_ms: u64,
    pub vehicles: Vec<VehicleReport>,
    pub network: NetworkStats,
    pub stats: SimStats,
}

impl SimulationReport {
    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleReport> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn all_idle(&self) -> bool {
        self.vehicles.iter().all(|v| v.state == OvertakeState::Idle)
    }

    pub fn delivered(&self, kind: &str) -> u64 {
        self.stats.delivered.get(kind).copied().unwrap_or(0)
    }
}

// ── Simulation ────────────────────────────────────────────────────────────────

pub struct Simulation {
    scenario: ScenarioConfig,
    world: World,
    coordinators: BTreeMap<VehicleId, Coordinator>,
    network: LossyNetwork,
    queue: BTreeMap<(u64, u64), Event>,
    next_seq: u64,
    now_ms: u64,
    /// Sequence number of the pending fire of each scheduled token.
    pending_timers: HashMap<(VehicleId, TimerToken), u64>,
    stats: SimStats,
}

impl Simulation {
    /// Place the platoon and the overtaker and queue the scenario events.
    pub fn new(scenario: ScenarioConfig) -> Result<Self> {
        scenario.validate()?;

        let membership = PlatoonMembership::new(scenario.platoon_id, scenario.formation())
            .context("platoon formation is empty")?;
        let speeds = scenario.maneuver.speeds;
        let pitch = scenario.vehicle_length + settled_gap(scenario.maneuver.nominal_spacing);

        let mut world = World::new(scenario.vehicle_length);
        let mut coordinators = BTreeMap::new();

        for (slot, &id) in membership.formation().iter().enumerate() {
            world.spawn(Body {
                id,
                lane: 0,
                position: scenario.leader_start - slot as f64 * pitch,
                speed: speeds.platoon,
                // Followers are capped by the vehicle ahead, not by cruise speed.
                cruise_speed: if slot == 0 {
                    speeds.platoon
                } else {
                    speeds.overtake
                },
                spacing: scenario.maneuver.nominal_spacing,
            });
            let ctx = SimVehicle::new(id, format!("platoon.{}", slot), scenario.admission);
            coordinators.insert(
                id,
                ManeuverCoordinator::new(ctx, scenario.maneuver.clone(), Some(membership.clone())),
            );
        }

        let tail = scenario.leader_start - scenario.followers as f64 * pitch;
        world.spawn(Body {
            id: scenario.overtaker_id,
            lane: 0,
            position: tail - scenario.vehicle_length - settled_gap(scenario.overtaker_gap),
            speed: speeds.platoon,
            cruise_speed: speeds.platoon,
            spacing: scenario.overtaker_gap,
        });
        let ctx = SimVehicle::new(scenario.overtaker_id, "overtaker.0", scenario.admission);
        coordinators.insert(
            scenario.overtaker_id,
            ManeuverCoordinator::new(ctx, scenario.maneuver.clone(), None),
        );

        let network = LossyNetwork::new(scenario.network, scenario.seed);
        let mut sim = Self {
            scenario,
            world,
            coordinators,
            network,
            queue: BTreeMap::new(),
            next_seq: 0,
            now_ms: 0,
            pending_timers: HashMap::new(),
            stats: SimStats::default(),
        };

        sim.push(0, Event::Step);
        sim.push(sim.scenario.maneuver_start_ms, Event::StartManeuver);
        if let Some(hazard) = sim.scenario.hazard {
            sim.push(hazard.start_ms, Event::Hazard(true));
            sim.push(hazard.end_ms, Event::Hazard(false));
        }

        info!(
            vehicles = sim.coordinators.len(),
            followers = sim.scenario.followers,
            overtaker = sim.scenario.overtaker_id,
            "simulation ready"
        );
        Ok(sim)
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn coordinator(&self, id: VehicleId) -> Option<&Coordinator> {
        self.coordinators.get(&id)
    }

    /// Time of the next event within the scenario duration.
    pub fn next_event_ms(&self) -> Option<u64> {
        self.queue
            .keys()
            .next()
            .map(|&(at_ms, _)| at_ms)
            .filter(|&at_ms| at_ms <= self.scenario.duration_ms)
    }

    /// Run the next event.  Returns `false` once the scenario is over.
    pub fn step(&mut self) -> bool {
        if self.next_event_ms().is_none() {
            return false;
        }
        let Some(((at_ms, seq), event)) = self.queue.pop_first() else {
            return false;
        };

        self.now_ms = at_ms;
        self.stats.events += 1;
        self.dispatch(seq, event);
        self.check_invariants();
        true
    }

    pub fn run(&mut self) -> SimulationReport {
        while self.step() {}
        self.report()
    }

    pub fn report(&self) -> SimulationReport {
        let vehicles = self
            .coordinators
            .values()
            .map(|c| {
                let body = self.world.body(c.id());
                VehicleReport {
                    id: c.id(),
                    external_id: c.context().external_id(),
                    role: c.role(),
                    state: c.state(),
                    lane: body.map_or(0, |b| b.lane),
                    position: body.map_or(0.0, |b| b.position),
                    speed: body.map_or(0.0, |b| b.speed),
                }
            })
            .collect();

        SimulationReport {
            elapsed_ms: self.now_ms,
            vehicles,
            network: self.network.stats(),
            stats: self.stats.clone(),
        }
    }

    // ── Event handling ────────────────────────────────────────────────────────

    fn dispatch(&mut self, seq: u64, event: Event) {
        match event {
            Event::Step => self.on_step(),

            Event::StartManeuver => {
                let platoon_id = self.scenario.platoon_id;
                let leader_id = self.scenario.leader_id();
                info!(at_ms = self.now_ms, "starting overtake maneuver");
                if let Some(Err(e)) = self.drive(self.scenario.overtaker_id, |c| {
                    c.request_overtake(platoon_id, leader_id)
                }) {
                    warn!(error = %e, "overtake not started");
                }
            }

            Event::Hazard(present) => {
                info!(at_ms = self.now_ms, hazard = present, "hazard window");
                self.drive(self.scenario.leader_id(), |c| c.set_hazard(present));
            }

            Event::Deliver(message) => {
                *self.stats.delivered.entry(message.kind()).or_default() += 1;
                if let Some(Err(e)) = self.drive(message.destination(), |c| c.on_message(&message)) {
                    self.stats.ignored += 1;
                    debug!(error = %e, "delivered message ignored");
                }
            }

            Event::DeliveryFailed(message) => {
                let rolled_back = self.drive(message.sender(), |c| c.on_failed_delivery(&message));
                if matches!(rolled_back, Some(from) if from != OvertakeState::Idle) {
                    self.stats.rollbacks += 1;
                }
            }

            Event::Timer { vehicle, token } => {
                // Cancelled or replaced since it was queued.
                if self.pending_timers.get(&(vehicle, token)) != Some(&seq) {
                    return;
                }
                self.pending_timers.remove(&(vehicle, token));
                if let Some(Err(e)) = self.drive(vehicle, |c| c.on_timer(token)) {
                    debug!(error = %e, "timer fire ignored");
                }
            }
        }
    }

    fn on_step(&mut self) {
        let dt = self.scenario.step_ms as f64 / 1000.0;
        self.world.advance(dt);

        let beacons: Vec<Beacon> = self
            .coordinators
            .values()
            .filter_map(|c| {
                let body = self.world.body(c.id())?;
                let membership = c.membership();
                Some(Beacon {
                    sender_id: c.id(),
                    platoon_id: membership.map(PlatoonMembership::platoon_id),
                    slot: membership.and_then(|m| m.slot_of(c.id())),
                    position: body.position,
                    speed: body.speed,
                })
            })
            .collect();
        let ids: Vec<VehicleId> = self.coordinators.keys().copied().collect();

        for beacon in &beacons {
            for &id in ids.iter().filter(|&&id| id != beacon.sender_id) {
                let _ = self.drive(id, |c| c.on_beacon(beacon));
            }
        }

        let next = self.now_ms + self.scenario.step_ms;
        if next <= self.scenario.duration_ms {
            self.push(next, Event::Step);
        }
    }

    /// Run `f` on one coordinator with fresh sensor values, then apply what
    /// it commanded.
    fn drive<R>(&mut self, id: VehicleId, f: impl FnOnce(&mut Coordinator) -> R) -> Option<R> {
        let coordinator = self.coordinators.get_mut(&id)?;
        coordinator.context_mut().refresh(&self.world);
        let result = f(coordinator);
        let commands = coordinator.context_mut().take_commands();
        self.apply(id, commands);
        Some(result)
    }

    fn apply(&mut self, id: VehicleId, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Send(message) => self.transmit(message),
                Command::ChangeLane(delta) => self.world.change_lane(id, delta),
                Command::CruiseSpeed(speed) => self.world.set_cruise_speed(id, speed),
                Command::Spacing(spacing) => self.world.set_spacing(id, spacing),
                Command::Schedule(token, delay) => {
                    let at_ms = self.now_ms.saturating_add(millis(delay));
                    let seq = self.push(at_ms, Event::Timer { vehicle: id, token });
                    self.pending_timers.insert((id, token), seq);
                }
                Command::Cancel(token) => {
                    self.pending_timers.remove(&(id, token));
                }
            }
        }
    }

    fn transmit(&mut self, message: ManeuverMessage) {
        let (from, to) = (message.sender(), message.destination());
        match self.network.transmit(from, to, self.now_ms) {
            Transmission::Arrives { at_ms, .. } => {
                self.push(at_ms, Event::Deliver(message));
            }
            Transmission::Exhausted { at_ms, attempts } => {
                debug!(from, to, kind = message.kind(), attempts, "unicast undeliverable");
                self.push(at_ms, Event::DeliveryFailed(message));
            }
        }
    }

    fn push(&mut self, at_ms: u64, event: Event) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((at_ms, seq), event);
        seq
    }

    fn check_invariants(&mut self) {
        let mut temporary_leaders = 0;
        for c in self.coordinators.values() {
            self.stats.invariant_checks += 1;
            if c.in_maneuver() != (c.state() != OvertakeState::Idle) {
                self.stats.invariant_violations += 1;
                warn!(vehicle = c.id(), state = ?c.state(), "InManeuver out of sync with state");
            }
            if c.role() == VehicleRole::TemporaryLeader {
                temporary_leaders += 1;
            }
        }
        if temporary_leaders > 1 {
            self.stats.invariant_violations += 1;
            warn!(temporary_leaders, "more than one temporary leader");
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
