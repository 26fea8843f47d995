/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Lossy point-to-point channel with a retry budget.
//!
//! Each attempt takes `latency_ms` and is lost with `loss_probability`.  A
//! message is retransmitted up to `max_retries` times; when the budget is
//! exhausted the sender learns about it one attempt-time after the last try.
//! Deliveries on one (sender, destination) pair never overtake each other.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::trace;

use platoon_overtake::message::VehicleId;

use crate::scenario::NetworkConfig;

/// Fate of one unicast message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmission {
    /// Reaches the destination at `at_ms`.
    Arrives { at_ms: u64, attempts: u32 },
    /// Every attempt was lost; the sender is notified at `at_ms`.
    Exhausted { at_ms: u64, attempts: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub sent: u64,
    pub arrived: u64,
    pub exhausted: u64,
    pub retransmissions: u64,
}

pub struct LossyNetwork {
    config: NetworkConfig,
    rng: StdRng,
    /// Latest scheduled arrival per channel.
    last_arrival: HashMap<(VehicleId, VehicleId), u64>,
    stats: NetworkStats,
}

impl LossyNetwork {
    pub fn new(config: NetworkConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            last_arrival: HashMap::new(),
            stats: NetworkStats::default(),
        }
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    /// Decide the fate of a message sent from `from` to `to` at `now_ms`.
    pub fn transmit(&mut self, from: VehicleId, to: VehicleId, now_ms: u64) -> Transmission {
        self.stats.sent += 1;

        let budget = self.config.max_retries.saturating_add(1);
        let mut attempts = 0;
        let delivered = loop {
            attempts += 1;
            if !self.lost() {
                break true;
            }
            if attempts >= budget {
                break false;
            }
        };
        self.stats.retransmissions += u64::from(attempts - 1);

        let at_ms = now_ms + u64::from(attempts) * self.config.latency_ms;
        if delivered {
            let channel = self.last_arrival.entry((from, to)).or_insert(0);
            let at_ms = at_ms.max(*channel);
            *channel = at_ms;
            self.stats.arrived += 1;
            trace!(from, to, attempts, at_ms, "unicast scheduled");
            Transmission::Arrives { at_ms, attempts }
        } else {
            self.stats.exhausted += 1;
            trace!(from, to, attempts, "unicast retry budget exhausted");
            Transmission::Exhausted { at_ms, attempts }
        }
    }

    fn lost(&mut self) -> bool {
        self.config.loss_probability > 0.0 && self.rng.gen_bool(self.config.loss_probability)
    }
}
