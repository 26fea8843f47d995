/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Timer tokens owned by a coordinator.
//!
//! A token is `(kind, generation)`.  Every arm hands out a fresh generation,
//! so a fire of a token that was cancelled, or re-armed since, no longer
//! matches the armed slot and is dropped by [`TimerSet::is_current`].  This is
//! what makes a timer that was already in flight at teardown a no-op.

use serde::Serialize;

/// Which periodic timer a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TimerKind {
    /// Leader: samples the hazard flag.
    HazardWatchdog,
    /// Temporary leader: samples the gap to the vehicle ahead.
    GapPoll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

impl std::fmt::Display for TimerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.generation)
    }
}

/// The armed timers of one coordinator (at most one per kind).
#[derive(Debug, Default)]
pub struct TimerSet {
    watchdog: Option<TimerToken>,
    gap_poll: Option<TimerToken>,
    next_generation: u64,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, kind: TimerKind) -> &mut Option<TimerToken> {
        match kind {
            TimerKind::HazardWatchdog => &mut self.watchdog,
            TimerKind::GapPoll => &mut self.gap_poll,
        }
    }

    /// Arm `kind` with a fresh token.  Returns the new token and the one it
    /// replaced (which the caller must cancel).
    pub fn arm(&mut self, kind: TimerKind) -> (TimerToken, Option<TimerToken>) {
        self.next_generation += 1;
        let token = TimerToken {
            kind,
            generation: self.next_generation,
        };
        let previous = self.slot_mut(kind).replace(token);
        (token, previous)
    }

    /// Disarm `kind`, returning the token that was armed.
    pub fn disarm(&mut self, kind: TimerKind) -> Option<TimerToken> {
        self.slot_mut(kind).take()
    }

    /// Disarm everything, returning all tokens that were armed.
    pub fn disarm_all(&mut self) -> Vec<TimerToken> {
        [self.watchdog.take(), self.gap_poll.take()]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn armed(&self, kind: TimerKind) -> Option<TimerToken> {
        match kind {
            TimerKind::HazardWatchdog => self.watchdog,
            TimerKind::GapPoll => self.gap_poll,
        }
    }

    /// `true` only for the exact token currently armed for its kind.
    pub fn is_current(&self, token: TimerToken) -> bool {
        self.armed(token.kind) == Some(token)
    }

    pub fn any_armed(&self) -> bool {
        self.watchdog.is_some() || self.gap_poll.is_some()
    }
}
