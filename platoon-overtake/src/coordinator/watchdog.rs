/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Hazard watchdog decision.
//!
//! The leader arms a periodic [`TimerKind::HazardWatchdog`] timer when it
//! admits an overtaker.  Each tick samples the hazard flag once and asks
//! [`evaluate`] what to do.  The decision is pure so the abort/resume rule
//! can be tested without a coordinator.
//!
//! | Hazard | Leader state | Verdict |
//! |---|---|---|
//! | set | `WaitPosition` | [`WatchdogVerdict::Abort`] |
//! | clear | `WaitDangerEnd` | [`WatchdogVerdict::Restart`] |
//! | anything else | | [`WatchdogVerdict::Continue`] |
//!
//! [`TimerKind::HazardWatchdog`]: crate::timer::TimerKind::HazardWatchdog

use super::OvertakeState;

/// What one watchdog tick asks the leader to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    Abort,
    Restart,
    Continue,
}

pub fn evaluate(hazard: bool, state: OvertakeState) -> WatchdogVerdict {
    match (hazard, state) {
        (true, OvertakeState::WaitPosition) => WatchdogVerdict::Abort,
        (false, OvertakeState::WaitDangerEnd) => WatchdogVerdict::Restart,
        _ => WatchdogVerdict::Continue,
    }
}
