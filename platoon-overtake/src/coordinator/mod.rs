//! Per-vehicle overtake maneuver coordinator.
//!
//! [`ManeuverCoordinator`] is the protocol state machine.  One instance runs
//! on every vehicle; which states it visits depends on the role the vehicle
//! takes in a maneuver:
//!
//! ```text
//! overtaker        Idle → WaitReply → Overtaking → {WaitGap | WaitDangerEnd} → Overtaking → Idle
//! leader           Idle → WaitPosition → WaitJoin → WaitDangerEnd → WaitPosition → Idle
//! temporary leader Idle → OpenGap → Idle
//! ```
//!
//! Events are delivered one at a time and each handler runs to completion,
//! calling into the owned [`VehicleContext`] for every outbound message,
//! actuation command or timer operation before it returns.
//!
//! # Design decisions
//!
//! | Topic | Handling |
//! |---|---|
//! | Message dispatch | One [`Payload`] enum, one exhaustive `match` in [`on_message`](ManeuverCoordinator::on_message) |
//! | InManeuver flag | `session: Option<Session>`, `Some` exactly while the state is not `Idle` |
//! | Role / maneuver data | Owned by the coordinator, never shared between vehicles |
//! | Guard mismatch | Ignored, logged at `debug`, returned as [`ManeuverError::ProtocolMismatch`] |
//! | Timers | Generation-stamped [`TimerToken`]s; all cancelled on every return to `Idle` |
//! | Delivery failure | Local rollback to `Idle` when addressed to a maneuver party, never a process-level failure |
//! | Silent overtaker | Leader gives the round up after `report_timeout_ms` without a PositionReport |
//!
//! # Example
//! ```rust,ignore
//! let mut overtaker = ManeuverCoordinator::new(ctx, ManeuverConfig::default(), None);
//! overtaker.request_overtake(platoon_id, leader_id)?;
//! // ... deliver messages, beacons and timer fires as they arrive
//! overtaker.on_message(&incoming)?;
//! ```

pub mod error;
pub mod watchdog;

pub use error::{ManeuverError, MismatchReason};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::ManeuverConfig;
use crate::context::{LaneDirection, VehicleContext};
use crate::message::{Beacon, Envelope, ManeuverMessage, Payload, PlatoonId, VehicleId};
use crate::position::{PositionError, PositionTable, RankBand, RelativeRank};
use crate::timer::{TimerKind, TimerSet, TimerToken};
use crate::vehicle::{PlatoonMembership, VehicleRole};

use watchdog::WatchdogVerdict;

// ── State ─────────────────────────────────────────────────────────────────────

/// Current step of the maneuver on this vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum OvertakeState {
    /// No maneuver.  Initial state and the only state reachable on teardown.
    #[default]
    Idle,

    // ── overtaker ──
    /// Request sent, waiting for the leader's Response.
    WaitReply,
    /// Passing the platoon in the passing lane.
    Overtaking,
    /// Paused alongside the platoon, waiting for a gap to open.
    WaitGap,

    // ── overtaker and leader ──
    /// Paused until the hazard clears (overtaker merged or at the tail; leader
    /// waiting to restart).
    WaitDangerEnd,

    // ── leader ──
    /// Tracking member positions and the overtaker's rank.
    WaitPosition,
    /// Pause issued, waiting for the overtaker to merge (or pass, near-front).
    WaitJoin,

    // ── temporary leader ──
    /// Opening / holding a gap for the overtaker.
    OpenGap,
}

/// What an overtaker knows about the platoon it is passing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetPlatoonInfo {
    pub platoon_id: PlatoonId,
    pub leader_id: VehicleId,
}

/// What a leader knows about the vehicle it admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OvertakerRecord {
    pub overtaker_id: VehicleId,
}

/// Leader-side maneuver data.
#[derive(Debug)]
struct LeaderSession {
    overtaker: OvertakerRecord,
    table: PositionTable,
    rank: Option<RelativeRank>,
    /// Member promoted to temporary leader by the last abort, if any.
    gap_opener: Option<VehicleId>,
    /// Platoon speed lowered for a near-front overtaker.
    yielding: bool,
    /// Time tracked in WaitPosition since the last PositionReport.
    silent_ms: u64,
}

/// The maneuver this vehicle is a party to.  At most one per vehicle.
#[derive(Debug)]
enum Session {
    Overtaker {
        target: TargetPlatoonInfo,
        in_passing_lane: bool,
    },
    Leader(LeaderSession),
    GapOpener {
        overtaker_id: VehicleId,
        leader_id: VehicleId,
        gap_acked: bool,
    },
}

// ── ManeuverCoordinator ───────────────────────────────────────────────────────

/// The per-vehicle protocol state machine.
pub struct ManeuverCoordinator<C> {
    ctx: C,
    config: ManeuverConfig,
    membership: Option<PlatoonMembership>,
    role: VehicleRole,
    state: OvertakeState,
    session: Option<Session>,
    timers: TimerSet,
    /// Written only by the hazard-sensing collaborator through
    /// [`set_hazard`](Self::set_hazard); read only by the watchdog tick.
    hazard: bool,
}

impl<C: VehicleContext> ManeuverCoordinator<C> {
    /// Create an idle coordinator.  `membership` is the platoon this vehicle
    /// drives in, or `None` for a free vehicle.
    pub fn new(ctx: C, config: ManeuverConfig, membership: Option<PlatoonMembership>) -> Self {
        let role = membership
            .as_ref()
            .map(|m| m.base_role(ctx.self_id()))
            .unwrap_or_default();
        Self {
            ctx,
            config,
            membership,
            role,
            state: OvertakeState::Idle,
            session: None,
            timers: TimerSet::new(),
            hazard: false,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn id(&self) -> VehicleId {
        self.ctx.self_id()
    }

    pub fn state(&self) -> OvertakeState {
        self.state
    }

    pub fn role(&self) -> VehicleRole {
        self.role
    }

    /// `true` while this vehicle is a party to a maneuver.
    pub fn in_maneuver(&self) -> bool {
        self.session.is_some()
    }

    pub fn config(&self) -> &ManeuverConfig {
        &self.config
    }

    pub fn membership(&self) -> Option<&PlatoonMembership> {
        self.membership.as_ref()
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    pub fn hazard(&self) -> bool {
        self.hazard
    }

    pub fn armed_timer(&self, kind: TimerKind) -> Option<TimerToken> {
        self.timers.armed(kind)
    }

    pub fn target_platoon(&self) -> Option<TargetPlatoonInfo> {
        match &self.session {
            Some(Session::Overtaker { target, .. }) => Some(*target),
            _ => None,
        }
    }

    pub fn overtaker_record(&self) -> Option<OvertakerRecord> {
        self.leader_session().map(|l| l.overtaker)
    }

    pub fn relative_rank(&self) -> Option<RelativeRank> {
        self.leader_session().and_then(|l| l.rank)
    }

    pub fn position_table(&self) -> Option<&PositionTable> {
        self.leader_session().map(|l| &l.table)
    }

    /// Member currently designated as gap-opener by this leader.
    pub fn gap_opener(&self) -> Option<VehicleId> {
        self.leader_session().and_then(|l| l.gap_opener)
    }

    // ── Externally triggered operations ───────────────────────────────────────

    /// Start overtaking platoon `platoon_id` led by `leader_id`.
    ///
    /// # Errors
    /// [`ManeuverError::AlreadyInManeuver`] if this vehicle is already a party
    /// to a maneuver.  Nothing is sent and no state changes in that case.
    pub fn request_overtake(
        &mut self,
        platoon_id: PlatoonId,
        leader_id: VehicleId,
    ) -> Result<(), ManeuverError> {
        if self.in_maneuver() || self.state != OvertakeState::Idle {
            warn!(
                vehicle = self.id(),
                state = ?self.state,
                "cannot begin the maneuver because already involved in another one"
            );
            return Err(ManeuverError::AlreadyInManeuver { state: self.state });
        }

        self.role = VehicleRole::Overtaker;
        self.session = Some(Session::Overtaker {
            target: TargetPlatoonInfo {
                platoon_id,
                leader_id,
            },
            in_passing_lane: false,
        });
        self.transition(OvertakeState::WaitReply);

        info!(
            vehicle = self.id(),
            platoon = platoon_id,
            leader = leader_id,
            "sending overtake Request"
        );
        self.send(leader_id, platoon_id, Payload::Request);

        self.debug_check_invariants();
        Ok(())
    }

    /// Leader: interrupt the maneuver because of a hazard.
    ///
    /// Branches on the last computed rank (no rank yet counts as tail):
    /// * near-front → the platoon slows down, no pause message;
    /// * mid → pause the overtaker and promote the member at
    ///   `rank - gap_opener_offset` to temporary leader;
    /// * tail → send the overtaker to the rear of the platoon.
    pub fn abort_maneuver(&mut self) -> Result<(), ManeuverError> {
        let result = self.abort_inner();
        self.debug_check_invariants();
        result.map_err(|reason| self.ignored("abort_maneuver", reason))
    }

    /// Leader: the hazard has cleared.  Release overtaker and temporary
    /// leader and re-arm position tracking for a new completion attempt.
    pub fn restart_maneuver(&mut self) -> Result<(), ManeuverError> {
        let result = self.restart_inner();
        self.debug_check_invariants();
        result.map_err(|reason| self.ignored("restart_maneuver", reason))
    }

    /// Leader: rank an overtaker at `overtaker_position` against a snapshot
    /// of the position table.
    ///
    /// Within one admission round the stored rank only moves forward (towards
    /// the front); a report that would move it back is out of order and the
    /// previous rank is kept.  The effective rank is returned.
    pub fn compute_relative_rank(
        &mut self,
        overtaker_position: f64,
    ) -> Result<RelativeRank, ManeuverError> {
        self.update_rank(overtaker_position)
            .map_err(|reason| self.ignored("compute_relative_rank", reason))
    }

    /// Hazard-sensing collaborator: raise or clear the hazard flag.
    pub fn set_hazard(&mut self, present: bool) {
        if self.hazard != present {
            info!(vehicle = self.id(), hazard = present, "hazard flag changed");
        }
        self.hazard = present;
    }

    // ── Event entry points ────────────────────────────────────────────────────

    /// Handle one unicast maneuver message.
    ///
    /// # Errors
    /// [`ManeuverError::ProtocolMismatch`] when the message does not match the
    /// current state, role or counterpart.  The message has then been
    /// ignored; callers log and move on.
    pub fn on_message(&mut self, msg: &ManeuverMessage) -> Result<(), ManeuverError> {
        let result = if msg.destination() != self.id() {
            Err(MismatchReason::NotAddressed {
                destination: msg.destination(),
            })
        } else {
            match &msg.payload {
                Payload::Request => self.handle_request(msg),
                Payload::Response { permitted } => self.handle_response(msg, *permitted),
                Payload::PositionReport { position } => {
                    self.handle_position_report(msg, *position)
                }
                Payload::FinishAck => self.handle_finish_ack(msg),
                Payload::PauseOrder {
                    overtaker_id,
                    is_tail_case,
                } => self.handle_pause_order(msg, *overtaker_id, *is_tail_case),
                Payload::OpenGapAck => self.handle_open_gap_ack(msg),
                Payload::JoinAck => self.handle_join_ack(msg),
                Payload::RestartNotice => self.handle_restart_notice(msg),
            }
        };

        self.debug_check_invariants();
        result.map_err(|reason| self.ignored(msg.kind(), reason))
    }

    /// Handle one periodic beacon from another vehicle.
    ///
    /// Most beacons are irrelevant to the current state; those come back as
    /// [`ManeuverError::ProtocolMismatch`] and are only traced.
    pub fn on_beacon(&mut self, beacon: &Beacon) -> Result<(), ManeuverError> {
        let result = match (self.role, self.state) {
            (VehicleRole::Overtaker, OvertakeState::Overtaking) => {
                self.overtaker_beacon(beacon)
            }
            (VehicleRole::Leader, OvertakeState::WaitPosition) => self.leader_beacon(beacon),
            (_, state) => Err(MismatchReason::WrongState { state }),
        };

        self.debug_check_invariants();
        result.map_err(|reason| {
            trace!(vehicle = self.id(), from = beacon.sender_id, %reason, "beacon not used");
            ManeuverError::mismatch("Beacon", reason)
        })
    }

    /// Handle a timer fire.  Fires of tokens that are no longer armed are
    /// ignored.
    pub fn on_timer(&mut self, token: TimerToken) -> Result<(), ManeuverError> {
        let result = if !self.timers.is_current(token) {
            Err(MismatchReason::StaleTimer { token })
        } else {
            match token.kind {
                TimerKind::HazardWatchdog => self.watchdog_tick(token),
                TimerKind::GapPoll => self.gap_poll_tick(token),
            }
        };

        self.debug_check_invariants();
        result.map_err(|reason| self.ignored("timer", reason))
    }

    /// The transport gave up on `message`.  When the message was addressed to
    /// a party of the current maneuver, rolls that maneuver back to `Idle`
    /// whatever state it was in and returns that state.  Otherwise nothing
    /// changes and `Idle` is returned.
    pub fn on_failed_delivery(&mut self, message: &ManeuverMessage) -> OvertakeState {
        let from = self.state;
        let err = ManeuverError::DeliveryFailure {
            kind: message.kind(),
            destination: message.destination(),
        };

        if from == OvertakeState::Idle {
            debug!(vehicle = self.id(), error = %err, "delivery failure outside a maneuver");
        } else if !self.is_counterpart(message.destination()) {
            debug!(vehicle = self.id(), state = ?from, error = %err, "delivery failure unrelated to the maneuver");
            return OvertakeState::Idle;
        } else {
            warn!(vehicle = self.id(), state = ?from, error = %err, "rolling maneuver back");
            self.reset_to_idle("delivery failure");
        }

        self.debug_check_invariants();
        from
    }

    // ── Message handlers ──────────────────────────────────────────────────────

    fn handle_request(&mut self, msg: &ManeuverMessage) -> Result<(), MismatchReason> {
        let size = self.check_own_platoon(msg.platoon_id())?.size();
        if !matches!(self.role, VehicleRole::Leader | VehicleRole::None) {
            return Err(MismatchReason::WrongRole { role: self.role });
        }

        let busy = self.in_maneuver();
        let permitted = !busy && self.ctx.is_overtake_allowed();

        info!(
            vehicle = self.id(),
            overtaker = msg.sender(),
            permitted,
            busy,
            "sending overtake Response"
        );
        self.send(
            msg.sender(),
            msg.platoon_id(),
            Payload::Response { permitted },
        );

        if !permitted {
            return Ok(());
        }

        self.role = VehicleRole::Leader;
        self.session = Some(Session::Leader(LeaderSession {
            overtaker: OvertakerRecord {
                overtaker_id: msg.sender(),
            },
            table: PositionTable::new(size),
            rank: None,
            gap_opener: None,
            yielding: false,
            silent_ms: 0,
        }));
        self.transition(OvertakeState::WaitPosition);
        self.arm_timer(TimerKind::HazardWatchdog, self.config.watchdog_period());
        Ok(())
    }

    fn handle_response(
        &mut self,
        msg: &ManeuverMessage,
        permitted: bool,
    ) -> Result<(), MismatchReason> {
        self.expect_role(VehicleRole::Overtaker)?;
        self.expect_state(&[OvertakeState::WaitReply])?;
        let target = self.expect_target(msg)?;

        if permitted {
            info!(vehicle = self.id(), leader = target.leader_id, "overtake permitted");
            self.transition(OvertakeState::Overtaking);
            self.enter_passing_lane();
            self.ctx.set_desired_speed(self.config.speeds.overtake);
        } else {
            info!(vehicle = self.id(), leader = target.leader_id, "overtake not permitted");
            self.reset_to_idle("admission denied");
        }
        Ok(())
    }

    fn handle_position_report(
        &mut self,
        msg: &ManeuverMessage,
        position: f64,
    ) -> Result<(), MismatchReason> {
        self.expect_role(VehicleRole::Leader)?;
        self.expect_state(&[OvertakeState::WaitPosition])?;
        self.check_own_platoon(msg.platoon_id())?;
        self.expect_overtaker(msg.sender())?;

        if let Some(l) = self.leader_session_mut() {
            l.silent_ms = 0;
        }
        self.update_rank(position).map(|_| ())
    }

    fn handle_finish_ack(&mut self, msg: &ManeuverMessage) -> Result<(), MismatchReason> {
        self.expect_role(VehicleRole::Leader)?;
        self.expect_state(&[OvertakeState::WaitPosition, OvertakeState::WaitJoin])?;
        self.check_own_platoon(msg.platoon_id())?;
        self.expect_overtaker(msg.sender())?;

        // A mid-platoon pause has a gap-opener waiting for a merge; only a
        // restart concludes that round.
        if self.gap_opener().is_some() {
            return Err(MismatchReason::WrongState { state: self.state });
        }

        info!(vehicle = self.id(), overtaker = msg.sender(), "overtake concluded");
        self.reset_to_idle("overtake finished");
        Ok(())
    }

    fn handle_pause_order(
        &mut self,
        msg: &ManeuverMessage,
        overtaker_id: VehicleId,
        is_tail_case: bool,
    ) -> Result<(), MismatchReason> {
        if overtaker_id == self.id() {
            self.pause_as_overtaker(msg, is_tail_case)
        } else {
            self.pause_as_gap_opener(msg, overtaker_id)
        }
    }

    fn pause_as_overtaker(
        &mut self,
        msg: &ManeuverMessage,
        is_tail_case: bool,
    ) -> Result<(), MismatchReason> {
        self.expect_role(VehicleRole::Overtaker)?;
        self.expect_state(&[OvertakeState::Overtaking])?;
        let target = self.expect_target(msg)?;

        if is_tail_case {
            info!(vehicle = self.id(), "pause: retreating to the tail of the platoon");
            self.ctx.set_desired_speed(self.config.speeds.retreat);
            self.leave_passing_lane();
            self.transition(OvertakeState::WaitDangerEnd);
        } else {
            let position = self.ctx.current_position();
            info!(vehicle = self.id(), position, "pause: holding position for a gap");
            self.ctx.set_desired_speed(self.config.speeds.hold);
            self.send(
                target.leader_id,
                target.platoon_id,
                Payload::PositionReport { position },
            );
            self.transition(OvertakeState::WaitGap);
        }
        Ok(())
    }

    fn pause_as_gap_opener(
        &mut self,
        msg: &ManeuverMessage,
        overtaker_id: VehicleId,
    ) -> Result<(), MismatchReason> {
        let leader_id = self.check_own_platoon(msg.platoon_id())?.leader_id();
        expect_sender(leader_id, msg.sender())?;
        if self.in_maneuver() {
            return Err(MismatchReason::Busy);
        }
        self.expect_role(VehicleRole::Follower)?;

        info!(
            vehicle = self.id(),
            overtaker = overtaker_id,
            gap_target = self.config.gap_target,
            "promoted to temporary leader, opening gap"
        );
        self.role = VehicleRole::TemporaryLeader;
        self.session = Some(Session::GapOpener {
            overtaker_id,
            leader_id,
            gap_acked: false,
        });
        self.ctx.set_gap_spacing(self.config.gap_target);
        self.transition(OvertakeState::OpenGap);
        self.arm_timer(TimerKind::GapPoll, self.config.gap_poll_period());
        Ok(())
    }

    fn handle_open_gap_ack(&mut self, msg: &ManeuverMessage) -> Result<(), MismatchReason> {
        self.expect_role(VehicleRole::Overtaker)?;
        self.expect_state(&[OvertakeState::WaitGap])?;
        let target = self.target_platoon().ok_or(MismatchReason::WrongRole { role: self.role })?;
        if msg.platoon_id() != target.platoon_id {
            return Err(MismatchReason::WrongPlatoon {
                expected: Some(target.platoon_id),
                actual: msg.platoon_id(),
            });
        }

        info!(vehicle = self.id(), opener = msg.sender(), "gap open, merging into the platoon");
        self.leave_passing_lane();
        self.send(target.leader_id, target.platoon_id, Payload::JoinAck);
        self.transition(OvertakeState::WaitDangerEnd);
        Ok(())
    }

    fn handle_join_ack(&mut self, msg: &ManeuverMessage) -> Result<(), MismatchReason> {
        self.expect_role(VehicleRole::Leader)?;
        self.expect_state(&[OvertakeState::WaitJoin])?;
        self.check_own_platoon(msg.platoon_id())?;
        self.expect_overtaker(msg.sender())?;

        info!(vehicle = self.id(), overtaker = msg.sender(), "overtaker merged, waiting for hazard to clear");
        self.transition(OvertakeState::WaitDangerEnd);
        Ok(())
    }

    fn handle_restart_notice(&mut self, msg: &ManeuverMessage) -> Result<(), MismatchReason> {
        match self.role {
            VehicleRole::TemporaryLeader => {
                self.expect_state(&[OvertakeState::OpenGap])?;
                let leader_id = match &self.session {
                    Some(Session::GapOpener { leader_id, .. }) => *leader_id,
                    _ => return Err(MismatchReason::WrongRole { role: self.role }),
                };
                expect_sender(leader_id, msg.sender())?;

                info!(vehicle = self.id(), "hazard cleared, restoring nominal spacing");
                self.reset_to_idle("maneuver restarted");
                Ok(())
            }
            VehicleRole::Overtaker => {
                self.expect_state(&[OvertakeState::WaitDangerEnd])?;
                self.expect_target(msg)?;

                info!(vehicle = self.id(), "hazard cleared, resuming overtake");
                self.enter_passing_lane();
                self.ctx.set_desired_speed(self.config.speeds.overtake);
                self.transition(OvertakeState::Overtaking);
                Ok(())
            }
            role => Err(MismatchReason::WrongRole { role }),
        }
    }

    // ── Beacon handlers ───────────────────────────────────────────────────────

    fn overtaker_beacon(&mut self, beacon: &Beacon) -> Result<(), MismatchReason> {
        let target = self.target_platoon().ok_or(MismatchReason::WrongRole { role: self.role })?;
        expect_sender(target.leader_id, beacon.sender_id)?;

        let position = self.ctx.current_position();
        let delta = beacon.position - position;

        if delta < -self.config.clearance_distance {
            info!(
                vehicle = self.id(),
                delta,
                "clear of the platoon, returning to the platoon lane"
            );
            self.leave_passing_lane();
            self.send(target.leader_id, target.platoon_id, Payload::FinishAck);
            self.reset_to_idle("overtake finished");
        } else {
            self.send(
                target.leader_id,
                target.platoon_id,
                Payload::PositionReport { position },
            );
        }
        Ok(())
    }

    fn leader_beacon(&mut self, beacon: &Beacon) -> Result<(), MismatchReason> {
        let membership = self.check_member_beacon(beacon)?;
        let slot = beacon.slot.ok_or(MismatchReason::NotMember {
            vehicle: beacon.sender_id,
        })?;
        if let Some(expected) = membership.member_at(slot) {
            expect_sender(expected, beacon.sender_id)?;
        }

        let own_position = self.ctx.current_position();
        let leader = self
            .leader_session_mut()
            .ok_or(MismatchReason::WrongRole { role: VehicleRole::Leader })?;
        leader.table.record(slot, beacon.position)?;
        leader.table.record(0, own_position)?;
        Ok(())
    }

    fn check_member_beacon(&self, beacon: &Beacon) -> Result<&PlatoonMembership, MismatchReason> {
        let actual = beacon.platoon_id.ok_or(MismatchReason::NotMember {
            vehicle: beacon.sender_id,
        })?;
        self.check_own_platoon(actual)
    }

    // ── Timer handlers ────────────────────────────────────────────────────────

    fn watchdog_tick(&mut self, token: TimerToken) -> Result<(), MismatchReason> {
        self.expect_role(VehicleRole::Leader)?;

        let verdict = watchdog::evaluate(self.hazard, self.state);
        trace!(vehicle = self.id(), hazard = self.hazard, state = ?self.state, ?verdict, "watchdog tick");

        let outcome = match verdict {
            WatchdogVerdict::Abort => self.abort_inner(),
            WatchdogVerdict::Restart => self.restart_inner(),
            WatchdogVerdict::Continue => {
                self.track_report_silence();
                Ok(())
            }
        };

        if self.timers.is_current(token) {
            self.ctx.schedule(token, self.config.watchdog_period());
        }
        outcome
    }

    /// Give the maneuver up once the overtaker has gone quiet for
    /// `report_timeout_ms` while positions are being tracked.
    fn track_report_silence(&mut self) {
        if self.state != OvertakeState::WaitPosition {
            return;
        }
        let period = self.config.watchdog_period_ms;
        let timeout = self.config.report_timeout_ms;
        let Some(leader) = self.leader_session_mut() else {
            return;
        };
        leader.silent_ms = leader.silent_ms.saturating_add(period);
        let (silent_ms, overtaker) = (leader.silent_ms, leader.overtaker.overtaker_id);

        if silent_ms >= timeout {
            warn!(vehicle = self.id(), overtaker, silent_ms, "no position report, giving the overtake up");
            self.reset_to_idle("overtaker silent");
        }
    }

    fn gap_poll_tick(&mut self, token: TimerToken) -> Result<(), MismatchReason> {
        self.expect_role(VehicleRole::TemporaryLeader)?;
        self.expect_state(&[OvertakeState::OpenGap])?;

        let (overtaker_id, gap_acked) = match &self.session {
            Some(Session::GapOpener {
                overtaker_id,
                gap_acked,
                ..
            }) => (*overtaker_id, *gap_acked),
            _ => return Err(MismatchReason::WrongRole { role: self.role }),
        };
        if gap_acked {
            return Err(MismatchReason::WrongState { state: self.state });
        }

        let reading = self.ctx.sense_gap();
        if reading.distance < self.config.gap_target {
            trace!(vehicle = self.id(), gap = reading.distance, "gap still opening");
            self.ctx.schedule(token, self.config.gap_poll_period());
            return Ok(());
        }

        info!(
            vehicle = self.id(),
            gap = reading.distance,
            overtaker = overtaker_id,
            "gap open, sending OpenGapAck"
        );
        if let Some(Session::GapOpener { gap_acked, .. }) = self.session.as_mut() {
            *gap_acked = true;
        }
        let platoon_id = self.own_platoon().unwrap_or_default();
        self.send(overtaker_id, platoon_id, Payload::OpenGapAck);
        self.cancel_timer(TimerKind::GapPoll);
        Ok(())
    }

    // ── Leader transitions ────────────────────────────────────────────────────

    fn abort_inner(&mut self) -> Result<(), MismatchReason> {
        self.expect_role(VehicleRole::Leader)?;
        self.expect_state(&[OvertakeState::WaitPosition])?;

        let (platoon_id, followers) = match &self.membership {
            Some(m) => (m.platoon_id(), m.followers()),
            None => return Err(MismatchReason::WrongRole { role: self.role }),
        };
        let (overtaker_id, rank) = match self.leader_session() {
            Some(l) => (l.overtaker.overtaker_id, l.rank),
            None => return Err(MismatchReason::WrongRole { role: self.role }),
        };

        let band = match rank {
            Some(rank) => RankBand::classify(rank, followers, &self.config.band_thresholds()),
            // No report yet: the overtaker has not come alongside.
            None => RankBand::Tail,
        };
        let opener = match band {
            RankBand::Mid { gap_opener_slot } => self
                .membership
                .as_ref()
                .and_then(|m| m.member_at(gap_opener_slot)),
            _ => None,
        };

        info!(vehicle = self.id(), ?rank, ?band, "hazard: aborting overtake");

        match (band, opener) {
            (RankBand::NearFront, _) => {
                self.ctx.set_desired_speed(self.config.speeds.platoon_yield);
                if let Some(l) = self.leader_session_mut() {
                    l.yielding = true;
                }
                self.transition(OvertakeState::WaitJoin);
            }
            (RankBand::Mid { .. }, Some(opener)) => {
                let pause = Payload::PauseOrder {
                    overtaker_id,
                    is_tail_case: false,
                };
                self.send(overtaker_id, platoon_id, pause.clone());
                self.send(opener, platoon_id, pause);
                if let Some(l) = self.leader_session_mut() {
                    l.gap_opener = Some(opener);
                }
                self.transition(OvertakeState::WaitJoin);
            }
            (RankBand::Tail, _) | (RankBand::Mid { .. }, None) => {
                self.send(
                    overtaker_id,
                    platoon_id,
                    Payload::PauseOrder {
                        overtaker_id,
                        is_tail_case: true,
                    },
                );
                self.transition(OvertakeState::WaitDangerEnd);
            }
        }
        Ok(())
    }

    fn restart_inner(&mut self) -> Result<(), MismatchReason> {
        self.expect_role(VehicleRole::Leader)?;
        self.expect_state(&[OvertakeState::WaitDangerEnd])?;
        let platoon_id = self
            .own_platoon()
            .ok_or(MismatchReason::WrongRole { role: self.role })?;

        let (overtaker_id, opener) = {
            let leader = self
                .leader_session_mut()
                .ok_or(MismatchReason::WrongRole { role: VehicleRole::Leader })?;
            // Positions and rank belong to the interrupted round.
            leader.table.clear();
            leader.rank = None;
            leader.silent_ms = 0;
            (leader.overtaker.overtaker_id, leader.gap_opener.take())
        };

        info!(vehicle = self.id(), overtaker = overtaker_id, ?opener, "hazard cleared, restarting overtake");
        self.send(overtaker_id, platoon_id, Payload::RestartNotice);
        if let Some(opener) = opener {
            self.send(opener, platoon_id, Payload::RestartNotice);
        }
        self.transition(OvertakeState::WaitPosition);
        Ok(())
    }

    fn update_rank(&mut self, overtaker_position: f64) -> Result<RelativeRank, MismatchReason> {
        let id = self.ctx.self_id();
        let role = self.role;
        let leader = self
            .leader_session_mut()
            .ok_or(MismatchReason::WrongRole { role })?;

        if !overtaker_position.is_finite() {
            return Err(PositionError::NonFiniteReport.into());
        }
        let snapshot = leader.table.snapshot()?;
        let fresh = snapshot.relative_rank(overtaker_position);
        let rank = match leader.rank {
            Some(previous) if fresh > previous => {
                debug!(vehicle = id, %fresh, %previous, "out-of-order report, keeping rank");
                previous
            }
            _ => fresh,
        };
        leader.rank = Some(rank);

        debug!(vehicle = id, position = overtaker_position, %rank, "relative rank updated");
        Ok(rank)
    }

    // ── Shared helpers ────────────────────────────────────────────────────────

    /// Tear the maneuver down: cancel every timer, undo lingering actuation,
    /// restore the membership role and enter `Idle`.
    fn reset_to_idle(&mut self, cause: &'static str) {
        for token in self.timers.disarm_all() {
            self.ctx.cancel(token);
        }

        match self.session.take() {
            Some(Session::GapOpener { .. }) => {
                self.ctx.set_gap_spacing(self.config.nominal_spacing);
            }
            Some(Session::Leader(leader)) if leader.yielding => {
                self.ctx.set_desired_speed(self.config.speeds.platoon);
            }
            Some(Session::Overtaker {
                in_passing_lane, ..
            }) => {
                if in_passing_lane {
                    self.ctx.change_lane_relative(1, LaneDirection::Right);
                }
                // No maneuver speed is commanded before the Response.
                if self.state != OvertakeState::WaitReply {
                    self.ctx.set_desired_speed(self.config.speeds.platoon);
                }
            }
            _ => {}
        }

        self.role = self.base_role();
        debug!(vehicle = self.id(), cause, "maneuver torn down");
        self.transition(OvertakeState::Idle);
    }

    fn transition(&mut self, to: OvertakeState) {
        let from = self.state;
        self.state = to;
        info!(
            vehicle = self.id(),
            role = %self.role,
            from = ?from,
            to = ?to,
            "state transition"
        );
    }

    fn send(&mut self, destination: VehicleId, platoon_id: PlatoonId, payload: Payload) {
        let envelope = Envelope {
            sender_id: self.ctx.self_id(),
            sender_external_id: self.ctx.external_id(),
            platoon_id,
            destination_id: destination,
        };
        let message = ManeuverMessage::new(envelope, payload);
        debug!(vehicle = self.id(), to = destination, kind = message.kind(), "sending");
        self.ctx.send_unicast(message, destination);
    }

    fn enter_passing_lane(&mut self) {
        if let Some(Session::Overtaker {
            in_passing_lane, ..
        }) = self.session.as_mut()
        {
            if !*in_passing_lane {
                *in_passing_lane = true;
                self.ctx.change_lane_relative(1, LaneDirection::Left);
            }
        }
    }

    fn leave_passing_lane(&mut self) {
        if let Some(Session::Overtaker {
            in_passing_lane, ..
        }) = self.session.as_mut()
        {
            if *in_passing_lane {
                *in_passing_lane = false;
                self.ctx.change_lane_relative(1, LaneDirection::Right);
            }
        }
    }

    fn arm_timer(&mut self, kind: TimerKind, delay: std::time::Duration) {
        let (token, previous) = self.timers.arm(kind);
        if let Some(previous) = previous {
            self.ctx.cancel(previous);
        }
        self.ctx.schedule(token, delay);
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        if let Some(token) = self.timers.disarm(kind) {
            self.ctx.cancel(token);
        }
    }

    fn base_role(&self) -> VehicleRole {
        self.membership
            .as_ref()
            .map(|m| m.base_role(self.ctx.self_id()))
            .unwrap_or_default()
    }

    fn own_platoon(&self) -> Option<PlatoonId> {
        self.membership.as_ref().map(PlatoonMembership::platoon_id)
    }

    /// Whether `id` is a party of the current maneuver.
    fn is_counterpart(&self, id: VehicleId) -> bool {
        match &self.session {
            Some(Session::Overtaker { target, .. }) => target.leader_id == id,
            Some(Session::Leader(l)) => {
                l.overtaker.overtaker_id == id || l.gap_opener == Some(id)
            }
            Some(Session::GapOpener {
                overtaker_id,
                leader_id,
                ..
            }) => *overtaker_id == id || *leader_id == id,
            None => false,
        }
    }

    fn leader_session(&self) -> Option<&LeaderSession> {
        match &self.session {
            Some(Session::Leader(l)) => Some(l),
            _ => None,
        }
    }

    fn leader_session_mut(&mut self) -> Option<&mut LeaderSession> {
        match &mut self.session {
            Some(Session::Leader(l)) => Some(l),
            _ => None,
        }
    }

    fn ignored(&self, event: &'static str, reason: MismatchReason) -> ManeuverError {
        debug!(vehicle = self.id(), event, state = ?self.state, %reason, "ignored");
        ManeuverError::mismatch(event, reason)
    }

    fn debug_check_invariants(&self) {
        debug_assert_eq!(
            self.in_maneuver(),
            self.state != OvertakeState::Idle,
            "InManeuver must hold exactly while the state is not Idle"
        );
        debug_assert!(
            self.state != OvertakeState::Idle || !self.timers.any_armed(),
            "no timer may stay armed in Idle"
        );
    }

    // ── Guards ────────────────────────────────────────────────────────────────

    fn expect_state(&self, allowed: &[OvertakeState]) -> Result<(), MismatchReason> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(MismatchReason::WrongState { state: self.state })
        }
    }

    fn expect_role(&self, role: VehicleRole) -> Result<(), MismatchReason> {
        if self.role == role {
            Ok(())
        } else {
            Err(MismatchReason::WrongRole { role: self.role })
        }
    }

    fn check_own_platoon(&self, actual: PlatoonId) -> Result<&PlatoonMembership, MismatchReason> {
        match &self.membership {
            Some(m) if m.platoon_id() == actual => Ok(m),
            other => Err(MismatchReason::WrongPlatoon {
                expected: other.as_ref().map(PlatoonMembership::platoon_id),
                actual,
            }),
        }
    }

    /// Overtaker: the message must come from the pending target's leader and
    /// name the pending target's platoon.
    fn expect_target(&self, msg: &ManeuverMessage) -> Result<TargetPlatoonInfo, MismatchReason> {
        let target = self
            .target_platoon()
            .ok_or(MismatchReason::WrongRole { role: self.role })?;
        if msg.platoon_id() != target.platoon_id {
            return Err(MismatchReason::WrongPlatoon {
                expected: Some(target.platoon_id),
                actual: msg.platoon_id(),
            });
        }
        expect_sender(target.leader_id, msg.sender())?;
        Ok(target)
    }

    fn expect_overtaker(&self, sender: VehicleId) -> Result<(), MismatchReason> {
        let record = self
            .overtaker_record()
            .ok_or(MismatchReason::WrongRole { role: self.role })?;
        expect_sender(record.overtaker_id, sender)
    }
}

fn expect_sender(expected: VehicleId, actual: VehicleId) -> Result<(), MismatchReason> {
    if expected == actual {
        Ok(())
    } else {
        Err(MismatchReason::UnexpectedSender { expected, actual })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use crate::context::{
        Actuation, AdmissionPolicy, GapReading, Positioning, TimerService, Transport,
    };
    use crate::position::PositionError;

    const PLATOON: PlatoonId = 1;
    const LEADER: VehicleId = 0;
    const OVERTAKER: VehicleId = 9;

    // ── Recording vehicle ─────────────────────────────────────────────────────

    #[derive(Debug, Default)]
    struct TestVehicle {
        id: VehicleId,
        position: f64,
        allowed: bool,
        gap: f64,
        outbox: Vec<ManeuverMessage>,
        lane_changes: Vec<LaneDirection>,
        speeds: Vec<f64>,
        spacings: Vec<f64>,
        scheduled: Vec<(TimerToken, Duration)>,
        cancelled: Vec<TimerToken>,
    }

    impl TestVehicle {
        /// Lane index relative to the platoon lane.
        fn lane(&self) -> i32 {
            self.lane_changes.iter().map(|d| d.signed(1)).sum()
        }

        fn last_speed(&self) -> Option<f64> {
            self.speeds.last().copied()
        }
    }

    impl Transport for TestVehicle {
        fn send_unicast(&mut self, message: ManeuverMessage, destination: VehicleId) {
            assert_eq!(message.destination(), destination);
            self.outbox.push(message);
        }
    }

    impl Actuation for TestVehicle {
        fn change_lane_relative(&mut self, offset: u8, direction: LaneDirection) {
            assert_eq!(offset, 1);
            self.lane_changes.push(direction);
        }

        fn set_desired_speed(&mut self, speed: f64) {
            self.speeds.push(speed);
        }

        fn set_gap_spacing(&mut self, distance: f64) {
            self.spacings.push(distance);
        }

        fn sense_gap(&self) -> GapReading {
            GapReading {
                distance: self.gap,
                relative_speed: 0.0,
            }
        }
    }

    impl AdmissionPolicy for TestVehicle {
        fn is_overtake_allowed(&self) -> bool {
            self.allowed
        }
    }

    impl Positioning for TestVehicle {
        fn self_id(&self) -> VehicleId {
            self.id
        }

        fn external_id(&self) -> String {
            format!("veh.{}", self.id)
        }

        fn current_position(&self) -> f64 {
            self.position
        }
    }

    impl TimerService for TestVehicle {
        fn schedule(&mut self, token: TimerToken, delay: Duration) {
            self.scheduled.push((token, delay));
        }

        fn cancel(&mut self, token: TimerToken) {
            self.cancelled.push(token);
        }
    }

    type Coordinator = ManeuverCoordinator<TestVehicle>;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn formation() -> PlatoonMembership {
        PlatoonMembership::new(PLATOON, vec![0, 1, 2, 3]).unwrap()
    }

    fn vehicle(id: VehicleId, position: f64) -> TestVehicle {
        TestVehicle {
            id,
            position,
            allowed: true,
            gap: 5.0,
            ..Default::default()
        }
    }

    fn member_with(id: VehicleId, position: f64, config: ManeuverConfig) -> Coordinator {
        ManeuverCoordinator::new(vehicle(id, position), config, Some(formation()))
    }

    fn member(id: VehicleId, position: f64) -> Coordinator {
        member_with(id, position, ManeuverConfig::default())
    }

    fn free_vehicle(position: f64) -> Coordinator {
        ManeuverCoordinator::new(vehicle(OVERTAKER, position), ManeuverConfig::default(), None)
    }

    fn message(from: VehicleId, to: VehicleId, payload: Payload) -> ManeuverMessage {
        ManeuverMessage::new(
            Envelope {
                sender_id: from,
                sender_external_id: format!("veh.{}", from),
                platoon_id: PLATOON,
                destination_id: to,
            },
            payload,
        )
    }

    fn member_beacon(slot: usize, position: f64) -> Beacon {
        Beacon {
            sender_id: slot as VehicleId,
            platoon_id: Some(PLATOON),
            slot: Some(slot),
            position,
            speed: 27.0,
        }
    }

    fn sent(c: &mut Coordinator) -> Vec<ManeuverMessage> {
        std::mem::take(&mut c.context_mut().outbox)
    }

    fn assert_invariants(c: &Coordinator) {
        assert_eq!(
            c.in_maneuver(),
            c.state() != OvertakeState::Idle,
            "vehicle {}: InManeuver out of sync with {:?}",
            c.id(),
            c.state()
        );
        if c.state() == OvertakeState::Idle {
            assert!(c.armed_timer(TimerKind::HazardWatchdog).is_none());
            assert!(c.armed_timer(TimerKind::GapPoll).is_none());
        }
    }

    fn mismatch_reason(result: Result<(), ManeuverError>) -> MismatchReason {
        match result {
            Err(ManeuverError::ProtocolMismatch { reason, .. }) => reason,
            other => panic!("expected a protocol mismatch, got {:?}", other),
        }
    }

    /// Leader that admitted the overtaker and holds a full 100/90/80/70 table.
    fn tracking_leader_with(config: ManeuverConfig) -> Coordinator {
        let mut leader = member_with(LEADER, 100.0, config);
        leader
            .on_message(&message(OVERTAKER, LEADER, Payload::Request))
            .unwrap();
        sent(&mut leader);
        for (slot, position) in [(1, 90.0), (2, 80.0), (3, 70.0)] {
            leader.on_beacon(&member_beacon(slot, position)).unwrap();
        }
        leader
    }

    fn tracking_leader() -> Coordinator {
        tracking_leader_with(ManeuverConfig::default())
    }

    fn report(leader: &mut Coordinator, position: f64) -> Result<(), ManeuverError> {
        leader.on_message(&message(
            OVERTAKER,
            LEADER,
            Payload::PositionReport { position },
        ))
    }

    fn waiting_for_reply() -> Coordinator {
        let mut o = free_vehicle(60.0);
        o.request_overtake(PLATOON, LEADER).unwrap();
        sent(&mut o);
        o
    }

    fn overtaking(position: f64) -> Coordinator {
        let mut o = waiting_for_reply();
        o.context_mut().position = position;
        o.on_message(&message(LEADER, OVERTAKER, Payload::Response { permitted: true }))
            .unwrap();
        o
    }

    fn pause(to: VehicleId, is_tail_case: bool) -> ManeuverMessage {
        message(
            LEADER,
            to,
            Payload::PauseOrder {
                overtaker_id: OVERTAKER,
                is_tail_case,
            },
        )
    }

    fn waiting_for_gap() -> Coordinator {
        let mut o = overtaking(85.0);
        o.on_message(&pause(OVERTAKER, false)).unwrap();
        sent(&mut o);
        o
    }

    fn retreated() -> Coordinator {
        let mut o = overtaking(60.0);
        o.on_message(&pause(OVERTAKER, true)).unwrap();
        o
    }

    fn gap_opener() -> Coordinator {
        let mut opener = member(2, 80.0);
        opener.on_message(&pause(2, false)).unwrap();
        opener
    }

    // ── request_overtake ──────────────────────────────────────────────────────

    #[test]
    fn request_overtake_sends_request_and_waits() {
        let mut o = free_vehicle(60.0);
        o.request_overtake(PLATOON, LEADER).unwrap();

        assert_eq!(o.state(), OvertakeState::WaitReply);
        assert_eq!(o.role(), VehicleRole::Overtaker);
        assert_eq!(
            o.target_platoon(),
            Some(TargetPlatoonInfo {
                platoon_id: PLATOON,
                leader_id: LEADER
            })
        );

        let out = sent(&mut o);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, Payload::Request);
        assert_eq!(out[0].destination(), LEADER);
        assert_eq!(out[0].platoon_id(), PLATOON);
        assert_eq!(out[0].envelope.sender_external_id, "veh.9");
    }

    #[test]
    fn second_request_is_rejected_without_side_effects() {
        let mut o = waiting_for_reply();
        let err = o.request_overtake(2, 20).unwrap_err();

        assert_eq!(
            err,
            ManeuverError::AlreadyInManeuver {
                state: OvertakeState::WaitReply
            }
        );
        assert!(sent(&mut o).is_empty());
        assert_eq!(o.target_platoon().unwrap().platoon_id, PLATOON);
    }

    // ── Request / admission ───────────────────────────────────────────────────

    #[test]
    fn leader_admits_request_for_own_platoon() {
        let mut leader = member(LEADER, 100.0);
        leader
            .on_message(&message(OVERTAKER, LEADER, Payload::Request))
            .unwrap();

        let out = sent(&mut leader);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, Payload::Response { permitted: true });
        assert_eq!(out[0].destination(), OVERTAKER);

        assert_eq!(leader.role(), VehicleRole::Leader);
        assert_eq!(leader.state(), OvertakeState::WaitPosition);
        assert_eq!(
            leader.overtaker_record(),
            Some(OvertakerRecord {
                overtaker_id: OVERTAKER
            })
        );
        assert_eq!(leader.position_table().unwrap().size(), 4);

        let token = leader.armed_timer(TimerKind::HazardWatchdog).unwrap();
        assert_eq!(
            leader.context().scheduled,
            vec![(token, Duration::from_millis(500))]
        );
    }

    #[test]
    fn leader_denies_when_policy_refuses() {
        let mut leader = member(LEADER, 100.0);
        leader.context_mut().allowed = false;
        leader
            .on_message(&message(OVERTAKER, LEADER, Payload::Request))
            .unwrap();

        let out = sent(&mut leader);
        assert_eq!(out[0].payload, Payload::Response { permitted: false });
        assert_eq!(leader.state(), OvertakeState::Idle);
        assert!(!leader.in_maneuver());
        assert!(leader.context().scheduled.is_empty());
    }

    #[test]
    fn busy_leader_denies_a_second_overtaker() {
        let mut leader = tracking_leader();
        leader.on_message(&message(8, LEADER, Payload::Request)).unwrap();

        let out = sent(&mut leader);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].destination(), 8);
        assert_eq!(out[0].payload, Payload::Response { permitted: false });
        assert_eq!(leader.overtaker_record().unwrap().overtaker_id, OVERTAKER);
        assert_eq!(leader.state(), OvertakeState::WaitPosition);
    }

    #[test]
    fn request_for_another_platoon_gets_no_reply() {
        let mut leader = member(LEADER, 100.0);
        let mut req = message(OVERTAKER, LEADER, Payload::Request);
        req.envelope.platoon_id = 2;

        let reason = mismatch_reason(leader.on_message(&req));
        assert_eq!(
            reason,
            MismatchReason::WrongPlatoon {
                expected: Some(PLATOON),
                actual: 2
            }
        );
        assert!(sent(&mut leader).is_empty());
    }

    #[test]
    fn follower_ignores_requests() {
        let mut follower = member(1, 90.0);
        let reason = mismatch_reason(follower.on_message(&message(OVERTAKER, 1, Payload::Request)));
        assert_eq!(
            reason,
            MismatchReason::WrongRole {
                role: VehicleRole::Follower
            }
        );
        assert!(sent(&mut follower).is_empty());
    }

    #[test]
    fn message_for_someone_else_is_ignored() {
        let mut leader = member(LEADER, 100.0);
        let reason = mismatch_reason(leader.on_message(&message(OVERTAKER, 5, Payload::Request)));
        assert_eq!(reason, MismatchReason::NotAddressed { destination: 5 });
    }

    // ── Response ──────────────────────────────────────────────────────────────

    #[test]
    fn permitted_response_moves_to_the_passing_lane() {
        let o = overtaking(60.0);
        assert_eq!(o.state(), OvertakeState::Overtaking);
        assert_eq!(o.context().lane_changes, vec![LaneDirection::Left]);
        assert_eq!(o.context().last_speed(), Some(o.config().speeds.overtake));
    }

    #[test]
    fn denied_response_rolls_back_to_idle() {
        let mut o = waiting_for_reply();
        o.on_message(&message(LEADER, OVERTAKER, Payload::Response { permitted: false }))
            .unwrap();

        assert_eq!(o.state(), OvertakeState::Idle);
        assert_eq!(o.role(), VehicleRole::None);
        assert!(!o.in_maneuver());
        assert!(o.context().lane_changes.is_empty());
        assert!(o.context().speeds.is_empty());
    }

    #[test]
    fn response_from_another_vehicle_is_ignored() {
        let mut o = waiting_for_reply();
        let reason = mismatch_reason(
            o.on_message(&message(3, OVERTAKER, Payload::Response { permitted: true })),
        );
        assert_eq!(
            reason,
            MismatchReason::UnexpectedSender {
                expected: LEADER,
                actual: 3
            }
        );
        assert_eq!(o.state(), OvertakeState::WaitReply);
    }

    #[test]
    fn response_while_idle_is_ignored() {
        let mut o = free_vehicle(60.0);
        let result = o.on_message(&message(LEADER, OVERTAKER, Payload::Response { permitted: true }));
        assert!(matches!(
            mismatch_reason(result),
            MismatchReason::WrongRole { .. }
        ));
        assert_eq!(o.state(), OvertakeState::Idle);
    }

    // ── Position table / rank ─────────────────────────────────────────────────

    #[test]
    fn rank_from_reference_table() {
        let mut leader = tracking_leader();
        report(&mut leader, 85.0).unwrap();
        assert_eq!(leader.relative_rank(), Some(RelativeRank::new(2)));
        assert_eq!(leader.position_table().unwrap().get(0), Some(100.0));
    }

    #[test]
    fn rank_never_moves_backwards_within_a_round() {
        let mut leader = tracking_leader();
        report(&mut leader, 85.0).unwrap();
        report(&mut leader, 60.0).unwrap();
        assert_eq!(leader.relative_rank(), Some(RelativeRank::new(2)));

        report(&mut leader, 95.0).unwrap();
        assert_eq!(leader.relative_rank(), Some(RelativeRank::new(1)));
    }

    #[test]
    fn compute_relative_rank_returns_the_effective_rank() {
        let mut leader = tracking_leader();
        assert_eq!(leader.compute_relative_rank(75.0).unwrap().value(), 3);
        assert_eq!(leader.compute_relative_rank(20.0).unwrap().value(), 3);
    }

    #[test]
    fn report_against_incomplete_table_is_ignored() {
        let mut leader = member(LEADER, 100.0);
        leader
            .on_message(&message(OVERTAKER, LEADER, Payload::Request))
            .unwrap();
        leader.on_beacon(&member_beacon(1, 90.0)).unwrap();
        leader.on_beacon(&member_beacon(2, 80.0)).unwrap();

        let reason = mismatch_reason(report(&mut leader, 85.0));
        assert_eq!(
            reason,
            MismatchReason::Position(PositionError::Incomplete { missing: 3 })
        );
        assert_eq!(leader.relative_rank(), None);
    }

    #[test]
    fn non_finite_report_leaves_the_rank_alone() {
        let mut leader = tracking_leader();
        report(&mut leader, 85.0).unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let reason = mismatch_reason(report(&mut leader, bad));
            assert_eq!(reason, MismatchReason::Position(PositionError::NonFiniteReport));
        }
        assert_eq!(leader.relative_rank().map(RelativeRank::value), Some(2));

        leader.abort_maneuver().unwrap();
        assert_eq!(leader.gap_opener(), Some(2));
    }

    #[test]
    fn report_from_unknown_vehicle_is_ignored() {
        let mut leader = tracking_leader();
        let result = leader.on_message(&message(8, LEADER, Payload::PositionReport { position: 85.0 }));
        assert!(matches!(
            mismatch_reason(result),
            MismatchReason::UnexpectedSender { expected: OVERTAKER, actual: 8 }
        ));
        assert_eq!(leader.relative_rank(), None);
    }

    #[test]
    fn beacon_with_out_of_range_slot_is_rejected() {
        let mut leader = tracking_leader();
        let bad = Beacon {
            sender_id: 7,
            platoon_id: Some(PLATOON),
            slot: Some(7),
            position: 10.0,
            speed: 0.0,
        };
        let reason = mismatch_reason(leader.on_beacon(&bad));
        assert_eq!(
            reason,
            MismatchReason::Position(PositionError::SlotOutOfRange { slot: 7, size: 4 })
        );
        report(&mut leader, 85.0).unwrap();
        assert_eq!(leader.relative_rank(), Some(RelativeRank::new(2)));
    }

    #[test]
    fn beacon_claiming_another_members_slot_is_rejected() {
        let mut leader = tracking_leader();
        let spoofed = Beacon {
            sender_id: 3,
            ..member_beacon(1, 10.0)
        };
        assert!(matches!(
            mismatch_reason(leader.on_beacon(&spoofed)),
            MismatchReason::UnexpectedSender { expected: 1, actual: 3 }
        ));
        assert_eq!(leader.position_table().unwrap().get(1), Some(90.0));
    }

    #[test]
    fn beacon_from_free_vehicle_is_not_recorded() {
        let mut leader = tracking_leader();
        let free = Beacon {
            sender_id: OVERTAKER,
            platoon_id: None,
            slot: None,
            position: 85.0,
            speed: 30.0,
        };
        assert_eq!(
            mismatch_reason(leader.on_beacon(&free)),
            MismatchReason::NotMember { vehicle: OVERTAKER }
        );
    }

    // ── Overtaker beacons ─────────────────────────────────────────────────────

    #[test]
    fn overtaker_reports_position_while_alongside() {
        let mut o = overtaking(95.0);
        o.on_beacon(&member_beacon(0, 100.0)).unwrap();

        let out = sent(&mut o);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, Payload::PositionReport { position: 95.0 });
        assert_eq!(out[0].destination(), LEADER);
    }

    #[test]
    fn overtaker_exactly_at_clearance_keeps_reporting() {
        let mut o = overtaking(110.0);
        o.on_beacon(&member_beacon(0, 100.0)).unwrap();
        assert_eq!(o.state(), OvertakeState::Overtaking);
        assert!(matches!(sent(&mut o)[0].payload, Payload::PositionReport { .. }));
    }

    #[test]
    fn overtaker_finishes_once_clear_of_the_leader() {
        let mut o = overtaking(115.0);
        o.on_beacon(&member_beacon(0, 100.0)).unwrap();

        let out = sent(&mut o);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, Payload::FinishAck);
        assert_eq!(o.state(), OvertakeState::Idle);
        assert_eq!(o.role(), VehicleRole::None);
        assert_eq!(o.context().lane(), 0);

        // A further beacon must not trigger a second lane change.
        assert!(o.on_beacon(&member_beacon(0, 100.0)).is_err());
        assert_eq!(
            o.context()
                .lane_changes
                .iter()
                .filter(|d| **d == LaneDirection::Right)
                .count(),
            1
        );
    }

    #[test]
    fn overtaker_ignores_beacons_of_other_members() {
        let mut o = overtaking(85.0);
        assert!(o.on_beacon(&member_beacon(2, 80.0)).is_err());
        assert!(sent(&mut o).is_empty());
    }

    // ── Abort bands ───────────────────────────────────────────────────────────

    #[test]
    fn near_front_abort_slows_the_platoon() {
        let mut leader = tracking_leader();
        report(&mut leader, 95.0).unwrap();
        leader.abort_maneuver().unwrap();

        assert!(sent(&mut leader).is_empty());
        assert_eq!(leader.state(), OvertakeState::WaitJoin);
        assert_eq!(
            leader.context().last_speed(),
            Some(leader.config().speeds.platoon_yield)
        );

        leader
            .on_message(&message(OVERTAKER, LEADER, Payload::FinishAck))
            .unwrap();
        assert_eq!(leader.state(), OvertakeState::Idle);
        assert_eq!(leader.role(), VehicleRole::Leader);
        assert_eq!(
            leader.context().last_speed(),
            Some(leader.config().speeds.platoon)
        );
    }

    #[test]
    fn mid_abort_pauses_overtaker_and_designates_gap_opener() {
        let mut leader = tracking_leader();
        report(&mut leader, 85.0).unwrap();
        leader.abort_maneuver().unwrap();

        let out = sent(&mut leader);
        let expected = Payload::PauseOrder {
            overtaker_id: OVERTAKER,
            is_tail_case: false,
        };
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].destination(), OVERTAKER);
        assert_eq!(out[1].destination(), 2);
        assert!(out.iter().all(|m| m.payload == expected));
        assert_eq!(leader.gap_opener(), Some(2));
        assert_eq!(leader.state(), OvertakeState::WaitJoin);
    }

    #[test]
    fn gap_opener_offset_shifts_the_designated_member() {
        let config = ManeuverConfig {
            gap_opener_offset: 1,
            tail_band: 0,
            ..ManeuverConfig::default()
        };
        let mut leader = tracking_leader_with(config);
        report(&mut leader, 75.0).unwrap();
        leader.abort_maneuver().unwrap();
        assert_eq!(leader.gap_opener(), Some(2));
    }

    #[test]
    fn tail_abort_sends_overtaker_back() {
        let mut leader = tracking_leader();
        report(&mut leader, 60.0).unwrap();
        leader.abort_maneuver().unwrap();

        let out = sent(&mut leader);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].payload,
            Payload::PauseOrder {
                overtaker_id: OVERTAKER,
                is_tail_case: true
            }
        );
        assert_eq!(leader.state(), OvertakeState::WaitDangerEnd);
        assert_eq!(leader.gap_opener(), None);
    }

    #[test]
    fn abort_before_any_report_is_a_tail_abort() {
        let mut leader = tracking_leader();
        leader.abort_maneuver().unwrap();
        let out = sent(&mut leader);
        assert!(matches!(
            out[0].payload,
            Payload::PauseOrder { is_tail_case: true, .. }
        ));
    }

    #[test]
    fn abort_outside_position_tracking_is_ignored() {
        let mut leader = member(LEADER, 100.0);
        assert!(matches!(
            leader.abort_maneuver(),
            Err(ManeuverError::ProtocolMismatch { event: "abort_maneuver", .. })
        ));
        let mut tail = tracking_leader();
        tail.abort_maneuver().unwrap();
        assert!(tail.abort_maneuver().is_err());
        assert!(tail.restart_maneuver().is_ok());
        assert!(tail.restart_maneuver().is_err());
    }

    #[test]
    fn finish_ack_is_ignored_while_a_gap_opener_waits() {
        let mut leader = tracking_leader();
        report(&mut leader, 85.0).unwrap();
        leader.abort_maneuver().unwrap();

        let result = leader.on_message(&message(OVERTAKER, LEADER, Payload::FinishAck));
        assert_eq!(
            mismatch_reason(result),
            MismatchReason::WrongState {
                state: OvertakeState::WaitJoin
            }
        );
        assert!(leader.in_maneuver());
    }

    // ── Hazard watchdog ───────────────────────────────────────────────────────

    #[test]
    fn watchdog_without_hazard_only_reschedules() {
        let mut leader = tracking_leader();
        let token = leader.armed_timer(TimerKind::HazardWatchdog).unwrap();
        leader.on_timer(token).unwrap();

        assert_eq!(leader.state(), OvertakeState::WaitPosition);
        assert_eq!(leader.context().scheduled.len(), 2);
        assert_eq!(leader.context().scheduled[1].0, token);
    }

    #[test]
    fn watchdog_with_hazard_aborts_and_keeps_running() {
        let mut leader = tracking_leader();
        leader.set_hazard(true);
        let token = leader.armed_timer(TimerKind::HazardWatchdog).unwrap();
        leader.on_timer(token).unwrap();

        assert_eq!(leader.state(), OvertakeState::WaitDangerEnd);
        assert_eq!(leader.armed_timer(TimerKind::HazardWatchdog), Some(token));

        // Hazard still present: nothing to do.
        leader.on_timer(token).unwrap();
        assert_eq!(leader.state(), OvertakeState::WaitDangerEnd);

        leader.set_hazard(false);
        leader.on_timer(token).unwrap();
        assert_eq!(leader.state(), OvertakeState::WaitPosition);
    }

    #[test]
    fn watchdog_fire_after_teardown_is_a_no_op() {
        let mut leader = tracking_leader();
        let token = leader.armed_timer(TimerKind::HazardWatchdog).unwrap();
        leader.on_message(&message(OVERTAKER, LEADER, Payload::FinishAck)).unwrap();
        assert!(leader.context().cancelled.contains(&token));

        leader.set_hazard(true);
        let reason = mismatch_reason(leader.on_timer(token));
        assert_eq!(reason, MismatchReason::StaleTimer { token });
        assert!(sent(&mut leader).is_empty());
        assert_eq!(leader.state(), OvertakeState::Idle);
    }

    #[test]
    fn silent_overtaker_is_given_up_after_the_report_timeout() {
        let config = ManeuverConfig {
            report_timeout_ms: 1_500,
            ..ManeuverConfig::default()
        };
        let mut leader = tracking_leader_with(config);
        let token = leader.armed_timer(TimerKind::HazardWatchdog).unwrap();

        leader.on_timer(token).unwrap();
        leader.on_timer(token).unwrap();
        assert_eq!(leader.state(), OvertakeState::WaitPosition);

        leader.on_timer(token).unwrap();
        assert_eq!(leader.state(), OvertakeState::Idle);
        assert_eq!(leader.role(), VehicleRole::Leader);
        assert!(leader.context().cancelled.contains(&token));
        assert_invariants(&leader);

        // Free again for the next overtaker.
        leader
            .on_message(&message(8, LEADER, Payload::Request))
            .unwrap();
        assert_eq!(
            sent(&mut leader)[0].payload,
            Payload::Response { permitted: true }
        );
    }

    #[test]
    fn position_reports_keep_the_round_alive() {
        let config = ManeuverConfig {
            report_timeout_ms: 1_000,
            ..ManeuverConfig::default()
        };
        let mut leader = tracking_leader_with(config);
        let token = leader.armed_timer(TimerKind::HazardWatchdog).unwrap();

        for _ in 0..5 {
            leader.on_timer(token).unwrap();
            report(&mut leader, 85.0).unwrap();
        }
        assert_eq!(leader.state(), OvertakeState::WaitPosition);
    }

    #[test]
    fn silence_is_not_counted_while_waiting_for_the_hazard_to_clear() {
        let config = ManeuverConfig {
            report_timeout_ms: 500,
            ..ManeuverConfig::default()
        };
        let mut leader = tracking_leader_with(config);
        leader.set_hazard(true);
        let token = leader.armed_timer(TimerKind::HazardWatchdog).unwrap();

        for _ in 0..4 {
            leader.on_timer(token).unwrap();
        }
        assert_eq!(leader.state(), OvertakeState::WaitDangerEnd);
    }

    // ── Pause: overtaker side ─────────────────────────────────────────────────

    #[test]
    fn pause_holds_position_and_reports() {
        let mut o = overtaking(85.0);
        o.on_message(&pause(OVERTAKER, false)).unwrap();

        assert_eq!(o.state(), OvertakeState::WaitGap);
        assert_eq!(o.context().last_speed(), Some(o.config().speeds.hold));
        assert_eq!(o.context().lane(), 1);
        let out = sent(&mut o);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, Payload::PositionReport { position: 85.0 });
    }

    #[test]
    fn tail_pause_retreats_to_the_platoon_lane() {
        let o = retreated();
        assert_eq!(o.state(), OvertakeState::WaitDangerEnd);
        assert_eq!(o.context().last_speed(), Some(o.config().speeds.retreat));
        assert_eq!(o.context().lane(), 0);
    }

    #[test]
    fn pause_from_a_member_is_ignored_by_the_overtaker() {
        let mut o = overtaking(85.0);
        let mut order = pause(OVERTAKER, false);
        order.envelope.sender_id = 2;
        assert!(o.on_message(&order).is_err());
        assert_eq!(o.state(), OvertakeState::Overtaking);
    }

    #[test]
    fn open_gap_ack_merges_and_acknowledges() {
        let mut o = waiting_for_gap();
        o.on_message(&message(2, OVERTAKER, Payload::OpenGapAck)).unwrap();

        assert_eq!(o.state(), OvertakeState::WaitDangerEnd);
        assert_eq!(o.context().lane(), 0);
        let out = sent(&mut o);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, Payload::JoinAck);
        assert_eq!(out[0].destination(), LEADER);
    }

    #[test]
    fn restart_notice_resumes_overtaking() {
        let mut o = retreated();
        o.on_message(&message(LEADER, OVERTAKER, Payload::RestartNotice))
            .unwrap();

        assert_eq!(o.state(), OvertakeState::Overtaking);
        assert_eq!(o.context().lane(), 1);
        assert_eq!(o.context().last_speed(), Some(o.config().speeds.overtake));
    }

    // ── Pause: gap-opener side ────────────────────────────────────────────────

    #[test]
    fn pause_promotes_follower_to_temporary_leader() {
        let opener = gap_opener();

        assert_eq!(opener.role(), VehicleRole::TemporaryLeader);
        assert_eq!(opener.state(), OvertakeState::OpenGap);
        assert_eq!(opener.context().spacings, vec![opener.config().gap_target]);
        let token = opener.armed_timer(TimerKind::GapPoll).unwrap();
        assert_eq!(
            opener.context().scheduled,
            vec![(token, Duration::from_millis(100))]
        );
    }

    #[test]
    fn busy_follower_refuses_to_open_a_gap() {
        let mut follower = member(2, 80.0);
        follower.request_overtake(5, 50).unwrap();

        let reason = mismatch_reason(follower.on_message(&pause(2, false)));
        assert_eq!(reason, MismatchReason::Busy);
        assert_eq!(follower.role(), VehicleRole::Overtaker);
    }

    #[test]
    fn pause_from_a_non_leader_does_not_promote() {
        let mut follower = member(2, 80.0);
        let mut order = pause(2, false);
        order.envelope.sender_id = 1;
        assert!(follower.on_message(&order).is_err());
        assert_eq!(follower.role(), VehicleRole::Follower);
    }

    #[test]
    fn gap_poll_waits_until_the_gap_is_open() {
        let mut opener = gap_opener();
        let token = opener.armed_timer(TimerKind::GapPoll).unwrap();
        opener.on_timer(token).unwrap();

        assert!(sent(&mut opener).is_empty());
        assert_eq!(opener.context().scheduled.len(), 2);
        assert_eq!(opener.armed_timer(TimerKind::GapPoll), Some(token));
    }

    #[test]
    fn open_gap_is_acknowledged_exactly_once() {
        let mut opener = gap_opener();
        let token = opener.armed_timer(TimerKind::GapPoll).unwrap();
        opener.context_mut().gap = 25.0;
        opener.on_timer(token).unwrap();

        let out = sent(&mut opener);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, Payload::OpenGapAck);
        assert_eq!(out[0].destination(), OVERTAKER);
        assert_eq!(opener.armed_timer(TimerKind::GapPoll), None);
        assert!(opener.context().cancelled.contains(&token));

        assert!(opener.on_timer(token).is_err());
        assert!(sent(&mut opener).is_empty());
        assert_eq!(opener.state(), OvertakeState::OpenGap);
    }

    #[test]
    fn restart_notice_releases_the_gap_opener() {
        let mut opener = gap_opener();
        opener
            .on_message(&message(LEADER, 2, Payload::RestartNotice))
            .unwrap();

        assert_eq!(opener.state(), OvertakeState::Idle);
        assert_eq!(opener.role(), VehicleRole::Follower);
        assert_eq!(
            opener.context().spacings.last().copied(),
            Some(opener.config().nominal_spacing)
        );
        assert!(opener.armed_timer(TimerKind::GapPoll).is_none());
    }

    #[test]
    fn restart_notice_from_a_non_leader_is_ignored() {
        let mut opener = gap_opener();
        assert!(opener.on_message(&message(3, 2, Payload::RestartNotice)).is_err());
        assert_eq!(opener.state(), OvertakeState::OpenGap);
    }

    // ── Delivery failure ──────────────────────────────────────────────────────

    #[test]
    fn delivery_failure_rolls_back_from_every_state() {
        let near_front_leader = {
            let mut l = tracking_leader();
            report(&mut l, 95.0).unwrap();
            l.abort_maneuver().unwrap();
            l
        };
        let tail_leader = {
            let mut l = tracking_leader();
            l.abort_maneuver().unwrap();
            l
        };

        let cases: Vec<(&str, Coordinator, VehicleId, VehicleRole)> = vec![
            ("overtaker WaitReply", waiting_for_reply(), LEADER, VehicleRole::None),
            ("overtaker Overtaking", overtaking(85.0), LEADER, VehicleRole::None),
            ("overtaker WaitGap", waiting_for_gap(), LEADER, VehicleRole::None),
            ("overtaker WaitDangerEnd", retreated(), LEADER, VehicleRole::None),
            ("leader WaitPosition", tracking_leader(), OVERTAKER, VehicleRole::Leader),
            ("leader WaitJoin", near_front_leader, OVERTAKER, VehicleRole::Leader),
            ("leader WaitDangerEnd", tail_leader, OVERTAKER, VehicleRole::Leader),
            ("temporary leader OpenGap", gap_opener(), OVERTAKER, VehicleRole::Follower),
        ];

        for (name, mut c, counterpart, base_role) in cases {
            let from = c.state();
            assert_ne!(from, OvertakeState::Idle, "{name}");
            let lost = message(c.id(), counterpart, Payload::JoinAck);

            assert_eq!(c.on_failed_delivery(&lost), from, "{name}");
            assert_eq!(c.state(), OvertakeState::Idle, "{name}");
            assert_eq!(c.role(), base_role, "{name}");
            assert_invariants(&c);
        }
    }

    #[test]
    fn rollback_undoes_lingering_actuation() {
        let mut opener = gap_opener();
        opener.on_failed_delivery(&message(2, OVERTAKER, Payload::OpenGapAck));
        assert_eq!(opener.context().spacings.last().copied(), Some(5.0));

        let mut leader = tracking_leader();
        report(&mut leader, 95.0).unwrap();
        leader.abort_maneuver().unwrap();
        let token = leader.armed_timer(TimerKind::HazardWatchdog).unwrap();
        leader.on_failed_delivery(&message(LEADER, OVERTAKER, Payload::RestartNotice));
        assert_eq!(
            leader.context().last_speed(),
            Some(leader.config().speeds.platoon)
        );
        assert!(leader.context().cancelled.contains(&token));
    }

    #[test]
    fn rollback_returns_the_overtaker_to_the_platoon_lane() {
        let platoon_speed = ManeuverConfig::default().speeds.platoon;
        for (name, mut o) in [
            ("Overtaking", overtaking(85.0)),
            ("WaitGap", waiting_for_gap()),
            ("WaitDangerEnd", retreated()),
        ] {
            o.on_failed_delivery(&message(
                OVERTAKER,
                LEADER,
                Payload::PositionReport { position: 85.0 },
            ));
            assert_eq!(o.state(), OvertakeState::Idle, "{name}");
            assert_eq!(o.context().lane(), 0, "{name}");
            assert_eq!(o.context().last_speed(), Some(platoon_speed), "{name}");
        }

        // Nothing was commanded before the Response, so nothing is undone.
        let mut o = waiting_for_reply();
        o.on_failed_delivery(&message(OVERTAKER, LEADER, Payload::Request));
        assert!(o.context().lane_changes.is_empty());
        assert!(o.context().speeds.is_empty());
    }

    #[test]
    fn failed_denial_to_another_vehicle_keeps_the_admitted_round() {
        let mut leader = tracking_leader();
        leader
            .on_message(&message(8, LEADER, Payload::Request))
            .unwrap();
        let denial = sent(&mut leader).pop().unwrap();
        assert_eq!(denial.payload, Payload::Response { permitted: false });

        assert_eq!(leader.on_failed_delivery(&denial), OvertakeState::Idle);
        assert_eq!(leader.state(), OvertakeState::WaitPosition);
        assert!(leader.armed_timer(TimerKind::HazardWatchdog).is_some());
        assert!(leader.context().cancelled.is_empty());
        assert_invariants(&leader);
    }

    #[test]
    fn delivery_failure_while_idle_changes_nothing() {
        let mut leader = member(LEADER, 100.0);
        let from = leader.on_failed_delivery(&message(
            LEADER,
            OVERTAKER,
            Payload::Response { permitted: false },
        ));
        assert_eq!(from, OvertakeState::Idle);
        assert_eq!(leader.role(), VehicleRole::Leader);
        assert!(leader.context().cancelled.is_empty());
    }

    // ── End-to-end over a lossless in-memory network ──────────────────────────

    struct Fleet {
        vehicles: BTreeMap<VehicleId, Coordinator>,
    }

    impl Fleet {
        fn new(overtaker_position: f64) -> Self {
            let mut vehicles = BTreeMap::new();
            for (id, position) in [(0, 100.0), (1, 90.0), (2, 80.0), (3, 70.0)] {
                vehicles.insert(id, member(id, position));
            }
            vehicles.insert(OVERTAKER, free_vehicle(overtaker_position));
            Self { vehicles }
        }

        fn get(&mut self, id: VehicleId) -> &mut Coordinator {
            self.vehicles.get_mut(&id).unwrap()
        }

        fn check(&self) {
            self.vehicles.values().for_each(assert_invariants);
        }

        /// Deliver every queued message (and whatever they trigger) in send
        /// order.  Returns everything delivered.
        fn pump(&mut self) -> Vec<ManeuverMessage> {
            let mut delivered = Vec::new();
            loop {
                let queue: Vec<ManeuverMessage> = self
                    .vehicles
                    .values_mut()
                    .flat_map(|c| std::mem::take(&mut c.context_mut().outbox))
                    .collect();
                if queue.is_empty() {
                    return delivered;
                }
                for msg in queue {
                    if let Some(c) = self.vehicles.get_mut(&msg.destination()) {
                        let _ = c.on_message(&msg);
                    }
                    self.check();
                    delivered.push(msg);
                }
            }
        }

        fn broadcast_beacons(&mut self) {
            let beacons: Vec<Beacon> = self
                .vehicles
                .values()
                .map(|c| Beacon {
                    sender_id: c.id(),
                    platoon_id: c.membership().map(PlatoonMembership::platoon_id),
                    slot: c.membership().and_then(|m| m.slot_of(c.id())),
                    position: c.context().position,
                    speed: 0.0,
                })
                .collect();
            for beacon in &beacons {
                for (id, c) in self.vehicles.iter_mut() {
                    if *id != beacon.sender_id {
                        let _ = c.on_beacon(beacon);
                    }
                }
            }
            self.check();
        }

        fn fire(&mut self, id: VehicleId, kind: TimerKind) -> Result<(), ManeuverError> {
            let c = self.get(id);
            let token = c.armed_timer(kind).expect("timer armed");
            c.on_timer(token)
        }
    }

    #[test]
    fn overtake_without_hazard_completes() {
        let mut fleet = Fleet::new(60.0);
        fleet.get(OVERTAKER).request_overtake(PLATOON, LEADER).unwrap();
        fleet.pump();
        assert_eq!(fleet.get(LEADER).state(), OvertakeState::WaitPosition);
        assert_eq!(fleet.get(OVERTAKER).state(), OvertakeState::Overtaking);

        for position in [80.0, 95.0, 105.0, 115.0] {
            fleet.get(OVERTAKER).context_mut().position = position;
            fleet.broadcast_beacons();
            fleet.pump();
        }

        for id in [LEADER, 1, 2, 3, OVERTAKER] {
            assert_eq!(fleet.get(id).state(), OvertakeState::Idle, "vehicle {id}");
        }
        assert_eq!(fleet.get(OVERTAKER).context().lane(), 0);
        assert_eq!(fleet.get(LEADER).role(), VehicleRole::Leader);
    }

    #[test]
    fn mid_platoon_hazard_pause_merge_and_restart() {
        let mut fleet = Fleet::new(60.0);
        fleet.get(OVERTAKER).request_overtake(PLATOON, LEADER).unwrap();
        fleet.pump();

        fleet.broadcast_beacons();
        fleet.pump();
        assert_eq!(fleet.get(LEADER).relative_rank(), Some(RelativeRank::new(4)));

        fleet.get(OVERTAKER).context_mut().position = 85.0;
        fleet.broadcast_beacons();
        fleet.pump();
        assert_eq!(fleet.get(LEADER).relative_rank(), Some(RelativeRank::new(2)));

        // Hazard: abort with the overtaker between F1 and F2.
        fleet.get(LEADER).set_hazard(true);
        fleet.fire(LEADER, TimerKind::HazardWatchdog).unwrap();
        fleet.pump();
        assert_eq!(fleet.get(LEADER).state(), OvertakeState::WaitJoin);
        assert_eq!(fleet.get(OVERTAKER).state(), OvertakeState::WaitGap);
        assert_eq!(fleet.get(2).state(), OvertakeState::OpenGap);
        assert_eq!(fleet.get(2).role(), VehicleRole::TemporaryLeader);

        // Gap opens over two polls.
        fleet.fire(2, TimerKind::GapPoll).unwrap();
        assert!(fleet.pump().is_empty());
        fleet.get(2).context_mut().gap = 21.0;
        fleet.fire(2, TimerKind::GapPoll).unwrap();
        let delivered = fleet.pump();
        let kinds: Vec<&str> = delivered.iter().map(ManeuverMessage::kind).collect();
        assert_eq!(kinds, vec!["OpenGapAck", "JoinAck"]);
        assert_eq!(fleet.get(OVERTAKER).context().lane(), 0);
        assert_eq!(fleet.get(OVERTAKER).state(), OvertakeState::WaitDangerEnd);
        assert_eq!(fleet.get(LEADER).state(), OvertakeState::WaitDangerEnd);

        // Hazard persists: nothing moves.
        fleet.fire(LEADER, TimerKind::HazardWatchdog).unwrap();
        assert!(fleet.pump().is_empty());

        // Hazard clears: everyone is released.
        fleet.get(LEADER).set_hazard(false);
        fleet.fire(LEADER, TimerKind::HazardWatchdog).unwrap();
        fleet.pump();
        assert_eq!(fleet.get(LEADER).state(), OvertakeState::WaitPosition);
        assert_eq!(fleet.get(LEADER).relative_rank(), None);
        assert!(!fleet.get(LEADER).position_table().unwrap().is_complete());
        assert_eq!(fleet.get(2).state(), OvertakeState::Idle);
        assert_eq!(fleet.get(2).role(), VehicleRole::Follower);
        assert_eq!(fleet.get(2).context().spacings.last().copied(), Some(5.0));
        assert_eq!(fleet.get(OVERTAKER).state(), OvertakeState::Overtaking);
        assert_eq!(fleet.get(OVERTAKER).context().lane(), 1);

        // Second attempt runs to completion.
        fleet.get(OVERTAKER).context_mut().position = 115.0;
        fleet.broadcast_beacons();
        fleet.pump();
        for id in [LEADER, 1, 2, 3, OVERTAKER] {
            assert_eq!(fleet.get(id).state(), OvertakeState::Idle, "vehicle {id}");
            assert!(!fleet.get(id).in_maneuver());
        }
    }

    #[test]
    fn tail_hazard_retreat_and_resume() {
        let mut fleet = Fleet::new(60.0);
        fleet.get(OVERTAKER).request_overtake(PLATOON, LEADER).unwrap();
        fleet.pump();
        fleet.broadcast_beacons();
        fleet.pump();

        fleet.get(LEADER).set_hazard(true);
        fleet.fire(LEADER, TimerKind::HazardWatchdog).unwrap();
        let delivered = fleet.pump();
        assert_eq!(delivered.len(), 1);
        assert_eq!(fleet.get(OVERTAKER).state(), OvertakeState::WaitDangerEnd);
        assert_eq!(fleet.get(OVERTAKER).context().lane(), 0);
        for id in 1..=3 {
            assert_eq!(fleet.get(id).role(), VehicleRole::Follower);
        }

        fleet.get(LEADER).set_hazard(false);
        fleet.fire(LEADER, TimerKind::HazardWatchdog).unwrap();
        let delivered = fleet.pump();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload, Payload::RestartNotice);
        assert_eq!(fleet.get(OVERTAKER).state(), OvertakeState::Overtaking);
        assert_eq!(fleet.get(OVERTAKER).context().lane(), 1);
    }
}
