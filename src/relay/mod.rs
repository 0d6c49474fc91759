//! Network move relay.
//!
//! Wraps the move pipeline for networked play. This is the only place that
//! translates between the display frame and the canonical wire frame, and the
//! only place that knows about desynchronization.

mod messages;
mod recovery;
mod state;

pub use messages::{ChannelBus, ClientMessage, MessageBus, ServerMessage, SyncReason, SyncState};
pub use recovery::{Inference, RecoveryTimer, SessionRecoveryProtocol};
pub use state::NetworkSessionState;

use crate::error::{SessionError, SessionErrorKind};
use crate::frame;
use crate::pipeline::{MoveExecutionPipeline, MoveOutcome, UnsafeMovePolicy};
use crate::rules::RulesEngine;
use crate::types::{Move, Position, SessionStatus, Side};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Something the relay wants the controller to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayNotice<P> {
    /// The local side became known.
    SideConfirmed {
        /// Local side.
        side: Side,
        /// True if it was inferred from an opponent move.
        inferred: bool,
    },
    /// An opponent move was applied.
    MoveApplied {
        /// Canonical move.
        mv: Move,
        /// Captured piece, if any.
        captured: Option<P>,
        /// Status after the move.
        status: SessionStatus,
        /// True if the move ended the game.
        game_ended: bool,
        /// True if the move was unsafe and accepted by policy.
        unsafe_warning: bool,
    },
    /// The unacknowledged local move was taken back.
    MoveRetracted {
        /// Side to move after the rollback.
        side_to_move: Side,
    },
    /// Recoverable trouble; play continues.
    Advisory(String),
    /// The room reported a finished game and the session was concluded.
    Concluded(SessionStatus),
    /// The session is torn down and must be rejoined.
    Fatal(String),
    /// The link went away.
    Disconnected(String),
}

/// Relay policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct RelayPolicy {
    /// Accept opponent moves the rules engine flags as unsafe.
    pub accept_unsafe_remote_moves: bool,
    /// Flip the display frame when the local side is SECOND.
    pub flip_for_second: bool,
    /// How long to wait for a session-start message after joining.
    pub session_start_window: Duration,
    /// How long to wait for a sync reply.
    pub sync_reply_timeout: Duration,
}

/// Relays moves between the local pipeline and the room.
pub struct NetworkMoveRelay<E> {
    bus: Arc<dyn MessageBus>,
    state: NetworkSessionState,
    recovery: SessionRecoveryProtocol<E>,
    policy: RelayPolicy,
}

impl<E> NetworkMoveRelay<E>
where
    E: From<RecoveryTimer> + Send + 'static,
{
    /// Creates a relay for `player_id` in `room_id`; recovery timers are
    /// reported on `tx`.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        player_id: impl Into<String>,
        room_id: impl Into<String>,
        policy: RelayPolicy,
        tx: mpsc::UnboundedSender<E>,
    ) -> Self {
        Self {
            bus,
            state: NetworkSessionState::new(player_id, room_id),
            recovery: SessionRecoveryProtocol::new(
                tx,
                policy.session_start_window,
                policy.sync_reply_timeout,
            ),
            policy,
        }
    }

    /// Current network session state.
    pub fn state(&self) -> &NetworkSessionState {
        &self.state
    }

    /// Confirmed local side.
    pub fn local_side(&self) -> Option<Side> {
        *self.state.local_side()
    }

    /// Side the display frame is drawn for, if flipping is enabled.
    pub fn perspective(&self) -> Option<Side> {
        if self.policy.flip_for_second {
            self.local_side()
        } else {
            None
        }
    }

    /// Sends the join request and starts the session-start detection window.
    #[instrument(
        skip(self),
        fields(player = %self.state.player_id(), room = %self.state.room_id())
    )]
    pub fn join(&mut self) -> Result<(), SessionError> {
        self.state.reset();
        self.bus.send(ClientMessage::Join {
            player_id: self.state.player_id().clone(),
            room_id: self.state.room_id().clone(),
        })?;
        self.recovery.arm_start_window();
        info!("Join sent");
        Ok(())
    }

    /// Sends the leave notice and drops all session state and timers.
    #[instrument(skip(self), fields(player = %self.state.player_id()))]
    pub fn leave(&mut self) -> Result<(), SessionError> {
        self.recovery.cancel_all();
        self.state.reset();
        self.bus.send(ClientMessage::Leave {
            player_id: self.state.player_id().clone(),
        })
    }

    /// Stops recovery timers without touching the wire.
    pub fn cancel_timers(&mut self) {
        self.recovery.cancel_all();
    }

    /// Applies and sends a move given in the display frame.
    #[instrument(skip(self, pipeline))]
    pub fn send_local_move<R: RulesEngine>(
        &mut self,
        pipeline: &mut MoveExecutionPipeline<R>,
        from_local: Position,
        to_local: Position,
    ) -> Result<MoveOutcome<R::Piece>, SessionError> {
        let size = pipeline.rules().board_size(pipeline.board());
        let perspective = self.perspective();
        let from = frame::to_canonical(from_local, perspective, size);
        let to = frame::to_canonical(to_local, perspective, size);
        self.send_canonical_move(pipeline, from, to)
    }

    /// Applies and sends a canonical move for the local side.
    ///
    /// Local application is optimistic: the move is applied before it is
    /// acknowledged. Further local input is refused until the opponent
    /// answers.
    #[instrument(skip(self, pipeline))]
    pub fn send_canonical_move<R: RulesEngine>(
        &mut self,
        pipeline: &mut MoveExecutionPipeline<R>,
        from: Position,
        to: Position,
    ) -> Result<MoveOutcome<R::Piece>, SessionError> {
        if *self.state.torn_down() {
            return Err(SessionError::new(SessionErrorKind::FatalProtocolViolation(
                "session torn down; rejoin to continue".to_string(),
            )));
        }
        let Some(local) = self.local_side() else {
            return Err(SessionError::new(SessionErrorKind::IllegalInput(
                "side not assigned yet".to_string(),
            )));
        };
        if *self.state.awaiting_remote_move() {
            return Err(SessionError::new(SessionErrorKind::IllegalInput(
                "waiting for the opponent's move".to_string(),
            )));
        }

        let outcome = pipeline.attempt_move(from, to, local);
        if outcome.is_applied() {
            if let Err(err) = self.bus.send(ClientMessage::Move { from, to }) {
                warn!(%from, %to, error = %err, "Move not sent, taking it back");
                pipeline.retract_last();
                return Err(err);
            }
            self.state.set_awaiting_remote_move(true);
            debug!(%from, %to, "Local move sent");
        }
        Ok(outcome)
    }

    /// Handles an error reported by the room.
    ///
    /// While a local move is unanswered the error is the room refusing it:
    /// the move is taken back and the room's record is requested.
    #[instrument(skip(self, pipeline))]
    pub fn on_room_error<R: RulesEngine>(
        &mut self,
        pipeline: &mut MoveExecutionPipeline<R>,
        message: String,
    ) -> Vec<RelayNotice<R::Piece>> {
        let mut notices = Vec::new();
        if !*self.state.awaiting_remote_move() {
            notices.push(RelayNotice::Advisory(format!("room error: {message}")));
            return notices;
        }

        self.state.set_awaiting_remote_move(false);
        match pipeline.retract_last() {
            Some(snapshot) => {
                warn!(%message, sequence = snapshot.sequence(), "Room refused the local move");
                notices.push(RelayNotice::MoveRetracted {
                    side_to_move: pipeline.side_to_move(),
                });
            }
            None => warn!(%message, "Room refused a move that is no longer in history"),
        }
        self.desync(
            &mut notices,
            format!("room refused the last move ({message})"),
            SyncReason::LocalMoveRefused,
        );
        notices
    }

    /// Handles an opponent move, canonical frame.
    #[instrument(skip(self, pipeline))]
    pub fn on_remote_move<R: RulesEngine>(
        &mut self,
        pipeline: &mut MoveExecutionPipeline<R>,
        from: Position,
        to: Position,
    ) -> Vec<RelayNotice<R::Piece>> {
        let mut notices = Vec::new();
        if *self.state.torn_down() {
            warn!("Ignoring opponent move on a torn-down session");
            return notices;
        }

        let size = pipeline.rules().board_size(pipeline.board());
        if !size.contains(from) || !size.contains(to) {
            self.desync(
                &mut notices,
                format!("opponent move {from} -> {to} is off the {size} board"),
                SyncReason::RemoteMoveRejected,
            );
            return notices;
        }

        let Some(mover) = pipeline.rules().piece_side(pipeline.board(), from) else {
            self.desync(
                &mut notices,
                format!("opponent moved from empty square {from}"),
                SyncReason::UnknownPieceOwner,
            );
            return notices;
        };

        match self.recovery.infer_from_remote_piece(&mut self.state, mover) {
            Inference::Consistent => {}
            Inference::Inferred { local_side } => notices.push(RelayNotice::SideConfirmed {
                side: local_side,
                inferred: true,
            }),
            Inference::Violation { message } => {
                self.tear_down(&mut notices, message);
                return notices;
            }
        }

        let policy = if self.policy.accept_unsafe_remote_moves {
            UnsafeMovePolicy::Warn
        } else {
            UnsafeMovePolicy::Reject
        };
        match pipeline.attempt_move_with(from, to, mover, policy) {
            MoveOutcome::Applied {
                captured,
                status,
                game_ended,
                unsafe_warning,
            } => {
                self.state.set_awaiting_remote_move(false);
                if game_ended {
                    self.recovery.cancel_all();
                }
                notices.push(RelayNotice::MoveApplied {
                    mv: Move::new(from, to),
                    captured,
                    status,
                    game_ended,
                    unsafe_warning,
                });
            }
            MoveOutcome::AlreadyEnded => {
                warn!("Opponent move after game end ignored");
            }
            rejected => self.desync(
                &mut notices,
                format!("opponent move {from} -> {to} rejected locally ({rejected:?})"),
                SyncReason::RemoteMoveRejected,
            ),
        }
        notices
    }

    /// Handles the authoritative session start.
    #[instrument(skip(self))]
    pub fn on_session_started<P>(&mut self, side: Side) -> Vec<RelayNotice<P>> {
        let mut notices = Vec::new();
        self.recovery.on_session_started();
        match self.local_side() {
            None => {
                self.state.confirm(side);
                notices.push(RelayNotice::SideConfirmed {
                    side,
                    inferred: false,
                });
            }
            Some(local) if local == side => debug!("Session start repeats the known side"),
            Some(local) => self.tear_down(
                &mut notices,
                format!("room assigned {side} but this player is confirmed as {local}"),
            ),
        }
        notices
    }

    /// Handles the room's answer to a sync request.
    #[instrument(skip(self, pipeline))]
    pub fn on_sync_reply<R: RulesEngine>(
        &mut self,
        pipeline: &mut MoveExecutionPipeline<R>,
        reply: SyncState,
    ) -> Vec<RelayNotice<R::Piece>> {
        let mut notices = Vec::new();
        self.recovery.on_sync_reply();
        if !reply.success {
            let reason = reply.error.unwrap_or_else(|| "no reason given".to_string());
            notices.push(RelayNotice::Advisory(format!("state sync failed: {reason}")));
            return notices;
        }

        // A seat is not a side until the room has started the session; the
        // side is confirmed later by the session-start message.
        if !reply.started {
            info!(seat = ?reply.your_side, "Room has not started the session");
            notices.push(RelayNotice::Advisory(
                "seated, waiting for an opponent to join".to_string(),
            ));
            return notices;
        }

        if let Some(assigned) = reply.your_side {
            match self.local_side() {
                None => {
                    self.state.confirm(assigned);
                    self.recovery.on_session_started();
                    notices.push(RelayNotice::SideConfirmed {
                        side: assigned,
                        inferred: false,
                    });
                }
                Some(local) if local != assigned => {
                    self.tear_down(
                        &mut notices,
                        format!(
                            "room reports side {assigned} but this player is confirmed as {local}"
                        ),
                    );
                    return notices;
                }
                Some(_) => {}
            }
        }

        if reply.game_over {
            let status = reply.winner.map_or(SessionStatus::Draw, SessionStatus::win_for);
            if pipeline.conclude(status) {
                info!(%status, "Room reports the game finished");
                self.recovery.cancel_all();
                notices.push(RelayNotice::Concluded(status));
            }
            return notices;
        }

        if let Some(remote_turn) = reply.side_to_move
            && remote_turn != pipeline.side_to_move()
        {
            warn!(%remote_turn, local_turn = %pipeline.side_to_move(), "Turn mismatch with room");
            notices.push(RelayNotice::Advisory(format!(
                "room says {remote_turn} is to move, local board says {}",
                pipeline.side_to_move()
            )));
        }
        notices
    }

    /// Handles a recovery timer.
    #[instrument(skip(self))]
    pub fn on_timer<P>(&mut self, timer: RecoveryTimer) -> Vec<RelayNotice<P>> {
        let mut notices = Vec::new();
        if !self.recovery.accept(timer) {
            return notices;
        }
        match timer {
            RecoveryTimer::StartWindowElapsed { .. } => {
                if *self.state.session_confirmed() {
                    return notices;
                }
                warn!("No session start received, requesting state sync");
                notices.push(RelayNotice::Advisory(
                    "session start not received; requesting state sync".to_string(),
                ));
                if let Err(err) = self.request_sync(SyncReason::SessionStartMissing) {
                    notices.push(RelayNotice::Advisory(err.kind.to_string()));
                }
            }
            RecoveryTimer::SyncReplyOverdue { .. } => {
                warn!("Sync reply overdue");
                notices.push(RelayNotice::Advisory(
                    "no sync reply; the side will be inferred from the opponent's next move"
                        .to_string(),
                ));
            }
        }
        notices
    }

    /// Handles a lost link.
    #[instrument(skip(self))]
    pub fn on_disconnected<P>(&mut self, reason: String) -> Vec<RelayNotice<P>> {
        self.recovery.cancel_all();
        self.state.reset();
        vec![RelayNotice::Disconnected(reason)]
    }

    /// Sends a sync request and starts waiting for the reply.
    #[instrument(skip(self))]
    pub fn request_sync(&mut self, reason: SyncReason) -> Result<(), SessionError> {
        self.bus.send(ClientMessage::SyncRequest {
            player_id: self.state.player_id().clone(),
            room_id: self.state.room_id().clone(),
            reason: reason.to_string(),
        })?;
        self.recovery.on_sync_requested();
        Ok(())
    }

    fn desync<P>(
        &mut self,
        notices: &mut Vec<RelayNotice<P>>,
        message: String,
        reason: SyncReason,
    ) {
        warn!(%message, %reason, "Desynchronized with opponent");
        notices.push(RelayNotice::Advisory(format!("desync: {message}; requesting state sync")));
        if let Err(err) = self.request_sync(reason) {
            notices.push(RelayNotice::Advisory(err.kind.to_string()));
        }
    }

    fn tear_down<P>(&mut self, notices: &mut Vec<RelayNotice<P>>, message: String) {
        error!(%message, "Fatal protocol violation, tearing down session");
        self.recovery.cancel_all();
        self.state.tear_down();
        notices.push(RelayNotice::Fatal(message));
    }
}

impl<E> std::fmt::Debug for NetworkMoveRelay<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMoveRelay")
            .field("state", &self.state)
            .field("recovery", &self.recovery)
            .field("policy", &self.policy)
            .finish()
    }
}
