//! Session controller: the single control task.
//!
//! One task owns the pipeline, the orchestrator and the relay. Engine
//! workers, timers, the network reader and the UI all talk to it through one
//! inbound channel of [`ControlEvent`]s, and it reports to the UI through an
//! outbound channel of [`SessionEvent`]s. Nothing else mutates session state.

use crate::config::SessionConfig;
use crate::engine::{
    AiMoveOrchestrator, EngineDecision, EngineEvent, FallbackMoveGenerator, MoveSearchEngine,
};
use crate::error::{SessionError, SessionErrorKind};
use crate::frame;
use crate::pipeline::{MoveExecutionPipeline, MoveOutcome};
use crate::relay::{MessageBus, NetworkMoveRelay, RecoveryTimer, RelayNotice, ServerMessage};
use crate::rules::RulesEngine;
use crate::types::{Move, PlayerRole, Position, Roles, SessionStatus, Side};
use derive_getters::Getters;
use derive_more::From;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Inputs to the control task.
#[derive(Debug, From)]
pub enum ControlEvent<B> {
    /// A human move, display frame.
    LocalMove {
        /// Start square as shown.
        from: Position,
        /// End square as shown.
        to: Position,
    },
    /// Roll back the last move (two in human-vs-engine play).
    Undo,
    /// Start over from the opening board.
    Reset,
    /// Change who plays a side.
    SetRole {
        /// Side to change.
        side: Side,
        /// New role.
        role: PlayerRole,
    },
    /// Pause or resume engine play.
    SetPaused(bool),
    /// Join a networked match.
    JoinMatch {
        /// Player identifier.
        player_id: String,
        /// Room identifier.
        room_id: String,
    },
    /// Leave the networked match.
    Leave,
    /// Request a read-only view of the session.
    Inspect(oneshot::Sender<SessionView<B>>),
    /// Stop the control task.
    Shutdown,
    /// Engine worker or timer completion.
    #[from]
    Engine(EngineEvent),
    /// Message from the room.
    #[from]
    Network(ServerMessage),
    /// Recovery timer expiry.
    #[from]
    Recovery(RecoveryTimer),
}

/// Notifications for the presentation layer. Squares are in the display frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent<P> {
    /// Status or side to move changed.
    StatusChanged {
        /// New status.
        status: SessionStatus,
        /// Side now to move.
        side_to_move: Side,
    },
    /// A move was applied.
    MoveApplied {
        /// Side that moved.
        side: Side,
        /// Start square.
        from: Position,
        /// End square.
        to: Position,
        /// Captured piece, if any.
        captured: Option<P>,
    },
    /// A move or command was refused.
    MoveRejected(String),
    /// An engine started thinking for `side`.
    EngineThinking {
        /// Side the engine plays.
        side: Side,
    },
    /// Moves were rolled back.
    Undone {
        /// Side to move after the rollback.
        side_to_move: Side,
    },
    /// The local side in networked play became known.
    SideAssigned {
        /// Local side.
        side: Side,
        /// True if inferred from an opponent move.
        inferred: bool,
    },
    /// The display frame flipped or unflipped.
    PerspectiveChanged {
        /// True if the board is now drawn point-reflected.
        flipped: bool,
    },
    /// Engine play paused or resumed.
    PauseChanged(bool),
    /// The game ended.
    GameOver {
        /// Final status.
        status: SessionStatus,
        /// True if the result is a forfeit.
        forfeit: bool,
    },
    /// The network link or the room went away.
    Disconnected(String),
    /// Something went wrong but play continues.
    RecoverableWarning(String),
    /// The session is unusable until reset or rejoined.
    FatalSessionError(String),
}

/// Read-only view of the session, canonical board.
#[derive(Debug, Clone, Getters)]
pub struct SessionView<B> {
    /// Current board.
    board: B,
    /// Current status.
    status: SessionStatus,
    /// Side to move.
    side_to_move: Side,
    /// Role per side.
    roles: Roles,
    /// Confirmed local side in networked play.
    local_side: Option<Side>,
    /// True if the display frame is point-reflected.
    flipped: bool,
    /// Snapshots available for undo.
    history_len: usize,
    /// True while an engine request is outstanding.
    engine_busy: bool,
    /// True while paused.
    paused: bool,
    /// True if networked and waiting for the opponent.
    awaiting_remote_move: bool,
    /// True after a fatal protocol violation.
    torn_down: bool,
}

/// Cloneable sender for driving a running controller.
#[derive(Debug)]
pub struct SessionHandle<B> {
    tx: mpsc::UnboundedSender<ControlEvent<B>>,
}

impl<B> Clone for SessionHandle<B> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<B: Send + 'static> SessionHandle<B> {
    /// Sends a raw control event.
    pub fn send(&self, event: ControlEvent<B>) -> Result<(), SessionError> {
        self.tx.send(event).map_err(|_| {
            SessionError::new(SessionErrorKind::Transport("control task has stopped".to_string()))
        })
    }

    /// Submits a human move, display frame.
    pub fn submit_move(&self, from: Position, to: Position) -> Result<(), SessionError> {
        self.send(ControlEvent::LocalMove { from, to })
    }

    /// Requests an undo.
    pub fn undo(&self) -> Result<(), SessionError> {
        self.send(ControlEvent::Undo)
    }

    /// Requests a reset.
    pub fn reset(&self) -> Result<(), SessionError> {
        self.send(ControlEvent::Reset)
    }

    /// Changes who plays `side`.
    pub fn set_role(&self, side: Side, role: PlayerRole) -> Result<(), SessionError> {
        self.send(ControlEvent::SetRole { side, role })
    }

    /// Pauses or resumes engine play.
    pub fn set_paused(&self, paused: bool) -> Result<(), SessionError> {
        self.send(ControlEvent::SetPaused(paused))
    }

    /// Joins a networked match.
    pub fn join(
        &self,
        player_id: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.send(ControlEvent::JoinMatch {
            player_id: player_id.into(),
            room_id: room_id.into(),
        })
    }

    /// Leaves the networked match.
    pub fn leave(&self) -> Result<(), SessionError> {
        self.send(ControlEvent::Leave)
    }

    /// Stops the control task.
    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.send(ControlEvent::Shutdown)
    }

    /// Fetches a view of the session from the control task.
    pub async fn inspect(&self) -> Result<SessionView<B>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControlEvent::Inspect(reply))?;
        rx.await.map_err(|_| {
            SessionError::new(SessionErrorKind::Transport(
                "control task dropped the reply".to_string(),
            ))
        })
    }

    /// Forwards everything from a transport's inbound channel to the control
    /// task until either side closes.
    pub fn forward_network(
        &self,
        mut inbound: mpsc::UnboundedReceiver<ServerMessage>,
    ) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                if handle.send(message.into()).is_err() {
                    debug!("Control task gone, stopping network forwarder");
                    break;
                }
            }
        })
    }
}

/// Owns and drives one game session.
pub struct SessionController<R: RulesEngine> {
    config: SessionConfig,
    pipeline: MoveExecutionPipeline<R>,
    roles: Roles,
    base_roles: Roles,
    network_role: PlayerRole,
    engines: HashMap<Side, Arc<dyn MoveSearchEngine<R::Board>>>,
    orchestrator: AiMoveOrchestrator<R, ControlEvent<R::Board>>,
    bus: Option<Arc<dyn MessageBus>>,
    relay: Option<NetworkMoveRelay<ControlEvent<R::Board>>>,
    paused: bool,
    flipped: bool,
    tx: mpsc::UnboundedSender<ControlEvent<R::Board>>,
    events: mpsc::UnboundedSender<SessionEvent<R::Piece>>,
}

impl<R: RulesEngine> SessionController<R> {
    /// Creates a controller and the receiver its control loop consumes.
    #[instrument(skip(rules, board, config, events))]
    pub fn new(
        rules: Arc<R>,
        board: R::Board,
        config: SessionConfig,
        roles: Roles,
        events: mpsc::UnboundedSender<SessionEvent<R::Piece>>,
    ) -> (Self, mpsc::UnboundedReceiver<ControlEvent<R::Board>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = AiMoveOrchestrator::new(
            Arc::clone(&rules),
            config.engine_timeout(),
            *config.max_engine_retries(),
            config.retry_backoff(),
            FallbackMoveGenerator::new(*config.fallback_seed()),
            tx.clone(),
        );
        let pipeline = MoveExecutionPipeline::new(
            rules,
            board,
            *config.history_capacity(),
            *config.unsafe_moves(),
        );
        let controller = Self {
            config,
            pipeline,
            roles,
            base_roles: roles,
            network_role: PlayerRole::LocalHuman,
            engines: HashMap::new(),
            orchestrator,
            bus: None,
            relay: None,
            paused: false,
            flipped: false,
            tx,
            events,
        };
        (controller, rx)
    }

    /// Installs the engine used when `side` is played by [`PlayerRole::LocalEngine`].
    pub fn set_engine(&mut self, side: Side, engine: Arc<dyn MoveSearchEngine<R::Board>>) {
        info!(%side, engine = engine.name(), "Engine installed");
        self.engines.insert(side, engine);
    }

    /// Attaches the outbound message bus. `local_role` is who plays the local
    /// side once it is assigned.
    pub fn attach_network(&mut self, bus: Arc<dyn MessageBus>, local_role: PlayerRole) {
        self.bus = Some(bus);
        self.network_role = local_role;
    }

    /// A handle for sending control events.
    pub fn handle(&self) -> SessionHandle<R::Board> {
        SessionHandle { tx: self.tx.clone() }
    }

    /// The move pipeline (read-only).
    pub fn pipeline(&self) -> &MoveExecutionPipeline<R> {
        &self.pipeline
    }

    /// The relay, when networked.
    pub fn relay(&self) -> Option<&NetworkMoveRelay<ControlEvent<R::Board>>> {
        self.relay.as_ref()
    }

    /// Current roles.
    pub fn roles(&self) -> Roles {
        self.roles
    }

    /// True if the display frame is point-reflected.
    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    /// True while an engine request is outstanding.
    pub fn engine_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    /// Announces the initial status and dispatches the first engine move if
    /// an engine opens.
    #[instrument(skip(self))]
    pub fn start(&mut self) {
        info!(roles = ?self.roles, "Session starting");
        self.update_perspective();
        self.emit_status();
        self.schedule_next();
    }

    /// Runs the control loop until [`ControlEvent::Shutdown`].
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ControlEvent<R::Board>>) {
        self.start();
        while let Some(event) = rx.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
        self.orchestrator.cancel();
        if let Some(relay) = self.relay.as_mut() {
            relay.cancel_timers();
        }
        info!("Control task stopped");
    }

    /// Processes one event. Returns false when the loop should stop.
    #[instrument(skip(self, event))]
    pub fn handle_event(&mut self, event: ControlEvent<R::Board>) -> bool {
        match event {
            ControlEvent::LocalMove { from, to } => self.on_local_move(from, to),
            ControlEvent::Undo => self.undo(),
            ControlEvent::Reset => self.reset(),
            ControlEvent::SetRole { side, role } => self.set_role(side, role),
            ControlEvent::SetPaused(paused) => self.set_paused(paused),
            ControlEvent::JoinMatch { player_id, room_id } => self.join(player_id, room_id),
            ControlEvent::Leave => self.leave(),
            ControlEvent::Inspect(reply) => {
                if reply.send(self.view()).is_err() {
                    debug!("Inspect requester went away");
                }
            }
            ControlEvent::Shutdown => return false,
            ControlEvent::Engine(event) => self.on_engine_event(event),
            ControlEvent::Network(message) => self.on_network(message),
            ControlEvent::Recovery(timer) => {
                if let Some(relay) = self.relay.as_mut() {
                    let notices = relay.on_timer(timer);
                    self.process_notices(notices);
                }
            }
        }
        true
    }

    /// Read-only view of the session.
    pub fn view(&self) -> SessionView<R::Board> {
        let state = self.relay.as_ref().map(|r| r.state());
        SessionView {
            board: self.pipeline.board().clone(),
            status: self.pipeline.status(),
            side_to_move: self.pipeline.side_to_move(),
            roles: self.roles,
            local_side: state.and_then(|s| *s.local_side()),
            flipped: self.flipped,
            history_len: self.pipeline.turn().history().len(),
            engine_busy: self.orchestrator.is_busy(),
            paused: self.paused,
            awaiting_remote_move: state.is_some_and(|s| *s.awaiting_remote_move()),
            torn_down: state.is_some_and(|s| *s.torn_down()),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────

    fn emit(&self, event: SessionEvent<R::Piece>) {
        if self.events.send(event).is_err() {
            debug!("Presentation channel closed");
        }
    }

    fn emit_status(&self) {
        self.emit(SessionEvent::StatusChanged {
            status: self.pipeline.status(),
            side_to_move: self.pipeline.side_to_move(),
        });
    }

    fn warn_user(&self, message: impl Into<String>) {
        self.emit(SessionEvent::RecoverableWarning(message.into()));
    }

    fn reject(&self, message: impl Into<String>) {
        self.emit(SessionEvent::MoveRejected(message.into()));
    }

    // ─────────────────────────────────────────────────────────────
    // Frames
    // ─────────────────────────────────────────────────────────────

    fn perspective(&self) -> Option<Side> {
        match &self.relay {
            Some(relay) => relay.perspective(),
            None if *self.config.flip_for_second() => self.roles.sole_local_human(),
            None => None,
        }
    }

    fn update_perspective(&mut self) {
        let flipped = frame::is_flipped(self.perspective());
        if flipped != self.flipped {
            info!(flipped, "Display frame changed");
            self.flipped = flipped;
            self.emit(SessionEvent::PerspectiveChanged { flipped });
        }
    }

    fn display_move(&self, mv: Move) -> Move {
        let size = self.pipeline.rules().board_size(self.pipeline.board());
        frame::move_to_local(mv, self.perspective(), size)
    }

    // ─────────────────────────────────────────────────────────────
    // Moves
    // ─────────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    fn on_local_move(&mut self, from: Position, to: Position) {
        if self.pipeline.turn().is_terminal() {
            self.reject("the game is over");
            return;
        }

        if self.relay.is_some() {
            self.on_local_network_move(from, to);
            return;
        }

        let side = self.pipeline.side_to_move();
        if self.roles.of(side) != PlayerRole::LocalHuman {
            self.reject(format!("{side} is not played by a human"));
            return;
        }
        let size = self.pipeline.rules().board_size(self.pipeline.board());
        let mv = frame::move_to_canonical(Move::new(from, to), self.perspective(), size);
        let outcome = self.pipeline.attempt_move(mv.from, mv.to, side);
        self.after_attempt(side, mv, outcome);
    }

    fn on_local_network_move(&mut self, from: Position, to: Position) {
        let Some(relay) = self.relay.as_ref() else {
            return;
        };
        let Some(local) = relay.local_side() else {
            self.reject("waiting for the room to assign a side");
            return;
        };
        if self.roles.of(local) != PlayerRole::LocalHuman {
            self.reject("the local side is played by an engine");
            return;
        }
        let size = self.pipeline.rules().board_size(self.pipeline.board());
        let mv = frame::move_to_canonical(Move::new(from, to), relay.perspective(), size);

        let Some(relay) = self.relay.as_mut() else {
            return;
        };
        match relay.send_local_move(&mut self.pipeline, from, to) {
            Ok(outcome) => self.after_attempt(local, mv, outcome),
            Err(err) if err.is_fatal() => {
                self.emit(SessionEvent::FatalSessionError(err.kind.to_string()))
            }
            Err(err) => self.reject(err.kind.to_string()),
        }
    }

    fn after_attempt(&mut self, side: Side, mv: Move, outcome: MoveOutcome<R::Piece>) {
        match outcome {
            MoveOutcome::Applied {
                captured,
                status,
                game_ended,
                unsafe_warning,
            } => self.after_applied(side, mv, captured, status, game_ended, unsafe_warning),
            MoveOutcome::RejectedOutOfTurn => self.reject(format!("it is not {side}'s turn")),
            MoveOutcome::RejectedIllegal => self.reject(format!("illegal move {mv}")),
            MoveOutcome::RejectedUnsafe => self.reject(format!("{mv} leaves the general in check")),
            MoveOutcome::AlreadyEnded => self.reject("the game is over"),
        }
    }

    fn after_applied(
        &mut self,
        side: Side,
        mv: Move,
        captured: Option<R::Piece>,
        status: SessionStatus,
        game_ended: bool,
        unsafe_warning: bool,
    ) {
        if unsafe_warning {
            self.warn_user(format!("{side} played {mv}, which leaves its general in check"));
        }
        let shown = self.display_move(mv);
        self.emit(SessionEvent::MoveApplied {
            side,
            from: shown.from,
            to: shown.to,
            captured,
        });
        self.emit_status();
        if game_ended {
            self.finish(status, false);
        } else {
            self.schedule_next();
        }
    }

    #[instrument(skip(self))]
    fn finish(&mut self, status: SessionStatus, forfeit: bool) {
        info!(%status, forfeit, "Game over");
        self.orchestrator.cancel();
        if let Some(relay) = self.relay.as_mut() {
            relay.cancel_timers();
        }
        self.emit(SessionEvent::GameOver { status, forfeit });
    }

    /// Dispatches an engine if one is due to move.
    #[instrument(skip(self))]
    fn schedule_next(&mut self) {
        if self.pipeline.turn().is_terminal() || self.paused || self.orchestrator.is_busy() {
            return;
        }
        let side = self.pipeline.side_to_move();
        if self.roles.of(side) != PlayerRole::LocalEngine {
            return;
        }
        if let Some(relay) = &self.relay
            && (relay.local_side() != Some(side) || *relay.state().torn_down())
        {
            return;
        }
        let Some(engine) = self.engines.get(&side).cloned() else {
            warn!(%side, "No engine installed for an engine-played side");
            self.warn_user(format!("no engine installed for {side}"));
            return;
        };
        self.orchestrator
            .request_move(self.pipeline.board().clone(), side, engine);
        self.emit(SessionEvent::EngineThinking { side });
    }

    #[instrument(skip(self, event))]
    fn on_engine_event(&mut self, event: EngineEvent) {
        let decision = self.orchestrator.on_event(event);
        self.apply_decision(decision, true);
    }

    fn apply_decision(&mut self, decision: EngineDecision, retry_illegal: bool) {
        match decision {
            EngineDecision::Discarded => {}
            EngineDecision::Retrying { side, attempt, reason } => {
                self.warn_user(format!(
                    "engine for {side} failed ({reason}); retrying, attempt {attempt}"
                ));
            }
            EngineDecision::GameEnded { status, forfeit } => {
                if forfeit {
                    error!(%status, "Engine side has no legal move on a live board");
                }
                if self.pipeline.conclude(status) {
                    self.emit_status();
                    self.finish(status, forfeit);
                }
            }
            EngineDecision::Deliver { side, mv, fallback } => {
                if self.pipeline.turn().is_terminal()
                    || self.pipeline.side_to_move() != side
                    || self.roles.of(side) != PlayerRole::LocalEngine
                {
                    debug!(%side, "Engine move no longer wanted");
                    return;
                }
                if fallback {
                    self.warn_user(format!(
                        "engine for {side} gave no move; playing fallback {mv}"
                    ));
                }
                let sent = match self.relay.as_mut() {
                    Some(relay) => relay.send_canonical_move(&mut self.pipeline, mv.from, mv.to),
                    None => Ok(self.pipeline.attempt_move(mv.from, mv.to, side)),
                };
                let outcome = match sent {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        self.warn_user(err.kind.to_string());
                        return;
                    }
                };
                if outcome.is_applied() || !retry_illegal {
                    self.after_attempt(side, mv, outcome);
                    return;
                }
                warn!(%side, %mv, ?outcome, "Engine proposed a move the rules refuse");
                self.warn_user(format!(
                    "engine for {side} proposed illegal {mv}; playing fallback"
                ));
                let board = self.pipeline.board().clone();
                let decision = self.orchestrator.fallback_move(&board, side);
                self.apply_decision(decision, false);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Session commands
    // ─────────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    fn undo(&mut self) {
        if self.relay.is_some() {
            self.reject("undo is not available in network play");
            return;
        }
        if self.orchestrator.is_busy() {
            self.reject("cannot undo while an engine is thinking");
            return;
        }
        if self.paused {
            self.reject("cannot undo while paused");
            return;
        }
        if self.pipeline.turn().is_terminal() {
            self.reject("cannot undo a finished game");
            return;
        }
        if self.pipeline.undo().is_none() {
            self.reject("nothing to undo");
            return;
        }
        if self.roles.of(self.pipeline.side_to_move()) == PlayerRole::LocalEngine
            && !self.pipeline.turn().history().is_empty()
        {
            self.pipeline.undo();
        }
        debug!(side = %self.pipeline.side_to_move(), "Undo applied");
        self.emit(SessionEvent::Undone {
            side_to_move: self.pipeline.side_to_move(),
        });
        self.emit_status();
        self.schedule_next();
    }

    #[instrument(skip(self))]
    fn reset(&mut self) {
        self.orchestrator.cancel();
        if let Some(mut relay) = self.relay.take() {
            if let Err(err) = relay.leave() {
                warn!(error = %err, "Leave notice failed during reset");
            }
            self.roles = self.base_roles;
            self.emit(SessionEvent::Disconnected("left the room on reset".to_string()));
        }
        self.pipeline.reset();
        self.update_perspective();
        self.emit_status();
        self.schedule_next();
    }

    #[instrument(skip(self))]
    fn set_role(&mut self, side: Side, role: PlayerRole) {
        if let Some(relay) = &self.relay {
            if relay.local_side() != Some(side) || !role.is_local() {
                self.reject(
                    "in network play only the local side can switch between human and engine",
                );
                return;
            }
            self.network_role = role;
        } else {
            self.base_roles.set(side, role);
        }
        self.roles.set(side, role);
        if self.orchestrator.pending_side() == Some(side) && role != PlayerRole::LocalEngine {
            self.orchestrator.cancel();
        }
        self.update_perspective();
        self.schedule_next();
    }

    #[instrument(skip(self))]
    fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if paused {
            self.orchestrator.cancel();
        }
        self.emit(SessionEvent::PauseChanged(paused));
        if !paused {
            self.schedule_next();
        }
    }

    #[instrument(skip(self))]
    fn join(&mut self, player_id: String, room_id: String) {
        let Some(bus) = self.bus.clone() else {
            self.reject("no network transport attached");
            return;
        };
        self.orchestrator.cancel();
        if let Some(mut old) = self.relay.take() {
            old.cancel_timers();
        }
        let mut relay = NetworkMoveRelay::new(
            bus,
            player_id,
            room_id,
            self.config.relay_policy(),
            self.tx.clone(),
        );
        if let Err(err) = relay.join() {
            self.warn_user(err.kind.to_string());
        }
        self.relay = Some(relay);
        self.roles = Roles::new(PlayerRole::RemoteHuman, PlayerRole::RemoteHuman);
        self.pipeline.reset();
        self.update_perspective();
        self.emit_status();
    }

    #[instrument(skip(self))]
    fn leave(&mut self) {
        let Some(mut relay) = self.relay.take() else {
            self.reject("not in a network match");
            return;
        };
        self.orchestrator.cancel();
        if let Err(err) = relay.leave() {
            self.warn_user(err.kind.to_string());
        }
        self.roles = self.base_roles;
        self.update_perspective();
        self.emit(SessionEvent::Disconnected("left the room".to_string()));
    }

    // ─────────────────────────────────────────────────────────────
    // Network
    // ─────────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    fn on_network(&mut self, message: ServerMessage) {
        let Some(relay) = self.relay.as_mut() else {
            warn!(?message, "Network message while not in a match");
            return;
        };
        let notices = match message {
            ServerMessage::SessionStarted { side } => relay.on_session_started(side),
            ServerMessage::Move { from, to } => relay.on_remote_move(&mut self.pipeline, from, to),
            ServerMessage::SyncReply(state) => relay.on_sync_reply(&mut self.pipeline, state),
            ServerMessage::Disconnected { reason } => relay.on_disconnected(reason),
            ServerMessage::Error { message } => relay.on_room_error(&mut self.pipeline, message),
        };
        self.process_notices(notices);
    }

    fn process_notices(&mut self, notices: Vec<RelayNotice<R::Piece>>) {
        for notice in notices {
            match notice {
                RelayNotice::SideConfirmed { side, inferred } => {
                    self.roles.set(side, self.network_role);
                    self.roles.set(side.opponent(), PlayerRole::RemoteHuman);
                    self.emit(SessionEvent::SideAssigned { side, inferred });
                    self.update_perspective();
                }
                RelayNotice::MoveApplied {
                    mv,
                    captured,
                    status,
                    game_ended,
                    unsafe_warning,
                } => {
                    let mover = self.pipeline.side_to_move().opponent();
                    self.after_applied(mover, mv, captured, status, game_ended, unsafe_warning);
                }
                RelayNotice::MoveRetracted { side_to_move } => {
                    self.emit(SessionEvent::Undone { side_to_move });
                    self.emit_status();
                }
                RelayNotice::Advisory(message) => self.warn_user(message),
                RelayNotice::Concluded(status) => {
                    self.emit_status();
                    self.finish(status, false);
                }
                RelayNotice::Fatal(message) => {
                    self.orchestrator.cancel();
                    self.emit(SessionEvent::FatalSessionError(message));
                }
                RelayNotice::Disconnected(reason) => {
                    self.orchestrator.cancel();
                    self.roles = Roles::new(PlayerRole::RemoteHuman, PlayerRole::RemoteHuman);
                    self.update_perspective();
                    self.emit(SessionEvent::Disconnected(reason));
                }
            }
        }
        self.schedule_next();
    }
}

impl<R: RulesEngine> std::fmt::Debug for SessionController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("status", &self.pipeline.status())
            .field("side_to_move", &self.pipeline.side_to_move())
            .field("roles", &self.roles)
            .field("paused", &self.paused)
            .field("flipped", &self.flipped)
            .field("relay", &self.relay)
            .finish()
    }
}
