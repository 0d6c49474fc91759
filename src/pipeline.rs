//! Move execution pipeline: validate, snapshot, apply, re-evaluate, advance.
//!
//! The pipeline owns the board and the turn state machine. It is agnostic to
//! who supplied a move; turn ownership is its only ordering guarantee.

use crate::history::BoardSnapshot;
use crate::rules::RulesEngine;
use crate::turn::TurnStateMachine;
use crate::types::{Move, Position, SessionStatus, Side};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What to do with a move the rules engine flags as leaving the king/general
/// in check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsafeMovePolicy {
    /// Refuse the move.
    #[default]
    Reject,
    /// Apply it and raise a warning.
    Warn,
}

/// Result of [`MoveExecutionPipeline::attempt_move`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome<P> {
    /// Move applied.
    Applied {
        /// Piece displaced by the move, if any.
        captured: Option<P>,
        /// Status for the side now to move.
        status: SessionStatus,
        /// True if the move ended the game.
        game_ended: bool,
        /// True if the move was unsafe but allowed by policy.
        unsafe_warning: bool,
    },
    /// Not the mover's turn.
    RejectedOutOfTurn,
    /// Rules engine refused the move, or the mover does not own the piece.
    RejectedIllegal,
    /// Move leaves the mover in check and policy forbids that.
    RejectedUnsafe,
    /// The game is over; nothing is accepted until reset.
    AlreadyEnded,
}

impl<P> MoveOutcome<P> {
    /// True for the `Applied` variant.
    pub fn is_applied(&self) -> bool {
        matches!(self, MoveOutcome::Applied { .. })
    }

    /// True if this outcome ended the game.
    pub fn ended_game(&self) -> bool {
        matches!(self, MoveOutcome::Applied { game_ended: true, .. })
    }
}

/// Validates and applies moves against a rules engine.
#[derive(Debug)]
pub struct MoveExecutionPipeline<R: RulesEngine> {
    rules: Arc<R>,
    board: R::Board,
    initial_board: R::Board,
    turn: TurnStateMachine<R::Board>,
    unsafe_policy: UnsafeMovePolicy,
}

impl<R: RulesEngine> MoveExecutionPipeline<R> {
    /// Creates a pipeline starting from `board` with FIRST to move.
    #[instrument(skip(rules, board))]
    pub fn new(
        rules: Arc<R>,
        board: R::Board,
        history_capacity: usize,
        unsafe_policy: UnsafeMovePolicy,
    ) -> Self {
        Self {
            rules,
            initial_board: board.clone(),
            board,
            turn: TurnStateMachine::new(history_capacity),
            unsafe_policy,
        }
    }

    /// Rules engine in use.
    pub fn rules(&self) -> &Arc<R> {
        &self.rules
    }

    /// Current board, canonical frame.
    pub fn board(&self) -> &R::Board {
        &self.board
    }

    /// Turn state machine (read-only).
    pub fn turn(&self) -> &TurnStateMachine<R::Board> {
        &self.turn
    }

    /// Side whose turn it is.
    pub fn side_to_move(&self) -> Side {
        self.turn.side_to_move()
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.turn.status()
    }

    /// Policy applied to unsafe moves.
    pub fn unsafe_policy(&self) -> UnsafeMovePolicy {
        self.unsafe_policy
    }

    /// Validates and applies a canonical move for `side`.
    #[instrument(skip(self), fields(side_to_move = %self.turn.side_to_move()))]
    pub fn attempt_move(
        &mut self,
        from: Position,
        to: Position,
        side: Side,
    ) -> MoveOutcome<R::Piece> {
        self.attempt_move_with(from, to, side, self.unsafe_policy)
    }

    /// Same as [`attempt_move`](Self::attempt_move) with an explicit unsafe-move
    /// policy for this one move.
    #[instrument(skip(self))]
    pub fn attempt_move_with(
        &mut self,
        from: Position,
        to: Position,
        side: Side,
        policy: UnsafeMovePolicy,
    ) -> MoveOutcome<R::Piece> {
        if self.turn.is_terminal() {
            debug!(status = %self.turn.status(), "Move after game end ignored");
            return MoveOutcome::AlreadyEnded;
        }
        if side != self.turn.side_to_move() {
            warn!("Move attempted out of turn");
            return MoveOutcome::RejectedOutOfTurn;
        }
        if self.rules.piece_side(&self.board, from) != Some(side) {
            warn!("Mover does not own a piece on the start square");
            return MoveOutcome::RejectedIllegal;
        }
        if !self.rules.is_valid_move(&self.board, from, to) {
            debug!("Rules engine rejected move");
            return MoveOutcome::RejectedIllegal;
        }
        let safe = self.rules.is_move_safe(&self.board, from, to, side);
        if !safe && policy == UnsafeMovePolicy::Reject {
            debug!("Move would leave the mover in check");
            return MoveOutcome::RejectedUnsafe;
        }
        if !safe {
            warn!("Applying unsafe move by policy");
        }

        let snapshot = self.turn.snapshot(&self.board);
        self.turn.push_snapshot(snapshot);

        let captured = self.rules.apply_move(&mut self.board, from, to);
        self.turn.record_move(Move::new(from, to));

        let next = side.opponent();
        let status = self.rules.check_game_state(&self.board, next);
        self.turn.advance(status, next);

        let game_ended = status.is_terminal();
        if game_ended {
            info!(%status, "Move ended the game");
        }
        MoveOutcome::Applied {
            captured,
            status,
            game_ended,
            unsafe_warning: !safe,
        }
    }

    /// Forces a result outside normal play (forfeit, authoritative game over).
    ///
    /// Returns false if the session had already ended.
    #[instrument(skip(self))]
    pub fn conclude(&mut self, status: SessionStatus) -> bool {
        let side = self.turn.side_to_move();
        self.turn.advance(status, side)
    }

    /// Re-evaluates the position for the side to move without changing it.
    pub fn evaluate(&self) -> SessionStatus {
        self.rules.check_game_state(&self.board, self.turn.side_to_move())
    }

    /// Rolls back one applied move.
    ///
    /// Returns `None` when there is nothing to undo or the game has ended.
    #[instrument(skip(self))]
    pub fn undo(&mut self) -> Option<BoardSnapshot<R::Board>> {
        if self.turn.is_terminal() {
            warn!("Undo refused on a finished session");
            return None;
        }
        self.retract_last()
    }

    /// Takes back the most recent move, even one that ended the game.
    ///
    /// Only for moves the room never accepted; player undo goes through
    /// [`undo`](Self::undo).
    #[instrument(skip(self))]
    pub fn retract_last(&mut self) -> Option<BoardSnapshot<R::Board>> {
        let snapshot = self.turn.pop_snapshot()?;
        self.board = snapshot.board().clone();
        Some(snapshot)
    }

    /// Restores the opening board and a fresh turn state.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        self.board = self.initial_board.clone();
        self.turn.reset();
    }
}
