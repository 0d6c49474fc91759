//! Turn state machine: whose move it is, the session status, and the undo
//! history.
//!
//! ```text
//!   IN_PROGRESS <──> IN_CHECK
//!        │              │
//!        └──────┬───────┘
//!               ▼
//!   FIRST_WINS | SECOND_WINS | DRAW   (frozen until reset)
//! ```

use crate::history::{BoardSnapshot, SessionHistory};
use crate::types::{Move, SessionStatus, Side};
use tracing::{debug, info, instrument, warn};

/// Holds the turn, the status and the snapshot history.
///
/// Only the move pipeline drives transitions.
#[derive(Debug, Clone)]
pub struct TurnStateMachine<B> {
    status: SessionStatus,
    side_to_move: Side,
    last_move: Option<Move>,
    next_sequence: u64,
    history: SessionHistory<B>,
}

impl<B: Clone> TurnStateMachine<B> {
    /// Creates a machine in IN_PROGRESS with FIRST to move.
    #[instrument]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            status: SessionStatus::InProgress,
            side_to_move: Side::First,
            last_move: None,
            next_sequence: 0,
            history: SessionHistory::new(history_capacity),
        }
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Side whose turn it is.
    pub fn side_to_move(&self) -> Side {
        self.side_to_move
    }

    /// Last applied move, canonical frame.
    pub fn last_move(&self) -> Option<Move> {
        self.last_move
    }

    /// True once a terminal status has been entered.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Undo history.
    pub fn history(&self) -> &SessionHistory<B> {
        &self.history
    }

    /// Moves to `new_status` with `next_side` to move.
    ///
    /// Returns false, and changes nothing, once the machine is terminal.
    #[instrument(skip(self), fields(current = %self.status))]
    pub fn advance(&mut self, new_status: SessionStatus, next_side: Side) -> bool {
        if self.status.is_terminal() {
            warn!("Ignoring transition on a finished session");
            return false;
        }
        self.status = new_status;
        self.side_to_move = next_side;
        if new_status.is_terminal() {
            info!(status = %new_status, "Session reached a terminal status");
        } else {
            debug!(side = %next_side, "Turn passed");
        }
        true
    }

    /// Records the move that was just applied.
    pub fn record_move(&mut self, mv: Move) {
        self.last_move = Some(mv);
    }

    /// Builds a snapshot of `board` stamped with the current bookkeeping.
    pub fn snapshot(&mut self, board: &B) -> BoardSnapshot<B> {
        self.next_sequence += 1;
        BoardSnapshot::new(
            board.clone(),
            self.side_to_move,
            self.status,
            self.last_move,
            self.next_sequence,
        )
    }

    /// Appends a snapshot to the history, honoring its capacity.
    pub fn push_snapshot(&mut self, snapshot: BoardSnapshot<B>) {
        self.history.push(snapshot);
    }

    /// Pops the most recent snapshot and rolls the bookkeeping back to it.
    ///
    /// Returns `None` when there is nothing to undo. No legality check is
    /// performed: every stored snapshot was a valid state when it was taken.
    #[instrument(skip(self), fields(len = self.history.len()))]
    pub fn pop_snapshot(&mut self) -> Option<BoardSnapshot<B>> {
        let snapshot = self.history.pop()?;
        self.status = *snapshot.status();
        self.side_to_move = *snapshot.side_to_move();
        self.last_move = *snapshot.last_move();
        debug!(sequence = snapshot.sequence(), side = %self.side_to_move, "Rolled back");
        Some(snapshot)
    }

    /// Restores IN_PROGRESS with FIRST to move and clears history and
    /// last-move markers.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        info!("Resetting turn state");
        self.status = SessionStatus::InProgress;
        self.side_to_move = Side::First;
        self.last_move = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;

    #[test]
    fn test_starts_with_first_in_progress() {
        let tsm = TurnStateMachine::<u8>::new(4);
        assert_eq!(tsm.status(), SessionStatus::InProgress);
        assert_eq!(tsm.side_to_move(), Side::First);
        assert!(tsm.history().is_empty());
    }

    #[test]
    fn test_terminal_freezes_until_reset() {
        let mut tsm = TurnStateMachine::<u8>::new(4);
        assert!(tsm.advance(SessionStatus::FirstWins, Side::Second));
        assert!(!tsm.advance(SessionStatus::InProgress, Side::First));
        assert_eq!(tsm.status(), SessionStatus::FirstWins);
        assert_eq!(tsm.side_to_move(), Side::Second);

        tsm.reset();
        assert_eq!(tsm.status(), SessionStatus::InProgress);
        assert_eq!(tsm.side_to_move(), Side::First);
        assert!(tsm.advance(SessionStatus::InCheck, Side::Second));
    }

    #[test]
    fn test_pop_restores_bookkeeping() {
        let mut tsm = TurnStateMachine::<u8>::new(4);
        let snap = tsm.snapshot(&7);
        tsm.push_snapshot(snap);
        tsm.record_move(Move::new(Position::new(0, 0), Position::new(0, 1)));
        tsm.advance(SessionStatus::InCheck, Side::Second);

        let popped = tsm.pop_snapshot().expect("snapshot");
        assert_eq!(*popped.board(), 7);
        assert_eq!(tsm.side_to_move(), Side::First);
        assert_eq!(tsm.status(), SessionStatus::InProgress);
        assert_eq!(tsm.last_move(), None);
        assert!(tsm.pop_snapshot().is_none());
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut tsm = TurnStateMachine::<u8>::new(4);
        let a = tsm.snapshot(&1);
        let b = tsm.snapshot(&2);
        assert!(b.sequence() > a.sequence());
    }
}
