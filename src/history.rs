//! Board snapshots and the bounded undo history.

use crate::types::{Move, SessionStatus, Side};
use derive_getters::Getters;
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// Point-in-time copy of the board plus the turn bookkeeping around it.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct BoardSnapshot<B> {
    /// The board as it was.
    board: B,
    /// Side that was to move.
    side_to_move: Side,
    /// Status at that point.
    status: SessionStatus,
    /// Move that produced this position, if any.
    last_move: Option<Move>,
    /// Monotonically increasing snapshot number.
    sequence: u64,
}

impl<B> BoardSnapshot<B> {
    /// Creates a snapshot.
    pub fn new(
        board: B,
        side_to_move: Side,
        status: SessionStatus,
        last_move: Option<Move>,
        sequence: u64,
    ) -> Self {
        Self {
            board,
            side_to_move,
            status,
            last_move,
            sequence,
        }
    }

    /// Consumes the snapshot, returning the board.
    pub fn into_board(self) -> B {
        self.board
    }
}

/// FIFO-bounded stack of snapshots used for undo.
#[derive(Debug, Clone)]
pub struct SessionHistory<B> {
    capacity: usize,
    entries: VecDeque<BoardSnapshot<B>>,
}

impl<B> SessionHistory<B> {
    /// Creates an empty history holding at most `capacity` snapshots.
    ///
    /// A capacity of zero is raised to one so undo always has somewhere to go.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a snapshot, evicting the oldest when full.
    #[instrument(
        skip(self, snapshot),
        fields(sequence = snapshot.sequence, len = self.entries.len())
    )]
    pub fn push(&mut self, snapshot: BoardSnapshot<B>) {
        while self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                debug!(evicted = evicted.sequence, "History full, evicting oldest snapshot");
            }
        }
        self.entries.push_back(snapshot);
    }

    /// Removes and returns the most recent snapshot.
    pub fn pop(&mut self) -> Option<BoardSnapshot<B>> {
        self.entries.pop_back()
    }

    /// Most recent snapshot without removing it.
    pub fn peek(&self) -> Option<&BoardSnapshot<B>> {
        self.entries.back()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing can be undone.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of stored snapshots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every snapshot.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(sequence: u64) -> BoardSnapshot<u64> {
        BoardSnapshot::new(sequence, Side::First, SessionStatus::InProgress, None, sequence)
    }

    #[test]
    fn test_eviction_is_fifo() {
        let mut history = SessionHistory::new(3);
        for n in 1..=5 {
            history.push(snap(n));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.pop().map(|s| s.sequence), Some(5));
        assert_eq!(history.pop().map(|s| s.sequence), Some(4));
        assert_eq!(history.pop().map(|s| s.sequence), Some(3));
        assert!(history.pop().is_none());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut history = SessionHistory::new(0);
        history.push(snap(1));
        history.push(snap(2));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.peek().map(|s| *s.sequence()), Some(2));
    }
}
