//! Simple greedy engine.

use super::{MoveSearchEngine, legal_moves};
use crate::error::EngineError;
use crate::rules::RulesEngine;
use crate::types::{Move, Side};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Engine that captures when it can and otherwise plays the first legal move.
#[derive(Debug)]
pub struct SimpleEngine<R> {
    name: String,
    rules: Arc<R>,
    think_time: Duration,
}

impl<R: RulesEngine> SimpleEngine<R> {
    /// Creates a new simple engine.
    pub fn new(name: impl Into<String>, rules: Arc<R>) -> Self {
        Self {
            name: name.into(),
            rules,
            think_time: Duration::ZERO,
        }
    }

    /// Adds a delay before answering, to simulate thinking.
    pub fn with_think_time(self, think_time: Duration) -> Self {
        Self { think_time, ..self }
    }
}

impl<R: RulesEngine> MoveSearchEngine<R::Board> for SimpleEngine<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn best_move(&self, board: &R::Board, side: Side) -> Result<Option<Move>, EngineError> {
        debug!(engine = %self.name, %side, "Engine searching");
        if !self.think_time.is_zero() {
            std::thread::sleep(self.think_time);
        }

        let moves = legal_moves(self.rules.as_ref(), board, side);
        let capture = moves
            .iter()
            .find(|mv| self.rules.piece_side(board, mv.to) == Some(side.opponent()));
        let choice = capture.or(moves.first()).copied();
        debug!(engine = %self.name, choice = ?choice, "Engine chose move");
        Ok(choice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{SkirmishBoard, SkirmishPiece, SkirmishRules};
    use crate::types::{BoardSize, Position};

    #[test]
    fn test_prefers_capture() {
        let mut board = SkirmishBoard::empty(BoardSize::CHESS);
        board.place(Position::new(0, 0), SkirmishPiece::general(Side::First));
        board.place(Position::new(4, 4), SkirmishPiece::soldier(Side::First));
        board.place(Position::new(5, 5), SkirmishPiece::soldier(Side::Second));
        board.place(Position::new(7, 7), SkirmishPiece::general(Side::Second));

        let engine = SimpleEngine::new("greedy", Arc::new(SkirmishRules));
        let mv = engine.best_move(&board, Side::First).expect("no error");
        assert_eq!(mv.map(|m| m.to), Some(Position::new(5, 5)));
    }

    #[test]
    fn test_no_move_is_none() {
        let board = SkirmishBoard::empty(BoardSize::CHESS);
        let engine = SimpleEngine::new("greedy", Arc::new(SkirmishRules));
        assert_eq!(engine.name(), "greedy");
        assert!(engine.best_move(&board, Side::First).expect("no error").is_none());
    }
}
