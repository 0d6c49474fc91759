//! Exhaustive legal-move enumeration and uniform random selection.

use crate::rules::RulesEngine;
use crate::types::{Move, Side};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, instrument};

/// Every legal and safe move for `side`: each of its pieces against every
/// board cell.
pub fn legal_moves<R: RulesEngine>(rules: &R, board: &R::Board, side: Side) -> Vec<Move> {
    let size = rules.board_size(board);
    size.positions()
        .filter(|from| rules.piece_side(board, *from) == Some(side))
        .flat_map(|from| {
            size.positions().map(move |to| Move {
                from,
                to,
                tag: None,
            })
        })
        .filter(|mv| {
            rules.is_valid_move(board, mv.from, mv.to)
                && rules.is_move_safe(board, mv.from, mv.to, side)
        })
        .collect()
}

/// Picks a random legal move when every engine attempt has failed.
#[derive(Debug)]
pub struct FallbackMoveGenerator {
    rng: StdRng,
}

impl FallbackMoveGenerator {
    /// Creates a generator, deterministic when `seed` is given.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Selects one legal move for `side` uniformly at random, or `None` if the
    /// side cannot move.
    #[instrument(skip(self, rules, board))]
    pub fn pick<R: RulesEngine>(
        &mut self,
        rules: &R,
        board: &R::Board,
        side: Side,
    ) -> Option<Move> {
        let moves = legal_moves(rules, board, side);
        debug!(candidates = moves.len(), "Fallback enumeration done");
        moves.choose(&mut self.rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{SkirmishBoard, SkirmishPiece, SkirmishRules};
    use crate::types::{BoardSize, Position};

    #[test]
    fn test_enumerates_only_own_safe_moves() {
        let mut board = SkirmishBoard::empty(BoardSize::CHESS);
        board.place(Position::new(0, 0), SkirmishPiece::general(Side::First));
        board.place(Position::new(2, 2), SkirmishPiece::soldier(Side::Second));
        board.place(Position::new(7, 7), SkirmishPiece::general(Side::Second));

        let moves = legal_moves(&SkirmishRules, &board, Side::First);
        // (1,1) touches the soldier on (2,2).
        assert_eq!(moves.len(), 2);
        assert!(moves.iter().all(|mv| mv.from == Position::new(0, 0)));
        assert!(!moves.iter().any(|mv| mv.to == Position::new(1, 1)));
    }

    #[test]
    fn test_seeded_pick_is_repeatable_and_legal() {
        let board = SkirmishBoard::standard(BoardSize::XIANGQI);
        let a = FallbackMoveGenerator::new(Some(7)).pick(&SkirmishRules, &board, Side::Second);
        let b = FallbackMoveGenerator::new(Some(7)).pick(&SkirmishRules, &board, Side::Second);
        assert_eq!(a, b);
        let mv = a.expect("opening position has moves");
        assert!(legal_moves(&SkirmishRules, &board, Side::Second).contains(&mv));
    }

    #[test]
    fn test_no_pieces_means_no_move() {
        let board = SkirmishBoard::empty(BoardSize::CHESS);
        assert!(
            FallbackMoveGenerator::new(None)
                .pick(&SkirmishRules, &board, Side::First)
                .is_none()
        );
    }
}
