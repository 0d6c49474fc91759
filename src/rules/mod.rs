//! The rules-engine seam.
//!
//! The session controller never decides legality itself. It asks a
//! [`RulesEngine`] about an opaque board value it owns but does not inspect.

mod skirmish;

pub use skirmish::{Rank, SkirmishBoard, SkirmishPiece, SkirmishRules};

use crate::types::{BoardSize, Position, SessionStatus, Side};
use std::fmt::Debug;

/// Passive rules engine consulted by the move pipeline.
///
/// All positions are canonical. Implementations must be pure with respect to
/// their arguments: the same board and move always give the same answer.
pub trait RulesEngine: Send + Sync + 'static {
    /// Opaque board snapshot.
    type Board: Clone + Debug + Send + Sync + 'static;
    /// A piece as reported when captured.
    type Piece: Clone + Debug + Send + 'static;

    /// Dimensions of the board.
    fn board_size(&self, board: &Self::Board) -> BoardSize;

    /// Side owning the piece at `at`, or `None` for an empty square.
    fn piece_side(&self, board: &Self::Board, at: Position) -> Option<Side>;

    /// Geometric legality of moving the piece at `from` to `to`.
    fn is_valid_move(&self, board: &Self::Board, from: Position, to: Position) -> bool;

    /// Whether the move leaves `side`'s king/general out of check.
    fn is_move_safe(&self, board: &Self::Board, from: Position, to: Position, side: Side) -> bool;

    /// Applies the move, returning the captured piece if any.
    fn apply_move(&self, board: &mut Self::Board, from: Position, to: Position)
    -> Option<Self::Piece>;

    /// Status of the game from the point of view of `side`, the side to move.
    fn check_game_state(&self, board: &Self::Board, side: Side) -> SessionStatus;
}
