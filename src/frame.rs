//! Translation between the canonical frame and the local display frame.
//!
//! The rules engine and the wire protocol always speak canonical
//! coordinates. A local participant playing SECOND may see the board
//! point-reflected. Every move crosses this boundary exactly once: local input
//! goes through [`to_canonical`] before it reaches the pipeline or the wire,
//! and anything shown to the user goes through [`to_local`].

use crate::types::{BoardSize, Move, Position, Side};

/// Returns true if the display frame is point-reflected for this perspective.
pub fn is_flipped(perspective: Option<Side>) -> bool {
    perspective == Some(Side::Second)
}

fn reflect(pos: Position, size: BoardSize) -> Position {
    Position::new(
        size.max_row().saturating_sub(pos.row),
        size.max_col().saturating_sub(pos.col),
    )
}

/// Converts a display-frame position into the canonical frame.
///
/// `perspective` is the side the local view is drawn for; `None` (side not yet
/// known) and `Some(Side::First)` leave the position unchanged.
pub fn to_canonical(pos: Position, perspective: Option<Side>, size: BoardSize) -> Position {
    if is_flipped(perspective) {
        reflect(pos, size)
    } else {
        pos
    }
}

/// Converts a canonical position into the display frame.
pub fn to_local(pos: Position, perspective: Option<Side>, size: BoardSize) -> Position {
    // Point reflection is its own inverse.
    if is_flipped(perspective) {
        reflect(pos, size)
    } else {
        pos
    }
}

/// Converts both ends of a display-frame move into the canonical frame.
pub fn move_to_canonical(mv: Move, perspective: Option<Side>, size: BoardSize) -> Move {
    Move {
        from: to_canonical(mv.from, perspective, size),
        to: to_canonical(mv.to, perspective, size),
        tag: mv.tag,
    }
}

/// Converts both ends of a canonical move into the display frame.
pub fn move_to_local(mv: Move, perspective: Option<Side>, size: BoardSize) -> Move {
    Move {
        from: to_local(mv.from, perspective, size),
        to: to_local(mv.to, perspective, size),
        tag: mv.tag,
    }
}
