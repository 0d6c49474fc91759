//! Tests for move pipeline and turn-state properties.

use duel_session::{
    BoardSize, FallbackMoveGenerator, MoveExecutionPipeline, MoveOutcome, Position, SessionStatus,
    Side, SkirmishBoard, SkirmishPiece, SkirmishRules, UnsafeMovePolicy,
};
use std::sync::Arc;

fn pos(row: u8, col: u8) -> Position {
    Position::new(row, col)
}

fn standard_pipeline(capacity: usize) -> MoveExecutionPipeline<SkirmishRules> {
    MoveExecutionPipeline::new(
        Arc::new(SkirmishRules),
        SkirmishBoard::standard(BoardSize::XIANGQI),
        capacity,
        UnsafeMovePolicy::Reject,
    )
}

/// Plays up to `plies` random legal moves, returning how many were applied.
fn play_random(p: &mut MoveExecutionPipeline<SkirmishRules>, plies: usize, seed: u64) -> usize {
    let rules = SkirmishRules;
    let mut generator = FallbackMoveGenerator::new(Some(seed));
    let mut applied = 0;
    for _ in 0..plies {
        if p.turn().is_terminal() {
            break;
        }
        let side = p.side_to_move();
        let Some(mv) = generator.pick(&rules, p.board(), side) else {
            break;
        };
        let outcome = p.attempt_move(mv.from, mv.to, side);
        assert!(outcome.is_applied(), "generated move {mv} was refused: {outcome:?}");
        applied += 1;
    }
    applied
}

#[test]
fn test_side_to_move_alternates_on_every_applied_move() {
    let mut p = standard_pipeline(200);
    let rules = SkirmishRules;
    let mut generator = FallbackMoveGenerator::new(Some(7));

    for _ in 0..80 {
        if p.turn().is_terminal() {
            break;
        }
        let side = p.side_to_move();
        let Some(mv) = generator.pick(&rules, p.board(), side) else {
            break;
        };
        assert!(p.attempt_move(mv.from, mv.to, side).is_applied());
        assert_eq!(p.side_to_move(), side.opponent());
    }
}

#[test]
fn test_undo_every_move_restores_opening_board() {
    let opening = SkirmishBoard::standard(BoardSize::XIANGQI);
    let mut p = standard_pipeline(200);

    // Too short for either side to be mated from the opening position.
    let applied = play_random(&mut p, 10, 11);
    assert_eq!(applied, 10);
    assert_eq!(p.turn().history().len(), 10);
    assert_ne!(p.board(), &opening);

    for _ in 0..applied {
        assert!(p.undo().is_some());
    }
    assert_eq!(p.board(), &opening);
    assert_eq!(p.side_to_move(), Side::First);
    assert_eq!(p.status(), SessionStatus::InProgress);
    assert!(p.undo().is_none());
}

#[test]
fn test_history_never_exceeds_capacity() {
    let mut p = standard_pipeline(3);
    let applied = play_random(&mut p, 6, 3);
    assert_eq!(applied, 6);
    assert_eq!(p.turn().history().len(), 3);

    for _ in 0..3 {
        assert!(p.undo().is_some());
    }
    assert!(p.undo().is_none());
    // Three plies remain applied, so SECOND is to move.
    assert_eq!(p.side_to_move(), Side::Second);
}

#[test]
fn test_out_of_turn_move_changes_nothing() {
    let mut p = standard_pipeline(200);
    let before = p.board().clone();

    let outcome = p.attempt_move(pos(8, 0), pos(7, 0), Side::Second);
    assert_eq!(outcome, MoveOutcome::RejectedOutOfTurn);
    assert_eq!(p.board(), &before);
    assert!(p.turn().history().is_empty());
    assert_eq!(p.side_to_move(), Side::First);
}

#[test]
fn test_moving_opponent_piece_is_illegal() {
    let mut p = standard_pipeline(200);
    let outcome = p.attempt_move(pos(8, 0), pos(7, 0), Side::First);
    assert_eq!(outcome, MoveOutcome::RejectedIllegal);
    assert!(p.turn().history().is_empty());
}

#[test]
fn test_capturing_the_general_ends_the_game_once() {
    let mut board = SkirmishBoard::empty(BoardSize::CHESS);
    board.place(pos(0, 0), SkirmishPiece::general(Side::First));
    board.place(pos(4, 4), SkirmishPiece::soldier(Side::First));
    board.place(pos(5, 5), SkirmishPiece::general(Side::Second));
    board.place(pos(7, 7), SkirmishPiece::soldier(Side::Second));
    let mut p =
        MoveExecutionPipeline::new(Arc::new(SkirmishRules), board, 16, UnsafeMovePolicy::Reject);

    let outcome = p.attempt_move(pos(4, 4), pos(5, 5), Side::First);
    assert_eq!(
        outcome,
        MoveOutcome::Applied {
            captured: Some(SkirmishPiece::general(Side::Second)),
            status: SessionStatus::FirstWins,
            game_ended: true,
            unsafe_warning: false,
        }
    );
    assert!(p.turn().is_terminal());

    let frozen = p.board().clone();
    assert_eq!(
        p.attempt_move(pos(7, 7), pos(6, 7), Side::Second),
        MoveOutcome::AlreadyEnded
    );
    assert_eq!(p.board(), &frozen);
    assert!(!p.conclude(SessionStatus::SecondWins));
    assert_eq!(p.status(), SessionStatus::FirstWins);
}

#[test]
fn test_reset_returns_to_opening() {
    let opening = SkirmishBoard::standard(BoardSize::XIANGQI);
    let mut p = standard_pipeline(200);
    play_random(&mut p, 5, 5);
    p.reset();
    assert_eq!(p.board(), &opening);
    assert!(p.turn().history().is_empty());
    assert_eq!(p.side_to_move(), Side::First);
}
