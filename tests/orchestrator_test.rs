//! Tests for engine orchestration: timeouts, retries, fallback and forfeit.

use duel_session::{
    AiMoveOrchestrator, BoardSize, ControlEvent, EngineDecision, EngineError, EngineEvent,
    FallbackMoveGenerator, Move, MoveSearchEngine, PlayerRole, Position, Roles, RulesEngine,
    SessionConfig, SessionController, SessionEvent, SessionStatus, Side, SkirmishBoard,
    SkirmishRules,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Engine that sleeps past any reasonable budget and counts its calls.
struct SleepyEngine {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl MoveSearchEngine<SkirmishBoard> for SleepyEngine {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn best_move(&self, _board: &SkirmishBoard, _side: Side) -> Result<Option<Move>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(None)
    }
}

/// Engine that always fails.
struct BrokenEngine;

impl<B> MoveSearchEngine<B> for BrokenEngine {
    fn name(&self) -> &str {
        "broken"
    }

    fn best_move(&self, _board: &B, _side: Side) -> Result<Option<Move>, EngineError> {
        Err(EngineError::new("search exploded"))
    }
}

/// Rules where the piece at (0,0) belongs to FIRST but can never move, while
/// the position is still reported as live.
#[derive(Debug)]
struct StuckRules;

impl RulesEngine for StuckRules {
    type Board = ();
    type Piece = ();

    fn board_size(&self, _board: &()) -> BoardSize {
        BoardSize::CHESS
    }

    fn piece_side(&self, _board: &(), at: Position) -> Option<Side> {
        (at == Position::new(0, 0)).then_some(Side::First)
    }

    fn is_valid_move(&self, _board: &(), _from: Position, _to: Position) -> bool {
        false
    }

    fn is_move_safe(&self, _board: &(), _from: Position, _to: Position, _side: Side) -> bool {
        true
    }

    fn apply_move(&self, _board: &mut (), _from: Position, _to: Position) -> Option<()> {
        None
    }

    fn check_game_state(&self, _board: &(), _side: Side) -> SessionStatus {
        SessionStatus::InProgress
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> EngineEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("engine event within five seconds")
        .expect("channel open")
}

#[tokio::test]
async fn test_timeouts_exhaust_retries_then_fall_back() {
    let (tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = Arc::new(SleepyEngine {
        calls: Arc::clone(&calls),
        delay: Duration::from_millis(600),
    });
    let max_retries = 1;
    let mut orchestrator = AiMoveOrchestrator::new(
        Arc::new(SkirmishRules),
        Duration::from_millis(100),
        max_retries,
        Duration::from_millis(10),
        FallbackMoveGenerator::new(Some(1)),
        tx,
    );

    let board = SkirmishBoard::standard(BoardSize::CHESS);
    orchestrator.request_move(board, Side::First, engine);

    let mut retries = 0;
    let decision = loop {
        match orchestrator.on_event(next_event(&mut rx).await) {
            EngineDecision::Discarded => {}
            EngineDecision::Retrying { side, attempt, .. } => {
                assert_eq!(side, Side::First);
                assert_eq!(attempt, 2);
                retries += 1;
            }
            other => break other,
        }
    };

    assert_eq!(retries, max_retries);
    assert_eq!(calls.load(Ordering::SeqCst), max_retries as usize + 1);
    assert!(matches!(
        decision,
        EngineDecision::Deliver {
            side: Side::First,
            fallback: true,
            ..
        }
    ));
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn test_late_result_after_timeout_is_discarded() {
    let (tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
    let engine = Arc::new(SleepyEngine {
        calls: Arc::new(AtomicUsize::new(0)),
        delay: Duration::from_millis(200),
    });
    let mut orchestrator = AiMoveOrchestrator::new(
        Arc::new(SkirmishRules),
        Duration::from_millis(20),
        0,
        Duration::from_millis(10),
        FallbackMoveGenerator::new(Some(2)),
        tx,
    );

    let board = SkirmishBoard::standard(BoardSize::CHESS);
    let ticket = orchestrator.request_move(board, Side::First, engine);
    let decision = orchestrator.on_event(next_event(&mut rx).await);
    assert!(matches!(decision, EngineDecision::Deliver { fallback: true, .. }));

    let late = EngineEvent::Finished {
        ticket,
        result: Ok(Some(Move::new(Position::new(1, 0), Position::new(2, 0)))),
    };
    assert_eq!(orchestrator.on_event(late), EngineDecision::Discarded);
}

#[tokio::test]
async fn test_no_legal_move_on_live_board_forfeits_once() {
    let (tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
    let mut orchestrator = AiMoveOrchestrator::new(
        Arc::new(StuckRules),
        Duration::from_secs(5),
        0,
        Duration::from_millis(10),
        FallbackMoveGenerator::new(Some(3)),
        tx,
    );

    let ticket = orchestrator.request_move((), Side::First, Arc::new(BrokenEngine));
    let decision = orchestrator.on_event(next_event(&mut rx).await);
    assert_eq!(
        decision,
        EngineDecision::GameEnded {
            status: SessionStatus::SecondWins,
            forfeit: true,
        }
    );

    let replay = EngineEvent::Finished {
        ticket,
        result: Err(EngineError::new("again")),
    };
    assert_eq!(orchestrator.on_event(replay), EngineDecision::Discarded);
}

#[tokio::test]
async fn test_controller_reports_forfeit_exactly_once() {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let config = SessionConfig::default().with_max_engine_retries(0);
    let (mut controller, mut rx) = SessionController::new(
        Arc::new(StuckRules),
        (),
        config,
        Roles::new(PlayerRole::LocalEngine, PlayerRole::LocalHuman),
        events_tx,
    );
    controller.set_engine(Side::First, Arc::new(BrokenEngine));
    controller.start();

    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("engine finished")
        .expect("channel open");
    assert!(matches!(event, ControlEvent::Engine(EngineEvent::Finished { .. })));
    assert!(controller.handle_event(event));

    // A duplicate completion for the same attempt changes nothing.
    controller.handle_event(ControlEvent::Engine(EngineEvent::Finished {
        ticket: 1,
        result: Err(EngineError::new("duplicate")),
    }));
    controller.handle_event(ControlEvent::Engine(EngineEvent::TimedOut { ticket: 1 }));

    let mut game_overs = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::GameOver { status, forfeit } = event {
            game_overs.push((status, forfeit));
        }
    }
    assert_eq!(game_overs, vec![(SessionStatus::SecondWins, true)]);
    assert_eq!(controller.pipeline().status(), SessionStatus::SecondWins);
    assert!(!controller.engine_busy());
}
