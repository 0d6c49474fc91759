//! Tests for the running control task: human vs engine play, undo and pause.

use duel_session::{
    BoardSize, ChannelBus, ClientMessage, ControlEvent, EngineEvent, Move, PlayerRole, Position,
    Roles, ServerMessage, SessionConfig, SessionController, SessionEvent, SessionStatus, Side,
    SimpleEngine, SkirmishBoard, SkirmishPiece, SkirmishRules,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

type Events = mpsc::UnboundedReceiver<SessionEvent<SkirmishPiece>>;

/// Waits for the first event matching `pred`, returning everything seen.
async fn wait_for(
    events: &mut Events,
    pred: impl Fn(&SessionEvent<SkirmishPiece>) -> bool,
) -> Vec<SessionEvent<SkirmishPiece>> {
    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within five seconds")
            .expect("events channel open");
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn test_human_against_engine_then_undo_both_moves() {
    let rules = Arc::new(SkirmishRules);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (mut controller, rx) = SessionController::new(
        Arc::clone(&rules),
        SkirmishBoard::standard(BoardSize::XIANGQI),
        SessionConfig::default(),
        Roles::new(PlayerRole::LocalHuman, PlayerRole::LocalEngine),
        events_tx,
    );
    controller.set_engine(Side::Second, Arc::new(SimpleEngine::new("greedy", rules)));
    let handle = controller.handle();
    let task = tokio::spawn(controller.run(rx));

    handle
        .submit_move(Position::new(1, 0), Position::new(2, 0))
        .expect("control task running");
    let seen = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::MoveApplied { side: Side::Second, .. })
    })
    .await;
    assert!(seen.contains(&SessionEvent::EngineThinking { side: Side::Second }));

    let view = handle.inspect().await.expect("view");
    assert_eq!(*view.side_to_move(), Side::First);
    assert_eq!(*view.history_len(), 2);
    assert!(!*view.flipped());

    // With the engine to move after one rollback, undo takes back both moves.
    handle.undo().expect("control task running");
    let view = handle.inspect().await.expect("view");
    assert_eq!(*view.history_len(), 0);
    assert_eq!(*view.side_to_move(), Side::First);
    assert_eq!(view.board(), &SkirmishBoard::standard(BoardSize::XIANGQI));

    handle.shutdown().expect("control task running");
    timeout(Duration::from_secs(5), task)
        .await
        .expect("control task stops")
        .expect("control task did not panic");
}

#[tokio::test]
async fn test_move_for_engine_side_is_rejected() {
    let rules = Arc::new(SkirmishRules);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (mut controller, _rx) = SessionController::new(
        rules,
        SkirmishBoard::standard(BoardSize::CHESS),
        SessionConfig::default(),
        Roles::new(PlayerRole::LocalEngine, PlayerRole::LocalHuman),
        events_tx,
    );
    controller.handle_event(ControlEvent::LocalMove {
        from: Position::new(1, 0),
        to: Position::new(2, 0),
    });
    let mut rejected = false;
    while let Ok(event) = events.try_recv() {
        rejected |= matches!(event, SessionEvent::MoveRejected(_));
    }
    assert!(rejected);
    assert!(controller.pipeline().turn().history().is_empty());
}

#[tokio::test]
async fn test_pause_cancels_engine_and_resume_redispatches() {
    let rules = Arc::new(SkirmishRules);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (mut controller, mut rx) = SessionController::new(
        Arc::clone(&rules),
        SkirmishBoard::standard(BoardSize::CHESS),
        SessionConfig::default(),
        Roles::new(PlayerRole::LocalEngine, PlayerRole::LocalHuman),
        events_tx,
    );
    let engine = SimpleEngine::new("greedy", rules).with_think_time(Duration::from_millis(50));
    controller.set_engine(Side::First, Arc::new(engine));

    controller.start();
    assert!(controller.engine_busy());
    controller.handle_event(ControlEvent::SetPaused(true));
    assert!(!controller.engine_busy());

    // Whatever the cancelled attempt still sends is stale.
    while let Ok(Some(event)) = timeout(Duration::from_millis(150), rx.recv()).await {
        controller.handle_event(event);
    }
    assert!(controller.pipeline().turn().history().is_empty());

    controller.handle_event(ControlEvent::SetPaused(false));
    assert!(controller.engine_busy());
    while controller.pipeline().turn().history().is_empty() {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("engine answers")
            .expect("channel open");
        controller.handle_event(event);
    }

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&SessionEvent::PauseChanged(true)));
    assert!(seen.contains(&SessionEvent::PauseChanged(false)));
    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, SessionEvent::MoveApplied { .. }))
            .count(),
        1
    );
    assert_eq!(controller.pipeline().side_to_move(), Side::Second);
}

#[tokio::test]
async fn test_switching_engine_side_to_human_cancels_request() {
    let rules = Arc::new(SkirmishRules);
    let (events_tx, _events) = mpsc::unbounded_channel();
    let (mut controller, _rx) = SessionController::new(
        Arc::clone(&rules),
        SkirmishBoard::standard(BoardSize::CHESS),
        SessionConfig::default(),
        Roles::new(PlayerRole::LocalEngine, PlayerRole::LocalHuman),
        events_tx,
    );
    let engine = SimpleEngine::new("greedy", rules).with_think_time(Duration::from_millis(200));
    controller.set_engine(Side::First, Arc::new(engine));
    controller.start();
    assert!(controller.engine_busy());

    controller.handle_event(ControlEvent::SetRole {
        side: Side::First,
        role: PlayerRole::LocalHuman,
    });
    assert!(!controller.engine_busy());
    assert_eq!(controller.roles().of(Side::First), PlayerRole::LocalHuman);

    controller.handle_event(ControlEvent::LocalMove {
        from: Position::new(1, 0),
        to: Position::new(2, 0),
    });
    assert_eq!(controller.pipeline().side_to_move(), Side::Second);
}

#[tokio::test]
async fn test_nothing_is_dispatched_after_the_game_ends() {
    let mut board = SkirmishBoard::empty(BoardSize::CHESS);
    board.place(Position::new(0, 0), SkirmishPiece::general(Side::First));
    board.place(Position::new(4, 4), SkirmishPiece::soldier(Side::First));
    board.place(Position::new(5, 5), SkirmishPiece::general(Side::Second));
    board.place(Position::new(7, 7), SkirmishPiece::soldier(Side::Second));

    let rules = Arc::new(SkirmishRules);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (mut controller, _rx) = SessionController::new(
        Arc::clone(&rules),
        board,
        SessionConfig::default(),
        Roles::new(PlayerRole::LocalHuman, PlayerRole::LocalEngine),
        events_tx,
    );
    controller.set_engine(Side::Second, Arc::new(SimpleEngine::new("greedy", rules)));
    controller.start();

    controller.handle_event(ControlEvent::LocalMove {
        from: Position::new(4, 4),
        to: Position::new(5, 5),
    });
    controller.handle_event(ControlEvent::LocalMove {
        from: Position::new(0, 0),
        to: Position::new(1, 1),
    });

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&SessionEvent::GameOver {
        status: SessionStatus::FirstWins,
        forfeit: false,
    }));
    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::EngineThinking { .. })));
    assert!(matches!(seen.last(), Some(SessionEvent::MoveRejected(_))));
    assert!(!controller.engine_busy());
    assert_eq!(controller.pipeline().turn().history().len(), 1);
}

/// Feeds everything the control channel produces within `window`.
async fn pump_for(
    controller: &mut SessionController<SkirmishRules>,
    rx: &mut mpsc::UnboundedReceiver<ControlEvent<SkirmishBoard>>,
    window: Duration,
) {
    while let Ok(Some(event)) = timeout(window, rx.recv()).await {
        controller.handle_event(event);
    }
}

fn moves_applied(events: &mut Events) -> usize {
    let mut count = 0;
    while let Ok(event) = events.try_recv() {
        count += usize::from(matches!(event, SessionEvent::MoveApplied { .. }));
    }
    count
}

#[tokio::test]
async fn test_reset_cancels_engine_and_ignores_its_answer() {
    let rules = Arc::new(SkirmishRules);
    let opening = SkirmishBoard::standard(BoardSize::CHESS);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (mut controller, mut rx) = SessionController::new(
        Arc::clone(&rules),
        opening.clone(),
        SessionConfig::default(),
        Roles::new(PlayerRole::LocalHuman, PlayerRole::LocalEngine),
        events_tx,
    );
    let engine = SimpleEngine::new("greedy", rules).with_think_time(Duration::from_millis(200));
    controller.set_engine(Side::Second, Arc::new(engine));
    controller.start();

    controller.handle_event(ControlEvent::LocalMove {
        from: Position::new(1, 0),
        to: Position::new(2, 0),
    });
    assert!(controller.engine_busy());

    controller.handle_event(ControlEvent::Reset);
    assert!(!controller.engine_busy());
    let _ = moves_applied(&mut events);

    // The first request carried ticket 1; its answer is stale now.
    controller.handle_event(ControlEvent::Engine(EngineEvent::Finished {
        ticket: 1,
        result: Ok(Some(Move::new(Position::new(6, 7), Position::new(5, 7)))),
    }));
    pump_for(&mut controller, &mut rx, Duration::from_millis(400)).await;

    assert_eq!(moves_applied(&mut events), 0);
    assert_eq!(controller.pipeline().board(), &opening);
    assert!(controller.pipeline().turn().history().is_empty());
    assert_eq!(controller.pipeline().side_to_move(), Side::First);
    assert!(!controller.engine_busy());
}

#[tokio::test]
async fn test_leaving_the_room_cancels_engine_and_ignores_its_answer() {
    let rules = Arc::new(SkirmishRules);
    let opening = SkirmishBoard::standard(BoardSize::CHESS);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (mut controller, mut rx) = SessionController::new(
        Arc::clone(&rules),
        opening.clone(),
        SessionConfig::default(),
        Roles::default(),
        events_tx,
    );
    let engine = SimpleEngine::new("greedy", rules).with_think_time(Duration::from_millis(200));
    controller.set_engine(Side::First, Arc::new(engine));
    let (bus, mut outbound) = ChannelBus::new();
    controller.attach_network(Arc::new(bus), PlayerRole::LocalEngine);
    controller.handle_event(ControlEvent::JoinMatch {
        player_id: "p1".to_string(),
        room_id: "r1".to_string(),
    });
    controller.handle_event(ServerMessage::SessionStarted { side: Side::First }.into());
    assert!(controller.engine_busy());

    controller.handle_event(ControlEvent::Leave);
    assert!(!controller.engine_busy());
    let mut sent = Vec::new();
    while let Ok(message) = outbound.try_recv() {
        sent.push(message);
    }
    assert!(sent.contains(&ClientMessage::Leave {
        player_id: "p1".to_string()
    }));
    let _ = moves_applied(&mut events);

    controller.handle_event(ControlEvent::Engine(EngineEvent::Finished {
        ticket: 1,
        result: Ok(Some(Move::new(Position::new(1, 0), Position::new(2, 0)))),
    }));
    pump_for(&mut controller, &mut rx, Duration::from_millis(400)).await;

    assert_eq!(moves_applied(&mut events), 0);
    assert_eq!(controller.pipeline().board(), &opening);
    assert!(controller.pipeline().turn().history().is_empty());
    assert!(!controller.engine_busy());
    assert!(outbound.try_recv().is_err());
}
