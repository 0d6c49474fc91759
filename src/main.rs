//! Duel Session - Unified CLI
//!
//! Local play, room hosting and networked play on the skirmish rules.

#![warn(missing_docs)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{BoardKind, Cli, Command, Seat};
use duel_session::{
    BoardSize, LineTransport, PlayerRole, Position, Roles, RoomServer, SessionConfig,
    SessionController, SessionEvent, SessionHandle, SessionView, Side, SimpleEngine,
    SkirmishBoard, SkirmishPiece, SkirmishRules,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::default(),
    };
    let size = match cli.board {
        BoardKind::Xiangqi => BoardSize::XIANGQI,
        BoardKind::Chess => BoardSize::CHESS,
    };

    match cli.command {
        Command::Local {
            first,
            second,
            think_ms,
        } => run_local(config, size, first, second, think_ms).await,
        Command::Host { addr } => run_host(addr).await,
        Command::Join {
            addr,
            player,
            room,
            engine,
        } => run_join(config, size, addr, player, room, engine).await,
    }
}

/// Play both sides on this machine.
#[instrument(skip(config))]
async fn run_local(
    config: SessionConfig,
    size: BoardSize,
    first: Seat,
    second: Seat,
    think_ms: u64,
) -> Result<()> {
    let rules = Arc::new(SkirmishRules);
    let (events_tx, events) = mpsc::unbounded_channel();
    let (mut controller, rx) = SessionController::new(
        Arc::clone(&rules),
        SkirmishBoard::standard(size),
        config,
        Roles::new(first.into(), second.into()),
        events_tx,
    );
    for side in [Side::First, Side::Second] {
        let engine = SimpleEngine::new(format!("greedy-{side}"), Arc::clone(&rules))
            .with_think_time(Duration::from_millis(think_ms));
        controller.set_engine(side, Arc::new(engine));
    }
    let handle = controller.handle();
    let task = tokio::spawn(controller.run(rx));
    info!("Local session started");
    interact(handle, events).await?;
    task.await?;
    Ok(())
}

/// Run the room relay server.
#[instrument]
async fn run_host(addr: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("Room server listening on {addr}");
    RoomServer::new().serve(listener).await?;
    Ok(())
}

/// Join a room and play the assigned side.
#[instrument(skip(config))]
async fn run_join(
    config: SessionConfig,
    size: BoardSize,
    addr: String,
    player: String,
    room: String,
    engine: bool,
) -> Result<()> {
    let rules = Arc::new(SkirmishRules);
    let (bus, inbound) = LineTransport::connect(&addr).await?;
    let (events_tx, events) = mpsc::unbounded_channel();
    let (mut controller, rx) = SessionController::new(
        Arc::clone(&rules),
        SkirmishBoard::standard(size),
        config,
        Roles::new(PlayerRole::RemoteHuman, PlayerRole::RemoteHuman),
        events_tx,
    );
    let local_role = if engine {
        PlayerRole::LocalEngine
    } else {
        PlayerRole::LocalHuman
    };
    controller.attach_network(Arc::new(bus), local_role);
    for side in [Side::First, Side::Second] {
        controller.set_engine(side, Arc::new(SimpleEngine::new("greedy", Arc::clone(&rules))));
    }

    let handle = controller.handle();
    let forwarder = handle.forward_network(inbound);
    let task = tokio::spawn(controller.run(rx));
    handle.join(player, room)?;
    interact(handle, events).await?;
    forwarder.abort();
    task.await?;
    Ok(())
}

enum Input {
    Move(Position, Position),
    Undo,
    Reset,
    Pause(bool),
    Leave,
    Quit,
    Help,
}

fn parse_input(line: &str) -> Option<Input> {
    match line.trim() {
        "undo" => return Some(Input::Undo),
        "reset" => return Some(Input::Reset),
        "pause" => return Some(Input::Pause(true)),
        "resume" => return Some(Input::Pause(false)),
        "leave" => return Some(Input::Leave),
        "quit" | "exit" => return Some(Input::Quit),
        "help" | "?" => return Some(Input::Help),
        _ => {}
    }
    let numbers: Vec<u8> = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match numbers.as_slice() {
        [r1, c1, r2, c2] => Some(Input::Move(Position::new(*r1, *c1), Position::new(*r2, *c2))),
        _ => None,
    }
}

const HELP: &str =
    "moves: `row col row col` (as drawn); commands: undo, reset, pause, resume, leave, quit";

/// Reads commands from stdin and prints session events until quit or EOF.
async fn interact(
    handle: SessionHandle<SkirmishBoard>,
    mut events: mpsc::UnboundedReceiver<SessionEvent<SkirmishPiece>>,
) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let redraw = matches!(
                    event,
                    SessionEvent::StatusChanged { .. } | SessionEvent::PerspectiveChanged { .. }
                );
                print_event(&event);
                if redraw {
                    let view = handle.inspect().await?;
                    print!("{}", render(&view));
                }
            }
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_input(&line) {
                    Some(Input::Move(from, to)) => handle.submit_move(from, to)?,
                    Some(Input::Undo) => handle.undo()?,
                    Some(Input::Reset) => handle.reset()?,
                    Some(Input::Pause(paused)) => handle.set_paused(paused)?,
                    Some(Input::Leave) => handle.leave()?,
                    Some(Input::Help) => println!("{HELP}"),
                    Some(Input::Quit) => break,
                    None => {
                        warn!(%line, "Unrecognized input");
                        println!("{HELP}");
                    }
                }
            }
        }
    }

    if handle.shutdown().is_err() {
        info!("Control task already stopped");
    }
    Ok(())
}

fn print_event(event: &SessionEvent<SkirmishPiece>) {
    match event {
        SessionEvent::StatusChanged { status, side_to_move } => {
            println!("-- {status}, {side_to_move} to move");
        }
        SessionEvent::MoveApplied {
            side,
            from,
            to,
            captured,
        } => match captured {
            Some(piece) => println!("{side}: {from} -> {to}, captures {piece}"),
            None => println!("{side}: {from} -> {to}"),
        },
        SessionEvent::MoveRejected(reason) => println!("rejected: {reason}"),
        SessionEvent::EngineThinking { side } => println!("{side} is thinking..."),
        SessionEvent::Undone { side_to_move } => println!("undone, {side_to_move} to move"),
        SessionEvent::SideAssigned { side, inferred } => {
            let how = if *inferred { "inferred" } else { "assigned" };
            println!("you play {side} ({how})");
        }
        SessionEvent::PerspectiveChanged { flipped } => {
            println!("board view {}", if *flipped { "flipped" } else { "normal" });
        }
        SessionEvent::PauseChanged(paused) => {
            println!("{}", if *paused { "paused" } else { "resumed" });
        }
        SessionEvent::GameOver { status, forfeit } => {
            let suffix = if *forfeit { " by forfeit" } else { "" };
            println!("game over: {status}{suffix}");
        }
        SessionEvent::Disconnected(reason) => println!("disconnected: {reason}"),
        SessionEvent::RecoverableWarning(message) => println!("warning: {message}"),
        SessionEvent::FatalSessionError(message) => {
            println!("session error: {message} (reset or rejoin)");
        }
    }
}

/// Draws the board in the display frame with the viewer's home rows at the
/// bottom.
fn render(view: &SessionView<SkirmishBoard>) -> String {
    let board = view.board();
    let size = board.size();
    let flipped = *view.flipped();
    let canonical_rows: Vec<u8> = (0..size.rows)
        .map(|i| {
            let display_row = size.max_row() - i;
            if flipped { size.max_row() - display_row } else { display_row }
        })
        .collect();
    let body = board.render_rows(canonical_rows.into_iter(), flipped);

    let mut out = String::new();
    for (i, line) in body.lines().enumerate() {
        let label = size.max_row() as usize - i;
        out.push_str(&format!("{label:>2} {line}\n"));
    }
    out.push_str("   ");
    for col in 0..size.cols {
        out.push_str(&(col % 10).to_string());
    }
    out.push('\n');
    out
}
