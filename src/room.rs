//! Two-seat room relay server.
//!
//! The room is the authority on side assignment. It seats the first joiner as
//! FIRST and the second as SECOND, announces the start to both, forwards each
//! move to the other seat and answers sync requests from its own record. It
//! knows nothing about the rules; turn order is tracked by move parity.

use crate::error::SessionError;
use crate::relay::{ClientMessage, ServerMessage, SyncState};
use crate::transport::spawn_line_io;
use crate::types::{Position, Side};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, instrument, warn};

/// Unique identifier for a player.
pub type PlayerId = String;

#[derive(Debug)]
struct Seat {
    player_id: PlayerId,
    side: Side,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Seat {
    fn send(&self, message: ServerMessage) {
        if self.tx.send(message).is_err() {
            debug!(player_id = %self.player_id, "Seat connection already closed");
        }
    }
}

/// The room's record of the match.
#[derive(Debug, Default)]
pub struct RoomState {
    room_id: Option<String>,
    seats: Vec<Seat>,
    moves: u64,
    started: bool,
}

impl RoomState {
    fn seat(&self, player_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.player_id == player_id)
    }

    fn opponent_of(&self, player_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.player_id != player_id)
    }

    /// Side whose turn it is, by move parity.
    pub fn side_to_move(&self) -> Side {
        if self.moves % 2 == 0 {
            Side::First
        } else {
            Side::Second
        }
    }

    /// True once both seats are filled.
    pub fn started(&self) -> bool {
        self.started
    }

    /// Seats a player. Returns the assigned side.
    #[instrument(skip(self, tx))]
    pub fn join(
        &mut self,
        player_id: PlayerId,
        room_id: String,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Side, String> {
        match &self.room_id {
            Some(existing) if *existing != room_id => {
                warn!(%existing, "Join for a different room");
                return Err(format!("this server hosts room {existing}"));
            }
            Some(_) => {}
            None => self.room_id = Some(room_id),
        }

        if let Some(seat) = self.seats.iter_mut().find(|s| s.player_id == player_id) {
            info!(side = %seat.side, "Player rejoined");
            seat.tx = tx;
            if self.started {
                seat.send(ServerMessage::SessionStarted { side: seat.side });
            }
            return Ok(seat.side);
        }

        let side = if self.seats.iter().any(|s| s.side == Side::First) {
            Side::Second
        } else {
            Side::First
        };
        if self.seats.len() >= 2 {
            warn!("Room already has 2 players");
            return Err("room already has 2 players".to_string());
        }
        info!(%side, "Player seated");
        self.seats.push(Seat {
            player_id,
            side,
            tx,
        });

        if self.seats.len() == 2 && !self.started {
            self.started = true;
            self.moves = 0;
            info!("Both seats filled, session started");
            for seat in &self.seats {
                seat.send(ServerMessage::SessionStarted { side: seat.side });
            }
        }
        Ok(side)
    }

    /// Forwards a move from `player_id` to the other seat.
    #[instrument(skip(self))]
    pub fn relay_move(
        &mut self,
        player_id: &str,
        from: Position,
        to: Position,
    ) -> Result<(), String> {
        let seat = self
            .seat(player_id)
            .ok_or_else(|| "not seated in this room".to_string())?;
        if !self.started {
            return Err("waiting for an opponent".to_string());
        }
        if seat.side != self.side_to_move() {
            warn!(side = %seat.side, expected = %self.side_to_move(), "Move out of turn");
            return Err(format!("not your turn; {} to move", self.side_to_move()));
        }
        if let Some(opponent) = self.opponent_of(player_id) {
            opponent.send(ServerMessage::Move { from, to });
        }
        self.moves += 1;
        debug!(moves = self.moves, "Move relayed");
        Ok(())
    }

    /// Builds the sync reply for `player_id`.
    #[instrument(skip(self))]
    pub fn sync_state(&self, player_id: &str, room_id: &str) -> SyncState {
        if self.room_id.as_deref() != Some(room_id) {
            return SyncState {
                success: false,
                error: Some(format!("unknown room {room_id}")),
                ..SyncState::default()
            };
        }
        match self.seat(player_id) {
            Some(seat) => SyncState {
                success: true,
                your_side: Some(seat.side),
                side_to_move: self.started.then(|| self.side_to_move()),
                started: self.started,
                ..SyncState::default()
            },
            None => SyncState {
                success: false,
                error: Some(format!("player {player_id} is not seated")),
                ..SyncState::default()
            },
        }
    }

    /// Frees a seat and tells the other player.
    #[instrument(skip(self))]
    pub fn leave(&mut self, player_id: &str) {
        let before = self.seats.len();
        self.seats.retain(|s| s.player_id != player_id);
        if self.seats.len() == before {
            return;
        }
        info!("Player left the room");
        for seat in &self.seats {
            seat.send(ServerMessage::Disconnected {
                reason: "opponent left the room".to_string(),
            });
        }
        self.started = false;
        self.moves = 0;
        if self.seats.is_empty() {
            self.room_id = None;
        }
    }
}

/// TCP front end for a single [`RoomState`].
#[derive(Debug, Clone, Default)]
pub struct RoomServer {
    state: Arc<Mutex<RoomState>>,
}

impl RoomServer {
    /// Creates an empty room.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared room state.
    pub fn state(&self) -> Arc<Mutex<RoomState>> {
        Arc::clone(&self.state)
    }

    /// Accepts connections forever.
    #[instrument(skip(self, listener))]
    pub async fn serve(self, listener: TcpListener) -> Result<(), SessionError> {
        info!(addr = ?listener.local_addr().ok(), "Room server listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(%peer, "Connection accepted");
            let server = self.clone();
            tokio::spawn(async move { server.handle_connection(stream).await });
        }
    }

    #[instrument(skip(self, stream))]
    async fn handle_connection(&self, stream: TcpStream) {
        let (tx, mut rx) = spawn_line_io::<ClientMessage, ServerMessage>(stream, |_| None);
        let mut player: Option<PlayerId> = None;

        while let Some(message) = rx.recv().await {
            let mut room = self.state.lock().await;
            let result = match message {
                ClientMessage::Join { player_id, room_id } => {
                    room.join(player_id.clone(), room_id, tx.clone()).map(|_| {
                        player = Some(player_id);
                    })
                }
                ClientMessage::Move { from, to } => match &player {
                    Some(id) => room.relay_move(id, from, to),
                    None => Err("join a room first".to_string()),
                },
                ClientMessage::SyncRequest {
                    player_id,
                    room_id,
                    reason,
                } => {
                    info!(%player_id, %reason, "Sync requested");
                    let reply = room.sync_state(&player_id, &room_id);
                    if tx.send(ServerMessage::SyncReply(reply)).is_err() {
                        debug!("Requester connection closed");
                    }
                    Ok(())
                }
                ClientMessage::Leave { player_id } => {
                    if player.as_deref() == Some(player_id.as_str()) {
                        room.leave(&player_id);
                        player = None;
                        Ok(())
                    } else {
                        warn!(%player_id, seated = ?player, "Leave for another player refused");
                        Err(format!("cannot leave on behalf of {player_id}"))
                    }
                }
            };
            if let Err(message) = result
                && tx.send(ServerMessage::Error { message }).is_err()
            {
                debug!("Connection closed before error was sent");
            }
        }

        if let Some(id) = player {
            self.state.lock().await.leave(&id);
        }
    }
}
