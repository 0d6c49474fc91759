//! Wire messages and the message-bus seam.
//!
//! Coordinates on the wire are always canonical.

use crate::error::{SessionError, SessionErrorKind};
use crate::types::{Position, Side};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::instrument;

/// Messages a player sends to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Take a seat in a room.
    Join {
        /// Player identifier.
        player_id: String,
        /// Room identifier.
        room_id: String,
    },
    /// A move, canonical frame.
    Move {
        /// Start square.
        from: Position,
        /// End square.
        to: Position,
    },
    /// Ask the room for the authoritative session state.
    SyncRequest {
        /// Player identifier.
        player_id: String,
        /// Room identifier.
        room_id: String,
        /// Why the sync is requested (see [`SyncReason`]).
        reason: String,
    },
    /// Give up the seat.
    Leave {
        /// Player identifier.
        player_id: String,
    },
}

/// Messages the room sends to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Both seats are filled; carries this player's side.
    SessionStarted {
        /// Side assigned to the receiver.
        side: Side,
    },
    /// The opponent's move, canonical frame.
    Move {
        /// Start square.
        from: Position,
        /// End square.
        to: Position,
    },
    /// Answer to a [`ClientMessage::SyncRequest`].
    SyncReply(SyncState),
    /// The link or the opponent went away.
    Disconnected {
        /// Human-readable reason.
        reason: String,
    },
    /// The room refused a request.
    Error {
        /// Human-readable message.
        message: String,
    },
}

/// Authoritative session state as reported by the room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// False if the room could not answer (unknown room or player).
    pub success: bool,
    /// Reason for a failed reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Side the room assigned to the requester.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_side: Option<Side>,
    /// Side the room believes is to move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_to_move: Option<Side>,
    /// True once both seats were filled.
    #[serde(default)]
    pub started: bool,
    /// True if the room recorded a finished game.
    #[serde(default)]
    pub game_over: bool,
    /// Winner of a finished game; `None` with `game_over` means a draw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Side>,
}

/// Reasons attached to sync requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SyncReason {
    /// No session-start arrived within the detection window.
    SessionStartMissing,
    /// The rules engine refused an incoming move.
    RemoteMoveRejected,
    /// An incoming move started from an empty square.
    UnknownPieceOwner,
    /// The room refused a move this end had already applied.
    LocalMoveRefused,
}

/// Outbound half of the message bus.
pub trait MessageBus: Send + Sync {
    /// Queues a message for the room.
    fn send(&self, message: ClientMessage) -> Result<(), SessionError>;
}

/// [`MessageBus`] backed by an unbounded channel.
///
/// The receiving end is drained by a transport writer task, or inspected
/// directly in tests.
#[derive(Debug, Clone)]
pub struct ChannelBus {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl ChannelBus {
    /// Creates a bus and the receiver of everything sent on it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Wraps an existing sender.
    pub fn from_sender(tx: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { tx }
    }
}

impl MessageBus for ChannelBus {
    #[instrument(skip(self))]
    fn send(&self, message: ClientMessage) -> Result<(), SessionError> {
        self.tx.send(message).map_err(|err| {
            SessionError::new(SessionErrorKind::Transport(format!(
                "outbound channel closed, dropped {:?}",
                err.0
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_tagged_snake_case() {
        let msg = ClientMessage::SyncRequest {
            player_id: "p1".into(),
            room_id: "r1".into(),
            reason: SyncReason::SessionStartMissing.to_string(),
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["type"], "sync_request");
        assert_eq!(json["reason"], "session_start_missing");
    }

    #[test]
    fn test_sync_reply_flattens_state() {
        let json = r#"{"type":"sync_reply","success":true,"your_side":"second","started":true}"#;
        let msg: ServerMessage = serde_json::from_str(json).expect("deserialize");
        assert_eq!(
            msg,
            ServerMessage::SyncReply(SyncState {
                success: true,
                your_side: Some(Side::Second),
                started: true,
                ..SyncState::default()
            })
        );
    }

    #[test]
    fn test_closed_channel_is_transport_error() {
        let (bus, rx) = ChannelBus::new();
        drop(rx);
        let err = bus
            .send(ClientMessage::Leave {
                player_id: "p1".into(),
            })
            .expect_err("closed");
        assert!(matches!(err.kind, SessionErrorKind::Transport(_)));
    }
}
