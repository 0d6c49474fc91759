//! Per-connection network session state.

use crate::types::Side;
use derive_getters::Getters;
use tracing::{info, instrument};

/// What this end knows about the networked session.
///
/// Created unconfirmed when joining, confirmed by a session-start message,
/// a sync reply or recovery inference, and reset on disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct NetworkSessionState {
    /// Player identifier used on the wire.
    player_id: String,
    /// Room identifier used on the wire.
    room_id: String,
    /// Side assigned to this end, once known.
    local_side: Option<Side>,
    /// True after a local move was sent and before the reply arrives.
    awaiting_remote_move: bool,
    /// True once `local_side` is authoritative.
    session_confirmed: bool,
    /// True after a fatal protocol violation; cleared only by rejoining.
    torn_down: bool,
}

impl NetworkSessionState {
    /// Creates an unconfirmed state.
    pub fn new(player_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            room_id: room_id.into(),
            local_side: None,
            awaiting_remote_move: false,
            session_confirmed: false,
            torn_down: false,
        }
    }

    /// Records the authoritative local side.
    ///
    /// Only fills an unknown side; returns false if a side was already set.
    #[instrument(skip(self), fields(player = %self.player_id))]
    pub fn confirm(&mut self, side: Side) -> bool {
        if self.local_side.is_some() {
            return false;
        }
        info!(%side, "Local side confirmed");
        self.local_side = Some(side);
        self.session_confirmed = true;
        true
    }

    /// Sets or clears the awaiting-reply flag.
    pub fn set_awaiting_remote_move(&mut self, awaiting: bool) {
        self.awaiting_remote_move = awaiting;
    }

    /// Marks the session unusable.
    pub fn tear_down(&mut self) {
        self.torn_down = true;
        self.awaiting_remote_move = false;
    }

    /// Back to unconfirmed, keeping the identifiers.
    #[instrument(skip(self), fields(player = %self.player_id))]
    pub fn reset(&mut self) {
        info!("Network session state reset");
        self.local_side = None;
        self.awaiting_remote_move = false;
        self.session_confirmed = false;
        self.torn_down = false;
    }
}
