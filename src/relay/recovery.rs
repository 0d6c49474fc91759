//! Session recovery when the session-start message went missing.
//!
//! Two mechanisms run side by side. Inference derives the local side from the
//! owner of the first piece the opponent moves, and only while the local side
//! is still unknown. Explicit resync asks the room for its record after a
//! detection window, and warns if no reply arrives in time.

use super::state::NetworkSessionState;
use crate::types::Side;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Timer expiries scheduled by the recovery protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTimer {
    /// The session-start detection window elapsed.
    StartWindowElapsed {
        /// Epoch the timer was armed in.
        epoch: u64,
    },
    /// No sync reply arrived in time.
    SyncReplyOverdue {
        /// Epoch the timer was armed in.
        epoch: u64,
    },
}

impl RecoveryTimer {
    fn epoch(self) -> u64 {
        match self {
            RecoveryTimer::StartWindowElapsed { epoch }
            | RecoveryTimer::SyncReplyOverdue { epoch } => epoch,
        }
    }
}

/// Result of checking an incoming move's piece owner against the local side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inference {
    /// The local side was already known and the mover is the opponent.
    Consistent,
    /// The local side was unknown and has now been inferred.
    Inferred {
        /// Newly confirmed local side.
        local_side: Side,
    },
    /// A confirmed local side was contradicted.
    Violation {
        /// Description for the user.
        message: String,
    },
}

/// Timers and bookkeeping for recovery.
pub struct SessionRecoveryProtocol<E> {
    tx: mpsc::UnboundedSender<E>,
    start_window: Duration,
    reply_timeout: Duration,
    epoch: u64,
    window_timer: Option<JoinHandle<()>>,
    reply_timer: Option<JoinHandle<()>>,
    sync_outstanding: bool,
}

impl<E> SessionRecoveryProtocol<E>
where
    E: From<RecoveryTimer> + Send + 'static,
{
    /// Creates an idle protocol that reports timers on `tx`.
    pub fn new(
        tx: mpsc::UnboundedSender<E>,
        start_window: Duration,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            tx,
            start_window,
            reply_timeout,
            epoch: 0,
            window_timer: None,
            reply_timer: None,
            sync_outstanding: false,
        }
    }

    /// True while a sync request awaits its reply.
    pub fn sync_outstanding(&self) -> bool {
        self.sync_outstanding
    }

    fn schedule(&self, delay: Duration, timer: RecoveryTimer) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(timer.into()).is_err() {
                debug!(?timer, "Control channel closed, dropping recovery timer");
            }
        })
    }

    /// Starts the session-start detection window after joining.
    #[instrument(skip(self))]
    pub fn arm_start_window(&mut self) {
        self.cancel_all();
        debug!(
            epoch = self.epoch,
            window_ms = self.start_window.as_millis() as u64,
            "Start window armed"
        );
        self.window_timer = Some(self.schedule(
            self.start_window,
            RecoveryTimer::StartWindowElapsed { epoch: self.epoch },
        ));
    }

    /// A session-start arrived; the detection window is no longer needed.
    pub fn on_session_started(&mut self) {
        if let Some(timer) = self.window_timer.take() {
            timer.abort();
        }
    }

    /// A sync request was sent; start waiting for the reply.
    #[instrument(skip(self))]
    pub fn on_sync_requested(&mut self) {
        if let Some(timer) = self.reply_timer.take() {
            timer.abort();
        }
        self.sync_outstanding = true;
        self.reply_timer = Some(self.schedule(
            self.reply_timeout,
            RecoveryTimer::SyncReplyOverdue { epoch: self.epoch },
        ));
    }

    /// A sync reply arrived.
    pub fn on_sync_reply(&mut self) {
        if let Some(timer) = self.reply_timer.take() {
            timer.abort();
        }
        self.sync_outstanding = false;
    }

    /// Accepts a timer from the current epoch, dropping stale ones.
    ///
    /// A reply-overdue timer is only live while a request is outstanding.
    pub fn accept(&mut self, timer: RecoveryTimer) -> bool {
        if timer.epoch() != self.epoch {
            debug!(?timer, current = self.epoch, "Stale recovery timer");
            return false;
        }
        match timer {
            RecoveryTimer::StartWindowElapsed { .. } => {
                self.window_timer = None;
                true
            }
            RecoveryTimer::SyncReplyOverdue { .. } => {
                self.reply_timer = None;
                let live = self.sync_outstanding;
                self.sync_outstanding = false;
                live
            }
        }
    }

    /// Checks the owner of a piece moved by the opponent against the local
    /// side, inferring the local side if it is still unknown.
    #[instrument(skip(self, state))]
    pub fn infer_from_remote_piece(
        &mut self,
        state: &mut NetworkSessionState,
        mover: Side,
    ) -> Inference {
        match *state.local_side() {
            None => {
                let local_side = mover.opponent();
                state.confirm(local_side);
                self.on_session_started();
                info!(%local_side, "Local side inferred from opponent move");
                Inference::Inferred { local_side }
            }
            Some(local) if local == mover => {
                error!(%local, "Opponent moved a piece of the confirmed local side");
                Inference::Violation {
                    message: format!(
                        "opponent moved a {mover} piece but this player is confirmed as \
                         {local}; rejoin required"
                    ),
                }
            }
            Some(_) => Inference::Consistent,
        }
    }

    /// Cancels every timer and invalidates any already in flight.
    pub fn cancel_all(&mut self) {
        self.epoch += 1;
        for timer in [self.window_timer.take(), self.reply_timer.take()].into_iter().flatten() {
            timer.abort();
        }
        if self.sync_outstanding {
            warn!("Dropping outstanding sync request");
        }
        self.sync_outstanding = false;
    }
}

impl<E> Drop for SessionRecoveryProtocol<E> {
    fn drop(&mut self) {
        for timer in [self.window_timer.take(), self.reply_timer.take()].into_iter().flatten() {
            timer.abort();
        }
    }
}

impl<E> std::fmt::Debug for SessionRecoveryProtocol<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecoveryProtocol")
            .field("epoch", &self.epoch)
            .field("sync_outstanding", &self.sync_outstanding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol() -> (
        SessionRecoveryProtocol<RecoveryTimer>,
        mpsc::UnboundedReceiver<RecoveryTimer>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SessionRecoveryProtocol::new(tx, Duration::from_millis(50), Duration::from_millis(50)),
            rx,
        )
    }

    #[tokio::test]
    async fn test_inference_only_fills_unknown_side() {
        let (mut recovery, _rx) = protocol();
        let mut state = NetworkSessionState::new("p1", "r1");

        assert_eq!(
            recovery.infer_from_remote_piece(&mut state, Side::Second),
            Inference::Inferred {
                local_side: Side::First
            }
        );
        assert_eq!(
            recovery.infer_from_remote_piece(&mut state, Side::Second),
            Inference::Consistent
        );
        assert!(matches!(
            recovery.infer_from_remote_piece(&mut state, Side::First),
            Inference::Violation { .. }
        ));
        assert_eq!(*state.local_side(), Some(Side::First));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_fires_then_stale_after_cancel() {
        let (mut recovery, mut rx) = protocol();
        recovery.arm_start_window();
        let timer = rx.recv().await.expect("window timer");
        assert!(recovery.accept(timer));

        recovery.arm_start_window();
        recovery.cancel_all();
        // A timer from a cancelled epoch is refused even if delivered.
        assert!(!recovery.accept(RecoveryTimer::StartWindowElapsed { epoch: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_overdue_only_when_outstanding() {
        let (mut recovery, mut rx) = protocol();
        recovery.on_sync_requested();
        let timer = rx.recv().await.expect("overdue timer");
        assert!(recovery.accept(timer));
        assert!(!recovery.sync_outstanding());

        recovery.on_sync_requested();
        recovery.on_sync_reply();
        assert!(!recovery.accept(RecoveryTimer::SyncReplyOverdue { epoch: 0 }));
    }
}
