//! JSON-lines over TCP.
//!
//! One JSON message per line in each direction. The same framing serves the
//! player client and the room server.

use crate::error::SessionError;
use crate::relay::{ChannelBus, ClientMessage, ServerMessage};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Splits `stream` into a reader task and a writer task.
///
/// Returns the sender feeding the writer and the receiver fed by the reader.
/// When the peer closes or the read fails, `on_close` may inject one final
/// inbound message. The writer stops when every sender is dropped.
pub fn spawn_line_io<In, Out>(
    stream: TcpStream,
    on_close: fn(String) -> Option<In>,
) -> (mpsc::UnboundedSender<Out>, mpsc::UnboundedReceiver<In>)
where
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + 'static,
{
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (read_half, mut write_half) = stream.into_split();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Out>();

    let reader_peer = peer.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        let reason = loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match serde_json::from_str::<In>(&line) {
                    Ok(message) => {
                        if in_tx.send(message).is_err() {
                            debug!(peer = %reader_peer, "Inbound receiver dropped");
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(peer = %reader_peer, error = %err, "Undecodable line skipped")
                    }
                },
                Ok(None) => break "connection closed by peer".to_string(),
                Err(err) => break format!("read failed: {err}"),
            }
        };
        info!(peer = %reader_peer, %reason, "Connection reader finished");
        if let Some(message) = on_close(reason)
            && in_tx.send(message).is_err()
        {
            debug!(peer = %reader_peer, "Inbound receiver dropped before close notice");
        }
    });

    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let mut line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(err) => {
                    warn!(peer = %peer, error = %err, "Unencodable message dropped");
                    continue;
                }
            };
            line.push('\n');
            if let Err(err) = write_half.write_all(line.as_bytes()).await {
                warn!(peer = %peer, error = %err, "Write failed, closing writer");
                break;
            }
        }
        debug!(peer = %peer, "Connection writer finished");
    });

    (out_tx, in_rx)
}

/// Player-side TCP transport.
#[derive(Debug)]
pub struct LineTransport;

impl LineTransport {
    /// Connects to a room server.
    ///
    /// Returns the outbound bus and the inbound message stream. A closed
    /// socket arrives as [`ServerMessage::Disconnected`].
    #[instrument(skip(addr))]
    pub async fn connect(
        addr: impl ToSocketAddrs,
    ) -> Result<(ChannelBus, mpsc::UnboundedReceiver<ServerMessage>), SessionError> {
        let stream = TcpStream::connect(addr).await?;
        info!(peer = ?stream.peer_addr().ok(), "Connected to room");
        let (tx, rx) = spawn_line_io::<ServerMessage, ClientMessage>(stream, |reason| {
            Some(ServerMessage::Disconnected { reason })
        });
        Ok((ChannelBus::from_sender(tx), rx))
    }
}
