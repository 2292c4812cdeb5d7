//! Per-socket event loop.
//!
//! A [`Connection`] owns one upgraded WebSocket. The socket itself lives in
//! a spawned task that:
//!
//! - forwards inbound text frames as [`TransportEvent::Frame`]
//! - writes outbound frames queued through [`Connection::send`]
//! - closes the socket on [`Connection::shutdown`]
//! - reports [`TransportEvent::Closed`] exactly once when it ends

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::PeerId;

use super::{EventSender, PeerEvent, TransportEvent};

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a text frame.
    Send(String),
    /// Close the socket and stop.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to a live WebSocket.
///
/// Cloning is cheap; all clones drive the same socket.
#[derive(Clone)]
pub struct Connection {
    /// Peer this socket belongs to.
    peer: PeerId,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Takes ownership of an upgraded socket and spawns its event loop.
    pub(crate) fn spawn<S>(ws_stream: WebSocketStream<S>, peer: PeerId, events: EventSender) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_event_loop(ws_stream, peer, command_rx, events));

        Self { peer, command_tx }
    }

    /// Returns the peer id.
    #[inline]
    #[must_use]
    pub const fn peer(&self) -> PeerId {
        self.peer
    }

    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has ended.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        self.command_tx
            .send(ConnectionCommand::Send(text.into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Closes the socket.
    ///
    /// Does nothing if the event loop has already ended.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Returns `true` once the event loop has ended.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        peer: PeerId,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        events: EventSender,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let emit = |event: TransportEvent| {
            let _ = events.send(PeerEvent { peer, event });
        };

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(%peer, len = text.len(), "Frame received");
                            emit(TransportEvent::Frame(text.to_string()));
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(%peer, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(%peer, error = %e, "WebSocket error");
                            emit(TransportEvent::Failed(e.to_string()));
                            break;
                        }

                        None => {
                            debug!(%peer, "WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(text)) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                warn!(%peer, error = %e, "Failed to send frame");
                            }
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!(%peer, "Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!(%peer, "Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        command_rx.close();
        emit(TransportEvent::Closed);
        debug!(%peer, "Event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
