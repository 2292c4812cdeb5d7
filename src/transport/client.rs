//! Outbound WebSocket connection.
//!
//! [`RemoteClient::connect`] returns immediately; dialing happens on a
//! spawned task that reports the outcome as peer events:
//!
//! | Outcome | Events |
//! |---------|--------|
//! | handshake ok | `Opened`, then `Frame`s, then `Closed` |
//! | dial failed | `Failed`, `Closed` |
//! | closed while dialing | none |
//!
//! There is no automatic reconnect. Callers replace the client explicitly.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use url::Url;

use crate::identifiers::PeerId;

use super::{Connection, EventSender, PeerEvent, TransportEvent};

// ============================================================================
// ClientSlot
// ============================================================================

/// State shared between the handle and the dial task.
#[derive(Default)]
struct ClientSlot {
    /// Set once [`RemoteClient::close`] ran.
    closed: bool,
    /// Live connection after a successful handshake.
    connection: Option<Connection>,
}

// ============================================================================
// RemoteClient
// ============================================================================

/// Handle to one outbound connection attempt.
///
/// Dropping the handle closes the connection.
pub struct RemoteClient {
    /// Peer id used for every event of this attempt.
    peer: PeerId,
    /// Dialed URL.
    url: Url,
    /// Shared slot.
    slot: Arc<Mutex<ClientSlot>>,
    /// Dial task.
    task: JoinHandle<()>,
}

impl fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteClient")
            .field("peer", &self.peer)
            .field("url", &self.url.as_str())
            .field("open", &self.is_open())
            .finish()
    }
}

impl RemoteClient {
    /// Starts dialing `url`.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn connect(url: Url, events: EventSender) -> Self {
        let peer = PeerId::next();
        let slot = Arc::new(Mutex::new(ClientSlot::default()));

        let task = tokio::spawn(Self::dial(url.clone(), peer, Arc::clone(&slot), events));

        Self {
            peer,
            url,
            slot,
            task,
        }
    }

    /// Returns the peer id of this attempt.
    #[inline]
    #[must_use]
    pub const fn peer(&self) -> PeerId {
        self.peer
    }

    /// Returns the dialed URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns `true` while the handshake is done and the socket is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.slot
            .lock()
            .connection
            .as_ref()
            .is_some_and(|connection| !connection.is_closed())
    }

    /// Closes the connection or abandons the attempt.
    ///
    /// Calling it more than once is harmless.
    pub fn close(&self) {
        let connection = {
            let mut slot = self.slot.lock();
            if slot.closed {
                return;
            }
            slot.closed = true;
            slot.connection.take()
        };

        match connection {
            Some(connection) => {
                debug!(peer = %self.peer, "Closing client connection");
                connection.shutdown();
            }
            None => {
                debug!(peer = %self.peer, "Abandoning connection attempt");
                self.task.abort();
            }
        }
    }

    /// Dials and installs the connection.
    async fn dial(url: Url, peer: PeerId, slot: Arc<Mutex<ClientSlot>>, events: EventSender) {
        debug!(%peer, url = %url, "Dialing");

        let ws_stream = match connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                if slot.lock().closed {
                    return;
                }
                warn!(%peer, url = %url, error = %e, "Connection failed");
                let _ = events.send(PeerEvent {
                    peer,
                    event: TransportEvent::Failed(e.to_string()),
                });
                let _ = events.send(PeerEvent {
                    peer,
                    event: TransportEvent::Closed,
                });
                return;
            }
        };

        let mut slot = slot.lock();
        if slot.closed {
            debug!(%peer, "Closed while dialing, dropping socket");
            return;
        }

        info!(%peer, url = %url, "Connected");
        let _ = events.send(PeerEvent {
            peer,
            event: TransportEvent::Opened,
        });
        slot.connection = Some(Connection::spawn(ws_stream, peer, events));
    }
}

impl Drop for RemoteClient {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    use crate::transport::{EventReceiver, event_channel};

    async fn next_event(events: &mut EventReceiver) -> PeerEvent {
        timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    async fn listener() -> (TcpListener, Url) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("ws://{}", listener.local_addr().unwrap())).unwrap();
        (listener, url)
    }

    #[tokio::test]
    async fn test_open_then_frames() {
        let (listener, url) = listener().await;
        let (events_tx, mut events) = event_channel();
        let client = RemoteClient::connect(url, events_tx);

        let (stream, _) = listener.accept().await.unwrap();
        let mut server = accept_async(stream).await.unwrap();

        let opened = next_event(&mut events).await;
        assert_eq!(opened.peer, client.peer());
        assert_eq!(opened.event, TransportEvent::Opened);

        server
            .send(Message::Text(r#"{"type":"cursor","text":"hi"}"#.into()))
            .await
            .unwrap();
        let frame = next_event(&mut events).await;
        assert_eq!(
            frame.event,
            TransportEvent::Frame(r#"{"type":"cursor","text":"hi"}"#.into())
        );
        assert!(client.is_open());
    }

    #[tokio::test]
    async fn test_refused_reports_failed_then_closed() {
        let (listener, url) = listener().await;
        drop(listener);

        let (events_tx, mut events) = event_channel();
        let _client = RemoteClient::connect(url, events_tx);

        assert!(matches!(
            next_event(&mut events).await.event,
            TransportEvent::Failed(_)
        ));
        assert_eq!(next_event(&mut events).await.event, TransportEvent::Closed);
    }

    #[tokio::test]
    async fn test_close_sends_close_frame() {
        let (listener, url) = listener().await;
        let (events_tx, mut events) = event_channel();
        let client = RemoteClient::connect(url, events_tx);

        let (stream, _) = listener.accept().await.unwrap();
        let mut server = accept_async(stream).await.unwrap();
        assert_eq!(next_event(&mut events).await.event, TransportEvent::Opened);

        client.close();
        client.close();

        let message = timeout(Duration::from_secs(5), server.next()).await.unwrap();
        assert!(matches!(message, Some(Ok(Message::Close(_))) | None));
        assert_eq!(next_event(&mut events).await.event, TransportEvent::Closed);
        assert!(!client.is_open());
    }

    #[tokio::test]
    async fn test_close_while_dialing_emits_nothing() {
        let (listener, url) = listener().await;
        let (events_tx, mut events) = event_channel();
        let client = RemoteClient::connect(url, events_tx);
        client.close();
        drop(client);

        // Accept whatever arrives so a late dial does not hang.
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let _ = accept_async(stream).await;
            }
        });

        let outcome = timeout(Duration::from_millis(300), events.recv()).await;
        assert!(matches!(outcome, Err(_) | Ok(None)));
    }
}
