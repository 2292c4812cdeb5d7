//! Local WebSocket server.
//!
//! A controller connects into the editor through this server.
//!
//! # Port Selection
//!
//! 1. Try the configured port
//! 2. If it is in use, try each fallback port in list order
//! 3. If every candidate is in use, let the OS assign a port (degraded)
//!
//! # Peers
//!
//! Exactly one peer is active at a time. When a new controller completes
//! the WebSocket upgrade it becomes the active peer and the previous one is
//! closed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::PeerId;

use super::{Connection, EventSender, PeerEvent, TransportEvent};

// ============================================================================
// PortSelection
// ============================================================================

/// How the listening port was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// The configured port.
    Primary,
    /// One of the fallback ports.
    Fallback,
    /// OS-assigned after every candidate was in use.
    Ephemeral,
}

/// Outcome of [`bind_with_fallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSelection {
    /// Configured port.
    pub requested: u16,
    /// Port actually bound.
    pub bound: u16,
    /// How `bound` was chosen.
    pub kind: PortKind,
}

impl PortSelection {
    /// Returns `true` if the configured port could not be used.
    #[inline]
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.kind != PortKind::Primary
    }

    /// Returns `true` if no configured candidate was free.
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.kind == PortKind::Ephemeral
    }
}

// ============================================================================
// Binding
// ============================================================================

/// Returns the ports to try, in order, before falling back to the OS.
///
/// Zero and repeats of the primary port are skipped.
#[must_use]
pub(crate) fn candidate_ports(port: u16, fallbacks: &[u16]) -> Vec<(u16, PortKind)> {
    let mut candidates = vec![(port, PortKind::Primary)];
    candidates.extend(
        fallbacks
            .iter()
            .copied()
            .filter(|&candidate| candidate != 0 && candidate != port)
            .map(|candidate| (candidate, PortKind::Fallback)),
    );
    candidates
}

/// Binds a TCP listener on `host`, walking the fallback list on conflicts.
///
/// A primary port of 0 binds an OS-assigned port directly and is not
/// considered degraded.
///
/// # Errors
///
/// Returns [`Error::Bind`] for any bind failure other than the address
/// being in use.
pub async fn bind_with_fallback(
    host: &str,
    port: u16,
    fallbacks: &[u16],
) -> Result<(TcpListener, PortSelection)> {
    if port == 0 {
        let listener = bind(host, 0).await?;
        let bound = listener.local_addr()?.port();
        return Ok((
            listener,
            PortSelection {
                requested: 0,
                bound,
                kind: PortKind::Primary,
            },
        ));
    }

    for (candidate, kind) in candidate_ports(port, fallbacks) {
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                debug!(port = candidate, ?kind, "Port bound");
                return Ok((
                    listener,
                    PortSelection {
                        requested: port,
                        bound: candidate,
                        kind,
                    },
                ));
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!(port = candidate, "Port already in use");
            }
            Err(e) => return Err(Error::bind(format!("{host}:{candidate}"), e)),
        }
    }

    warn!(port, ?fallbacks, "All configured ports in use, using an OS-assigned port");
    let listener = bind(host, 0).await?;
    let bound = listener.local_addr()?.port();
    Ok((
        listener,
        PortSelection {
            requested: port,
            bound,
            kind: PortKind::Ephemeral,
        },
    ))
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .map_err(|e| Error::bind(format!("{host}:{port}"), e))
}

// ============================================================================
// RemoteServer
// ============================================================================

/// A listening WebSocket server with a single active peer.
///
/// Dropping the server shuts it down.
///
/// # Example
///
/// ```ignore
/// use editor_remote_control::transport::{RemoteServer, event_channel};
///
/// let (events_tx, mut events) = event_channel();
/// let server = RemoteServer::start("127.0.0.1", 3710, &[3711, 3712], events_tx).await?;
/// println!("listening on {}", server.ws_url());
///
/// while let Some(event) = events.recv().await {
///     // route frames of server.active_peer()
/// }
/// ```
pub struct RemoteServer {
    /// Host the listener is bound on.
    host: String,
    /// Port selection outcome.
    selection: PortSelection,
    /// Active peer slot (shared with the accept loop).
    active: Arc<Mutex<Option<Connection>>>,
    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,
    /// Wakes the accept loop on shutdown.
    stop: Arc<Notify>,
    /// Accept loop task; owns the listener.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for RemoteServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteServer")
            .field("host", &self.host)
            .field("selection", &self.selection)
            .field("active", &self.active_peer().map(|c| c.peer()))
            .finish()
    }
}

// ============================================================================
// RemoteServer - Constructor
// ============================================================================

impl RemoteServer {
    /// Binds the server and starts the accept loop.
    ///
    /// Every peer event is sent to `events`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if no port could be bound.
    pub async fn start(
        host: &str,
        port: u16,
        fallbacks: &[u16],
        events: EventSender,
    ) -> Result<Self> {
        let (listener, selection) = bind_with_fallback(host, port, fallbacks).await?;

        let active = Arc::new(Mutex::new(None));
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(Notify::new());

        let task = tokio::spawn(Self::accept_loop(
            listener,
            Arc::clone(&active),
            Arc::clone(&shutdown),
            Arc::clone(&stop),
            events,
        ));

        let server = Self {
            host: host.to_string(),
            selection,
            active,
            shutdown,
            stop,
            task: Mutex::new(Some(task)),
        };

        info!(url = %server.ws_url(), "Remote Control server listening");

        Ok(server)
    }
}

// ============================================================================
// RemoteServer - Public API
// ============================================================================

impl RemoteServer {
    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.selection.bound
    }

    /// Returns how the port was chosen.
    #[inline]
    #[must_use]
    pub fn selection(&self) -> PortSelection {
        self.selection
    }

    /// Returns the bound host.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://{host}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port())
    }

    /// Returns the active peer, if any.
    #[must_use]
    pub fn active_peer(&self) -> Option<Connection> {
        self.active.lock().clone()
    }

    /// Returns `true` if `peer` is the active peer.
    #[must_use]
    pub fn is_active(&self, peer: PeerId) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|connection| connection.peer() == peer)
    }

    /// Stops accepting and closes the active peer.
    ///
    /// The listener is released once the accept loop observes the stop;
    /// use [`RemoteServer::stop`] to wait for that.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        // Stores a permit if the loop is between accepts.
        self.stop.notify_one();

        if let Some(connection) = self.active.lock().take() {
            connection.shutdown();
            debug!(peer = %connection.peer(), "Active peer closed during shutdown");
        }

        info!(port = self.port(), "Remote Control server shut down");
    }

    /// Shuts down and waits until the listening socket is closed.
    ///
    /// The port can be bound again as soon as this returns.
    pub async fn stop(&self) {
        self.shutdown();

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Accept loop ended abnormally");
        }
    }
}

impl Drop for RemoteServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// RemoteServer - Accept Loop
// ============================================================================

impl RemoteServer {
    /// Background task that accepts new connections.
    async fn accept_loop(
        listener: TcpListener,
        active: Arc<Mutex<Option<Connection>>>,
        shutdown: Arc<AtomicBool>,
        stop: Arc<Notify>,
        events: EventSender,
    ) {
        debug!("Accept loop started");

        loop {
            let accepted = tokio::select! {
                biased;
                () = stop.notified() => {
                    debug!("Accept loop shutting down");
                    break;
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    let active = Arc::clone(&active);
                    let shutdown = Arc::clone(&shutdown);
                    let events = events.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_connection(stream, addr, active, shutdown, events).await
                        {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            }
        }

        drop(listener);
        debug!("Accept loop terminated");
    }

    /// Upgrades one TCP connection and makes it the active peer.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        active: Arc<Mutex<Option<Connection>>>,
        shutdown: Arc<AtomicBool>,
        events: EventSender,
    ) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let peer = PeerId::next();

        // The slot lock is held across spawn so no frame of this peer can be
        // routed before it is installed.
        let prior = {
            let mut slot = active.lock();
            if shutdown.load(Ordering::SeqCst) {
                debug!(%peer, "Server shut down during upgrade");
                return Ok(());
            }
            let _ = events.send(PeerEvent {
                peer,
                event: TransportEvent::Opened,
            });
            slot.replace(Connection::spawn(ws_stream, peer, events))
        };

        info!(%peer, ?addr, "Controller connected");

        if let Some(prior) = prior {
            info!(superseded = %prior.peer(), by = %peer, "Closing superseded peer");
            prior.shutdown();
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
