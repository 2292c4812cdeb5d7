//! Session lifecycle.
//!
//! A [`Session`] owns everything the relay keeps alive inside one editor
//! window: at most one outbound client, at most one local server and the
//! connection status. The host drives it through four entry points:
//!
//! | Entry point | Host trigger |
//! |-------------|--------------|
//! | [`Session::activate`] | extension activation |
//! | [`Session::run_command`] | a registered command was invoked |
//! | [`Session::configuration_changed`] | settings changed |
//! | [`Session::deactivate`] | extension deactivation |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use editor_remote_control::{Session, host::RecordingHost};
//! use serde_json::json;
//!
//! # async fn example() -> editor_remote_control::Result<()> {
//! let host = Arc::new(RecordingHost::new().with_settings(json!({
//!     "websocketUrl": "ws://127.0.0.1:9000",
//!     "enable": true,
//! })));
//!
//! let session = Session::new(host);
//! session.activate().await?;
//! // ...
//! session.deactivate();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{
    ClientConfig, EXTENSION_ID, SETTINGS_SECTION, ServerConfig, Settings, WEBSOCKET_URL_KEY,
};
use crate::dispatch::{ClientDispatcher, ServerDispatcher};
use crate::error::{Error, Result};
use crate::host::{EditorHost, NotificationLevel, StatusItem};
use crate::identifiers::PeerId;
use crate::protocol::CommandArg;
use crate::status::{ConnectionState, StatusEvent, StatusReporter};
use crate::transport::{
    Connection, EventReceiver, PeerEvent, RemoteClient, RemoteServer, TransportEvent,
    event_channel,
};

// ============================================================================
// Constants
// ============================================================================

/// Command that opens the relay's settings.
pub const OPEN_SETTINGS_COMMAND: &str = "remoteControl.openSettings";

/// Command that re-reads settings and reconnects.
pub const RECONNECT_COMMAND: &str = "remoteControl.reconnect";

/// Environment variable carrying the bound server port.
pub const PORT_ENV_VAR: &str = "REMOTE_CONTROL_PORT";

/// Action offered when the configured port was taken.
const CONFIGURE_ACTION: &str = "Configure locally";

/// Shown when activation finds no usable URL.
const URL_NOT_CONFIGURED: &str = "WebSocket URL is not configured. Please configure the 'remoteControl.websocketUrl' setting.";

/// Shown when the server role fails to start.
const SERVER_START_FAILED: &str = "Remote Control: Error while starting the websocket server. Check the output for more details.";

// ============================================================================
// ServerRole
// ============================================================================

/// Running server with the configuration it was started from.
struct ServerRole {
    server: RemoteServer,
    config: ServerConfig,
    dispatcher: ServerDispatcher,
}

// ============================================================================
// FrameQueue
// ============================================================================

/// Frames of one peer, dispatched one at a time in arrival order.
///
/// Dropping the queue lets its task finish the pending frames and exit.
struct FrameQueue {
    peer: PeerId,
    frames: mpsc::UnboundedSender<String>,
}

impl FrameQueue {
    /// Starts a queue feeding the client dispatcher.
    fn client(peer: PeerId, dispatcher: ClientDispatcher) -> Self {
        let (frames, mut pending) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(frame) = pending.recv().await {
                dispatcher.handle_frame(&frame).await;
            }
            debug!(%peer, "Client frame queue drained");
        });

        Self { peer, frames }
    }

    /// Starts a queue feeding the server dispatcher.
    ///
    /// Responses go back through `connection`.
    fn server(connection: Connection, dispatcher: ServerDispatcher, host: Arc<dyn EditorHost>) -> Self {
        let peer = connection.peer();
        let (frames, mut pending) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(frame) = pending.recv().await {
                let Some(response) = dispatcher.handle_frame(&frame).await else {
                    continue;
                };
                if let Err(e) = connection.send(response) {
                    warn!(%peer, error = %e, "Failed to send response");
                    host.append_log(&e.to_string());
                }
            }
            debug!(%peer, "Server frame queue drained");
        });

        Self { peer, frames }
    }

    fn push(&self, frame: String) {
        let _ = self.frames.send(frame);
    }
}

// ============================================================================
// Session
// ============================================================================

/// Relay state for one editor window.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    host: Arc<dyn EditorHost>,
    status: Mutex<StatusReporter>,
    client: Mutex<Option<RemoteClient>>,
    client_dispatcher: ClientDispatcher,
    server: Mutex<Option<ServerRole>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("client", &self.client_peer())
            .field("server_port", &self.server_port())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Public API
// ============================================================================

impl Session {
    /// Creates an inactive session.
    #[must_use]
    pub fn new(host: Arc<dyn EditorHost>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                status: Mutex::new(StatusReporter::new(Arc::clone(&host))),
                client: Mutex::new(None),
                client_dispatcher: ClientDispatcher::new(Arc::clone(&host)),
                server: Mutex::new(None),
                host,
            }),
        }
    }

    /// Reads settings and starts the configured roles.
    ///
    /// The client role is required: without a usable `websocketUrl` an
    /// error is shown and nothing starts. The server role starts only when
    /// `enable` is set; failing to start it is reported to the user but
    /// does not fail activation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the settings section is malformed
    /// - [`Error::MissingSetting`] if `websocketUrl` is unset
    /// - [`Error::Url`] / [`Error::Config`] if `websocketUrl` is invalid
    pub async fn activate(&self) -> Result<()> {
        let host = &self.inner.host;
        info!("Remote Control starting");
        host.append_log("Remote Control starting...");

        let settings = self.read_settings()?;
        host.append_log(&format!(
            "WebSocket URL: {}",
            settings.websocket_url.as_deref().unwrap_or("null")
        ));

        let client_config = match settings.client_config() {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Client role not configured");
                host.show_error(URL_NOT_CONFIGURED);
                return Err(e);
            }
        };

        host.register_command(OPEN_SETTINGS_COMMAND);
        host.register_command(RECONNECT_COMMAND);
        self.inner.status.lock().show();

        self.connect_client(&client_config);
        self.apply_server_config(settings.server_config()).await;

        Ok(())
    }

    /// Runs a command registered by [`Session::activate`].
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if `command` is not a relay command
    /// - the host's error if opening the settings fails
    pub async fn run_command(&self, command: &str) -> Result<()> {
        match command {
            OPEN_SETTINGS_COMMAND => self.open_settings().await,
            RECONNECT_COMMAND => self.reconnect().await,
            other => Err(Error::protocol(format!("unknown command \"{other}\""))),
        }
    }

    /// Re-reads settings, reconnects the client and reconciles the server.
    ///
    /// Without a usable URL the client is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the settings section is malformed.
    pub async fn reconnect(&self) -> Result<()> {
        let settings = self.read_settings()?;

        match settings.client_config() {
            Ok(config) => self.connect_client(&config),
            Err(e) => debug!(error = %e, "Reconnect skipped for client role"),
        }

        self.apply_server_config(settings.server_config()).await;
        Ok(())
    }

    /// Handles a settings change notification.
    ///
    /// `keys` are the changed setting keys. Only a change that affects
    /// `remoteControl.websocketUrl` reconnects the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the settings section is malformed.
    pub fn configuration_changed(&self, keys: &[&str]) -> Result<()> {
        if !keys.iter().any(|key| affects(key, WEBSOCKET_URL_KEY)) {
            return Ok(());
        }

        let settings = self.read_settings()?;
        match settings.client_config() {
            Ok(config) => self.connect_client(&config),
            Err(e) => debug!(error = %e, "Changed URL is not usable"),
        }
        Ok(())
    }

    /// Closes every transport.
    ///
    /// Safe to call on a session that never activated.
    pub fn deactivate(&self) {
        if let Some(client) = self.inner.client.lock().take() {
            client.close();
        }
        if let Some(role) = self.inner.server.lock().take() {
            role.server.shutdown();
        }
        info!("Remote Control deactivated");
    }

    /// Returns the client connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.status.lock().state()
    }

    /// Returns the peer id of the current client attempt.
    #[must_use]
    pub fn client_peer(&self) -> Option<PeerId> {
        self.inner.client.lock().as_ref().map(RemoteClient::peer)
    }

    /// Returns the bound server port, if the server role runs.
    #[must_use]
    pub fn server_port(&self) -> Option<u16> {
        self.inner
            .server
            .lock()
            .as_ref()
            .map(|role| role.server.port())
    }
}

// ============================================================================
// Session - Client Role
// ============================================================================

impl Session {
    /// Replaces the client with a fresh connection to `config.url`.
    ///
    /// The prior client is closed before the new one dials.
    fn connect_client(&self, config: &ClientConfig) {
        let mut slot = self.inner.client.lock();

        if let Some(prior) = slot.take() {
            debug!(peer = %prior.peer(), "Closing prior client");
            prior.close();
        }

        let url = config.url.clone();
        if let Err(e) = self.inner.status.lock().apply(&StatusEvent::Connecting {
            url: url.to_string(),
        }) {
            warn!(error = %e, "Unexpected state before connecting");
        }

        let (events_tx, events) = event_channel();
        let client = RemoteClient::connect(url, events_tx);
        *slot = Some(client);
        drop(slot);

        tokio::spawn(pump_client(Arc::downgrade(&self.inner), events));
    }
}

/// Routes client events into the session until the channel closes.
async fn pump_client(inner: Weak<SessionInner>, mut events: EventReceiver) {
    let mut queue: Option<FrameQueue> = None;

    while let Some(PeerEvent { peer, event }) = events.recv().await {
        let Some(session) = inner.upgrade() else {
            break;
        };
        let Some(frame) = session.on_client_event(peer, event) else {
            continue;
        };
        queue
            .get_or_insert_with(|| FrameQueue::client(peer, session.client_dispatcher.clone()))
            .push(frame);
    }
}

impl SessionInner {
    /// Applies a status event of the current client.
    ///
    /// Returns the frame text when the event is a frame to dispatch.
    fn on_client_event(&self, peer: PeerId, event: TransportEvent) -> Option<String> {
        let current = self.client.lock().as_ref().map(RemoteClient::peer);
        if current != Some(peer) {
            debug!(%peer, ?event, "Event from superseded client ignored");
            return None;
        }

        if let TransportEvent::Frame(text) = event {
            return Some(text);
        }

        if let Some(status_event) = event.status_event() {
            // Rejections are logged by the reporter.
            let _ = self.status.lock().apply(&status_event);
        }
        None
    }
}

// ============================================================================
// Session - Server Role
// ============================================================================

impl Session {
    /// Starts, restarts or stops the server to match `config`.
    async fn apply_server_config(&self, config: ServerConfig) {
        let host = &self.inner.host;

        if !config.enabled {
            let prior = self.inner.server.lock().take();
            if let Some(prior) = prior {
                prior.server.stop().await;
            }
            warn!("Remote Control server is not running");
            host.append_log("Remote Control server is not running!");
            return;
        }

        let unchanged = self
            .inner
            .server
            .lock()
            .as_ref()
            .is_some_and(|role| role.config == config);
        if unchanged {
            debug!("Server configuration unchanged");
            return;
        }

        if let Err(e) = self.start_server(config).await {
            error!(error = %e, "Error while starting the websocket server");
            host.append_log("Error while starting the websocket server.");
            host.append_log(&e.to_string());
            host.show_error(SERVER_START_FAILED);
            return;
        }

        info!("Remote Control is now active");
        host.append_log("Remote Control is now active!");
    }

    /// Binds a new server, replacing any running one.
    ///
    /// The prior listener is fully closed first so its port can be reused.
    async fn start_server(&self, config: ServerConfig) -> Result<()> {
        let prior = self.inner.server.lock().take();
        if let Some(prior) = prior {
            prior.server.stop().await;
        }

        let (events_tx, events) = event_channel();
        let server = RemoteServer::start(
            &config.host,
            config.port,
            &config.fallback_ports(),
            events_tx,
        )
        .await?;

        self.announce_server(&server);

        let dispatcher = ServerDispatcher::new(Arc::clone(&self.inner.host), config.only_when_in_focus);
        *self.inner.server.lock() = Some(ServerRole {
            server,
            config,
            dispatcher,
        });

        tokio::spawn(pump_server(Arc::downgrade(&self.inner), events));
        Ok(())
    }

    /// Publishes the bound port to the host.
    fn announce_server(&self, server: &RemoteServer) {
        let host = &self.inner.host;
        let port = server.port();
        let listening = format!("Remote Control: Listening on \"{}\"", server.ws_url());

        host.append_log(&listening);
        host.set_environment_variable(PORT_ENV_VAR, &port.to_string());
        host.set_status_item(&StatusItem::server_port(
            format!("$(plug) RC Port: {port}"),
            listening.clone(),
        ));

        let selection = server.selection();
        if !selection.used_fallback() {
            return;
        }

        host.show_info(&listening);

        let message = format!(
            "Remote Control: Port \"{}\" was already in use. The extension opened on a port \"{}\". If you want, you can configure another port via the \"remotecontrol.port\" workspace setting.",
            selection.requested, selection.bound
        );
        let host = Arc::clone(host);
        tokio::spawn(async move {
            let choice = host
                .notify_with_actions(NotificationLevel::Warning, &message, &[CONFIGURE_ACTION])
                .await;
            if choice.as_deref() == Some(CONFIGURE_ACTION) {
                if let Err(e) = open_settings(host.as_ref()).await {
                    warn!(error = %e, "Failed to open settings");
                }
                if let Err(e) = host
                    .execute_command("workbench.action.openWorkspaceSettings", Vec::new())
                    .await
                {
                    warn!(error = %e, "Failed to open workspace settings");
                }
            }
        });
    }
}

/// Routes server events into the session until the channel closes.
async fn pump_server(inner: Weak<SessionInner>, mut events: EventReceiver) {
    let mut queue: Option<FrameQueue> = None;

    while let Some(PeerEvent { peer, event }) = events.recv().await {
        let Some(session) = inner.upgrade() else {
            break;
        };

        match event {
            TransportEvent::Frame(frame) => {
                let Some((connection, dispatcher)) = session.server_route(peer) else {
                    debug!(%peer, "Frame from inactive peer ignored");
                    continue;
                };
                if queue.as_ref().is_none_or(|queue| queue.peer != peer) {
                    queue = Some(FrameQueue::server(
                        connection,
                        dispatcher,
                        Arc::clone(&session.host),
                    ));
                }
                if let Some(queue) = &queue {
                    queue.push(frame);
                }
            }
            other => {
                if matches!(other, TransportEvent::Closed)
                    && queue.as_ref().is_some_and(|queue| queue.peer == peer)
                {
                    queue = None;
                }
                session.on_server_event(peer, other);
            }
        }
    }
}

impl SessionInner {
    /// Returns the connection and dispatcher for `peer` if it is active.
    fn server_route(&self, peer: PeerId) -> Option<(Connection, ServerDispatcher)> {
        let guard = self.server.lock();
        guard.as_ref().and_then(|role| {
            role.server
                .active_peer()
                .filter(|connection| connection.peer() == peer)
                .map(|connection| (connection, role.dispatcher.clone()))
        })
    }

    fn on_server_event(&self, peer: PeerId, event: TransportEvent) {
        match event {
            TransportEvent::Frame(_) => {}
            TransportEvent::Opened => {
                info!(%peer, "Controller connected");
            }
            TransportEvent::Closed => {
                info!(%peer, "Controller disconnected");
                self.host.append_log("Closing the ws connection");
            }
            TransportEvent::Failed(message) => {
                warn!(%peer, %message, "Controller connection error");
                self.host.append_log(&message);
            }
        }
    }
}

// ============================================================================
// Session - Helpers
// ============================================================================

impl Session {
    fn read_settings(&self) -> Result<Settings> {
        Settings::from_json(self.inner.host.settings(SETTINGS_SECTION)).inspect_err(|e| {
            error!(error = %e, "Invalid settings");
            self.inner.host.show_error(&format!("Remote Control: {e}"));
        })
    }

    async fn open_settings(&self) -> Result<()> {
        open_settings(self.inner.host.as_ref()).await
    }
}

/// Opens the settings UI filtered to this extension.
async fn open_settings(host: &dyn EditorHost) -> Result<()> {
    host.execute_command(
        "workbench.action.openSettings",
        vec![CommandArg::Value(Value::String(format!("@ext:{EXTENSION_ID}")))],
    )
    .await
    .map(|_| ())
}

/// Returns `true` if a change to `changed` affects `key`.
///
/// A change to a parent section affects every key below it.
fn affects(changed: &str, key: &str) -> bool {
    changed == key
        || key
            .strip_prefix(changed)
            .is_some_and(|rest| rest.starts_with('.'))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures_util::{SinkExt, Stream, StreamExt};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::broadcast;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{accept_async, connect_async};
    use tracing_subscriber::EnvFilter;

    use crate::host::{HostCall, RecordingHost, StatusSlot};
    use crate::status::STATUS_LABEL;

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// A controller server the client role dials into.
    struct Controller {
        url: String,
        accepted: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
        outbound: broadcast::Sender<String>,
    }

    impl Controller {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("ws://{}", listener.local_addr().unwrap());
            let accepted = Arc::new(AtomicUsize::new(0));
            let live = Arc::new(AtomicUsize::new(0));
            let (outbound, _) = broadcast::channel::<String>(1024);

            let (acc, liv, out) = (accepted.clone(), live.clone(), outbound.clone());
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(mut ws) = accept_async(stream).await else {
                        continue;
                    };
                    let mut frames = out.subscribe();
                    acc.fetch_add(1, Ordering::SeqCst);
                    liv.fetch_add(1, Ordering::SeqCst);
                    let live = liv.clone();
                    tokio::spawn(async move {
                        loop {
                            tokio::select! {
                                frame = frames.recv() => match frame {
                                    Ok(text) => {
                                        if ws.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                },
                                message = ws.next() => match message {
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    _ => {}
                                },
                            }
                        }
                        live.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });

            Self {
                url,
                accepted,
                live,
                outbound,
            }
        }

        fn push(&self, frame: &str) {
            let _ = self.outbound.send(frame.to_string());
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    async fn recv_text<S>(ws: &mut S) -> Option<String>
    where
        S: Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        match timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => Some(text.to_string()),
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_activate_without_url_starts_nothing() {
        init_tracing();
        let host = Arc::new(RecordingHost::new().with_settings(json!({ "enable": true })));
        let session = Session::new(host.clone());

        let err = session.activate().await.unwrap_err();

        assert!(matches!(err, Error::MissingSetting { .. }));
        assert_eq!(
            host.notifications(NotificationLevel::Error),
            vec![URL_NOT_CONFIGURED.to_string()]
        );
        assert!(
            !host
                .calls()
                .iter()
                .any(|call| matches!(call, HostCall::RegisterCommand(_)))
        );
        assert_eq!(session.server_port(), None);
        assert_eq!(session.client_peer(), None);
    }

    #[tokio::test]
    async fn test_activate_with_bad_scheme() {
        let host = Arc::new(
            RecordingHost::new().with_settings(json!({ "websocketUrl": "http://x:1" })),
        );
        let session = Session::new(host.clone());

        assert!(session.activate().await.is_err());
        assert_eq!(
            host.notifications(NotificationLevel::Error),
            vec![URL_NOT_CONFIGURED.to_string()]
        );
    }

    #[tokio::test]
    async fn test_activate_connects_client() {
        init_tracing();
        let controller = Controller::start().await;
        let host = Arc::new(
            RecordingHost::new().with_settings(json!({ "websocketUrl": controller.url })),
        );
        let session = Session::new(host.clone());

        session.activate().await.unwrap();

        assert!(eventually(|| session.state() == ConnectionState::Connected).await);
        let calls = host.calls();
        assert!(calls.contains(&HostCall::RegisterCommand(OPEN_SETTINGS_COMMAND.into())));
        assert!(calls.contains(&HostCall::RegisterCommand(RECONNECT_COMMAND.into())));
        assert!(calls.contains(&HostCall::Status(StatusItem::connection(STATUS_LABEL))));
        assert_eq!(
            host.status_text(StatusSlot::Connection),
            Some(format!("{STATUS_LABEL}: Connected"))
        );
        assert_eq!(session.server_port(), None);

        session.deactivate();
    }

    #[tokio::test]
    async fn test_client_frames_are_dispatched() {
        let controller = Controller::start().await;
        let host = Arc::new(
            RecordingHost::new().with_settings(json!({ "websocketUrl": controller.url })),
        );
        let session = Session::new(host.clone());
        session.activate().await.unwrap();
        assert!(eventually(|| controller.live.load(Ordering::SeqCst) == 1).await);
        assert!(eventually(|| session.state() == ConnectionState::Connected).await);

        controller.push(r#"{"type":"openFile","path":"/tmp/a.txt"}"#);
        controller.push(r#"{"type":"cursor","text":"move:10"}"#);

        assert!(
            host.wait_until(|calls| calls.iter().any(|call| matches!(
                call,
                HostCall::OpenDocument { uri } if uri.path() == "/tmp/a.txt"
            )))
            .await
        );
        assert!(
            host.wait_until(|calls| calls.iter().any(|call| matches!(
                call,
                HostCall::ExecuteCommand { command, args }
                    if command == "composer.newAgentChat"
                        && args == &vec![CommandArg::Value(json!("move:10"))]
            )))
            .await
        );

        session.deactivate();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_client_frames_are_dispatched_in_order() {
        const FRAMES: usize = 200;

        let controller = Controller::start().await;
        let host = Arc::new(
            RecordingHost::new().with_settings(json!({ "websocketUrl": controller.url })),
        );
        let session = Session::new(host.clone());
        session.activate().await.unwrap();
        assert!(eventually(|| controller.live.load(Ordering::SeqCst) == 1).await);
        assert!(eventually(|| session.state() == ConnectionState::Connected).await);

        let frames: Vec<String> = (0..FRAMES)
            .map(|n| format!(r#"{{"type":"ping","n":{n}}}"#))
            .collect();
        for frame in &frames {
            controller.push(frame);
        }

        let received = || -> Vec<String> {
            host.logs()
                .into_iter()
                .filter_map(|line| line.strip_prefix("Received command: ").map(str::to_string))
                .collect()
        };
        assert!(eventually(|| received().len() == FRAMES).await);
        assert_eq!(received(), frames);

        session.deactivate();
    }

    #[tokio::test]
    async fn test_refused_client_reports_error_then_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let host = Arc::new(RecordingHost::new().with_settings(json!({ "websocketUrl": url })));
        let session = Session::new(host.clone());
        session.activate().await.unwrap();

        assert!(eventually(|| session.state() == ConnectionState::Disconnected
            && host.notifications(NotificationLevel::Error).len() == 1)
        .await);
        assert!(host.notifications(NotificationLevel::Error)[0].starts_with("WebSocket error: "));
    }

    // ------------------------------------------------------------------------
    // Reconnect
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_reconnect_twice_leaves_one_connection() {
        let controller = Controller::start().await;
        let host = Arc::new(
            RecordingHost::new().with_settings(json!({ "websocketUrl": controller.url })),
        );
        let session = Session::new(host.clone());
        session.activate().await.unwrap();
        assert!(eventually(|| session.state() == ConnectionState::Connected).await);

        let first = session.client_peer().unwrap();
        session.run_command(RECONNECT_COMMAND).await.unwrap();
        session.run_command(RECONNECT_COMMAND).await.unwrap();
        let last = session.client_peer().unwrap();
        assert!(last > first);

        assert!(eventually(|| session.state() == ConnectionState::Connected).await);
        assert!(eventually(|| controller.live.load(Ordering::SeqCst) == 1).await);
        assert!(controller.accepted.load(Ordering::SeqCst) >= 2);

        // Closes of superseded clients never reach the status bar.
        assert!(host.notifications(NotificationLevel::Warning).is_empty());

        session.deactivate();
        assert!(eventually(|| controller.live.load(Ordering::SeqCst) == 0).await);
    }

    #[tokio::test]
    async fn test_configuration_change_of_url_reconnects() {
        let first = Controller::start().await;
        let second = Controller::start().await;
        let host = Arc::new(
            RecordingHost::new().with_settings(json!({ "websocketUrl": first.url })),
        );
        let session = Session::new(host.clone());
        session.activate().await.unwrap();
        assert!(eventually(|| first.live.load(Ordering::SeqCst) == 1).await);

        host.set_settings(json!({ "websocketUrl": second.url }));
        session.configuration_changed(&["editor.fontSize"]).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(second.accepted.load(Ordering::SeqCst), 0);

        session
            .configuration_changed(&["remoteControl.websocketUrl"])
            .unwrap();
        assert!(eventually(|| second.live.load(Ordering::SeqCst) == 1).await);
        assert!(eventually(|| first.live.load(Ordering::SeqCst) == 0).await);

        session.deactivate();
    }

    #[test]
    fn test_affects() {
        assert!(affects("remoteControl.websocketUrl", WEBSOCKET_URL_KEY));
        assert!(affects("remoteControl", WEBSOCKET_URL_KEY));
        assert!(!affects("remoteControl.port", WEBSOCKET_URL_KEY));
        assert!(!affects("remote", WEBSOCKET_URL_KEY));
    }

    // ------------------------------------------------------------------------
    // Server Role
    // ------------------------------------------------------------------------

    async fn server_session(settings: Value) -> (Arc<RecordingHost>, Session, Controller) {
        let controller = Controller::start().await;
        let mut settings = settings;
        settings["websocketUrl"] = json!(controller.url);
        settings["enable"] = json!(true);
        let host = Arc::new(
            RecordingHost::new()
                .with_settings(settings)
                .with_response("editor.getText", json!({ "text": "hello" })),
        );
        let session = Session::new(host.clone());
        session.activate().await.unwrap();
        (host, session, controller)
    }

    #[tokio::test]
    async fn test_server_publishes_port() {
        let (host, session, _controller) = server_session(json!({ "port": 0 })).await;

        let port = session.server_port().unwrap();
        assert_eq!(host.environment(PORT_ENV_VAR), Some(port.to_string()));
        assert_eq!(
            host.status_text(StatusSlot::ServerPort),
            Some(format!("$(plug) RC Port: {port}"))
        );
        assert!(host.notifications(NotificationLevel::Warning).is_empty());

        session.deactivate();
    }

    #[tokio::test]
    async fn test_server_round_trip() {
        let (host, session, _controller) = server_session(json!({ "port": 0 })).await;
        let url = format!("ws://127.0.0.1:{}", session.server_port().unwrap());
        let (mut ws, _) = connect_async(url).await.unwrap();

        // Malformed frame: no answer, connection stays usable.
        ws.send(Message::Text("{broken".into())).await.unwrap();
        // Terminal input never answers.
        ws.send(Message::Text(r#"{"command":"terminal.execute","args":"ls"}"#.into()))
            .await
            .unwrap();
        // Commands without a result never answer.
        ws.send(Message::Text(r#"{"command":"editor.action.selectAll"}"#.into()))
            .await
            .unwrap();
        assert!(
            host.wait_until(|calls| calls.iter().any(|call| matches!(
                call,
                HostCall::ExecuteCommand { command, args }
                    if command == "editor.action.selectAll" && args == &vec![CommandArg::Undefined]
            )))
            .await
        );

        ws.send(Message::Text(r#"{"command":"editor.getText"}"#.into()))
            .await
            .unwrap();

        assert_eq!(recv_text(&mut ws).await.as_deref(), Some(r#"{"text":"hello"}"#));
        assert_eq!(recv_text(&mut ws).await, None);

        session.deactivate();
    }

    #[tokio::test]
    async fn test_server_focus_gating() {
        let (host, session, _controller) =
            server_session(json!({ "port": 0, "onlyWhenInFocus": true })).await;
        host.set_focused(false);
        let url = format!("ws://127.0.0.1:{}", session.server_port().unwrap());
        let (mut ws, _) = connect_async(url).await.unwrap();

        ws.send(Message::Text(r#"{"command":"editor.getText"}"#.into()))
            .await
            .unwrap();
        assert_eq!(recv_text(&mut ws).await, None);
        assert!(host.executed().is_empty());

        host.set_focused(true);
        ws.send(Message::Text(r#"{"command":"editor.getText"}"#.into()))
            .await
            .unwrap();
        assert_eq!(recv_text(&mut ws).await.as_deref(), Some(r#"{"text":"hello"}"#));

        session.deactivate();
    }

    #[tokio::test]
    async fn test_server_fallback_warns_and_offers_settings() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let controller = Controller::start().await;
        let host = Arc::new(
            RecordingHost::new()
                .with_settings(json!({
                    "websocketUrl": controller.url,
                    "enable": true,
                    "port": port,
                }))
                .with_action_choice(CONFIGURE_ACTION),
        );
        let session = Session::new(host.clone());
        session.activate().await.unwrap();

        let bound = session.server_port().unwrap();
        assert_ne!(bound, port);
        assert!(
            host.wait_until(|calls| calls.iter().any(|call| matches!(
                call,
                HostCall::ExecuteCommand { command, .. }
                    if command == "workbench.action.openWorkspaceSettings"
            )))
            .await
        );

        let warnings = host.notifications(NotificationLevel::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains(&format!("Port \"{port}\" was already in use")));
        assert!(warnings[0].contains(&format!("port \"{bound}\"")));

        let executed: Vec<_> = host.executed().into_iter().map(|(c, _)| c).collect();
        assert_eq!(
            executed,
            vec![
                "workbench.action.openSettings".to_string(),
                "workbench.action.openWorkspaceSettings".to_string(),
            ]
        );

        session.deactivate();
        drop(occupied);
    }

    #[tokio::test]
    async fn test_server_start_failure_is_reported() {
        let (host, session, _controller) =
            server_session(json!({ "host": "192.0.2.1", "port": 3710 })).await;

        assert_eq!(session.server_port(), None);
        assert_eq!(
            host.notifications(NotificationLevel::Error),
            vec![SERVER_START_FAILED.to_string()]
        );
        assert_ne!(session.client_peer(), None);

        session.deactivate();
    }

    #[tokio::test]
    async fn test_reconnect_reconciles_server() {
        let (host, session, controller) = server_session(json!({ "port": 0 })).await;
        assert!(session.server_port().is_some());

        host.set_settings(json!({ "websocketUrl": controller.url, "enable": false }));
        session.reconnect().await.unwrap();
        assert_eq!(session.server_port(), None);

        session.deactivate();
    }

    #[tokio::test]
    async fn test_restart_keeps_configured_port() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let (host, session, controller) = server_session(json!({ "port": port })).await;
        assert_eq!(session.server_port(), Some(port));

        host.set_settings(json!({
            "websocketUrl": controller.url,
            "enable": true,
            "port": port,
            "onlyWhenInFocus": true,
        }));
        session.reconnect().await.unwrap();

        assert_eq!(session.server_port(), Some(port));
        assert_eq!(host.environment(PORT_ENV_VAR), Some(port.to_string()));
        assert!(host.notifications(NotificationLevel::Warning).is_empty());

        session.deactivate();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_server_frames_are_dispatched_in_order() {
        const FRAMES: usize = 100;

        let (host, session, _controller) = server_session(json!({ "port": 0 })).await;
        let url = format!("ws://127.0.0.1:{}", session.server_port().unwrap());
        let (mut ws, _) = connect_async(url).await.unwrap();

        let expected: Vec<String> = (0..FRAMES).map(|n| format!("test.step{n}")).collect();
        for command in &expected {
            let frame = format!(r#"{{"command":"{command}"}}"#);
            ws.send(Message::Text(frame.into())).await.unwrap();
        }

        let executed = || -> Vec<String> {
            host.executed()
                .into_iter()
                .map(|(command, _)| command)
                .collect()
        };
        assert!(eventually(|| executed().len() == FRAMES).await);
        assert_eq!(executed(), expected);

        session.deactivate();
    }

    // ------------------------------------------------------------------------
    // Commands & Teardown
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_open_settings_command() {
        let host = Arc::new(RecordingHost::new());
        let session = Session::new(host.clone());

        session.run_command(OPEN_SETTINGS_COMMAND).await.unwrap();

        assert_eq!(
            host.executed(),
            vec![(
                "workbench.action.openSettings".to_string(),
                vec![CommandArg::Value(json!(format!("@ext:{EXTENSION_ID}")))]
            )]
        );
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let session = Session::new(Arc::new(RecordingHost::new()));
        let err = session.run_command("remoteControl.nope").await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_deactivate_without_activate() {
        let session = Session::new(Arc::new(RecordingHost::new()));
        session.deactivate();
        session.deactivate();
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}
