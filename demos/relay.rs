//! Standalone relay with a console host.
//!
//! Demonstrates:
//! - Implementing `EditorHost` for a custom host
//! - Activating a session with both roles
//! - Port fallback when the primary port is taken
//!
//! Usage:
//!   cargo run --example relay -- --url ws://127.0.0.1:9000
//!   cargo run --example relay -- --url ws://127.0.0.1:9000 --port 3710
//!   cargo run --example relay -- --url ws://127.0.0.1:9000 --debug
//!
//! Connect a controller to the printed port and send
//! `{"command":"editor.getText"}`; the console host answers every command
//! with `{"command": <name>}`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use editor_remote_control::{
    CommandArg, EditorHost, NotificationLevel, Result, Session, StatusItem, Terminal,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use url::Url;

// ============================================================================
// Args
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    url: String,
    port: u16,
    debug: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let value_of = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        Self {
            url: value_of("--url").unwrap_or_else(|| "ws://127.0.0.1:9000".to_string()),
            port: value_of("--port")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3710),
            debug: args.iter().any(|a| a == "--debug"),
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "editor_remote_control=debug"
    } else {
        "editor_remote_control=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// ConsoleHost
// ============================================================================

/// Host that prints everything it is asked to do.
struct ConsoleHost {
    settings: Value,
}

#[async_trait]
impl EditorHost for ConsoleHost {
    async fn execute_command(&self, command: &str, args: Vec<CommandArg>) -> Result<Option<Value>> {
        let args: Vec<Value> = args.iter().map(CommandArg::to_json).collect();
        println!("[command] {command} {}", Value::Array(args));
        Ok(Some(json!({ "command": command })))
    }

    async fn open_document(&self, uri: &Url) -> Result<()> {
        println!("[open] {uri}");
        Ok(())
    }

    fn is_focused(&self) -> bool {
        true
    }

    fn active_terminal(&self) -> Option<Arc<dyn Terminal>> {
        Some(Arc::new(ConsoleTerminal))
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        println!("[{level}] {message}");
    }

    async fn notify_with_actions(
        &self,
        level: NotificationLevel,
        message: &str,
        actions: &[&str],
    ) -> Option<String> {
        println!("[{level}] {message} {actions:?}");
        None
    }

    fn set_status_item(&self, item: &StatusItem) {
        println!("[status] {}", item.text);
    }

    fn append_log(&self, line: &str) {
        println!("[log] {line}");
    }

    fn set_environment_variable(&self, name: &str, value: &str) {
        println!("[env] {name}={value}");
    }

    fn settings(&self, _section: &str) -> Value {
        self.settings.clone()
    }

    fn register_command(&self, command: &str) {
        println!("[register] {command}");
    }
}

struct ConsoleTerminal;

impl Terminal for ConsoleTerminal {
    fn show(&self, _preserve_focus: bool) {}

    fn send_text(&self, text: &str) {
        println!("[terminal] {text}");
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Remote Control relay ===\n");

    let host = Arc::new(ConsoleHost {
        settings: json!({
            "websocketUrl": args.url,
            "enable": true,
            "port": args.port,
            "fallbacks": [args.port.saturating_add(1)],
        }),
    });

    let session = Session::new(host);
    session.activate().await?;

    match session.server_port() {
        Some(port) => println!("\nListening on ws://127.0.0.1:{port}"),
        None => println!("\nServer role not running"),
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();

    session.deactivate();
    Ok(())
}
