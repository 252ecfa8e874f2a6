use anyhow::Result;
use colored::*;
use dotenvy::dotenv;
use tokio::sync::mpsc;

pub mod api;
pub mod app;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod imports;
pub mod integrations;
pub mod interface;
pub mod logger;
pub mod model;
pub mod reconciler;
pub mod render;
pub mod selection;
pub mod store;
pub mod utils;
pub mod voice;
pub mod wire;

use crate::voice::{CommandVoice, Unsupported, VoiceCapability};

/// Run the panel: load `.env` and config, connect to the backend and start
/// the REPL.
pub async fn run() -> Result<()> {
    // Load environment variables from .env
    dotenv().ok();

    let config = AppConfig::load();
    interface::print_banner();

    let client = BackendClient::new(&config.backend_url, config.request_timeout());
    let store = ClientStore::open(config.state_path());
    let reconciler = Reconciler::new(config.reconciler_config(), store);
    let dispatcher = CommandDispatcher::new(client.clone(), config.dispatcher_settings());
    let voice = VoiceSession::new(voice_capability(&config));

    println!("{} {}", "✓ Backend:".green(), config.backend_url.bright_white());
    let mut app = App::new(reconciler, dispatcher, voice, config.poll_interval()).with_console();
    match logger::Logger::new(&config.log_dir) {
        Ok(logger) => {
            println!(
                "{} {}",
                "✓ Session log:".green(),
                logger.path().display().to_string().dimmed()
            );
            app = app.with_logger(logger);
        }
        Err(e) => println!("{} {}", "⚠️  Session log disabled:".yellow(), e),
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let connection =
        ConnectionManager::new(config.connection_settings(), client, event_tx).spawn();
    let _repl = interface::spawn_repl(command_tx);

    let result = app.run(event_rx, command_rx).await;
    connection.abort();
    result
}

fn voice_capability(config: &AppConfig) -> Box<dyn VoiceCapability> {
    if config.voice_command.is_some() || config.speak_command.is_some() {
        Box::new(CommandVoice::new(
            config.voice_command.clone(),
            config.speak_command.clone(),
        ))
    } else {
        Box::new(Unsupported)
    }
}

// Re-exports for library consumers: common useful types
pub use api::BackendClient;
pub use app::{App, Submitted, UserCommand};
pub use config::AppConfig;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionSettings};
pub use dispatcher::{CommandDispatcher, Confirm, Outcome};
pub use reconciler::{DashboardState, Effect, Reconciler, ReconcilerConfig};
pub use store::ClientStore;
pub use voice::VoiceSession;
