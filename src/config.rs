use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::connection::{ConnectionSettings, Transport};
use crate::dispatcher::DispatcherSettings;
use crate::reconciler::ReconcilerConfig;

/// Environment variable that overrides `backend_url`.
pub const URL_ENV: &str = "BOTPANEL_URL";

/// Application configuration, loaded from `botpanel.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    pub transport: Transport,
    pub reconnect_delay_ms: u64,
    pub reconnect_delay_max_ms: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub stats_poll_secs: u64,
    pub websocket_failures_before_polling: u32,
    pub chat_capacity: usize,
    pub log_capacity: usize,
    pub raid_capacity: usize,
    pub notice_secs: u64,
    pub raid_notice_secs: u64,
    pub refresh_delay_ms: u64,
    pub debug_mode: bool,
    pub voice_enabled: bool,
    /// Speech-to-text program; prints one transcript per line.
    pub voice_command: Option<String>,
    /// Text-to-speech program; reads the text on stdin.
    pub speak_command: Option<String>,
    pub activation_word: String,
    pub thank_you_message: String,
    pub log_dir: String,
    /// Overrides the platform data dir location of `state.json`.
    pub state_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".to_string(),
            transport: Transport::WebSocket,
            reconnect_delay_ms: 1000,
            reconnect_delay_max_ms: 5000,
            connect_timeout_secs: 30,
            request_timeout_secs: 15,
            stats_poll_secs: 5,
            websocket_failures_before_polling: 3,
            chat_capacity: 500,
            log_capacity: 1000,
            raid_capacity: 5,
            notice_secs: 3,
            raid_notice_secs: 10,
            refresh_delay_ms: 1000,
            debug_mode: false,
            voice_enabled: false,
            voice_command: None,
            speak_command: None,
            activation_word: "bot".to_string(),
            thank_you_message: "Obrigado pelo apoio! 💜".to_string(),
            log_dir: "logs".to_string(),
            state_file: None,
        }
    }
}

impl AppConfig {
    /// Load configuration with the chain: `./botpanel.toml` -> `~/botpanel.toml` -> defaults,
    /// then apply `BOTPANEL_URL` from the environment.
    pub fn load() -> Self {
        let mut cfg = Self::from_files();
        if let Ok(url) = std::env::var(URL_ENV) {
            if !url.trim().is_empty() {
                cfg.backend_url = url.trim().to_string();
            }
        }
        cfg
    }

    fn from_files() -> Self {
        let candidates = Self::config_paths();
        for path in &candidates {
            if let Ok(contents) = fs::read_to_string(path) {
                match toml::from_str::<AppConfig>(&contents) {
                    Ok(cfg) => return cfg,
                    Err(e) => {
                        eprintln!("Warning: failed to parse {}: {}", path.display(), e);
                    }
                }
            }
        }
        Self::default()
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("botpanel.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join("botpanel.toml"));
        }
        paths
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(crate::store::ClientStore::default_path)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            base_url: self.backend_url.clone(),
            transport: self.transport,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            reconnect_delay_max: Duration::from_millis(self.reconnect_delay_max_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            poll_interval: self.poll_interval(),
            websocket_failures_before_polling: self.websocket_failures_before_polling,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.stats_poll_secs.max(1))
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            debug_mode: self.debug_mode,
            voice_enabled: self.voice_enabled,
            chat_capacity: self.chat_capacity,
            log_capacity: self.log_capacity,
            raid_capacity: self.raid_capacity,
            notice_ttl: Duration::from_secs(self.notice_secs),
            raid_notice_ttl: Duration::from_secs(self.raid_notice_secs),
        }
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            refresh_delay: Duration::from_millis(self.refresh_delay_ms),
            thank_you_message: self.thank_you_message.clone(),
            activation_word: self.activation_word.clone(),
        }
    }
}
