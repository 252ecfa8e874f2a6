use serde::{Deserialize, Serialize};

/// Local wall-clock stamp in the same `HH:MM:SS` shape the backend uses.
pub fn now_stamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

// ── Stats ───────────────────────────────────────────────────────────────

/// Aggregated counters pushed by `stats_update` and returned by `GET /api/stats`.
///
/// Always replaced wholesale: the newest snapshot wins, there is no merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSnapshot {
    pub connected_channels: Vec<String>,
    pub total_users: u64,
    pub total_messages: u64,
    pub total_points: u64,
}

impl StatsSnapshot {
    pub fn is_connected(&self, channel: &str) -> bool {
        self.connected_channels.iter().any(|c| c == channel)
    }
}

// ── Chat ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOrigin {
    /// Sent by the bot itself.
    Own,
    /// Synthesised from a raid notification.
    Raid,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ChatWire")]
pub struct ChatEntry {
    pub channel: String,
    pub username: String,
    pub text: String,
    pub timestamp: String,
    pub origin: ChatOrigin,
}

/// `chat_message` payload as the backend emits it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatWire {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default = "now_stamp")]
    timestamp: String,
    #[serde(default)]
    is_own: bool,
    #[serde(default)]
    is_raid: bool,
}

impl From<ChatWire> for ChatEntry {
    fn from(w: ChatWire) -> Self {
        let origin = if w.is_raid {
            ChatOrigin::Raid
        } else if w.is_own {
            ChatOrigin::Own
        } else {
            ChatOrigin::Normal
        };
        Self {
            channel: w.channel,
            username: w.username,
            text: w.message.unwrap_or_default(),
            timestamp: w.timestamp,
            origin,
        }
    }
}

// ── Logs ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Success,
    Error,
    Warning,
    Bot,
    Event,
    Debug,
    /// Also what unknown wire levels decode to.
    #[serde(other)]
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    #[serde(default)]
    pub message: String,
    #[serde(default = "now_stamp")]
    pub timestamp: String,
}

impl LogEntry {
    /// A locally generated entry stamped with the current time.
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: now_stamp(),
        }
    }
}

// ── Raids / status ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RaidRecord {
    pub channel: String,
    pub raider: String,
    #[serde(rename = "viewers", default)]
    pub viewer_count: u64,
    #[serde(default = "now_stamp")]
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusChange {
    pub channel: String,
    pub status: String,
}

/// Per-integration state reported by `GET /api/integrations/status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IntegrationStatus {
    pub enabled: bool,
    pub configured: bool,
    /// `false` when the backend lacks the optional library for this integration.
    pub available: bool,
}

// ── Server events ───────────────────────────────────────────────────────

/// Events pushed by the backend over the live connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ChatMessage(ChatEntry),
    LogMessage(LogEntry),
    StatusChange(StatusChange),
    StatsUpdate(StatsSnapshot),
    RaidReceived(RaidRecord),
}

impl ServerEvent {
    pub const NAMES: &'static [&'static str] = &[
        "chat_message",
        "log_message",
        "status_change",
        "stats_update",
        "raid_received",
    ];

    /// Decode an event from its name and JSON payload.
    ///
    /// Returns `Ok(None)` for event names this client does not handle.
    pub fn from_parts(
        name: &str,
        data: serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        if !Self::NAMES.contains(&name) {
            return Ok(None);
        }
        let tagged = serde_json::json!({ "event": name, "data": data });
        serde_json::from_value(tagged).map(Some)
    }
}
