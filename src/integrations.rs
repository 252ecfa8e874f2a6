use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Optional external connectors the backend can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrationKind {
    Discord,
    Minecraft,
    Email,
    TwitchApi,
}

impl IntegrationKind {
    pub const ALL: [IntegrationKind; 4] = [
        IntegrationKind::Discord,
        IntegrationKind::Minecraft,
        IntegrationKind::Email,
        IntegrationKind::TwitchApi,
    ];

    /// Path segment under `/api/integrations/`.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Minecraft => "minecraft",
            Self::Email => "email",
            Self::TwitchApi => "twitch-api",
        }
    }

    /// Key in the `/api/integrations/status` response.
    pub fn status_key(self) -> &'static str {
        match self {
            Self::TwitchApi => "twitch_api",
            other => other.slug(),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Discord => "Discord",
            Self::Minecraft => "Minecraft RCON",
            Self::Email => "Email",
            Self::TwitchApi => "Twitch API",
        }
    }

    /// Whether the backend exposes a `/test` endpoint for this integration.
    pub fn supports_test(self) -> bool {
        !matches!(self, Self::TwitchApi)
    }

    pub fn from_status_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.status_key() == key)
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for IntegrationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discord" => Ok(Self::Discord),
            "minecraft" | "rcon" => Ok(Self::Minecraft),
            "email" | "mail" => Ok(Self::Email),
            "twitch-api" | "twitch_api" | "twitch" => Ok(Self::TwitchApi),
            other => Err(format!(
                "Unknown integration '{}'. Supported: discord, minecraft, email, twitch-api",
                other
            )),
        }
    }
}

/// Settings submitted to `POST /api/integrations/{kind}/setup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationSetup {
    Discord {
        token: String,
        channel_id: String,
    },
    Minecraft {
        host: String,
        port: u16,
        password: String,
    },
    Email {
        smtp_server: String,
        port: u16,
        email: String,
        password: String,
    },
    TwitchApi {
        client_id: String,
        client_secret: String,
    },
}

pub const DEFAULT_RCON_PORT: u16 = 25575;
pub const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

impl IntegrationSetup {
    /// Build from `key=value` pairs, filling the documented defaults.
    pub fn from_pairs(kind: IntegrationKind, pairs: &[(String, String)]) -> Result<Self, String> {
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.trim().to_string())
                .unwrap_or_default()
        };
        let port = |key: &str, default: u16| -> Result<u16, String> {
            let raw = get(key);
            if raw.is_empty() {
                return Ok(default);
            }
            raw.parse().map_err(|_| format!("Invalid port '{raw}'"))
        };

        Ok(match kind {
            IntegrationKind::Discord => Self::Discord {
                token: get("token"),
                channel_id: get("channel_id"),
            },
            IntegrationKind::Minecraft => Self::Minecraft {
                host: non_empty_or(get("host"), "localhost"),
                port: port("port", DEFAULT_RCON_PORT)?,
                password: get("password"),
            },
            IntegrationKind::Email => Self::Email {
                smtp_server: non_empty_or(get("smtp_server"), DEFAULT_SMTP_SERVER),
                port: port("port", DEFAULT_SMTP_PORT)?,
                email: get("email"),
                password: get("password"),
            },
            IntegrationKind::TwitchApi => Self::TwitchApi {
                client_id: get("client_id"),
                client_secret: get("client_secret"),
            },
        })
    }

    pub fn kind(&self) -> IntegrationKind {
        match self {
            Self::Discord { .. } => IntegrationKind::Discord,
            Self::Minecraft { .. } => IntegrationKind::Minecraft,
            Self::Email { .. } => IntegrationKind::Email,
            Self::TwitchApi { .. } => IntegrationKind::TwitchApi,
        }
    }

    /// Local required-field check; the message is shown as a warning.
    pub fn validate(&self) -> Result<(), String> {
        let missing = match self {
            Self::Discord { token, channel_id } => token.is_empty() || channel_id.is_empty(),
            Self::Minecraft { host, password, .. } => host.is_empty() || password.is_empty(),
            Self::Email { email, password, .. } => email.is_empty() || password.is_empty(),
            Self::TwitchApi {
                client_id,
                client_secret,
            } => client_id.is_empty() || client_secret.is_empty(),
        };
        if !missing {
            return Ok(());
        }
        Err(match self.kind() {
            IntegrationKind::Discord => "Fill in the Token and Channel ID",
            IntegrationKind::Minecraft => "Fill in the host and RCON password",
            IntegrationKind::Email => "Fill in the email and password",
            IntegrationKind::TwitchApi => "Fill in the Client ID and Client Secret",
        }
        .to_string())
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::Discord { token, channel_id } => {
                json!({ "token": token, "channel_id": channel_id })
            }
            Self::Minecraft {
                host,
                port,
                password,
            } => json!({ "host": host, "port": port, "password": password }),
            Self::Email {
                smtp_server,
                port,
                email,
                password,
            } => json!({
                "smtp_server": smtp_server,
                "port": port,
                "email": email,
                "password": password,
            }),
            Self::TwitchApi {
                client_id,
                client_secret,
            } => json!({ "client_id": client_id, "client_secret": client_secret }),
        }
    }
}

/// Body for `POST /api/integrations/{kind}/test`. Empty fields are omitted so
/// the backend applies its own defaults.
pub fn test_payload(kind: IntegrationKind, pairs: &[(String, String)]) -> Value {
    let allowed: &[&str] = match kind {
        IntegrationKind::Discord => &["message"],
        IntegrationKind::Minecraft => &["command"],
        IntegrationKind::Email => &["to", "subject", "body"],
        IntegrationKind::TwitchApi => &[],
    };
    let map = pairs
        .iter()
        .filter(|(k, v)| allowed.contains(&k.as_str()) && !v.is_empty())
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}
