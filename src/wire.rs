//! Engine.IO v4 / Socket.IO v5 text framing used by the backend's live
//! event socket.
//!
//! Only the subset a receive-mostly client needs is handled: the open
//! handshake, heartbeats, namespace connect/disconnect and event packets.
//! Bare JSON envelopes (`{"event": ..., "data": ...}`) are accepted as events
//! as well.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::model::ServerEvent;

/// Namespace connect for the default namespace.
pub const CONNECT: &str = "40";
/// Heartbeat reply.
pub const PONG: &str = "3";
/// Path and query appended to the backend base URL.
pub const SOCKET_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet type '{0}'")]
    UnknownType(char),
    #[error("malformed payload: {0}")]
    Payload(String),
}

/// Parameters the server announces in its open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    #[serde(default)]
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl Default for OpenInfo {
    fn default() -> Self {
        Self {
            sid: String::new(),
            ping_interval: default_ping_interval(),
            ping_timeout: default_ping_timeout(),
        }
    }
}

impl OpenInfo {
    /// How long to wait for the next server ping before the link is dead.
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace connect acknowledged.
    Connect,
    /// Server closed the namespace.
    Disconnect,
    ConnectError(String),
    Event(ServerEvent),
    /// An event this client does not handle.
    Unhandled(String),
    /// Acks, binary frames and other traffic a listener can skip.
    Other,
}

/// Convert a backend base URL (`http://host:port`) into the socket URL.
pub fn socket_url(base_url: &str) -> Option<String> {
    let base = base_url.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return None;
    };
    Some(format!("{ws}{SOCKET_PATH}"))
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<Packet, WireError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(WireError::Empty)?;
    let body = chars.as_str();

    match kind {
        '{' => decode_envelope(text),
        '0' => {
            let info = if body.is_empty() {
                OpenInfo::default()
            } else {
                serde_json::from_str(body).map_err(|e| WireError::Payload(e.to_string()))?
            };
            Ok(Packet::Open(info))
        }
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_message(body),
        '5' | '6' => Ok(Packet::Noop),
        other => Err(WireError::UnknownType(other)),
    }
}

/// Encode an outgoing event (`42["name",data]`).
pub fn encode_event(name: &str, data: Option<&Value>) -> String {
    let array = match data {
        Some(d) => Value::Array(vec![Value::String(name.to_string()), d.clone()]),
        None => Value::Array(vec![Value::String(name.to_string())]),
    };
    format!("42{array}")
}

fn decode_message(body: &str) -> Result<Packet, WireError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(WireError::Empty)?;
    let rest = skip_namespace(chars.as_str());

    match kind {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event_array(skip_ack_id(rest)),
        '4' => {
            let reason = serde_json::from_str::<Value>(rest)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| rest.to_string());
            Ok(Packet::ConnectError(reason))
        }
        '3' | '5' | '6' => Ok(Packet::Other),
        other => Err(WireError::UnknownType(other)),
    }
}

/// Strip an optional `/namespace,` prefix.
fn skip_namespace(s: &str) -> &str {
    if s.starts_with('/') {
        match s.find(',') {
            Some(i) => &s[i + 1..],
            None => "",
        }
    } else {
        s
    }
}

fn skip_ack_id(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn decode_event_array(payload: &str) -> Result<Packet, WireError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| WireError::Payload(e.to_string()))?;
    let mut items = match value {
        Value::Array(items) if !items.is_empty() => items.into_iter(),
        _ => return Err(WireError::Payload("event is not a non-empty array".into())),
    };
    let name = match items.next() {
        Some(Value::String(name)) => name,
        _ => return Err(WireError::Payload("event name is not a string".into())),
    };
    let data = items.next().unwrap_or(Value::Null);
    to_event(name, data)
}

fn decode_envelope(text: &str) -> Result<Packet, WireError> {
    #[derive(Deserialize)]
    struct Envelope {
        event: String,
        #[serde(default)]
        data: Value,
    }
    let env: Envelope =
        serde_json::from_str(text).map_err(|e| WireError::Payload(e.to_string()))?;
    to_event(env.event, env.data)
}

fn to_event(name: String, data: Value) -> Result<Packet, WireError> {
    match ServerEvent::from_parts(&name, data) {
        Ok(Some(event)) => Ok(Packet::Event(event)),
        Ok(None) => Ok(Packet::Unhandled(name)),
        Err(e) => Err(WireError::Payload(format!("{name}: {e}"))),
    }
}
