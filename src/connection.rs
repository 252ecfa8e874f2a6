//! The single live connection to the backend.
//!
//! `ConnectionManager` runs as its own task and only ever sends
//! `ConnectionEvent`s. It speaks Socket.IO over a WebSocket and falls back
//! to polling `GET /api/stats` when configured to, or after the socket keeps
//! failing. Reconnects never give up.

use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::api::BackendClient;
use crate::error::ConnectError;
use crate::model::ServerEvent;
use crate::wire::{self, OpenInfo, Packet};

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;
type WsWrite = futures::stream::SplitSink<WsStream, Message>;
type WsRead = futures::stream::SplitStream<WsStream>;

/// Everything the driver hears from the connection task.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected(String),
    /// A connection succeeded after `n` failed attempts.
    Reconnected(u32),
    Retrying { attempt: u32, delay: Duration },
    /// The socket kept failing; stats are polled from now on.
    PollingFallback(String),
    Server(ServerEvent),
    /// A server event this client has no handler for.
    Ignored(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    WebSocket,
    Polling,
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub base_url: String,
    pub transport: Transport,
    pub reconnect_delay: Duration,
    pub reconnect_delay_max: Duration,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    /// Consecutive socket failures before switching to polling. Zero never
    /// falls back.
    pub websocket_failures_before_polling: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            transport: Transport::WebSocket,
            reconnect_delay: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            websocket_failures_before_polling: 3,
        }
    }
}

// ── Backoff ─────────────────────────────────────────────────────────────

/// Doubling delay capped at `max`; `reset` after a successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Up to 10% extra so many panels do not reconnect in lockstep.
fn jittered(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 10;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

// ── Manager ─────────────────────────────────────────────────────────────

/// How a session ended.
enum SessionEnd {
    /// Never reached the connected state.
    Failed(ConnectError),
    /// Was connected, then lost the link.
    Lost(String),
    /// The driver went away.
    Shutdown,
}

pub struct ConnectionManager {
    settings: ConnectionSettings,
    client: BackendClient,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionManager {
    pub fn new(
        settings: ConnectionSettings,
        client: BackendClient,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            settings,
            client,
            events,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Connect, pump, reconnect. Returns only when the receiver is dropped.
    pub async fn run(self) {
        let mut backoff = Backoff::new(
            self.settings.reconnect_delay,
            self.settings.reconnect_delay_max,
        );
        let mut failed_attempts: u32 = 0;
        let mut socket_failures: u32 = 0;
        let mut ever_connected = false;

        loop {
            let polling = self.use_polling(socket_failures);
            let mut connected = false;
            let end = if polling {
                self.polling_session(&mut connected, failed_attempts, ever_connected)
                    .await
            } else {
                self.websocket_session(&mut connected, failed_attempts, ever_connected)
                    .await
            };

            if connected {
                ever_connected = true;
                failed_attempts = 0;
                backoff.reset();
                if !polling {
                    socket_failures = 0;
                }
            }

            match end {
                SessionEnd::Shutdown => return,
                SessionEnd::Lost(reason) => {
                    if !self.emit(ConnectionEvent::Disconnected(reason)) {
                        return;
                    }
                    if polling {
                        // The backend was reachable; give the socket another go.
                        socket_failures = 0;
                    }
                }
                SessionEnd::Failed(err) => {
                    if !polling {
                        socket_failures += 1;
                        if self.use_polling(socket_failures)
                            && !self.emit(ConnectionEvent::PollingFallback(err.to_string()))
                        {
                            return;
                        }
                    }
                }
            }

            failed_attempts += 1;
            let delay = backoff.next_delay();
            if !self.emit(ConnectionEvent::Retrying {
                attempt: failed_attempts,
                delay,
            }) {
                return;
            }
            sleep(jittered(delay)).await;
        }
    }

    fn use_polling(&self, socket_failures: u32) -> bool {
        let threshold = self.settings.websocket_failures_before_polling;
        self.settings.transport == Transport::Polling
            || (threshold > 0 && socket_failures >= threshold)
    }

    fn emit(&self, event: ConnectionEvent) -> bool {
        self.events.send(event).is_ok()
    }

    fn announce_connected(
        &self,
        connected: &mut bool,
        failed_attempts: u32,
        ever_connected: bool,
    ) -> bool {
        *connected = true;
        if !self.emit(ConnectionEvent::Connected) {
            return false;
        }
        if ever_connected && failed_attempts > 0 {
            return self.emit(ConnectionEvent::Reconnected(failed_attempts));
        }
        true
    }

    // ── WebSocket ───────────────────────────────────────────────────────

    async fn websocket_session(
        &self,
        connected: &mut bool,
        failed_attempts: u32,
        ever_connected: bool,
    ) -> SessionEnd {
        let url = match wire::socket_url(&self.settings.base_url) {
            Some(url) => url,
            None => {
                return SessionEnd::Failed(ConnectError::BadUrl(self.settings.base_url.clone()))
            }
        };
        let limit = self.settings.connect_timeout;

        let (stream, _) = match timeout(limit, connect_async(url.as_str())).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => return SessionEnd::Failed(ConnectError::WebSocket(e)),
            Err(_) => return SessionEnd::Failed(ConnectError::Timeout(limit)),
        };
        let (mut write, mut read) = stream.split();

        let info = match timeout(limit, handshake(&mut write, &mut read)).await {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => return SessionEnd::Failed(e),
            Err(_) => return SessionEnd::Failed(ConnectError::Timeout(limit)),
        };

        if !self.announce_connected(connected, failed_attempts, ever_connected) {
            return SessionEnd::Shutdown;
        }
        let request = wire::encode_event("request_stats", None);
        if let Err(e) = write.send(Message::Text(request.into())).await {
            return SessionEnd::Lost(e.to_string());
        }

        // Pump until the link dies. A missing ping means a dead link.
        let heartbeat = info.heartbeat_deadline();
        let mut deadline = Instant::now() + heartbeat;
        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Ping(payload))) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                return SessionEnd::Lost(e.to_string());
                            }
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return SessionEnd::Lost("transport close".into());
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return SessionEnd::Lost(format!("transport error: {e}")),
                    };
                    match wire::decode(&text) {
                        Ok(Packet::Ping) => {
                            deadline = Instant::now() + heartbeat;
                            let pong = Message::Text(wire::PONG.to_string().into());
                            if let Err(e) = write.send(pong).await {
                                return SessionEnd::Lost(e.to_string());
                            }
                        }
                        Ok(Packet::Event(event)) => {
                            if !self.emit(ConnectionEvent::Server(event)) {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Ok(Packet::Unhandled(name)) => {
                            if !self.emit(ConnectionEvent::Ignored(name)) {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Ok(Packet::Disconnect) => {
                            return SessionEnd::Lost("io server disconnect".into())
                        }
                        Ok(Packet::Close) => return SessionEnd::Lost("transport close".into()),
                        Ok(_) => {}
                        // One bad frame does not kill the link.
                        Err(_) => {}
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return SessionEnd::Lost("ping timeout".into());
                }
                _ = self.events.closed() => return SessionEnd::Shutdown,
            }
        }
    }

    // ── Polling ─────────────────────────────────────────────────────────

    async fn polling_session(
        &self,
        connected: &mut bool,
        failed_attempts: u32,
        ever_connected: bool,
    ) -> SessionEnd {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.events.closed() => return SessionEnd::Shutdown,
            }
            match self.client.stats().await {
                Ok(stats) => {
                    if !*connected
                        && !self.announce_connected(connected, failed_attempts, ever_connected)
                    {
                        return SessionEnd::Shutdown;
                    }
                    if !self.emit(ConnectionEvent::Server(ServerEvent::StatsUpdate(stats))) {
                        return SessionEnd::Shutdown;
                    }
                }
                Err(e) if *connected => return SessionEnd::Lost(format!("poll failed: {e}")),
                Err(e) => return SessionEnd::Failed(ConnectError::Poll(e)),
            }
        }
    }
}

/// Socket.IO handshake: open packet, namespace connect, server ack.
async fn handshake(write: &mut WsWrite, read: &mut WsRead) -> Result<OpenInfo, ConnectError> {
    let mut info = None;
    while let Some(msg) = read.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match wire::decode(&text) {
            Ok(Packet::Open(open)) => {
                info = Some(open);
                write
                    .send(Message::Text(wire::CONNECT.to_string().into()))
                    .await?;
            }
            Ok(Packet::Ping) => {
                write
                    .send(Message::Text(wire::PONG.to_string().into()))
                    .await?
            }
            Ok(Packet::Connect) => return Ok(info.unwrap_or_default()),
            Ok(Packet::ConnectError(reason)) => return Err(ConnectError::Refused(reason)),
            Ok(_) => {}
            Err(e) => return Err(ConnectError::Handshake(e.to_string())),
        }
    }
    Err(ConnectError::Handshake("socket closed during handshake".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        let seq: Vec<u64> = (0..5).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(seq, vec![1, 2, 4, 5, 5]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_secs(2);
        for _ in 0..50 {
            let d = jittered(base);
            assert!(d >= base && d <= Duration::from_millis(2200));
        }
    }

    #[test]
    fn test_transport_from_config() {
        #[derive(Deserialize)]
        struct Wrap {
            transport: Transport,
        }
        let w: Wrap = toml::from_str("transport = \"polling\"").unwrap();
        assert_eq!(w.transport, Transport::Polling);
        let w: Wrap = toml::from_str("transport = \"websocket\"").unwrap();
        assert_eq!(w.transport, Transport::WebSocket);
    }

    fn polling_settings(base_url: String) -> ConnectionSettings {
        ConnectionSettings {
            base_url,
            transport: Transport::Polling,
            reconnect_delay: Duration::from_millis(10),
            reconnect_delay_max: Duration::from_millis(20),
            connect_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(20),
            websocket_failures_before_polling: 3,
        }
    }

    #[tokio::test]
    async fn test_polling_emits_connected_then_stats() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/stats")
            .with_status(200)
            .with_body(r#"{"connected_channels":["alpha"],"total_users":3}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = BackendClient::new(&server.url(), Duration::from_secs(2));
        let handle = ConnectionManager::new(polling_settings(server.url()), client, tx).spawn();

        assert_eq!(rx.recv().await, Some(ConnectionEvent::Connected));
        match rx.recv().await {
            Some(ConnectionEvent::Server(ServerEvent::StatsUpdate(stats))) => {
                assert_eq!(stats.connected_channels, vec!["alpha"]);
                assert_eq!(stats.total_users, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        drop(rx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_backend_retries_with_backoff() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}");
        let mut settings = polling_settings(url.clone());
        settings.transport = Transport::WebSocket;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = BackendClient::new(&url, Duration::from_secs(1));
        let handle = ConnectionManager::new(settings, client, tx).spawn();

        let mut delays = Vec::new();
        while delays.len() < 3 {
            match rx.recv().await {
                Some(ConnectionEvent::Retrying { attempt, delay }) => {
                    assert_eq!(attempt as usize, delays.len() + 1);
                    delays.push(delay.as_millis());
                }
                Some(ConnectionEvent::PollingFallback(reason)) => {
                    assert_eq!(delays.len(), 2);
                    assert!(!reason.is_empty());
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(delays, vec![10, 20, 20]);
        drop(rx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_websocket_handshake_and_events() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let open = r#"0{"sid":"s1","pingInterval":25000,"pingTimeout":20000}"#;
            ws.send(Message::Text(open.to_string().into())).await.unwrap();

            let connect = ws.next().await.unwrap().unwrap();
            assert_eq!(connect.to_text().unwrap(), "40");
            ws.send(Message::Text("40".to_string().into())).await.unwrap();

            let request = ws.next().await.unwrap().unwrap();
            assert_eq!(request.to_text().unwrap(), r#"42["request_stats"]"#);

            let chat = r#"42["chat_message",{"channel":"alpha","username":"viewer","message":"oi"}]"#;
            ws.send(Message::Text(chat.to_string().into())).await.unwrap();
            let unknown = r#"42["connected",{"status":"ok"}]"#;
            ws.send(Message::Text(unknown.to_string().into())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let url = format!("http://{addr}");
        let settings = ConnectionSettings {
            base_url: url.clone(),
            reconnect_delay: Duration::from_millis(10),
            reconnect_delay_max: Duration::from_millis(10),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = BackendClient::new(&url, Duration::from_secs(1));
        let handle = ConnectionManager::new(settings, client, tx).spawn();

        assert_eq!(rx.recv().await, Some(ConnectionEvent::Connected));
        match rx.recv().await {
            Some(ConnectionEvent::Server(ServerEvent::ChatMessage(entry))) => {
                assert_eq!(entry.text, "oi");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            rx.recv().await,
            Some(ConnectionEvent::Ignored("connected".into()))
        );
        match rx.recv().await {
            Some(ConnectionEvent::Disconnected(reason)) => assert_eq!(reason, "transport close"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            rx.recv().await,
            Some(ConnectionEvent::Retrying { attempt: 1, .. })
        ));

        server.await.unwrap();
        drop(rx);
        handle.await.unwrap();
    }
}
