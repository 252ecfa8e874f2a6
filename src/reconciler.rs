//! Applies inbound events to the dashboard state with minimal disruption.
//!
//! The `Reconciler` is the only writer of `DashboardState`. Follow-up work it
//! cannot do itself (a stats refetch, dismissing a notice later, speaking a
//! line) is queued as `Effect`s for the driver loop to drain.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::buffer::BoundedBuffer;
use crate::connection::ConnectionEvent;
use crate::model::{
    ChatEntry, ChatOrigin, IntegrationStatus, LogEntry, LogLevel, RaidRecord, ServerEvent,
    StatsSnapshot, StatusChange,
};
use crate::selection::{ChannelSelector, SelectionChange};
use crate::store::ClientStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Online,
    Offline,
}

/// Follow-up work queued for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Refetch `GET /api/stats`.
    RefreshStats,
    /// Refetch everything the dashboard shows (stats, auto-responses,
    /// integration status).
    Reload,
    Dismiss(u64),
    Speak(String),
    Defer { after: Duration, effect: Box<Effect> },
}

impl Effect {
    pub fn deferred(after: Duration, effect: Effect) -> Self {
        Self::Defer {
            after,
            effect: Box::new(effect),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Warning,
    Info,
    Raid,
}

/// A toast-style notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub message: String,
    /// Persistent notices stay until the state that raised them goes away.
    pub persistent: bool,
}

/// Chat view with its empty-state placeholder.
#[derive(Debug, Clone)]
pub struct ChatTranscript {
    entries: BoundedBuffer<ChatEntry>,
    placeholder: bool,
    placeholder_clears: u32,
}

impl ChatTranscript {
    fn new(capacity: usize) -> Self {
        Self {
            entries: BoundedBuffer::new(capacity),
            placeholder: true,
            placeholder_clears: 0,
        }
    }

    pub fn entries(&self) -> &BoundedBuffer<ChatEntry> {
        &self.entries
    }

    /// Whether the "no messages yet" placeholder is showing.
    pub fn shows_placeholder(&self) -> bool {
        self.placeholder
    }

    /// How many times the placeholder has been removed.
    pub fn placeholder_clears(&self) -> u32 {
        self.placeholder_clears
    }

    fn push(&mut self, entry: ChatEntry) {
        if self.placeholder {
            self.placeholder = false;
            self.placeholder_clears += 1;
        }
        self.entries.push(entry);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.placeholder = true;
    }
}

/// Capabilities and limits of one dashboard instance.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub debug_mode: bool,
    pub voice_enabled: bool,
    pub chat_capacity: usize,
    pub log_capacity: usize,
    pub raid_capacity: usize,
    pub notice_ttl: Duration,
    pub raid_notice_ttl: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            voice_enabled: false,
            chat_capacity: 500,
            log_capacity: 1000,
            raid_capacity: 5,
            notice_ttl: Duration::from_secs(3),
            raid_notice_ttl: Duration::from_secs(10),
        }
    }
}

/// Everything the dashboard renders.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub link: LinkStatus,
    pub stats: StatsSnapshot,
    pub selector: ChannelSelector,
    pub chat: ChatTranscript,
    pub logs: BoundedBuffer<LogEntry>,
    pub raids: BoundedBuffer<RaidRecord>,
    /// Per-channel online indicator keyed by channel name.
    pub channel_status: BTreeMap<String, bool>,
    pub auto_responses: BTreeMap<String, String>,
    pub integrations: BTreeMap<String, IntegrationStatus>,
    pub notices: Vec<Notice>,
}

pub struct Reconciler {
    state: DashboardState,
    config: ReconcilerConfig,
    store: ClientStore,
    pending: Vec<Effect>,
    next_notice_id: u64,
    /// Integration name to the id of its persistent warning.
    unavailable_warnings: HashMap<String, u64>,
}

impl Reconciler {
    pub fn new(mut config: ReconcilerConfig, store: ClientStore) -> Self {
        config.debug_mode |= store.debug_mode();
        let state = DashboardState {
            link: LinkStatus::Offline,
            stats: StatsSnapshot::default(),
            selector: ChannelSelector::new(),
            chat: ChatTranscript::new(config.chat_capacity),
            logs: BoundedBuffer::new(config.log_capacity),
            raids: BoundedBuffer::new(config.raid_capacity),
            channel_status: BTreeMap::new(),
            auto_responses: BTreeMap::new(),
            integrations: BTreeMap::new(),
            notices: Vec::new(),
        };
        Self {
            state,
            config,
            store,
            pending: Vec::new(),
            next_notice_id: 1,
            unavailable_warnings: HashMap::new(),
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn store(&self) -> &ClientStore {
        &self.store
    }

    pub fn selected_channel(&self) -> Option<&str> {
        self.state.selector.selected()
    }

    /// Queue follow-up work for the driver.
    pub fn schedule(&mut self, effect: Effect) {
        self.pending.push(effect);
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.pending)
    }

    // ── Connection events ───────────────────────────────────────────────

    pub fn apply_connection(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                self.set_link(LinkStatus::Online);
                self.append_log(LogEntry::now(LogLevel::Success, "Connected to the server"));
                // Anything missed while offline is resynced, not replayed.
                self.schedule(Effect::RefreshStats);
            }
            ConnectionEvent::Disconnected(reason) => {
                // Displayed state stays as it was: stale beats blank.
                self.set_link(LinkStatus::Offline);
                self.append_log(LogEntry::now(
                    LogLevel::Error,
                    format!("Disconnected: {reason}"),
                ));
            }
            ConnectionEvent::Reconnected(attempt) => {
                self.set_link(LinkStatus::Online);
                self.append_log(LogEntry::now(
                    LogLevel::Success,
                    format!("Reconnected to the server (attempt {attempt})"),
                ));
            }
            ConnectionEvent::Retrying { attempt, delay } => {
                self.append_log(LogEntry::now(
                    LogLevel::Debug,
                    format!("Reconnect attempt {attempt} in {:.1}s", delay.as_secs_f32()),
                ));
            }
            ConnectionEvent::PollingFallback(reason) => {
                self.append_log(LogEntry::now(
                    LogLevel::Warning,
                    format!("Live socket unavailable ({reason}), polling stats instead"),
                ));
            }
            ConnectionEvent::Server(event) => self.apply_event(event),
            ConnectionEvent::Ignored(name) => {
                self.append_log(LogEntry::now(
                    LogLevel::Debug,
                    format!("Ignored server event '{name}'"),
                ));
            }
        }
    }

    /// Returns whether the link state changed.
    pub fn set_link(&mut self, link: LinkStatus) -> bool {
        let changed = self.state.link != link;
        self.state.link = link;
        changed
    }

    pub fn apply_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ChatMessage(entry) => self.append_chat(entry),
            ServerEvent::LogMessage(entry) => self.append_log(entry),
            ServerEvent::StatusChange(change) => self.apply_status_change(change),
            ServerEvent::StatsUpdate(stats) => self.apply_stats(stats),
            ServerEvent::RaidReceived(raid) => self.apply_raid(raid),
        }
    }

    // ── Stats / selection ───────────────────────────────────────────────

    /// Store the snapshot and run the stable-selection algorithm.
    pub fn apply_stats(&mut self, snapshot: StatsSnapshot) {
        let change = self
            .state
            .selector
            .reconcile(&snapshot.connected_channels, self.store.selected_channel());
        self.state.stats = snapshot;

        if let SelectionChange::Rebuilt {
            selected: Some(channel),
            persist: true,
        } = change
        {
            self.persist_selection(&channel);
        }
    }

    /// Operator picked a channel explicitly.
    pub fn select_channel(&mut self, channel: &str) -> bool {
        if !self.state.selector.select(channel) {
            self.notify(
                NoticeKind::Warning,
                format!("Channel {channel} is not connected"),
            );
            return false;
        }
        self.persist_selection(channel);
        true
    }

    fn persist_selection(&mut self, channel: &str) {
        if let Err(e) = self.store.set_selected_channel(channel) {
            self.append_log(LogEntry::now(
                LogLevel::Warning,
                format!("Could not remember channel {channel}: {e}"),
            ));
        }
    }

    // ── Transcripts ─────────────────────────────────────────────────────

    pub fn append_chat(&mut self, entry: ChatEntry) {
        self.state.chat.push(entry);
    }

    /// Append to the log, evicting the oldest entries past capacity.
    /// Debug entries are dropped unless debug mode is on.
    pub fn append_log(&mut self, entry: LogEntry) {
        if entry.level == LogLevel::Debug && !self.config.debug_mode {
            return;
        }
        self.state.logs.push(entry);
    }

    pub fn clear_chat(&mut self) {
        self.state.chat.clear();
    }

    pub fn clear_logs(&mut self) {
        self.state.logs.clear();
        self.append_log(LogEntry::now(LogLevel::Info, "Logs cleared"));
    }

    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.config.debug_mode = enabled;
        if let Err(e) = self.store.set_debug_mode(enabled) {
            self.append_log(LogEntry::now(
                LogLevel::Warning,
                format!("Could not save debug mode: {e}"),
            ));
        }
    }

    pub fn set_voice_enabled(&mut self, enabled: bool) {
        self.config.voice_enabled = enabled;
    }

    // ── Status / raids ──────────────────────────────────────────────────

    pub fn apply_status_change(&mut self, change: StatusChange) {
        let online = change.status.eq_ignore_ascii_case("online");
        self.state
            .channel_status
            .insert(change.channel.clone(), online);
        self.append_log(LogEntry::now(
            LogLevel::Info,
            format!("Channel {} is {}", change.channel, change.status),
        ));
        // One channel going up or down can change the connected set.
        self.schedule(Effect::RefreshStats);
    }

    pub fn apply_raid(&mut self, raid: RaidRecord) {
        self.state.raids.push_front(raid.clone());

        self.append_log(LogEntry {
            level: LogLevel::Event,
            message: format!(
                "RAID from {} with {} viewers on channel {}!",
                raid.raider, raid.viewer_count, raid.channel
            ),
            timestamp: raid.timestamp.clone(),
        });
        self.append_chat(ChatEntry {
            channel: raid.channel.clone(),
            username: "RAID".to_string(),
            text: format!("{} arrived with {} viewers!", raid.raider, raid.viewer_count),
            timestamp: raid.timestamp.clone(),
            origin: ChatOrigin::Raid,
        });

        let ttl = self.config.raid_notice_ttl;
        self.push_notice(
            NoticeKind::Raid,
            format!(
                "RAID INCOMING! {} brought {} viewers to {}",
                raid.raider, raid.viewer_count, raid.channel
            ),
            Some(ttl),
        );
        self.schedule(Effect::RefreshStats);
    }

    // ── Server-owned collections ────────────────────────────────────────

    pub fn set_auto_responses(&mut self, responses: BTreeMap<String, String>) {
        self.state.auto_responses = responses;
    }

    /// Replace integration statuses. Each integration whose backend library
    /// is missing gets one persistent warning, withdrawn once it is available.
    pub fn set_integrations(&mut self, statuses: BTreeMap<String, IntegrationStatus>) {
        let resolved: Vec<String> = self
            .unavailable_warnings
            .keys()
            .filter(|name| statuses.get(*name).map_or(true, |s| s.available))
            .cloned()
            .collect();
        for name in resolved {
            if let Some(id) = self.unavailable_warnings.remove(&name) {
                self.dismiss(id);
            }
        }

        for (name, status) in &statuses {
            if !status.available && !self.unavailable_warnings.contains_key(name) {
                let id = self.push_notice(
                    NoticeKind::Warning,
                    format!("{name}: library not installed on the backend"),
                    None,
                );
                self.unavailable_warnings.insert(name.clone(), id);
            }
        }
        self.state.integrations = statuses;
    }

    // ── Notices ─────────────────────────────────────────────────────────

    /// Raise a transient notice that dismisses itself after the configured
    /// delay.
    pub fn notify(&mut self, kind: NoticeKind, message: impl Into<String>) -> u64 {
        let ttl = self.config.notice_ttl;
        self.push_notice(kind, message.into(), Some(ttl))
    }

    pub fn dismiss(&mut self, id: u64) {
        self.state.notices.retain(|n| n.id != id);
    }

    fn push_notice(&mut self, kind: NoticeKind, message: String, ttl: Option<Duration>) -> u64 {
        let id = self.next_notice_id;
        self.next_notice_id += 1;
        self.state.notices.push(Notice {
            id,
            kind,
            message,
            persistent: ttl.is_none(),
        });
        if let Some(after) = ttl {
            self.schedule(Effect::deferred(after, Effect::Dismiss(id)));
        }
        id
    }
}
