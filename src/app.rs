//! The driver: one loop that owns the dashboard state.
//!
//! Connection events, operator commands, the stats resync timer, voice
//! results and deferred effects are all consumed here, in arrival order, so
//! the state needs no locks.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

use crate::connection::ConnectionEvent;
use crate::dispatcher::{CommandDispatcher, Outcome};
use crate::imports::ImportKind;
use crate::integrations::{IntegrationKind, IntegrationSetup};
use crate::logger::{Logger, SessionMetrics};
use crate::model::{LogEntry, LogLevel};
use crate::reconciler::{Effect, LinkStatus, NoticeKind, Reconciler};
use crate::render::Console;
use crate::voice::{VoiceError, VoiceResult, VoiceSession};

/// Operator intents coming from the REPL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Send text to `channel`, or to the selected channel.
    Send { channel: Option<String>, text: String },
    Select(String),
    /// Start/stop the bot on a channel, or on the selected one.
    Toggle(Option<String>),
    AddStreamer(String),
    RemoveStreamer(String),
    AddResponse { trigger: String, response: String },
    RemoveResponse(String),
    ListResponses,
    ListIntegrations,
    Setup(IntegrationSetup),
    Test { kind: IntegrationKind, fields: Vec<(String, String)> },
    Disable(IntegrationKind),
    Import { kind: ImportKind, path: PathBuf },
    Voice(bool),
    VoiceSay(String),
    Debug(bool),
    Chat(usize),
    Logs(usize),
    Raids,
    ClearChat,
    ClearLogs,
    Status,
    Metrics,
    Refresh,
    Help,
    Quit,
}

impl UserCommand {
    /// Question to ask before a destructive command is sent.
    pub fn confirmation_prompt(&self) -> Option<String> {
        match self {
            Self::RemoveStreamer(name) => Some(format!("Remove streamer {name}?")),
            Self::RemoveResponse(trigger) => Some(format!("Remove auto-response {trigger}?")),
            Self::Disable(kind) => Some(format!("Disable {kind}?")),
            _ => None,
        }
    }

    /// Log label that leaves out integration credentials.
    pub fn describe(&self) -> String {
        match self {
            Self::Setup(setup) => format!("Setup({})", setup.kind().slug()),
            other => format!("{other:?}"),
        }
    }
}

/// A command plus the operator's answer to its confirmation, if it had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub command: UserCommand,
    pub confirmed: bool,
}

impl Submitted {
    pub fn new(command: UserCommand) -> Self {
        Self {
            command,
            confirmed: false,
        }
    }

    pub fn confirmed(command: UserCommand) -> Self {
        Self {
            command,
            confirmed: true,
        }
    }
}

pub struct App {
    reconciler: Reconciler,
    dispatcher: CommandDispatcher,
    voice: VoiceSession,
    console: Option<Console>,
    logger: Option<Logger>,
    metrics: SessionMetrics,
    poll_interval: Duration,
    /// Deferred effects ordered by deadline.
    timers: Vec<(Instant, Effect)>,
    logged_mark: u64,
}

impl App {
    pub fn new(
        reconciler: Reconciler,
        dispatcher: CommandDispatcher,
        voice: VoiceSession,
        poll_interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            dispatcher,
            voice,
            console: None,
            logger: None,
            metrics: SessionMetrics::new(),
            poll_interval,
            timers: Vec::new(),
            logged_mark: 0,
        }
    }

    /// Print state changes to the terminal.
    pub fn with_console(mut self) -> Self {
        self.console = Some(Console::new());
        self
    }

    /// Mirror the dashboard log into a session file.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Run until the operator quits or the command channel closes.
    pub async fn run(
        &mut self,
        mut events: UnboundedReceiver<ConnectionEvent>,
        mut commands: UnboundedReceiver<Submitted>,
    ) -> Result<()> {
        if self.reconciler.config().voice_enabled {
            self.start_voice();
        }
        self.reconciler.schedule(Effect::Reload);
        self.settle().await;

        let mut resync = interval(self.poll_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        resync.tick().await;
        let mut events_open = true;

        loop {
            let next_timer = self.timers.first().map(|(at, _)| *at);
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        self.metrics.events_received += 1;
                        match &event {
                            ConnectionEvent::Reconnected(_) => self.metrics.reconnects += 1,
                            ConnectionEvent::Ignored(name) => self.log_ignored(name),
                            _ => {}
                        }
                        self.reconciler.apply_connection(event);
                    }
                    None => {
                        events_open = false;
                        self.reconciler.set_link(LinkStatus::Offline);
                        self.reconciler.append_log(LogEntry::now(
                            LogLevel::Error,
                            "Connection task stopped",
                        ));
                    }
                },
                command = commands.recv() => match command {
                    Some(submitted) => {
                        if !self.handle(submitted).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = resync.tick() => {
                    // Best-effort resync on top of push events.
                    if self.reconciler.state().link == LinkStatus::Online {
                        self.reconciler.schedule(Effect::RefreshStats);
                    }
                },
                result = self.voice.next_result() => {
                    if let Some(result) = result {
                        self.on_voice_result(result).await;
                    }
                },
                _ = sleep_until_opt(next_timer) => self.fire_due_timers(),
            }
            self.settle().await;
        }

        self.voice.stop();
        self.settle().await;
        Ok(())
    }

    /// Apply queued effects until none are left, then render.
    async fn settle(&mut self) {
        let mut queue: VecDeque<Effect> = self.reconciler.take_effects().into();
        let mut stats_fresh = false;
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::RefreshStats => {
                    if !stats_fresh {
                        self.dispatcher.load_stats(&mut self.reconciler).await;
                        stats_fresh = true;
                    }
                }
                Effect::Reload => {
                    self.dispatcher.reload_all(&mut self.reconciler).await;
                    stats_fresh = true;
                }
                Effect::Dismiss(id) => self.reconciler.dismiss(id),
                Effect::Speak(text) => self.speak(&text),
                Effect::Defer { after, effect } => self.defer(after, *effect),
            }
            queue.extend(self.reconciler.take_effects());
        }

        if let Some(console) = self.console.as_mut() {
            console.render(self.reconciler.state());
        }
        self.mirror_log();
    }

    fn defer(&mut self, after: Duration, effect: Effect) {
        let at = Instant::now() + after;
        let pos = self.timers.partition_point(|(t, _)| *t <= at);
        self.timers.insert(pos, (at, effect));
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        let due = self.timers.partition_point(|(t, _)| *t <= now);
        for (_, effect) in self.timers.drain(..due) {
            self.reconciler.schedule(effect);
        }
    }

    /// Debug entries only reach the state in debug mode; the session file
    /// records ignored events either way.
    fn log_ignored(&self, name: &str) {
        if self.reconciler.config().debug_mode {
            return;
        }
        if let Some(logger) = &self.logger {
            let entry = LogEntry::now(LogLevel::Debug, format!("Ignored server event '{name}'"));
            if let Err(e) = logger.log_entry(&entry) {
                eprintln!("Warning: could not write session log: {e}");
            }
        }
    }

    fn mirror_log(&mut self) {
        let Some(logger) = &self.logger else {
            return;
        };
        let logs = &self.reconciler.state().logs;
        for entry in logs.since(self.logged_mark) {
            if let Err(e) = logger.log_entry(entry) {
                eprintln!("Warning: could not write session log: {e}");
                break;
            }
        }
        self.logged_mark = logs.pushed();
    }

    /// Returns `false` when the driver should stop.
    async fn handle(&mut self, submitted: Submitted) -> bool {
        let Submitted {
            command,
            mut confirmed,
        } = submitted;
        let label = command.describe();
        let rec = &mut self.reconciler;
        let dispatcher = &self.dispatcher;

        let outcome = match command {
            UserCommand::Quit => {
                if let Some(console) = &self.console {
                    console.show_status(rec.state());
                }
                self.metrics.display();
                return false;
            }
            UserCommand::Send { channel, text } => {
                let channel = channel
                    .or_else(|| rec.selected_channel().map(str::to_string))
                    .unwrap_or_default();
                dispatcher.send_chat_message(rec, &channel, &text).await
            }
            UserCommand::Select(channel) => {
                if rec.select_channel(&channel) {
                    rec.notify(NoticeKind::Info, format!("Selected {channel}"));
                    Outcome::Done
                } else {
                    Outcome::Rejected
                }
            }
            UserCommand::Toggle(channel) => {
                let channel = channel
                    .or_else(|| rec.selected_channel().map(str::to_string))
                    .unwrap_or_default();
                dispatcher.toggle_bot_connection(rec, &channel).await
            }
            UserCommand::AddStreamer(name) => dispatcher.add_streamer(rec, &name).await,
            UserCommand::RemoveStreamer(name) => {
                dispatcher.remove_streamer(rec, &name, &mut confirmed).await
            }
            UserCommand::AddResponse { trigger, response } => {
                dispatcher.add_auto_response(rec, &trigger, &response).await
            }
            UserCommand::RemoveResponse(trigger) => {
                dispatcher
                    .remove_auto_response(rec, &trigger, &mut confirmed)
                    .await
            }
            UserCommand::ListResponses => {
                let outcome = dispatcher.load_auto_responses(rec).await;
                if let Some(console) = &self.console {
                    console.show_auto_responses(rec.state());
                }
                outcome
            }
            UserCommand::ListIntegrations => {
                let outcome = dispatcher.load_integrations(rec).await;
                if let Some(console) = &self.console {
                    console.show_integrations(rec.state());
                }
                outcome
            }
            UserCommand::Setup(setup) => dispatcher.setup_integration(rec, setup).await,
            UserCommand::Test { kind, fields } => {
                dispatcher.test_integration(rec, kind, &fields).await
            }
            UserCommand::Disable(kind) => {
                dispatcher
                    .disable_integration(rec, kind, &mut confirmed)
                    .await
            }
            UserCommand::Import { kind, path } => dispatcher.import_file(rec, kind, &path).await,
            UserCommand::Voice(true) => {
                self.start_voice();
                Outcome::Done
            }
            UserCommand::Voice(false) => {
                self.voice.stop();
                self.reconciler.set_voice_enabled(false);
                self.reconciler
                    .notify(NoticeKind::Info, "Voice control disabled");
                Outcome::Done
            }
            UserCommand::VoiceSay(text) => {
                if rec.config().voice_enabled {
                    dispatcher.process_voice_command(rec, &text).await
                } else {
                    rec.notify(NoticeKind::Warning, "Voice control is off (/voice on)");
                    Outcome::Rejected
                }
            }
            UserCommand::Debug(enabled) => {
                rec.set_debug_mode(enabled);
                let state = if enabled { "enabled" } else { "disabled" };
                rec.notify(NoticeKind::Info, format!("Debug mode {state}"));
                Outcome::Done
            }
            UserCommand::Chat(count) => {
                if let Some(console) = &self.console {
                    console.show_chat(rec.state(), count);
                }
                Outcome::Ignored
            }
            UserCommand::Logs(count) => {
                if let Some(console) = &self.console {
                    console.show_logs(rec.state(), count);
                }
                Outcome::Ignored
            }
            UserCommand::Raids => {
                if let Some(console) = &self.console {
                    console.show_raids(rec.state());
                }
                Outcome::Ignored
            }
            UserCommand::ClearChat => {
                rec.clear_chat();
                Outcome::Done
            }
            UserCommand::ClearLogs => {
                rec.clear_logs();
                Outcome::Done
            }
            UserCommand::Status => {
                if let Some(console) = &self.console {
                    console.show_status(rec.state());
                }
                Outcome::Ignored
            }
            UserCommand::Metrics => {
                self.metrics.display();
                Outcome::Ignored
            }
            UserCommand::Refresh => dispatcher.reload_all(rec).await,
            UserCommand::Help => Outcome::Ignored,
        };

        self.metrics.record(outcome);
        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log_command(&label, outcome) {
                eprintln!("Warning: could not write session log: {e}");
            }
        }
        true
    }

    fn start_voice(&mut self) {
        self.reconciler.set_voice_enabled(true);
        match self.voice.start() {
            Ok(()) => {
                self.reconciler
                    .notify(NoticeKind::Success, "Voice recognition enabled");
            }
            Err(VoiceError::Unsupported) => {
                self.reconciler.notify(
                    NoticeKind::Warning,
                    "Speech capture unavailable; use /voice say <text>",
                );
            }
            Err(e) => {
                self.reconciler.notify(NoticeKind::Error, e.to_string());
            }
        }
    }

    async fn on_voice_result(&mut self, result: VoiceResult) {
        match result {
            VoiceResult::Transcript(text) => {
                if !self.reconciler.config().voice_enabled {
                    return;
                }
                let outcome = self
                    .dispatcher
                    .process_voice_command(&mut self.reconciler, &text)
                    .await;
                self.metrics.record(outcome);
            }
            VoiceResult::Error(e) => {
                self.reconciler.append_log(LogEntry::now(
                    LogLevel::Warning,
                    format!("Voice recognition error: {e}"),
                ));
            }
        }
    }

    /// Spoken replies always land in the log; audio is best effort.
    fn speak(&mut self, text: &str) {
        self.reconciler
            .append_log(LogEntry::now(LogLevel::Bot, format!("🔊 {text}")));
        match self.voice.speak(text) {
            Ok(()) | Err(VoiceError::Unsupported) => {}
            Err(e) => self.reconciler.append_log(LogEntry::now(
                LogLevel::Debug,
                format!("Speech output failed: {e}"),
            )),
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
