//! Turns operator intents into backend requests.
//!
//! Every operation validates locally first (a rejected intent never touches
//! the network), then folds the result back into the `Reconciler` as log
//! entries, notices and queued effects. Nothing here returns an error.

use std::path::Path;
use std::time::Duration;

use crate::api::{BackendClient, Reply};
use crate::error::ApiError;
use crate::imports::{validate_upload, ImportKind, ImportSummary};
use crate::integrations::{test_payload, IntegrationKind, IntegrationSetup};
use crate::model::{LogEntry, LogLevel};
use crate::reconciler::{Effect, NoticeKind, Reconciler};
use crate::voice::{IntentMatcher, VoiceIntent};

/// Chat entries spoken by the "read chat" voice intent.
const READ_BACK_COUNT: usize = 3;
/// Rows of an import echoed back to the operator.
const IMPORT_PREVIEW_ROWS: usize = 3;

/// Asks the operator before a destructive request goes out. Held across
/// requests, so it must be `Send` for the driver to run on a spawned task.
pub trait Confirm: Send {
    fn confirm(&mut self, question: &str) -> bool;
}

/// A fixed answer, for callers that already asked.
impl Confirm for bool {
    fn confirm(&mut self, _question: &str) -> bool {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Local validation failed; nothing was sent.
    Rejected,
    /// The operator declined the confirmation.
    Cancelled,
    /// The request was sent and failed.
    Failed,
    /// Input that maps to no action.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Delay before the full reload that follows a bot start/stop.
    pub refresh_delay: Duration,
    pub thank_you_message: String,
    pub activation_word: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            refresh_delay: Duration::from_secs(1),
            thank_you_message: "Obrigado pelo apoio! 💜".to_string(),
            activation_word: "bot".to_string(),
        }
    }
}

pub struct CommandDispatcher {
    client: BackendClient,
    settings: DispatcherSettings,
    intents: IntentMatcher,
}

impl CommandDispatcher {
    pub fn new(client: BackendClient, settings: DispatcherSettings) -> Self {
        let intents = IntentMatcher::new(&settings.activation_word);
        Self {
            client,
            settings,
            intents,
        }
    }

    // ── Chat / bot control ──────────────────────────────────────────────

    /// Send a chat line. The transcript is not touched; the server echo
    /// delivers the message.
    pub async fn send_chat_message(
        &self,
        rec: &mut Reconciler,
        channel: &str,
        text: &str,
    ) -> Outcome {
        let text = text.trim();
        if channel.is_empty() {
            return reject(rec, "Select a channel first");
        }
        if text.is_empty() {
            return reject(rec, "Type a message first");
        }
        match self.client.send_message(channel, text).await {
            Ok(_) => Outcome::Done,
            Err(e) => fail(rec, "Sending message", e),
        }
    }

    /// Stop the bot on `channel` if it is connected, otherwise start it.
    pub async fn toggle_bot_connection(&self, rec: &mut Reconciler, channel: &str) -> Outcome {
        let channel = channel.trim();
        if channel.is_empty() {
            return reject(rec, "Enter a channel name");
        }
        let stopping = rec.state().stats.is_connected(channel);
        let result = if stopping {
            self.client.stop_bot(channel).await
        } else {
            self.client.start_bot(channel).await
        };
        match result {
            Ok(reply) => {
                let fallback = if stopping {
                    format!("Bot disconnected from {channel}")
                } else {
                    format!("Bot connected to {channel}")
                };
                succeed(rec, reply, fallback);
                rec.schedule(Effect::deferred(self.settings.refresh_delay, Effect::Reload));
                Outcome::Done
            }
            Err(e) => fail(
                rec,
                if stopping { "Stopping bot" } else { "Starting bot" },
                e,
            ),
        }
    }

    // ── Streamers ───────────────────────────────────────────────────────

    pub async fn add_streamer(&self, rec: &mut Reconciler, username: &str) -> Outcome {
        let username = username.trim();
        if username.is_empty() {
            return reject(rec, "Enter a streamer name");
        }
        match self.client.add_streamer(username).await {
            Ok(reply) => {
                succeed(rec, reply, format!("Streamer {username} added"));
                rec.schedule(Effect::Reload);
                Outcome::Done
            }
            Err(e) => fail(rec, "Adding streamer", e),
        }
    }

    pub async fn remove_streamer(
        &self,
        rec: &mut Reconciler,
        username: &str,
        confirm: &mut dyn Confirm,
    ) -> Outcome {
        let username = username.trim();
        if username.is_empty() {
            return reject(rec, "Enter a streamer name");
        }
        if !confirm.confirm(&format!("Remove streamer {username}?")) {
            return Outcome::Cancelled;
        }
        match self.client.remove_streamer(username).await {
            Ok(reply) => {
                succeed(rec, reply, format!("Streamer {username} removed"));
                rec.schedule(Effect::Reload);
                Outcome::Done
            }
            Err(e) => fail(rec, "Removing streamer", e),
        }
    }

    // ── Auto-responses ──────────────────────────────────────────────────

    pub async fn add_auto_response(
        &self,
        rec: &mut Reconciler,
        trigger: &str,
        response: &str,
    ) -> Outcome {
        let (trigger, response) = (trigger.trim(), response.trim());
        if trigger.is_empty() || response.is_empty() {
            return reject(rec, "Fill in both the trigger and the response");
        }
        match self.client.add_auto_response(trigger, response).await {
            Ok(reply) => {
                succeed(rec, reply, format!("Auto-response {trigger} added"));
                self.load_auto_responses(rec).await;
                Outcome::Done
            }
            Err(e) => fail(rec, "Adding auto-response", e),
        }
    }

    pub async fn remove_auto_response(
        &self,
        rec: &mut Reconciler,
        trigger: &str,
        confirm: &mut dyn Confirm,
    ) -> Outcome {
        let trigger = trigger.trim();
        if trigger.is_empty() {
            return reject(rec, "Enter the trigger to remove");
        }
        if !confirm.confirm(&format!("Remove auto-response {trigger}?")) {
            return Outcome::Cancelled;
        }
        match self.client.remove_auto_response(trigger).await {
            Ok(reply) => {
                succeed(rec, reply, format!("Auto-response {trigger} removed"));
                self.load_auto_responses(rec).await;
                Outcome::Done
            }
            Err(e) => fail(rec, "Removing auto-response", e),
        }
    }

    // ── Loads ───────────────────────────────────────────────────────────

    pub async fn load_stats(&self, rec: &mut Reconciler) -> Outcome {
        match self.client.stats().await {
            Ok(stats) => {
                rec.apply_stats(stats);
                Outcome::Done
            }
            Err(e) => {
                rec.append_log(LogEntry::now(
                    LogLevel::Warning,
                    format!("Could not refresh stats: {e}"),
                ));
                Outcome::Failed
            }
        }
    }

    pub async fn load_auto_responses(&self, rec: &mut Reconciler) -> Outcome {
        match self.client.auto_responses().await {
            Ok(map) => {
                rec.set_auto_responses(map);
                Outcome::Done
            }
            Err(e) => {
                rec.append_log(LogEntry::now(
                    LogLevel::Warning,
                    format!("Could not load auto-responses: {e}"),
                ));
                Outcome::Failed
            }
        }
    }

    pub async fn load_integrations(&self, rec: &mut Reconciler) -> Outcome {
        match self.client.integrations_status().await {
            Ok(statuses) => {
                rec.set_integrations(statuses);
                Outcome::Done
            }
            Err(e) => {
                rec.append_log(LogEntry::now(
                    LogLevel::Warning,
                    format!("Could not load integrations: {e}"),
                ));
                Outcome::Failed
            }
        }
    }

    /// Refetch everything server-owned.
    pub async fn reload_all(&self, rec: &mut Reconciler) -> Outcome {
        let results = [
            self.load_stats(rec).await,
            self.load_auto_responses(rec).await,
            self.load_integrations(rec).await,
        ];
        if results.iter().all(|o| *o == Outcome::Done) {
            Outcome::Done
        } else {
            Outcome::Failed
        }
    }

    // ── Integrations ────────────────────────────────────────────────────

    pub async fn setup_integration(
        &self,
        rec: &mut Reconciler,
        setup: IntegrationSetup,
    ) -> Outcome {
        if let Err(msg) = setup.validate() {
            return reject(rec, msg);
        }
        let kind = setup.kind();
        match self.client.setup_integration(kind, &setup.payload()).await {
            Ok(reply) => {
                succeed(rec, reply, format!("{kind} configured"));
                self.load_integrations(rec).await;
                Outcome::Done
            }
            Err(e) => fail(rec, &format!("Configuring {kind}"), e),
        }
    }

    pub async fn test_integration(
        &self,
        rec: &mut Reconciler,
        kind: IntegrationKind,
        fields: &[(String, String)],
    ) -> Outcome {
        if !kind.supports_test() {
            return reject(rec, format!("{kind} has no test action"));
        }
        match self.client.test_integration(kind, &test_payload(kind, fields)).await {
            Ok(reply) => {
                succeed(rec, reply, format!("{kind} test sent"));
                Outcome::Done
            }
            Err(e) => fail(rec, &format!("Testing {kind}"), e),
        }
    }

    pub async fn disable_integration(
        &self,
        rec: &mut Reconciler,
        kind: IntegrationKind,
        confirm: &mut dyn Confirm,
    ) -> Outcome {
        if !confirm.confirm(&format!("Disable {kind}?")) {
            return Outcome::Cancelled;
        }
        match self.client.disable_integration(kind).await {
            Ok(reply) => {
                succeed(rec, reply, format!("{kind} disabled"));
                self.load_integrations(rec).await;
                Outcome::Done
            }
            Err(e) => fail(rec, &format!("Disabling {kind}"), e),
        }
    }

    // ── Imports ─────────────────────────────────────────────────────────

    pub async fn import_file(
        &self,
        rec: &mut Reconciler,
        kind: ImportKind,
        path: &Path,
    ) -> Outcome {
        if let Err(msg) = validate_upload(path) {
            return reject(rec, msg);
        }
        rec.append_log(LogEntry::now(
            LogLevel::Info,
            format!("Importing {} from {}...", kind, path.display()),
        ));
        match self.client.import_file(kind, path).await {
            Ok(summary) => {
                let message = import_report(kind, &summary);
                rec.append_log(LogEntry::now(LogLevel::Success, message.clone()));
                rec.notify(NoticeKind::Success, message);
                Outcome::Done
            }
            Err(e) => fail(rec, &format!("Importing {kind}"), e),
        }
    }

    // ── Voice ───────────────────────────────────────────────────────────

    /// Act on a transcript. Input without the activation word, or matching
    /// no intent, is logged at debug level and ignored.
    pub async fn process_voice_command(&self, rec: &mut Reconciler, text: &str) -> Outcome {
        if !self.intents.is_addressed(text) {
            rec.append_log(LogEntry::now(
                LogLevel::Debug,
                format!("Voice input not addressed to the bot: {text}"),
            ));
            return Outcome::Ignored;
        }
        let Some(intent) = self.intents.parse(text) else {
            rec.append_log(LogEntry::now(
                LogLevel::Debug,
                format!("Unrecognised voice command: {text}"),
            ));
            return Outcome::Ignored;
        };
        rec.notify(NoticeKind::Info, format!("Voice command: {text}"));

        match intent {
            VoiceIntent::ReadLastMessages => {
                let chat = rec.state().chat.entries();
                let line = if chat.is_empty() {
                    "No messages yet".to_string()
                } else {
                    chat.tail(READ_BACK_COUNT)
                        .map(|e| format!("{} says {}", e.username, e.text))
                        .collect::<Vec<_>>()
                        .join(". ")
                };
                rec.schedule(Effect::Speak(line));
                Outcome::Done
            }
            VoiceIntent::AnnounceViewerCount => {
                let total = rec.state().stats.total_users;
                rec.schedule(Effect::Speak(format!("{total} viewers")));
                Outcome::Done
            }
            VoiceIntent::SendThankYou => {
                let channel = rec.selected_channel().unwrap_or_default().to_string();
                self.send_chat_message(rec, &channel, &self.settings.thank_you_message)
                    .await
            }
            VoiceIntent::ClearChatView => {
                rec.clear_chat();
                Outcome::Done
            }
            VoiceIntent::SendMessage(message) => {
                let channel = rec.selected_channel().unwrap_or_default().to_string();
                self.send_chat_message(rec, &channel, &message).await
            }
        }
    }
}

fn reject(rec: &mut Reconciler, message: impl Into<String>) -> Outcome {
    rec.notify(NoticeKind::Warning, message);
    Outcome::Rejected
}

fn succeed(rec: &mut Reconciler, reply: Reply, fallback: String) {
    let message = reply.message.unwrap_or(fallback);
    rec.append_log(LogEntry::now(LogLevel::Success, message.clone()));
    rec.notify(NoticeKind::Success, message);
}

/// Backend messages are shown verbatim; transport trouble as a generic
/// connection error with the detail kept in the log.
fn fail(rec: &mut Reconciler, action: &str, err: ApiError) -> Outcome {
    rec.append_log(LogEntry::now(LogLevel::Error, format!("{action} failed: {err}")));
    rec.notify(NoticeKind::Error, err.user_message());
    Outcome::Failed
}

fn import_report(kind: ImportKind, summary: &ImportSummary) -> String {
    let mut report = format!("{} items imported from {}", summary.imported, kind);
    let rows: Vec<String> = summary
        .users
        .iter()
        .map(|u| format!("{} ({} pts)", u.username, u.points))
        .chain(
            summary
                .commands
                .iter()
                .map(|c| format!("{} → {}", c.trigger, c.response)),
        )
        .take(IMPORT_PREVIEW_ROWS)
        .collect();
    if !rows.is_empty() {
        report.push_str(": ");
        report.push_str(&rows.join(", "));
    }
    report
}
