//! Colored terminal rendering of the dashboard state.
//!
//! `Console` remembers what it has already printed, so each `render` call
//! only prints new chat lines, log lines and notices, plus a status line
//! when the link, the channel set or the selection changed.

use colored::*;

use crate::integrations::IntegrationKind;
use crate::model::{ChatEntry, ChatOrigin, LogEntry, LogLevel};
use crate::reconciler::{DashboardState, LinkStatus, Notice, NoticeKind};

#[derive(Debug, Default)]
pub struct Console {
    chat_mark: u64,
    log_mark: u64,
    notice_mark: u64,
    last_status: Option<String>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print everything that changed since the previous call.
    pub fn render(&mut self, state: &DashboardState) {
        for entry in state.chat.entries().since(self.chat_mark) {
            println!("{}", format_chat(entry));
        }
        self.chat_mark = state.chat.entries().pushed();

        for entry in state.logs.since(self.log_mark) {
            println!("{}", format_log(entry));
        }
        self.log_mark = state.logs.pushed();

        for notice in state.notices.iter().filter(|n| n.id > self.notice_mark) {
            println!("{}", format_notice(notice));
        }
        if let Some(last) = state.notices.iter().map(|n| n.id).max() {
            self.notice_mark = self.notice_mark.max(last);
        }

        let status = status_line(state);
        if self.last_status.as_deref() != Some(status.as_str()) {
            println!("{}", status);
            self.last_status = Some(status);
        }
    }

    pub fn show_status(&self, state: &DashboardState) {
        println!("\n{}", "━━━━━━━━━━━━ Dashboard ━━━━━━━━━━━━".bright_cyan().bold());
        println!("{}", status_line(state));
        let s = &state.stats;
        println!("  {} {}", "Users:".dimmed(), s.total_users.to_string().bright_white());
        println!("  {} {}", "Messages:".dimmed(), s.total_messages.to_string().bright_white());
        println!("  {} {}", "Points:".dimmed(), s.total_points.to_string().bright_white());
        if !state.channel_status.is_empty() {
            println!("  {}", "Channels:".dimmed());
            for (channel, online) in &state.channel_status {
                let dot = if *online { "●".green() } else { "●".red() };
                println!("    {} {}", dot, channel);
            }
        }
        println!("{}\n", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_cyan());
    }

    pub fn show_chat(&self, state: &DashboardState, count: usize) {
        if state.chat.shows_placeholder() {
            println!("{}", "No messages yet.".dimmed());
            return;
        }
        for entry in state.chat.entries().tail(count) {
            println!("{}", format_chat(entry));
        }
    }

    pub fn show_logs(&self, state: &DashboardState, count: usize) {
        if state.logs.is_empty() {
            println!("{}", "Log is empty.".dimmed());
            return;
        }
        for entry in state.logs.tail(count) {
            println!("{}", format_log(entry));
        }
    }

    pub fn show_raids(&self, state: &DashboardState) {
        if state.raids.is_empty() {
            println!("{}", "No raids yet.".dimmed());
            return;
        }
        println!("\n{}", "Recent raids:".bright_magenta().bold());
        for raid in state.raids.iter() {
            println!(
                "  {} {} → {} ({} viewers)",
                raid.timestamp.dimmed(),
                raid.raider.bright_magenta(),
                raid.channel,
                raid.viewer_count
            );
        }
        println!();
    }

    pub fn show_auto_responses(&self, state: &DashboardState) {
        if state.auto_responses.is_empty() {
            println!("{}", "No auto-responses configured.".dimmed());
            return;
        }
        println!("\n{}", "Auto-responses:".bright_cyan().bold());
        for (trigger, response) in &state.auto_responses {
            println!("  {} → {}", trigger.green(), response);
        }
        println!();
    }

    pub fn show_integrations(&self, state: &DashboardState) {
        if state.integrations.is_empty() {
            println!("{}", "No integration status loaded.".dimmed());
            return;
        }
        println!("\n{}", "Integrations:".bright_cyan().bold());
        for (name, status) in &state.integrations {
            let label = if !status.available {
                "library missing".yellow()
            } else if status.enabled {
                "enabled".green()
            } else if status.configured {
                "configured".cyan()
            } else {
                "off".dimmed()
            };
            println!("  {:<12} {}", integration_name(name), label);
        }
        println!();
    }
}

fn status_line(state: &DashboardState) -> String {
    let link = match state.link {
        LinkStatus::Online => "● Online".green().bold(),
        LinkStatus::Offline => "● Offline".red().bold(),
    };
    let options = state.selector.options();
    let channels = if options.is_empty() {
        "none".dimmed().to_string()
    } else {
        options.join(", ")
    };
    let selected = state.selector.selected().unwrap_or("-");
    format!(
        "{} {} {} {} {}",
        link,
        "| channels:".dimmed(),
        channels,
        "| selected:".dimmed(),
        selected.bright_white()
    )
}

/// Display name for a status key, or the key itself when it is unknown.
fn integration_name(key: &str) -> &str {
    IntegrationKind::from_status_key(key).map_or(key, |kind| kind.display_name())
}

fn format_chat(entry: &ChatEntry) -> String {
    let head = format!("[{}] #{}", entry.timestamp, entry.channel).dimmed();
    match entry.origin {
        ChatOrigin::Own => format!(
            "{} {}: {}",
            head,
            entry.username.green().bold(),
            entry.text.green()
        ),
        ChatOrigin::Raid => format!(
            "{} {} {}",
            head,
            "🎉 RAID".bright_magenta().bold(),
            entry.text.bright_magenta()
        ),
        ChatOrigin::Normal => format!("{} {}: {}", head, entry.username.cyan(), entry.text),
    }
}

fn format_log(entry: &LogEntry) -> String {
    let stamp = format!("[{}]", entry.timestamp).dimmed();
    let message = match entry.level {
        LogLevel::Success => entry.message.green(),
        LogLevel::Error => entry.message.red(),
        LogLevel::Warning => entry.message.yellow(),
        LogLevel::Info => entry.message.normal(),
        LogLevel::Bot => entry.message.bright_blue(),
        LogLevel::Event => entry.message.bright_magenta().bold(),
        LogLevel::Debug => entry.message.bright_black(),
    };
    format!("{} {}", stamp, message)
}

fn format_notice(notice: &Notice) -> String {
    match notice.kind {
        NoticeKind::Success => format!("✓ {}", notice.message).green().to_string(),
        NoticeKind::Error => format!("✗ {}", notice.message).red().bold().to_string(),
        NoticeKind::Warning => format!("⚠️  {}", notice.message).yellow().to_string(),
        NoticeKind::Info => format!("ℹ {}", notice.message).blue().to_string(),
        NoticeKind::Raid => format!("🎉 {}", notice.message)
            .bright_magenta()
            .bold()
            .to_string(),
    }
}
