use anyhow::Result;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::dispatcher::Outcome;
use crate::model::{LogEntry, LogLevel};

/// Mirrors the dashboard log into `logs/session_<timestamp>.log`.
pub struct Logger {
    log_file: PathBuf,
}

#[derive(Debug, Default)]
pub struct SessionMetrics {
    pub events_received: usize,
    pub commands_sent: usize,
    pub commands_failed: usize,
    pub reconnects: usize,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a finished command. Rejected and cancelled commands never
    /// reached the backend and are not counted.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Done => self.commands_sent += 1,
            Outcome::Failed => {
                self.commands_sent += 1;
                self.commands_failed += 1;
            }
            Outcome::Rejected | Outcome::Cancelled | Outcome::Ignored => {}
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.commands_sent == 0 {
            return 0.0;
        }
        let ok = self.commands_sent - self.commands_failed;
        (ok as f64 / self.commands_sent as f64) * 100.0
    }

    pub fn display(&self) {
        use colored::Colorize;
        println!("\n{}", "━━━━━━━━━ Session Statistics ━━━━━━━━━".bright_cyan().bold());
        println!("Events received: {}", self.events_received);
        println!("Commands sent: {}", self.commands_sent.to_string().green());
        println!("Commands failed: {}", self.commands_failed.to_string().red());
        println!("Reconnects: {}", self.reconnects.to_string().yellow());
        println!("Success rate: {:.1}%", self.success_rate());
        println!("{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_cyan());
    }
}

impl Logger {
    pub fn new(log_dir: &str) -> Result<Self> {
        let dir = PathBuf::from(log_dir);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_file = dir.join(format!("session_{}.log", timestamp));

        Ok(Self { log_file })
    }

    pub fn path(&self) -> &Path {
        &self.log_file
    }

    pub fn log(&self, message: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{}] {}", timestamp, message)?;
        Ok(())
    }

    /// One dashboard log entry, tagged with its level.
    pub fn log_entry(&self, entry: &LogEntry) -> Result<()> {
        self.log(&format!("{}: {}", level_tag(entry.level), entry.message))
    }

    pub fn log_command(&self, command: &str, outcome: Outcome) -> Result<()> {
        self.log(&format!("COMMAND {:?}: {}", outcome, command))
    }
}

fn level_tag(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Success => "SUCCESS",
        LogLevel::Error => "ERROR",
        LogLevel::Warning => "WARNING",
        LogLevel::Info => "INFO",
        LogLevel::Bot => "BOT",
        LogLevel::Event => "EVENT",
        LogLevel::Debug => "DEBUG",
    }
}
