use std::io::{self, Write};
use std::path::PathBuf;
use std::thread::JoinHandle;

use crate::app::{Submitted, UserCommand};
use crate::imports::ImportKind;
use crate::integrations::{IntegrationKind, IntegrationSetup};
use crate::utils::parse_key_values;
use colored::*;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::hint::Hinter;
use rustyline::{CompletionType, Config, Context, Editor, Helper, Highlighter, Validator};
use tokio::sync::mpsc::UnboundedSender;

/// Available slash commands for tab-completion.
const COMMANDS: &[&str] = &[
    "/help", "/quit", "/exit", "/status", "/select", "/send", "/toggle",
    "/streamer-add", "/streamer-remove", "/respond", "/unrespond", "/responses",
    "/integrations", "/setup", "/test", "/disable", "/import", "/voice",
    "/debug", "/chat", "/logs", "/raids", "/clear-chat", "/clear-logs",
    "/refresh", "/metrics",
];

/// Lines shown by `/chat` and `/logs` without an explicit count.
const DEFAULT_TAIL: usize = 20;

/// Rustyline helper providing slash-command tab-completion and inline hints.
#[derive(Helper, Validator, Highlighter)]
struct CommandCompleter;

impl Hinter for CommandCompleter {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        // Only hint when cursor is at end and line starts with '/'
        if pos != line.len() || !line.starts_with('/') || line.contains(' ') {
            return None;
        }

        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Only complete when the cursor is at the first word and it starts with '/'
        let prefix = &line[..pos];
        if !prefix.starts_with('/') || prefix.contains(' ') {
            return Ok((0, vec![]));
        }

        let matches: Vec<Pair> = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

pub fn print_banner() {
    println!("{}", "====================================".bright_cyan());
    println!("{}", "         BOT PANEL v0.3.0           ".bright_cyan().bold());
    println!("{}", "====================================".bright_cyan());
    println!("{}", " Live control panel for your chat bot".bright_white());
    println!("{}\n", " Type /help for commands or /quit to exit".dimmed());
}

/// Ask the user a question and return their trimmed answer.
pub fn ask_user(question: &str) -> String {
    print!("{question}");
    let _ = io::stdout().flush();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return String::new();
    }
    input.trim().to_string()
}

/// Yes/no question using `ask_user`.
pub fn confirm(question: &str) -> bool {
    let ans = ask_user(&format!("{question} (y/n) : "));
    ans.to_lowercase().starts_with('y')
}

pub fn print_help() {
    println!("\n{}", "Available Commands:".bright_cyan().bold());
    println!("  {}                 - Send text to the selected channel", "<text>".green());
    println!("  {} <channel>        - Select the active channel", "/select".green());
    println!("  {} <channel> <text>   - Send to a specific channel", "/send".green());
    println!("  {} [channel]        - Start/stop the bot on a channel", "/toggle".green());
    println!("  {} <name>     - Add a streamer", "/streamer-add".green());
    println!("  {} <name>  - Remove a streamer", "/streamer-remove".green());
    println!("  {} <trigger> <text> - Add an auto-response", "/respond".green());
    println!("  {} <trigger>     - Remove an auto-response", "/unrespond".green());
    println!("  {}            - List auto-responses", "/responses".green());
    println!("  {}         - Show integration status", "/integrations".green());
    println!("  {} <kind> key=value... - Configure an integration", "/setup".green());
    println!("  {} <kind> key=value...  - Test an integration", "/test".green());
    println!("  {} <kind>          - Disable an integration", "/disable".green());
    println!("  {} <source> <file>  - Import StreamElements/Nightbot data", "/import".green());
    println!("  {} on|off|say <text> - Voice control", "/voice".green());
    println!("  {} on|off            - Show debug log entries", "/debug".green());
    println!(
        "  {} [n] / {} [n]   - Show recent chat / log lines",
        "/chat".green(),
        "/logs".green()
    );
    println!("  {}                - Show raid history", "/raids".green());
    println!("  {} / {} - Clear the chat / log view", "/clear-chat".green(), "/clear-logs".green());
    println!(
        "  {} / {}   - Dashboard status / session statistics",
        "/status".green(),
        "/metrics".green()
    );
    println!("  {}              - Reload everything from the backend", "/refresh".green());
    println!("  {}          - Exit the program", "/quit, /exit".green());
    println!();
}

/// Parse one REPL line. `Ok(None)` means there is nothing to do.
pub fn parse_command(line: &str) -> Result<Option<UserCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(UserCommand::Send {
            channel: None,
            text: line.to_string(),
        }));
    }

    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };
    let (first, tail) = match rest.split_once(char::is_whitespace) {
        Some((first, tail)) => (first, tail.trim()),
        None => (rest, ""),
    };
    let need = |what: &str| -> Result<String, String> {
        if first.is_empty() {
            Err(format!("Usage: {cmd} {what}"))
        } else {
            Ok(first.to_string())
        }
    };

    let command = match cmd {
        "/quit" | "/exit" => UserCommand::Quit,
        "/help" => UserCommand::Help,
        "/status" => UserCommand::Status,
        "/metrics" => UserCommand::Metrics,
        "/refresh" => UserCommand::Refresh,
        "/responses" => UserCommand::ListResponses,
        "/integrations" => UserCommand::ListIntegrations,
        "/raids" => UserCommand::Raids,
        "/clear-chat" => UserCommand::ClearChat,
        "/clear-logs" => UserCommand::ClearLogs,
        "/chat" => UserCommand::Chat(parse_count(first)?),
        "/logs" => UserCommand::Logs(parse_count(first)?),
        "/select" => UserCommand::Select(need("<channel>")?),
        "/send" => {
            let channel = need("<channel> <text>")?;
            if tail.is_empty() {
                return Err(format!("Usage: {cmd} <channel> <text>"));
            }
            UserCommand::Send {
                channel: Some(channel),
                text: tail.to_string(),
            }
        }
        "/toggle" => UserCommand::Toggle((!first.is_empty()).then(|| first.to_string())),
        "/streamer-add" => UserCommand::AddStreamer(need("<name>")?),
        "/streamer-remove" => UserCommand::RemoveStreamer(need("<name>")?),
        "/respond" => {
            let trigger = need("<trigger> <response>")?;
            UserCommand::AddResponse {
                trigger,
                response: tail.to_string(),
            }
        }
        "/unrespond" => UserCommand::RemoveResponse(need("<trigger>")?),
        "/setup" => {
            let kind: IntegrationKind = need("<kind> key=value...")?.parse()?;
            let pairs = parse_key_values(tail);
            UserCommand::Setup(IntegrationSetup::from_pairs(kind, &pairs)?)
        }
        "/test" => {
            let kind: IntegrationKind = need("<kind> key=value...")?.parse()?;
            UserCommand::Test {
                kind,
                fields: parse_key_values(tail),
            }
        }
        "/disable" => UserCommand::Disable(need("<kind>")?.parse()?),
        "/import" => {
            let kind: ImportKind = need("<streamelements|nightbot> <file>")?.parse()?;
            if tail.is_empty() {
                return Err(format!("Usage: {cmd} <streamelements|nightbot> <file>"));
            }
            UserCommand::Import {
                kind,
                path: PathBuf::from(tail.trim_matches('"')),
            }
        }
        "/voice" => match first {
            "on" => UserCommand::Voice(true),
            "off" => UserCommand::Voice(false),
            "say" if !tail.is_empty() => UserCommand::VoiceSay(tail.to_string()),
            _ => return Err(format!("Usage: {cmd} on|off|say <text>")),
        },
        "/debug" => match first {
            "on" => UserCommand::Debug(true),
            "off" => UserCommand::Debug(false),
            _ => return Err(format!("Usage: {cmd} on|off")),
        },
        other => return Err(format!("Unknown command: {other}. Type /help")),
    };
    Ok(Some(command))
}

fn parse_count(arg: &str) -> Result<usize, String> {
    if arg.is_empty() {
        return Ok(DEFAULT_TAIL);
    }
    arg.parse()
        .map_err(|_| format!("Expected a number, got '{arg}'"))
}

/// Run the line editor on its own thread, forwarding parsed commands to the
/// driver. Confirmations are asked here, before the command is sent.
pub fn spawn_repl(commands: UnboundedSender<Submitted>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let rl_config = Config::builder()
            .auto_add_history(true)
            .completion_type(CompletionType::List)
            .completion_prompt_limit(100)
            .build();
        let mut rl = match Editor::with_config(rl_config) {
            Ok(rl) => rl,
            Err(e) => {
                println!("{} {}", "✗ Failed to create line editor:".red(), e);
                let _ = commands.send(Submitted::new(UserCommand::Quit));
                return;
            }
        };
        rl.set_helper(Some(CommandCompleter));

        loop {
            let readline = rl.readline(&"> ".bright_cyan().bold().to_string());
            let line = match readline {
                Ok(line) => line,
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                    let _ = commands.send(Submitted::new(UserCommand::Quit));
                    break;
                }
                Err(e) => {
                    println!("{} {}", "✗ Input error:".red(), e);
                    continue;
                }
            };

            let command = match parse_command(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    println!("{}", e.yellow());
                    continue;
                }
            };

            if command == UserCommand::Help {
                print_help();
                continue;
            }
            let quit = command == UserCommand::Quit;

            let confirmed = match command.confirmation_prompt() {
                Some(question) => {
                    let ok = confirm(&question);
                    if !ok {
                        println!("{}", "Cancelled.".dimmed());
                        continue;
                    }
                    ok
                }
                None => false,
            };

            if commands.send(Submitted { command, confirmed }).is_err() || quit {
                println!("Goodbye!");
                break;
            }
        }
    })
}
