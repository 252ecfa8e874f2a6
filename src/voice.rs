//! Voice control: a rule-based intent matcher plus an optional speech
//! capability.
//!
//! Speech capture and synthesis are external programs configured by the
//! operator (`voice_command` prints one transcript per line, `speak_command`
//! reads the text to say on stdin). Without them the session runs text-only
//! and transcripts can still be injected from the REPL.

use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceIntent {
    /// Speak the last few chat messages.
    ReadLastMessages,
    AnnounceViewerCount,
    SendThankYou,
    ClearChatView,
    SendMessage(String),
}

const SEND_PHRASES: &[&str] = &["enviar mensagem", "send message"];
const READ_PHRASES: &[&str] = &["ler chat", "read chat"];
const VIEWER_PHRASES: &[&str] = &["quantos viewers", "how many viewers"];
const THANKS_PHRASES: &[&str] = &["obrigado", "thank you"];
const CLEAR_PHRASES: &[&str] = &["limpar chat", "clear chat"];

/// Matches transcripts against the known phrases (Portuguese and English).
#[derive(Debug, Clone)]
pub struct IntentMatcher {
    activation_word: String,
}

impl IntentMatcher {
    pub fn new(activation_word: &str) -> Self {
        Self {
            activation_word: activation_word.trim().to_lowercase(),
        }
    }

    /// Whether the transcript contains the activation word as a whole word.
    pub fn is_addressed(&self, text: &str) -> bool {
        if self.activation_word.is_empty() {
            return true;
        }
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == self.activation_word)
    }

    /// Match an intent. `send message <text>` is checked first so a dictated
    /// message that happens to contain another phrase is still sent.
    pub fn parse(&self, text: &str) -> Option<VoiceIntent> {
        let lower = text.to_lowercase();

        for phrase in SEND_PHRASES {
            if let Some(end) = phrase_end(text, phrase) {
                let message = text[end..].trim_start_matches([':', ',']).trim();
                if !message.is_empty() {
                    return Some(VoiceIntent::SendMessage(message.to_string()));
                }
            }
        }

        let has = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));
        if has(READ_PHRASES) {
            Some(VoiceIntent::ReadLastMessages)
        } else if has(VIEWER_PHRASES) {
            Some(VoiceIntent::AnnounceViewerCount)
        } else if has(THANKS_PHRASES) {
            Some(VoiceIntent::SendThankYou)
        } else if has(CLEAR_PHRASES) {
            Some(VoiceIntent::ClearChatView)
        } else {
            None
        }
    }
}

/// Byte offset in `text` just past the first case-insensitive occurrence of
/// the lower-case `phrase`. Offsets always fall on char boundaries of `text`.
fn phrase_end(text: &str, phrase: &str) -> Option<usize> {
    text.char_indices().find_map(|(start, _)| {
        let mut chars = text[start..].char_indices();
        let mut end = start;
        for wanted in phrase.chars() {
            let (offset, c) = chars.next()?;
            if !c.to_lowercase().eq(std::iter::once(wanted)) {
                return None;
            }
            end = start + offset + c.len_utf8();
        }
        Some(end)
    })
}

// ── Capability ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("speech recognition is not available")]
    Unsupported,

    #[error("failed to start speech recognition: {0}")]
    Spawn(#[from] std::io::Error),
}

/// What a running recogniser reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceResult {
    Transcript(String),
    Error(String),
}

/// A speech backend. Implementations must tolerate `stop` without `start`.
pub trait VoiceCapability: Send {
    fn start(&mut self, results: mpsc::UnboundedSender<VoiceResult>) -> Result<(), VoiceError>;
    fn stop(&mut self);
    fn speak(&mut self, text: &str) -> Result<(), VoiceError>;
}

/// Used when no speech programs are configured.
#[derive(Debug, Default)]
pub struct Unsupported;

impl VoiceCapability for Unsupported {
    fn start(&mut self, _results: mpsc::UnboundedSender<VoiceResult>) -> Result<(), VoiceError> {
        Err(VoiceError::Unsupported)
    }

    fn stop(&mut self) {}

    fn speak(&mut self, _text: &str) -> Result<(), VoiceError> {
        Err(VoiceError::Unsupported)
    }
}

/// Drives external programs through `sh -c`.
#[derive(Debug, Default)]
pub struct CommandVoice {
    listen_command: Option<String>,
    speak_command: Option<String>,
    listener: Option<JoinHandle<()>>,
}

impl CommandVoice {
    pub fn new(listen_command: Option<String>, speak_command: Option<String>) -> Self {
        Self {
            listen_command: listen_command.filter(|c| !c.trim().is_empty()),
            speak_command: speak_command.filter(|c| !c.trim().is_empty()),
            listener: None,
        }
    }
}

impl VoiceCapability for CommandVoice {
    fn start(&mut self, results: mpsc::UnboundedSender<VoiceResult>) -> Result<(), VoiceError> {
        let command = self.listen_command.clone().ok_or(VoiceError::Unsupported)?;
        self.stop();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("recogniser stdout not captured"))?;

        self.listener = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if results.send(VoiceResult::Transcript(line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = results.send(VoiceResult::Error(e.to_string()));
                        break;
                    }
                }
            }
            match child.wait().await {
                Ok(status) if !status.success() => {
                    let message = format!("recogniser exited with {status}");
                    let _ = results.send(VoiceResult::Error(message));
                }
                Err(e) => {
                    let _ = results.send(VoiceResult::Error(e.to_string()));
                }
                Ok(_) => {}
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        // Aborting drops the child, and kill_on_drop takes it down.
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }

    fn speak(&mut self, text: &str) -> Result<(), VoiceError> {
        let command = self.speak_command.as_deref().ok_or(VoiceError::Unsupported)?;
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let text = text.to_string();
        tokio::spawn(async move {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(text.as_bytes()).await;
            }
            let _ = child.wait().await;
        });
        Ok(())
    }
}

impl Drop for CommandVoice {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Session ─────────────────────────────────────────────────────────────

/// Owns the capability and its result channel. Dropping the session stops
/// any running recogniser.
pub struct VoiceSession {
    capability: Box<dyn VoiceCapability>,
    sender: mpsc::UnboundedSender<VoiceResult>,
    results: mpsc::UnboundedReceiver<VoiceResult>,
    listening: bool,
}

impl VoiceSession {
    pub fn new(capability: Box<dyn VoiceCapability>) -> Self {
        let (sender, results) = mpsc::unbounded_channel();
        Self {
            capability,
            sender,
            results,
            listening: false,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn start(&mut self) -> Result<(), VoiceError> {
        if self.listening {
            return Ok(());
        }
        self.capability.start(self.sender.clone())?;
        self.listening = true;
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.listening {
            self.capability.stop();
            self.listening = false;
        }
    }

    pub fn speak(&mut self, text: &str) -> Result<(), VoiceError> {
        self.capability.speak(text)
    }

    /// Next recogniser result. Pends forever while not listening.
    pub async fn next_result(&mut self) -> Option<VoiceResult> {
        if !self.listening {
            return std::future::pending().await;
        }
        self.results.recv().await
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_activation_word_is_whole_word() {
        let m = IntentMatcher::new("bot");
        assert!(m.is_addressed("Bot, ler chat"));
        assert!(m.is_addressed("ok bot quantos viewers"));
        assert!(!m.is_addressed("the robot says hi"));
        assert!(IntentMatcher::new("").is_addressed("anything"));
    }

    #[test]
    fn test_intents_both_languages() {
        let m = IntentMatcher::new("bot");
        assert_eq!(m.parse("bot ler chat"), Some(VoiceIntent::ReadLastMessages));
        assert_eq!(m.parse("bot read chat please"), Some(VoiceIntent::ReadLastMessages));
        assert_eq!(m.parse("bot quantos viewers"), Some(VoiceIntent::AnnounceViewerCount));
        assert_eq!(m.parse("bot how many viewers"), Some(VoiceIntent::AnnounceViewerCount));
        assert_eq!(m.parse("obrigado bot"), Some(VoiceIntent::SendThankYou));
        assert_eq!(m.parse("bot limpar chat"), Some(VoiceIntent::ClearChatView));
        assert_eq!(m.parse("bot dance"), None);
    }

    #[test]
    fn test_send_message_wins_and_keeps_case() {
        let m = IntentMatcher::new("bot");
        assert_eq!(
            m.parse("bot send message: Thank you ALL for coming"),
            Some(VoiceIntent::SendMessage("Thank you ALL for coming".into()))
        );
        assert_eq!(
            m.parse("bot enviar mensagem olá pessoal"),
            Some(VoiceIntent::SendMessage("olá pessoal".into()))
        );
        // Nothing to send falls through to the other intents.
        assert_eq!(m.parse("bot send message"), None);
    }

    #[test]
    fn test_send_message_with_case_changing_characters() {
        let m = IntentMatcher::new("bot");
        assert_eq!(
            m.parse("İİ bot send message hello world \u{212A}"),
            Some(VoiceIntent::SendMessage("hello world \u{212A}".into()))
        );
        assert_eq!(
            m.parse("İİ bot send message éa \u{212A}"),
            Some(VoiceIntent::SendMessage("éa \u{212A}".into()))
        );
        assert_eq!(
            m.parse("BOT SEND MESSAGE Çà va"),
            Some(VoiceIntent::SendMessage("Çà va".into()))
        );
    }

    struct Recording {
        stops: Arc<AtomicUsize>,
    }

    impl VoiceCapability for Recording {
        fn start(&mut self, results: mpsc::UnboundedSender<VoiceResult>) -> Result<(), VoiceError> {
            results
                .send(VoiceResult::Transcript("bot ler chat".into()))
                .unwrap();
            Ok(())
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn speak(&mut self, _text: &str) -> Result<(), VoiceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_session_delivers_results_and_stops_on_drop() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut session = VoiceSession::new(Box::new(Recording {
            stops: stops.clone(),
        }));
        session.start().unwrap();
        assert_eq!(
            session.next_result().await,
            Some(VoiceResult::Transcript("bot ler chat".into()))
        );
        drop(session);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsupported_degrades() {
        let mut session = VoiceSession::new(Box::new(Unsupported));
        assert!(matches!(session.start(), Err(VoiceError::Unsupported)));
        assert!(!session.is_listening());
        session.stop();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_voice_reads_transcripts() {
        let mut session = VoiceSession::new(Box::new(CommandVoice::new(
            Some("printf 'bot ler chat\\n\\nbot obrigado\\n'".into()),
            None,
        )));
        session.start().unwrap();
        assert_eq!(
            session.next_result().await,
            Some(VoiceResult::Transcript("bot ler chat".into()))
        );
        assert_eq!(
            session.next_result().await,
            Some(VoiceResult::Transcript("bot obrigado".into()))
        );
        assert!(session.speak("hello").is_err());
    }
}
