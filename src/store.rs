use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::ensure_dir;

/// Values that survive a restart: the last channel the operator picked and
/// whether debug logging is on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub selected_channel: Option<String>,
    pub debug_mode: bool,
}

/// Small key-value file scoped to the user profile.
///
/// Writes go straight to disk on every change. A store without a path keeps
/// everything in memory.
#[derive(Debug, Clone, Default)]
pub struct ClientStore {
    path: Option<PathBuf>,
    state: PersistedState,
}

impl ClientStore {
    /// Open the store at `path`, starting from defaults when the file is
    /// missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: ignoring corrupt state file {}: {}", path.display(), e);
                PersistedState::default()
            }),
            Err(_) => PersistedState::default(),
        };
        Self {
            path: Some(path),
            state,
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    /// `<data dir>/botpanel/state.json`, or `state.json` in the working
    /// directory when the platform has no data dir.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("botpanel"))
            .unwrap_or_default()
            .join("state.json")
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn selected_channel(&self) -> Option<&str> {
        self.state.selected_channel.as_deref()
    }

    pub fn debug_mode(&self) -> bool {
        self.state.debug_mode
    }

    pub fn set_selected_channel(&mut self, channel: &str) -> Result<()> {
        if self.state.selected_channel.as_deref() == Some(channel) {
            return Ok(());
        }
        self.state.selected_channel = Some(channel.to_string());
        self.save()
    }

    pub fn set_debug_mode(&mut self, enabled: bool) -> Result<()> {
        if self.state.debug_mode == enabled {
            return Ok(());
        }
        self.state.debug_mode = enabled;
        self.save()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write state file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut store = ClientStore::open(&path);
        assert_eq!(store.selected_channel(), None);
        assert!(!store.debug_mode());

        store.set_selected_channel("alpha").unwrap();
        store.set_debug_mode(true).unwrap();

        let reopened = ClientStore::open(&path);
        assert_eq!(reopened.selected_channel(), Some("alpha"));
        assert!(reopened.debug_mode());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let store = ClientStore::open(&path);
        assert_eq!(store.state, PersistedState::default());
    }

    #[test]
    fn test_in_memory_never_touches_disk() {
        let mut store = ClientStore::in_memory();
        store.set_selected_channel("beta").unwrap();
        assert_eq!(store.selected_channel(), Some("beta"));
        assert!(store.path().is_none());
    }
}
