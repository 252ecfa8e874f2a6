use std::collections::HashSet;

/// Result of reconciling the selector against a fresh channel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionChange {
    /// Same channel set as before; options and selection left untouched.
    Unchanged,
    /// Options were rebuilt. `persist` is set when the resolved selection
    /// should be remembered across sessions.
    Rebuilt {
        selected: Option<String>,
        persist: bool,
    },
}

/// The channel-picker control and its stable-selection algorithm.
///
/// Options are only rebuilt when the set of connected channels actually
/// changes, so periodic stats polls never disturb what the operator picked.
#[derive(Debug, Clone, Default)]
pub struct ChannelSelector {
    options: Vec<String>,
    selected: Option<String>,
    rebuilds: usize,
}

impl ChannelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// How many times the option list has been rebuilt.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Reconcile against the server's channel list.
    ///
    /// Selection priority after a rebuild: the current selection if still
    /// connected, then `remembered` if connected, then the only channel when
    /// exactly one is connected, else nothing.
    pub fn reconcile(&mut self, channels: &[String], remembered: Option<&str>) -> SelectionChange {
        if same_members(&self.options, channels) {
            return SelectionChange::Unchanged;
        }

        self.options = dedup_in_order(channels);
        self.rebuilds += 1;

        let contains = |name: &str| self.options.iter().any(|c| c == name);
        let current = self.selected.take();

        let resolved = match current {
            Some(ch) if contains(&ch) => Some(ch),
            _ => match remembered {
                Some(saved) if contains(saved) => Some(saved.to_string()),
                _ if self.options.len() == 1 => Some(self.options[0].clone()),
                _ => None,
            },
        };

        let persist = match (&resolved, remembered) {
            (Some(sel), Some(saved)) => sel != saved,
            (Some(_), None) => true,
            (None, _) => false,
        };

        self.selected = resolved.clone();
        SelectionChange::Rebuilt {
            selected: resolved,
            persist,
        }
    }

    /// Explicit operator choice. Only connected channels can be selected.
    pub fn select(&mut self, channel: &str) -> bool {
        if self.options.iter().any(|c| c == channel) {
            self.selected = Some(channel.to_string());
            true
        } else {
            false
        }
    }
}

fn same_members(current: &[String], incoming: &[String]) -> bool {
    let a: HashSet<&str> = current.iter().map(String::as_str).collect();
    let b: HashSet<&str> = incoming.iter().map(String::as_str).collect();
    a == b
}

fn dedup_in_order(channels: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    channels
        .iter()
        .filter(|c| seen.insert(c.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chans(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_channel_auto_selected_and_persisted() {
        let mut sel = ChannelSelector::new();
        let change = sel.reconcile(&chans(&["alpha"]), None);
        assert_eq!(
            change,
            SelectionChange::Rebuilt {
                selected: Some("alpha".into()),
                persist: true
            }
        );
        assert_eq!(sel.selected(), Some("alpha"));
    }

    #[test]
    fn test_same_set_any_order_is_not_rebuilt() {
        let mut sel = ChannelSelector::new();
        sel.reconcile(&chans(&["alpha", "beta"]), None);
        assert!(sel.select("beta"));
        let rebuilds = sel.rebuilds();

        for _ in 0..3 {
            assert_eq!(
                sel.reconcile(&chans(&["beta", "alpha"]), Some("alpha")),
                SelectionChange::Unchanged
            );
        }
        assert_eq!(sel.rebuilds(), rebuilds);
        assert_eq!(sel.selected(), Some("beta"));
        assert_eq!(sel.options(), &chans(&["alpha", "beta"])[..]);
    }

    #[test]
    fn test_current_selection_survives_rebuild() {
        let mut sel = ChannelSelector::new();
        sel.reconcile(&chans(&["alpha", "beta"]), None);
        sel.select("beta");
        let change = sel.reconcile(&chans(&["alpha", "beta", "gamma"]), Some("beta"));
        assert_eq!(
            change,
            SelectionChange::Rebuilt {
                selected: Some("beta".into()),
                persist: false
            }
        );
    }

    #[test]
    fn test_removed_selection_falls_back_to_remembered() {
        let mut sel = ChannelSelector::new();
        sel.reconcile(&chans(&["alpha", "beta", "gamma"]), None);
        sel.select("gamma");
        sel.reconcile(&chans(&["alpha", "beta"]), Some("beta"));
        assert_eq!(sel.selected(), Some("beta"));
    }

    #[test]
    fn test_removed_selection_falls_back_to_single_channel() {
        let mut sel = ChannelSelector::new();
        sel.reconcile(&chans(&["alpha", "beta"]), None);
        sel.select("beta");
        sel.reconcile(&chans(&["alpha"]), Some("beta"));
        assert_eq!(sel.selected(), Some("alpha"));
    }

    #[test]
    fn test_removed_selection_falls_back_to_empty() {
        let mut sel = ChannelSelector::new();
        sel.reconcile(&chans(&["alpha", "beta", "gamma"]), None);
        sel.select("gamma");
        let change = sel.reconcile(&chans(&["alpha", "beta"]), Some("delta"));
        assert_eq!(
            change,
            SelectionChange::Rebuilt {
                selected: None,
                persist: false
            }
        );
        assert_eq!(sel.selected(), None);
    }

    #[test]
    fn test_select_rejects_unknown_channel() {
        let mut sel = ChannelSelector::new();
        sel.reconcile(&chans(&["alpha", "beta"]), None);
        assert!(!sel.select("zeta"));
        assert_eq!(sel.selected(), None);
    }

    #[test]
    fn test_empty_list_before_any_channel_is_unchanged() {
        let mut sel = ChannelSelector::new();
        assert_eq!(sel.reconcile(&[], Some("alpha")), SelectionChange::Unchanged);
        assert_eq!(sel.rebuilds(), 0);
    }
}
