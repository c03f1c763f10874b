use super::ConsequenceKind;
use crate::config::ConsequencesConfig;
use std::collections::BTreeSet;

/// Which consequences are dangerous and which are enabled on this wiki.
/// Built once from configuration.
#[derive(Debug, Clone)]
pub struct ConsequencesRegistry {
    dangerous: BTreeSet<String>,
    enabled: BTreeSet<String>,
}

impl ConsequencesRegistry {
    pub fn from_config(config: &ConsequencesConfig) -> Self {
        let enabled = config
            .enabled
            .iter()
            .filter(|(name, on)| **on && ConsequenceKind::from_name(name).is_some())
            .map(|(name, _)| name.clone())
            .collect();

        Self {
            dangerous: config.dangerous.iter().cloned().collect(),
            enabled,
        }
    }

    pub fn is_dangerous_action(&self, name: &str) -> bool {
        self.dangerous.contains(name)
    }

    pub fn dangerous_action_names(&self) -> Vec<&str> {
        self.dangerous.iter().map(String::as_str).collect()
    }

    /// Unknown consequence names are never enabled
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    pub fn enabled_action_names(&self) -> Vec<&str> {
        self.enabled.iter().map(String::as_str).collect()
    }
}
