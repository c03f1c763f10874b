//! Aggregate outcome handed back to the interception layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Localizable message: a message key plus its parameters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Message {
    pub key: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl Message {
    pub fn new(key: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            key: key.into(),
            params,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}({})", self.key, self.params.join(", "))
        }
    }
}

/// Good when empty; otherwise the reasons the action was rejected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    messages: Vec<Message>,
}

impl Status {
    pub fn good() -> Self {
        Self::default()
    }

    /// Build a status from collected abort messages, sorted for determinism
    pub fn from_messages(mut messages: Vec<Message>) -> Self {
        messages.sort();
        Self { messages }
    }

    pub fn is_good(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages carrying `key`
    pub fn count_key(&self, key: &str) -> usize {
        self.messages.iter().filter(|m| m.key == key).count()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.count_key(key) > 0
    }
}
