//! Filters as seen by the consequence engine
//!
//! The engine never evaluates a filter's pattern; it only needs its identity,
//! flags and declared actions.

use crate::error::{AbuseFilterError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const GLOBAL_PREFIX: &str = "global-";

/// Identity of a filter: `<id>` for local filters, `global-<id>` for filters
/// hosted on the central wiki.
///
/// Keys order local filters before global ones, then by numeric id. This
/// order breaks ties wherever the engine has to pick a single filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterKey {
    pub global: bool,
    pub id: u64,
}

impl FilterKey {
    pub fn local(id: u64) -> Self {
        Self { global: false, id }
    }

    pub fn global(id: u64) -> Self {
        Self { global: true, id }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.global {
            write!(f, "{}{}", GLOBAL_PREFIX, self.id)
        } else {
            write!(f, "{}", self.id)
        }
    }
}

impl FromStr for FilterKey {
    type Err = AbuseFilterError;

    fn from_str(s: &str) -> Result<Self> {
        let (global, digits) = match s.strip_prefix(GLOBAL_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        digits
            .parse::<u64>()
            .map(|id| Self { global, id })
            .map_err(|_| AbuseFilterError::FilterNotFound { key: s.to_string() })
    }
}

impl Serialize for FilterKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FilterKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Declared consequences of a filter: consequence name -> raw parameters
pub type ActionMap = BTreeMap<String, Vec<String>>;

/// Declared-but-unresolved consequences of every filter that matched one action
pub type RawConsequenceMap = BTreeMap<FilterKey, ActionMap>;

/// A stored filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub key: FilterKey,
    /// Public description, shown in warning and block messages
    pub name: String,
    /// Rule text, opaque to this crate
    #[serde(default)]
    pub pattern: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub actions: ActionMap,
    #[serde(default)]
    pub hit_count: u64,
    /// Administrative safety valve: only safe actions run while set
    #[serde(default)]
    pub throttled: bool,
}

fn default_true() -> bool {
    true
}

impl Filter {
    pub fn new(key: FilterKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            pattern: String::new(),
            enabled: true,
            deleted: false,
            hidden: false,
            actions: ActionMap::new(),
            hit_count: 0,
            throttled: false,
        }
    }

    /// Builder-style helper to declare an action
    pub fn with_action<I, S>(mut self, name: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.insert(
            name.to_string(),
            params.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn is_global(&self) -> bool {
        self.key.global
    }

    /// Whether the filter can still produce consequences
    pub fn is_active(&self) -> bool {
        self.enabled && !self.deleted
    }
}

/// A file of filter definitions: one `[[filter]]` table per filter
#[derive(Debug, Deserialize)]
struct FilterFile {
    #[serde(default)]
    filter: Vec<Filter>,
}

/// Parse filter definitions from TOML
pub fn parse_filter_file(content: &str) -> Result<Vec<Filter>> {
    let file: FilterFile = toml::from_str(content)?;
    if file.filter.is_empty() {
        return Err(AbuseFilterError::Config(
            "No [[filter]] tables found".to_string(),
        ));
    }
    Ok(file.filter)
}
