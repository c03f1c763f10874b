//! Collaborator interfaces for the shared mutable state consequences touch
//!
//! Each store provides its own atomicity; the engine holds them behind
//! `Arc<dyn ...>` so a single set can serve concurrent requests.

use crate::abuse_log::AbuseLogEntry;
use crate::error::{AbuseFilterError, Result};
use crate::expiry::Expiry;
use crate::filter::{Filter, FilterKey};
use crate::parameters::{UserIdentity, VariableHolder};
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// What a block applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockTarget {
    User(String),
    Ip(IpAddr),
    Range(IpNet),
}

impl BlockTarget {
    /// Target for a user: registered users by name, anonymous users by IP
    pub fn for_user(user: &UserIdentity) -> Self {
        if user.is_anonymous() {
            if let Ok(ip) = user.name.parse() {
                return BlockTarget::Ip(ip);
            }
        }
        BlockTarget::User(user.name.clone())
    }
}

impl fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTarget::User(name) => write!(f, "user:{}", name),
            BlockTarget::Ip(ip) => write!(f, "ip:{}", ip),
            BlockTarget::Range(net) => write!(f, "range:{}", net),
        }
    }
}

impl FromStr for BlockTarget {
    type Err = AbuseFilterError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AbuseFilterError::Config(format!("Invalid block target: {}", s));
        match s.split_once(':') {
            Some(("user", name)) => Ok(BlockTarget::User(name.to_string())),
            Some(("ip", ip)) => ip.parse().map(BlockTarget::Ip).map_err(|_| invalid()),
            Some(("range", net)) => net.parse().map(BlockTarget::Range).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

/// Request to place a sitewide block
#[derive(Debug, Clone)]
pub struct BlockRequest {
    pub target: BlockTarget,
    pub performer: UserIdentity,
    pub reason: String,
    pub expiry: Expiry,
    pub prevent_talk_edit: bool,
}

/// An active or historical block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: i64,
    pub target: BlockTarget,
    pub performer: UserIdentity,
    pub reason: String,
    pub expiry: Expiry,
    pub prevent_talk_edit: bool,
    pub created_at: DateTime<Utc>,
}

/// Outcome of [`BlockStore::place_block`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockPlacement {
    /// The request is now the active block
    Placed(BlockRecord),
    /// An active block expiring later than the request was left in place
    Kept(BlockRecord),
}

impl BlockPlacement {
    pub fn record(&self) -> &BlockRecord {
        match self {
            BlockPlacement::Placed(record) | BlockPlacement::Kept(record) => record,
        }
    }

    pub fn is_placed(&self) -> bool {
        matches!(self, BlockPlacement::Placed(_))
    }
}

/// Filter definitions and their hit counters
pub trait FilterStore: Send + Sync {
    fn filter(&self, key: &FilterKey) -> Result<Option<Filter>>;
    fn save_filter(&self, filter: &Filter) -> Result<()>;
    fn increment_hit_count(&self, key: &FilterKey) -> Result<()>;
}

/// User accounts
pub trait UserStore: Send + Sync {
    /// Find the named system account, creating it when missing
    fn find_or_create_system_user(&self, name: &str) -> Result<UserIdentity>;
}

/// Group membership
pub trait GroupStore: Send + Sync {
    fn user_groups(&self, user: &UserIdentity) -> Result<Vec<String>>;
    /// Returns false when the user already held the group
    fn add_user_to_group(
        &self,
        user: &UserIdentity,
        group: &str,
        performer: &UserIdentity,
    ) -> Result<bool>;
    /// Returns false when the user did not hold the group
    fn remove_user_from_group(
        &self,
        user: &UserIdentity,
        group: &str,
        performer: &UserIdentity,
    ) -> Result<bool>;
}

/// Sitewide and range blocks. Placing a block on an already blocked target
/// replaces the existing block unless that block expires later.
pub trait BlockStore: Send + Sync {
    fn place_block(&self, request: &BlockRequest) -> Result<BlockPlacement>;
    fn active_block(&self, target: &BlockTarget) -> Result<Option<BlockRecord>>;
    /// Returns false when there was no active block to lift
    fn remove_block(
        &self,
        target: &BlockTarget,
        performer: &UserIdentity,
        reason: &str,
    ) -> Result<bool>;
}

/// Time-bounded bans on automatic group promotion
pub trait AutopromoteStore: Send + Sync {
    fn block_autopromote(
        &self,
        user: &UserIdentity,
        until: DateTime<Utc>,
        performer: &UserIdentity,
    ) -> Result<()>;
    fn autopromote_blocked_until(&self, user: &UserIdentity) -> Result<Option<DateTime<Utc>>>;
}

/// Change tags waiting to be applied to the resulting change
pub trait TagStore: Send + Sync {
    fn add_tags(&self, specifier: &str, tags: &[String]) -> Result<()>;
    fn tags_for(&self, specifier: &str) -> Result<Vec<String>>;
}

/// Sliding-window hit counters for the throttle consequence
pub trait ThrottleStore: Send + Sync {
    fn hits_since(&self, key: &str, since: DateTime<Utc>) -> Result<u64>;
    fn record_hit(&self, key: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Audit records of filter hits
pub trait AbuseLogStore: Send + Sync {
    fn insert_log_entry(&self, entry: &AbuseLogEntry) -> Result<i64>;
    fn log_entry(&self, id: i64) -> Result<Option<AbuseLogEntry>>;
    /// Entries for a filter with `from <= timestamp <= to`, oldest first
    fn log_entries_for_filter(
        &self,
        key: &FilterKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AbuseLogEntry>>;
    fn recent_log_entries(&self, limit: usize) -> Result<Vec<AbuseLogEntry>>;
}

/// Storage for variable dumps referenced from abuse log entries
pub trait VarDumpStore: Send + Sync {
    /// Store a dump and return the reference recorded in the log entry
    fn store_dump(&self, vars: &VariableHolder) -> Result<String>;
    fn load_dump(&self, reference: &str) -> Result<VariableHolder>;
}

/// Full set of collaborators the engine is built from
#[derive(Clone)]
pub struct Services {
    pub filters: Arc<dyn FilterStore>,
    pub users: Arc<dyn UserStore>,
    pub groups: Arc<dyn GroupStore>,
    pub blocks: Arc<dyn BlockStore>,
    pub autopromote: Arc<dyn AutopromoteStore>,
    pub tags: Arc<dyn TagStore>,
    pub throttle: Arc<dyn ThrottleStore>,
    pub abuse_log: Arc<dyn AbuseLogStore>,
    pub var_dumps: Arc<dyn VarDumpStore>,
}

impl Services {
    /// Use one backend for every collaborator except variable dumps
    pub fn from_backend<S>(store: Arc<S>, var_dumps: Arc<dyn VarDumpStore>) -> Self
    where
        S: FilterStore
            + UserStore
            + GroupStore
            + BlockStore
            + AutopromoteStore
            + TagStore
            + ThrottleStore
            + AbuseLogStore
            + 'static,
    {
        Self {
            filters: store.clone(),
            users: store.clone(),
            groups: store.clone(),
            blocks: store.clone(),
            autopromote: store.clone(),
            tags: store.clone(),
            throttle: store.clone(),
            abuse_log: store,
            var_dumps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_target_for_user() {
        let anon = UserIdentity::new(0, "192.0.2.4");
        assert_eq!(
            BlockTarget::for_user(&anon),
            BlockTarget::Ip("192.0.2.4".parse().unwrap())
        );
        let alice = UserIdentity::new(5, "Alice");
        assert_eq!(
            BlockTarget::for_user(&alice),
            BlockTarget::User("Alice".to_string())
        );
    }

    #[test]
    fn test_block_target_string_form() {
        for target in [
            BlockTarget::User("Alice: the first".to_string()),
            BlockTarget::Ip("2001:db8::1".parse().unwrap()),
            BlockTarget::Range("10.1.0.0/16".parse().unwrap()),
        ] {
            let text = target.to_string();
            assert_eq!(text.parse::<BlockTarget>().unwrap(), target);
        }
        assert!("mask:1.2.3.4".parse::<BlockTarget>().is_err());
    }
}
