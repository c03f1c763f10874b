//! Audit records of filter hits
//!
//! One entry per (filter, filtered action). The action list is the
//! post-resolution set, so an action stripped by resolution never appears.

use crate::config::Config;
use crate::consequences::RevertInfo;
use crate::deferred::DeferredUpdates;
use crate::error::Result;
use crate::filter::FilterKey;
use crate::parameters::{ActionKind, HitContext, UserIdentity, VariableHolder};
use crate::stores::{AbuseLogStore, FilterStore, VarDumpStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbuseLogEntry {
    /// Assigned by the store on insert
    pub id: Option<i64>,
    /// Shared by every entry written for the same filtered action
    pub request_id: Uuid,
    pub filter: FilterKey,
    pub actions: Vec<String>,
    /// Wiki where the action happened
    pub wiki: String,
    /// Wiki hosting the filter, for global filters
    pub filter_wiki: Option<String>,
    pub user: UserIdentity,
    pub target: String,
    pub action: ActionKind,
    pub ip: IpAddr,
    /// Reference to the variable dump
    pub var_dump: String,
    pub timestamp: DateTime<Utc>,
}

impl AbuseLogEntry {
    pub fn took_action(&self, name: &str) -> bool {
        self.actions.iter().any(|a| a == name)
    }

    /// Rebuild the hit context the entry was written for
    pub fn to_hit_context(&self, vars: VariableHolder) -> HitContext {
        HitContext {
            user: self.user.clone(),
            target: self.target.clone(),
            action: self.action,
            request_ip: self.ip,
            account_name: None,
            vars,
        }
    }

    pub fn revert_info(&self, vars: VariableHolder) -> RevertInfo {
        RevertInfo {
            log_id: self.id.unwrap_or_default(),
            user: self.user.clone(),
            vars,
            timestamp: self.timestamp,
        }
    }
}

/// Writes abuse log entries and queues hit-count bookkeeping
pub struct AbuseLogger {
    config: Arc<Config>,
    log: Arc<dyn AbuseLogStore>,
    dumps: Arc<dyn VarDumpStore>,
    filters: Arc<dyn FilterStore>,
}

impl AbuseLogger {
    pub fn new(
        config: Arc<Config>,
        log: Arc<dyn AbuseLogStore>,
        dumps: Arc<dyn VarDumpStore>,
        filters: Arc<dyn FilterStore>,
    ) -> Self {
        Self {
            config,
            log,
            dumps,
            filters,
        }
    }

    /// Write one entry per filter in `actions_taken` and return their ids.
    /// The variable dump is stored once and shared by every entry.
    pub fn log_hits(
        &self,
        request_id: Uuid,
        context: &HitContext,
        actions_taken: &BTreeMap<FilterKey, Vec<String>>,
        deferred: &DeferredUpdates,
    ) -> Result<Vec<i64>> {
        if actions_taken.is_empty() {
            return Ok(Vec::new());
        }

        let var_dump = self.dumps.store_dump(&context.vars)?;
        let timestamp = Utc::now();
        let mut ids = Vec::with_capacity(actions_taken.len());

        for (key, actions) in actions_taken {
            let entry = AbuseLogEntry {
                id: None,
                request_id,
                filter: *key,
                actions: actions.clone(),
                wiki: self.config.wiki.wiki_id.clone(),
                filter_wiki: self.config.hosting_wiki(key.global).map(str::to_string),
                user: context.user.clone(),
                target: context.target.clone(),
                action: context.action,
                ip: context.request_ip,
                var_dump: var_dump.clone(),
                timestamp,
            };
            ids.push(self.log.insert_log_entry(&entry)?);

            let filters = self.filters.clone();
            let key = *key;
            deferred.push(format!("hit count {}", key), move || {
                filters.increment_hit_count(&key)
            });
        }

        tracing::debug!(
            "Logged request {} against {} filter(s)",
            request_id,
            ids.len()
        );
        Ok(ids)
    }
}
