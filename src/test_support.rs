use crate::abuse_log::AbuseLogEntry;
use crate::config::Config;
use crate::consequences::{ConsequencesFactory, RevertInfo};
use crate::deferred::DeferredUpdates;
use crate::error::{AbuseFilterError, Result};
use crate::filter::{Filter, FilterKey};
use crate::filter_user::FilterUser;
use crate::parameters::{ActionKind, HitContext, UserIdentity, VariableHolder};
use crate::stores::*;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

const SYSTEM_USER_BASE_ID: u64 = 1000;

#[derive(Default)]
struct State {
    filters: BTreeMap<FilterKey, Filter>,
    system_users: Vec<String>,
    groups: HashMap<u64, BTreeSet<String>>,
    blocks: HashMap<BlockTarget, BlockRecord>,
    next_block_id: i64,
    autopromote: HashMap<u64, DateTime<Utc>>,
    tags: HashMap<String, BTreeSet<String>>,
    hits: HashMap<String, Vec<DateTime<Utc>>>,
    log: Vec<AbuseLogEntry>,
    dumps: Vec<VariableHolder>,
}

/// Every store in one `Mutex`, with switches to make writes fail
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
    fail_blocks: AtomicBool,
    fail_groups: AtomicBool,
}

impl MemoryStore {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn fail_blocks(&self) {
        self.fail_blocks.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_groups(&self) {
        self.fail_groups.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_groups(&self, user: &UserIdentity, groups: &[&str]) {
        self.state().groups.insert(
            user.id,
            groups.iter().map(|g| g.to_string()).collect(),
        );
    }

    pub(crate) fn active_block_for(&self, target: &BlockTarget) -> Option<BlockRecord> {
        self.active_block(target).ok().flatten()
    }

    pub(crate) fn autopromote_blocked_until_for(&self, user: &UserIdentity) -> Option<DateTime<Utc>> {
        self.autopromote_blocked_until(user).ok().flatten()
    }

    pub(crate) fn filter_user_identity(&self) -> UserIdentity {
        self.find_or_create_system_user(&Config::default().filter_user.name)
            .unwrap_or_else(|e| panic!("system user: {}", e))
    }

    pub(crate) fn log_entries(&self) -> Vec<AbuseLogEntry> {
        self.state().log.clone()
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(AbuseFilterError::Config(format!("{} store unavailable", what)));
        }
        Ok(())
    }
}

impl FilterStore for MemoryStore {
    fn filter(&self, key: &FilterKey) -> Result<Option<Filter>> {
        Ok(self.state().filters.get(key).cloned())
    }

    fn save_filter(&self, filter: &Filter) -> Result<()> {
        self.state().filters.insert(filter.key, filter.clone());
        Ok(())
    }

    fn increment_hit_count(&self, key: &FilterKey) -> Result<()> {
        let mut state = self.state();
        let filter = state
            .filters
            .get_mut(key)
            .ok_or_else(|| AbuseFilterError::FilterNotFound {
                key: key.to_string(),
            })?;
        filter.hit_count += 1;
        Ok(())
    }
}

impl UserStore for MemoryStore {
    fn find_or_create_system_user(&self, name: &str) -> Result<UserIdentity> {
        let mut state = self.state();
        let index = match state.system_users.iter().position(|n| n == name) {
            Some(index) => index,
            None => {
                state.system_users.push(name.to_string());
                state.system_users.len() - 1
            }
        };
        Ok(UserIdentity::new(SYSTEM_USER_BASE_ID + index as u64, name))
    }
}

impl GroupStore for MemoryStore {
    fn user_groups(&self, user: &UserIdentity) -> Result<Vec<String>> {
        Ok(self
            .state()
            .groups
            .get(&user.id)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn add_user_to_group(
        &self,
        user: &UserIdentity,
        group: &str,
        _performer: &UserIdentity,
    ) -> Result<bool> {
        Self::check(&self.fail_groups, "group")?;
        Ok(self
            .state()
            .groups
            .entry(user.id)
            .or_default()
            .insert(group.to_string()))
    }

    fn remove_user_from_group(
        &self,
        user: &UserIdentity,
        group: &str,
        _performer: &UserIdentity,
    ) -> Result<bool> {
        Self::check(&self.fail_groups, "group")?;
        Ok(self
            .state()
            .groups
            .get_mut(&user.id)
            .map_or(false, |groups| groups.remove(group)))
    }
}

impl BlockStore for MemoryStore {
    fn place_block(&self, request: &BlockRequest) -> Result<BlockPlacement> {
        Self::check(&self.fail_blocks, "block")?;
        let mut state = self.state();
        if let Some(active) = state
            .blocks
            .get(&request.target)
            .filter(|b| !b.expiry.has_passed(Utc::now()) && b.expiry > request.expiry)
        {
            return Ok(BlockPlacement::Kept(active.clone()));
        }
        state.next_block_id += 1;
        let record = BlockRecord {
            id: state.next_block_id,
            target: request.target.clone(),
            performer: request.performer.clone(),
            reason: request.reason.clone(),
            expiry: request.expiry,
            prevent_talk_edit: request.prevent_talk_edit,
            created_at: Utc::now(),
        };
        state.blocks.insert(request.target.clone(), record.clone());
        Ok(BlockPlacement::Placed(record))
    }

    fn active_block(&self, target: &BlockTarget) -> Result<Option<BlockRecord>> {
        Ok(self
            .state()
            .blocks
            .get(target)
            .filter(|b| !b.expiry.has_passed(Utc::now()))
            .cloned())
    }

    fn remove_block(
        &self,
        target: &BlockTarget,
        _performer: &UserIdentity,
        _reason: &str,
    ) -> Result<bool> {
        Self::check(&self.fail_blocks, "block")?;
        Ok(self.state().blocks.remove(target).is_some())
    }
}

impl AutopromoteStore for MemoryStore {
    fn block_autopromote(
        &self,
        user: &UserIdentity,
        until: DateTime<Utc>,
        _performer: &UserIdentity,
    ) -> Result<()> {
        self.state().autopromote.insert(user.id, until);
        Ok(())
    }

    fn autopromote_blocked_until(&self, user: &UserIdentity) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .state()
            .autopromote
            .get(&user.id)
            .copied()
            .filter(|until| *until > Utc::now()))
    }
}

impl TagStore for MemoryStore {
    fn add_tags(&self, specifier: &str, tags: &[String]) -> Result<()> {
        self.state()
            .tags
            .entry(specifier.to_string())
            .or_default()
            .extend(tags.iter().cloned());
        Ok(())
    }

    fn tags_for(&self, specifier: &str) -> Result<Vec<String>> {
        Ok(self
            .state()
            .tags
            .get(specifier)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default())
    }
}

impl ThrottleStore for MemoryStore {
    fn hits_since(&self, key: &str, since: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .state()
            .hits
            .get(key)
            .map_or(0, |hits| hits.iter().filter(|at| **at >= since).count() as u64))
    }

    fn record_hit(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.state().hits.entry(key.to_string()).or_default().push(at);
        Ok(())
    }
}

impl AbuseLogStore for MemoryStore {
    fn insert_log_entry(&self, entry: &AbuseLogEntry) -> Result<i64> {
        let mut state = self.state();
        let id = state.log.len() as i64 + 1;
        let mut stored = entry.clone();
        stored.id = Some(id);
        state.log.push(stored);
        Ok(id)
    }

    fn log_entry(&self, id: i64) -> Result<Option<AbuseLogEntry>> {
        Ok(self
            .state()
            .log
            .iter()
            .find(|e| e.id == Some(id))
            .cloned())
    }

    fn log_entries_for_filter(
        &self,
        key: &FilterKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AbuseLogEntry>> {
        Ok(self
            .state()
            .log
            .iter()
            .filter(|e| &e.filter == key && e.timestamp >= from && e.timestamp <= to)
            .cloned()
            .collect())
    }

    fn recent_log_entries(&self, limit: usize) -> Result<Vec<AbuseLogEntry>> {
        Ok(self.state().log.iter().rev().take(limit).cloned().collect())
    }
}

impl VarDumpStore for MemoryStore {
    fn store_dump(&self, vars: &VariableHolder) -> Result<String> {
        let mut state = self.state();
        state.dumps.push(vars.clone());
        Ok(format!("mem:{}", state.dumps.len() - 1))
    }

    fn load_dump(&self, reference: &str) -> Result<VariableHolder> {
        let missing = || AbuseFilterError::Config(format!("Unknown dump {}", reference));
        let index: usize = reference
            .strip_prefix("mem:")
            .and_then(|i| i.parse().ok())
            .ok_or_else(missing)?;
        self.state().dumps.get(index).cloned().ok_or_else(missing)
    }
}

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Serializes tests that touch process environment variables
pub(crate) fn lock_env() -> MutexGuard<'static, ()> {
    ENV_MUTEX
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn services_for(store: &Arc<MemoryStore>) -> Services {
    Services::from_backend(store.clone(), store.clone())
}

pub(crate) fn registered() -> UserIdentity {
    UserIdentity::new(7, "Mallory")
}

pub(crate) fn anonymous(ip: &str) -> UserIdentity {
    UserIdentity::anonymous(ip.parse().unwrap())
}

/// An edit of `Sandbox` from 192.0.2.10
pub(crate) fn context_for(user: UserIdentity) -> HitContext {
    HitContext {
        user,
        target: "Sandbox".to_string(),
        action: ActionKind::Edit,
        request_ip: "192.0.2.10".parse().unwrap(),
        account_name: None,
        vars: VariableHolder::new(),
    }
}

pub(crate) fn factory_for(
    config: &Config,
    store: &Arc<MemoryStore>,
    context: HitContext,
    filters: Vec<Filter>,
) -> ConsequencesFactory {
    let services = services_for(store);
    let filter_user = Arc::new(FilterUser::new(
        config.filter_user.name.clone(),
        services.users.clone(),
    ));
    ConsequencesFactory::new(
        Arc::new(config.clone()),
        services,
        filter_user,
        context,
        filters,
        Arc::new(DeferredUpdates::new()),
    )
}

pub(crate) fn revert_info(user: UserIdentity) -> RevertInfo {
    revert_info_with(user, VariableHolder::new())
}

pub(crate) fn revert_info_with(user: UserIdentity, vars: VariableHolder) -> RevertInfo {
    RevertInfo {
        log_id: 1,
        user,
        vars,
        timestamp: Utc::now(),
    }
}
