//! Undo the side effects a filter took over a period of time

use crate::abuse_log::AbuseLogEntry;
use crate::config::Config;
use crate::consequences::{ConsequenceKind, ConsequencesFactory};
use crate::deferred::DeferredUpdates;
use crate::error::{AbuseFilterError, Result};
use crate::filter::{Filter, FilterKey};
use crate::filter_user::FilterUser;
use crate::parameters::UserIdentity;
use crate::stores::Services;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of one revert attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertedAction {
    pub log_id: i64,
    pub user: String,
    pub action: String,
    pub reverted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertReport {
    pub filter: FilterKey,
    pub entries_examined: usize,
    pub actions: Vec<RevertedAction>,
}

impl RevertReport {
    pub fn reverted_count(&self) -> usize {
        self.actions.iter().filter(|a| a.reverted).count()
    }
}

pub struct Reverter {
    config: Arc<Config>,
    services: Services,
    filter_user: Arc<FilterUser>,
}

impl Reverter {
    pub fn new(config: Arc<Config>, services: Services, filter_user: Arc<FilterUser>) -> Self {
        Self {
            config,
            services,
            filter_user,
        }
    }

    /// Revert every reversible action logged for `key` with a timestamp in
    /// `[from, to]`. Each attempt is reported; refusals are not errors.
    pub fn revert_filter(
        &self,
        key: &FilterKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        performer: &UserIdentity,
        reason: &str,
    ) -> Result<RevertReport> {
        if from > to {
            return Err(AbuseFilterError::InvalidConfigValue {
                path: "revert.period".to_string(),
                message: format!("{} is after {}", from, to),
            });
        }
        let filter = self
            .services
            .filters
            .filter(key)?
            .ok_or_else(|| AbuseFilterError::FilterNotFound {
                key: key.to_string(),
            })?;
        let entries = self.services.abuse_log.log_entries_for_filter(key, from, to)?;

        let mut report = RevertReport {
            filter: *key,
            entries_examined: entries.len(),
            actions: Vec::new(),
        };
        for entry in &entries {
            self.revert_entry(&filter, entry, performer, reason, &mut report);
        }

        tracing::info!(
            "Reverted {} of {} action(s) taken by filter {}",
            report.reverted_count(),
            report.actions.len(),
            key
        );
        Ok(report)
    }

    fn revert_entry(
        &self,
        filter: &Filter,
        entry: &AbuseLogEntry,
        performer: &UserIdentity,
        reason: &str,
        report: &mut RevertReport,
    ) {
        let reversible: Vec<&String> = entry
            .actions
            .iter()
            .filter(|a| ConsequenceKind::from_name(a).map_or(false, |k| k.is_reversible()))
            .collect();
        if reversible.is_empty() {
            return;
        }
        let log_id = entry.id.unwrap_or_default();

        // Without the snapshot nothing can be verified
        let vars = match self.services.var_dumps.load_dump(&entry.var_dump) {
            Ok(vars) => Some(vars),
            Err(e) => {
                tracing::warn!("Log entry {}: variable dump unavailable: {}", log_id, e);
                None
            }
        };

        for action in reversible {
            let reverted = match &vars {
                Some(vars) => self.revert_action(filter, entry, action, vars, performer, reason),
                None => false,
            };
            report.actions.push(RevertedAction {
                log_id,
                user: entry.user.name.clone(),
                action: action.clone(),
                reverted,
            });
        }
    }

    fn revert_action(
        &self,
        filter: &Filter,
        entry: &AbuseLogEntry,
        action: &str,
        vars: &crate::parameters::VariableHolder,
        performer: &UserIdentity,
        reason: &str,
    ) -> bool {
        let factory = ConsequencesFactory::new(
            self.config.clone(),
            self.services.clone(),
            self.filter_user.clone(),
            entry.to_hit_context(vars.clone()),
            vec![filter.clone()],
            Arc::new(DeferredUpdates::new()),
        );
        let raw = filter.actions.get(action).cloned().unwrap_or_default();
        match factory.new_consequence(&filter.key, action, &raw) {
            Ok(consequence) => consequence.revert(&entry.revert_info(vars.clone()), performer, reason),
            Err(e) => {
                tracing::warn!("Cannot rebuild '{}' for log entry {:?}: {}", action, entry.id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abuse_log::AbuseLogger;
    use crate::stores::{BlockStore, BlockTarget, FilterStore, GroupStore};
    use crate::test_support::{context_for, registered, services_for, MemoryStore};
    use chrono::Duration;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    struct Setup {
        store: Arc<MemoryStore>,
        reverter: Reverter,
        filter_user: Arc<FilterUser>,
    }

    fn setup() -> Setup {
        let store = Arc::new(MemoryStore::default());
        let mut config = Config::default();
        config.consequences.enabled.insert("degroup".to_string(), true);
        let config = Arc::new(config);
        let services = services_for(&store);
        let filter_user = Arc::new(FilterUser::new("Abuse filter", services.users.clone()));
        let filter = Filter::new(FilterKey::local(1), "Vandal")
            .with_action("block", ["1 day", "1 day"])
            .with_action("degroup", Vec::<String>::new());
        store.save_filter(&filter).unwrap();

        Setup {
            reverter: Reverter::new(config, services, filter_user.clone()),
            store,
            filter_user,
        }
    }

    fn log_hit(store: &Arc<MemoryStore>, actions: &[&str]) {
        let mut context = context_for(registered());
        context.vars.set("user_groups", serde_json::json!(["user", "sysop"]));
        let logger = AbuseLogger::new(
            Arc::new(Config::default()),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        let mut taken = BTreeMap::new();
        taken.insert(
            FilterKey::local(1),
            actions.iter().map(|a| a.to_string()).collect(),
        );
        logger
            .log_hits(Uuid::new_v4(), &context, &taken, &DeferredUpdates::new())
            .unwrap();
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (Utc::now() - Duration::hours(1), Utc::now() + Duration::hours(1))
    }

    #[test]
    fn test_reverts_block_and_degroup() {
        let s = setup();
        let user = registered();
        let performer = s.filter_user.identity().unwrap().clone();
        s.store
            .place_block(&crate::stores::BlockRequest {
                target: BlockTarget::User("Mallory".to_string()),
                performer: performer.clone(),
                reason: "auto".to_string(),
                expiry: crate::expiry::Expiry::Infinite,
                prevent_talk_edit: false,
            })
            .unwrap();
        s.store.set_groups(&user, &["user"]);
        log_hit(&s.store, &["block", "degroup", "tag"]);

        let (from, to) = window();
        let admin = UserIdentity::new(2, "Admin");
        let report = s
            .reverter
            .revert_filter(&FilterKey::local(1), from, to, &admin, "false positive")
            .unwrap();

        assert_eq!(report.entries_examined, 1);
        assert_eq!(report.actions.len(), 2);
        assert_eq!(report.reverted_count(), 2);
        assert!(s
            .store
            .active_block(&BlockTarget::User("Mallory".to_string()))
            .unwrap()
            .is_none());
        let mut groups = s.store.user_groups(&user).unwrap();
        groups.sort();
        assert_eq!(groups, vec!["sysop", "user"]);
    }

    #[test]
    fn test_refuses_admin_block() {
        let s = setup();
        let admin = UserIdentity::new(2, "Admin");
        s.store
            .place_block(&crate::stores::BlockRequest {
                target: BlockTarget::User("Mallory".to_string()),
                performer: admin.clone(),
                reason: "manual".to_string(),
                expiry: crate::expiry::Expiry::Infinite,
                prevent_talk_edit: false,
            })
            .unwrap();
        log_hit(&s.store, &["block"]);

        let (from, to) = window();
        let report = s
            .reverter
            .revert_filter(&FilterKey::local(1), from, to, &admin, "undo")
            .unwrap();
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.reverted_count(), 0);
        assert!(s
            .store
            .active_block(&BlockTarget::User("Mallory".to_string()))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_entries_outside_window_ignored() {
        let s = setup();
        log_hit(&s.store, &["block"]);

        let from = Utc::now() + Duration::hours(1);
        let to = Utc::now() + Duration::hours(2);
        let report = s
            .reverter
            .revert_filter(&FilterKey::local(1), from, to, &registered(), "none")
            .unwrap();
        assert_eq!(report.entries_examined, 0);
    }

    #[test]
    fn test_bad_inputs() {
        let s = setup();
        let (from, to) = window();
        assert!(matches!(
            s.reverter
                .revert_filter(&FilterKey::local(1), to, from, &registered(), "x"),
            Err(AbuseFilterError::InvalidConfigValue { .. })
        ));
        assert!(matches!(
            s.reverter
                .revert_filter(&FilterKey::local(42), from, to, &registered(), "x"),
            Err(AbuseFilterError::FilterNotFound { .. })
        ));
    }
}
