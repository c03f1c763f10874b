use super::ConsequencesFactory;
use crate::config::Config;
use crate::expiry::Expiry;
use crate::filter::{ActionMap, FilterKey, RawConsequenceMap};
use crate::status::{Message, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of resolving and executing one action's consequences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: Status,
    /// Final action names per filter, as recorded in the abuse log
    pub actions_taken: BTreeMap<FilterKey, Vec<String>>,
}

/// Decides which declared consequences fire and runs them.
///
/// Holds nothing per request; every hit brings its own factory.
#[derive(Debug, Clone)]
pub struct ConsequencesExecutor {
    config: Arc<Config>,
}

impl ConsequencesExecutor {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Resolve, then execute
    pub fn execute_all(
        &self,
        raw: &RawConsequenceMap,
        factory: &ConsequencesFactory,
    ) -> ExecutionResult {
        let filtered = self.get_filtered_consequences(raw, factory);
        self.execute(&filtered, factory)
    }

    /// Strip conflicting and disallowed actions. Rules run in order; each
    /// sees only what the previous ones left.
    pub fn get_filtered_consequences(
        &self,
        raw: &RawConsequenceMap,
        factory: &ConsequencesFactory,
    ) -> RawConsequenceMap {
        let mut filtered = RawConsequenceMap::new();

        for (key, declared) in raw {
            let mut actions = declared.clone();

            if key.global {
                self.strip_locally_disabled(key, &mut actions);
            }
            self.apply_self_exclusive(key, &mut actions, factory);
            if actions.contains_key("block") && actions.remove("disallow").is_some() {
                tracing::debug!("Filter {}: block supersedes disallow", key);
            }
            if is_throttled(factory, key) {
                self.restrict_to_safe(key, &mut actions);
            }

            filtered.insert(*key, actions);
        }

        reconcile_blocks(&mut filtered, factory, Utc::now());
        filtered
    }

    /// Run every surviving consequence. Only consequences that applied
    /// contribute a message and an entry in `actions_taken`; every filter
    /// still gets an entry, possibly empty.
    pub fn execute(
        &self,
        filtered: &RawConsequenceMap,
        factory: &ConsequencesFactory,
    ) -> ExecutionResult {
        let mut messages: Vec<Message> = Vec::new();
        let mut actions_taken = BTreeMap::new();

        for (key, actions) in filtered {
            let mut executed = Vec::new();
            let mut actions = actions.clone();
            if is_throttled(factory, key) {
                self.restrict_to_safe(key, &mut actions);
            }

            for (name, params) in &actions {
                let consequence = match factory.new_consequence(key, name, params) {
                    Ok(consequence) => consequence,
                    Err(e) => {
                        tracing::warn!("Filter {}: cannot build '{}': {}", key, name, e);
                        continue;
                    }
                };

                if !consequence.execute() {
                    tracing::warn!("Filter {}: '{}' did not apply", key, name);
                    continue;
                }
                if let Some(message) = consequence.message() {
                    messages.push(message);
                }
                executed.push(name.clone());
            }
            actions_taken.insert(*key, executed);
        }

        ExecutionResult {
            status: Status::from_messages(messages),
            actions_taken,
        }
    }

    fn strip_locally_disabled(&self, key: &FilterKey, actions: &mut ActionMap) {
        let disabled = &self.config.consequences.locally_disabled_global_actions;
        actions.retain(|name, _| {
            let keep = !disabled.contains(name);
            if !keep {
                tracing::debug!("Global filter {}: '{}' is disabled on this wiki", key, name);
            }
            keep
        });
    }

    fn apply_self_exclusive(
        &self,
        key: &FilterKey,
        actions: &mut ActionMap,
        factory: &ConsequencesFactory,
    ) {
        if actions.contains_key("warn") {
            if actions.contains_key("throttle") {
                tracing::warn!(
                    "Filter {} declares both warn and throttle; only warn is kept",
                    key
                );
            }
            actions.retain(|name, _| name == "warn");
            return;
        }

        let Some(params) = actions.get("throttle") else {
            return;
        };
        match factory.new_throttle(key, params) {
            Ok(throttle) if throttle.is_over_limit() => {
                tracing::debug!("Filter {} is over its throttle limit", key);
                actions.retain(|name, _| name == "throttle");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Filter {}: unusable throttle: {}", key, e),
        }
    }

    fn restrict_to_safe(&self, key: &FilterKey, actions: &mut ActionMap) {
        let safe = &self.config.consequences.throttled_safe_actions;
        actions.retain(|name, _| {
            let keep = safe.contains(name);
            if !keep {
                tracing::debug!("Filter {} is throttled; skipping '{}'", key, name);
            }
            keep
        });
    }
}

fn is_throttled(factory: &ConsequencesFactory, key: &FilterKey) -> bool {
    factory.filter(key).map_or(false, |f| f.throttled)
}

/// Keep only the block with the latest expiry. Filters are visited in key
/// order and only a strictly later expiry displaces the current winner, so
/// ties go to the smallest key. Unparsable durations lose to any valid one.
fn reconcile_blocks(
    filtered: &mut RawConsequenceMap,
    factory: &ConsequencesFactory,
    now: DateTime<Utc>,
) {
    let mut winner: Option<(Option<Expiry>, FilterKey)> = None;

    for (key, actions) in filtered.iter() {
        let Some(params) = actions.get("block") else {
            continue;
        };
        let expiry = match factory.new_block(key, params).and_then(|b| b.resolved_expiry(now)) {
            Ok(expiry) => Some(expiry),
            Err(e) => {
                tracing::debug!("Filter {}: block expiry unusable: {}", key, e);
                None
            }
        };
        let displaces = match &winner {
            Some((best, _)) => expiry > *best,
            None => true,
        };
        if displaces {
            winner = Some((expiry, *key));
        }
    }

    let Some((_, winning_key)) = winner else {
        return;
    };
    for (key, actions) in filtered.iter_mut() {
        if *key != winning_key && actions.remove("block").is_some() {
            tracing::debug!("Filter {}: block superseded by filter {}", key, winning_key);
        }
    }
}
