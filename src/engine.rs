//! Entry point for the interception layer: one call per filtered action

use crate::abuse_log::AbuseLogger;
use crate::config::Config;
use crate::consequences::{
    ConsequencesExecutor, ConsequencesFactory, ConsequencesLookup, ConsequencesRegistry,
};
use crate::deferred::DeferredUpdates;
use crate::error::Result;
use crate::filter::FilterKey;
use crate::filter_user::FilterUser;
use crate::parameters::HitContext;
use crate::revert::Reverter;
use crate::status::Status;
use crate::stores::Services;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Filters that matched one action, in match order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterHit {
    pub matched: Vec<FilterKey>,
    pub context: HitContext,
}

#[derive(Debug)]
pub struct HitOutcome {
    pub request_id: Uuid,
    pub status: Status,
    pub actions_taken: BTreeMap<FilterKey, Vec<String>>,
    pub log_ids: Vec<i64>,
    /// Bookkeeping to run once the response is out
    pub deferred: Arc<DeferredUpdates>,
}

impl HitOutcome {
    /// Returns how many updates failed
    pub fn run_deferred_updates(&self) -> usize {
        self.deferred.run()
    }
}

/// Shared across requests; every call builds its own factory
pub struct AbuseFilterEngine {
    config: Arc<Config>,
    services: Services,
    filter_user: Arc<FilterUser>,
    lookup: ConsequencesLookup,
    executor: ConsequencesExecutor,
    logger: AbuseLogger,
}

impl AbuseFilterEngine {
    pub fn new(config: Config, services: Services) -> Self {
        let config = Arc::new(config);
        let registry = ConsequencesRegistry::from_config(&config.consequences);
        let filter_user = Arc::new(FilterUser::new(
            config.filter_user.name.clone(),
            services.users.clone(),
        ));

        Self {
            lookup: ConsequencesLookup::new(services.filters.clone(), registry),
            executor: ConsequencesExecutor::new(config.clone()),
            logger: AbuseLogger::new(
                config.clone(),
                services.abuse_log.clone(),
                services.var_dumps.clone(),
                services.filters.clone(),
            ),
            config,
            services,
            filter_user,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn filter_user(&self) -> &FilterUser {
        &self.filter_user
    }

    /// Resolve and execute the consequences of a hit, then write the audit
    /// log. Only failures to read the matched filters are returned as errors.
    pub fn handle_hit(&self, hit: &FilterHit) -> Result<HitOutcome> {
        let request_id = Uuid::new_v4();
        let filters = self.lookup.load_filters(&hit.matched)?;
        let raw = self.lookup.get_consequences_for_filters(&filters);

        let deferred = Arc::new(DeferredUpdates::new());
        let factory = ConsequencesFactory::new(
            self.config.clone(),
            self.services.clone(),
            self.filter_user.clone(),
            hit.context.clone(),
            filters,
            deferred.clone(),
        );
        let result = self.executor.execute_all(&raw, &factory);

        let log_ids = match self.logger.log_hits(
            request_id,
            &hit.context,
            &result.actions_taken,
            &deferred,
        ) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Failed to write abuse log for request {}: {}", request_id, e);
                Vec::new()
            }
        };

        tracing::info!(
            "{} by {}: {} filter(s) matched, status {}",
            hit.context.action,
            hit.context.user.name,
            result.actions_taken.len(),
            if result.status.is_good() { "good" } else { "rejected" }
        );

        Ok(HitOutcome {
            request_id,
            status: result.status,
            actions_taken: result.actions_taken,
            log_ids,
            deferred,
        })
    }

    pub fn reverter(&self) -> Reverter {
        Reverter::new(
            self.config.clone(),
            self.services.clone(),
            self.filter_user.clone(),
        )
    }
}
