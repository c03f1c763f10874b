use super::ConsequencesRegistry;
use crate::error::Result;
use crate::filter::{ActionMap, Filter, FilterKey, RawConsequenceMap};
use crate::stores::FilterStore;
use std::sync::Arc;

/// Reads the declared actions of matched filters
pub struct ConsequencesLookup {
    filters: Arc<dyn FilterStore>,
    registry: ConsequencesRegistry,
}

impl ConsequencesLookup {
    pub fn new(filters: Arc<dyn FilterStore>, registry: ConsequencesRegistry) -> Self {
        Self { filters, registry }
    }

    /// Load matched filters, skipping keys that no longer resolve to an
    /// active filter
    pub fn load_filters(&self, keys: &[FilterKey]) -> Result<Vec<Filter>> {
        let mut loaded = Vec::with_capacity(keys.len());
        for key in keys {
            match self.filters.filter(key)? {
                Some(filter) if filter.is_active() => loaded.push(filter),
                Some(_) => tracing::debug!("Filter {} matched but is disabled or deleted", key),
                None => tracing::warn!("Matched filter {} does not exist", key),
            }
        }
        Ok(loaded)
    }

    /// Declared actions of each filter, restricted to consequences enabled on
    /// this wiki. Every filter gets an entry, even with nothing left.
    pub fn get_consequences_for_filters(&self, filters: &[Filter]) -> RawConsequenceMap {
        filters
            .iter()
            .map(|filter| {
                let actions: ActionMap = filter
                    .actions
                    .iter()
                    .filter(|(name, _)| {
                        let enabled = self.registry.is_enabled(name);
                        if !enabled {
                            tracing::debug!(
                                "Filter {}: '{}' is not enabled here",
                                filter.key,
                                name
                            );
                        }
                        enabled
                    })
                    .map(|(name, params)| (name.clone(), params.clone()))
                    .collect();
                (filter.key, actions)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_support::MemoryStore;

    fn lookup(store: Arc<MemoryStore>) -> ConsequencesLookup {
        ConsequencesLookup::new(
            store,
            ConsequencesRegistry::from_config(&Config::default().consequences),
        )
    }

    #[test]
    fn test_only_enabled_actions() {
        let filter = Filter::new(FilterKey::local(1), "Mixed")
            .with_action("warn", Vec::<String>::new())
            .with_action("rangeblock", Vec::<String>::new())
            .with_action("smite", vec!["hard"]);
        let store = Arc::new(MemoryStore::default());

        let map = lookup(store).get_consequences_for_filters(&[filter]);
        let actions: Vec<_> = map[&FilterKey::local(1)].keys().cloned().collect();
        assert_eq!(actions, vec!["warn"]);
    }

    #[test]
    fn test_filter_with_nothing_enabled_is_kept() {
        let filter = Filter::new(FilterKey::global(2), "Ranges only")
            .with_action("rangeblock", Vec::<String>::new());
        let store = Arc::new(MemoryStore::default());

        let map = lookup(store).get_consequences_for_filters(&[filter]);
        assert!(map[&FilterKey::global(2)].is_empty());
    }

    #[test]
    fn test_load_skips_inactive_and_missing() {
        let store = Arc::new(MemoryStore::default());
        let mut disabled = Filter::new(FilterKey::local(2), "Off");
        disabled.enabled = false;
        let mut deleted = Filter::new(FilterKey::local(3), "Gone");
        deleted.deleted = true;
        for filter in [Filter::new(FilterKey::local(1), "On"), disabled, deleted] {
            store.save_filter(&filter).unwrap();
        }

        let keys = [
            FilterKey::local(1),
            FilterKey::local(2),
            FilterKey::local(3),
            FilterKey::local(4),
        ];
        let loaded = lookup(store).load_filters(&keys).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key, FilterKey::local(1));
    }
}
