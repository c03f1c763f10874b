//! Post-response bookkeeping
//!
//! Hit-count increments and throttle counters must not delay the filtered
//! action, so they are queued here and run once the response is out. A failed
//! update is logged and dropped.

use crate::error::Result;
use std::sync::Mutex;

type Update = Box<dyn FnOnce() -> Result<()> + Send>;

/// Queue of named updates run after the response
#[derive(Default)]
pub struct DeferredUpdates {
    queue: Mutex<Vec<(String, Update)>>,
}

impl DeferredUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an update; `label` identifies it in failure logs
    pub fn push<F>(&self, label: impl Into<String>, update: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.push((label.into(), Box::new(update)));
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every queued update in order; returns how many failed
    pub fn run(&self) -> usize {
        let updates = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *queue)
        };

        let mut failures = 0;
        for (label, update) in updates {
            if let Err(e) = update() {
                failures += 1;
                tracing::error!("Deferred update '{}' failed: {}", label, e);
            }
        }
        failures
    }
}

impl std::fmt::Debug for DeferredUpdates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredUpdates")
            .field("pending", &self.len())
            .finish()
    }
}
