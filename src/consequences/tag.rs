use crate::parameters::Parameters;
use crate::stores::TagStore;
use std::sync::Arc;

/// Attaches change tags to the change the action produces
pub struct Tag {
    params: Parameters,
    specifier: String,
    tags: Vec<String>,
    store: Arc<dyn TagStore>,
}

impl Tag {
    pub fn new(
        params: Parameters,
        specifier: String,
        tags: Vec<String>,
        store: Arc<dyn TagStore>,
    ) -> Self {
        Self {
            params,
            specifier,
            tags,
            store,
        }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn execute(&self) -> bool {
        if self.tags.is_empty() {
            return false;
        }
        match self.store.add_tags(&self.specifier, &self.tags) {
            Ok(()) => {
                tracing::debug!("Tagged {} with [{}]", self.specifier, self.tags.join(", "));
                true
            }
            Err(e) => {
                tracing::warn!("Failed to tag {}: {}", self.specifier, e);
                false
            }
        }
    }
}
