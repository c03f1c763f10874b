use super::{filter_message_params, filter_reason, RevertInfo};
use crate::filter_user::FilterUser;
use crate::parameters::{Parameters, UserIdentity, VariableHolder};
use crate::status::Message;
use crate::stores::GroupStore;
use std::sync::Arc;

const USER_GROUPS_VAR: &str = "user_groups";

/// Removes the user from every explicit group they held at hit time
pub struct Degroup {
    params: Parameters,
    vars: VariableHolder,
    implicit_groups: Vec<String>,
    groups: Arc<dyn GroupStore>,
    filter_user: Arc<FilterUser>,
}

impl Degroup {
    pub fn new(
        params: Parameters,
        vars: VariableHolder,
        implicit_groups: Vec<String>,
        groups: Arc<dyn GroupStore>,
        filter_user: Arc<FilterUser>,
    ) -> Self {
        Self {
            params,
            vars,
            implicit_groups,
            groups,
            filter_user,
        }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn explicit_groups(&self, vars: &VariableHolder) -> Vec<String> {
        vars.get_string_list(USER_GROUPS_VAR)
            .into_iter()
            .filter(|g| !self.implicit_groups.contains(g))
            .collect()
    }

    pub fn execute(&self) -> bool {
        let user = self.params.user();
        if user.is_anonymous() {
            return false;
        }

        let performer = match self.filter_user.identity() {
            Ok(performer) => performer.clone(),
            Err(e) => {
                tracing::warn!("Cannot degroup {}: {}", user.name, e);
                return false;
            }
        };

        let current = match self.groups.user_groups(user) {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!("Cannot read groups of {}: {}", user.name, e);
                return false;
            }
        };

        let to_remove: Vec<String> = self
            .explicit_groups(&self.vars)
            .into_iter()
            .filter(|g| current.contains(g))
            .collect();
        if to_remove.is_empty() {
            tracing::debug!("{} holds no groups to remove", user.name);
            return false;
        }

        let mut removed = Vec::new();
        for group in &to_remove {
            match self.groups.remove_user_from_group(user, group, &performer) {
                Ok(true) => removed.push(group.as_str()),
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to remove {} from {}: {}", user.name, group, e),
            }
        }

        if removed.is_empty() {
            return false;
        }
        tracing::info!(
            "{}: removed {} from groups [{}]",
            filter_reason("Degrouped", &self.params),
            user.name,
            removed.join(", ")
        );
        true
    }

    pub fn message(&self) -> Message {
        Message::new("abusefilter-degrouped", filter_message_params(&self.params))
    }

    /// Restore the groups recorded in the audit snapshot that the user no
    /// longer holds. Groups added back by someone else are left as they are.
    pub fn revert(&self, info: &RevertInfo, performer: &UserIdentity, reason: &str) -> bool {
        let user = self.params.user();
        if user.is_anonymous() {
            return false;
        }

        let current = match self.groups.user_groups(user) {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!("Cannot read groups of {}: {}", user.name, e);
                return false;
            }
        };

        let mut restored = false;
        for group in self.explicit_groups(&info.vars) {
            if current.contains(&group) {
                continue;
            }
            match self.groups.add_user_to_group(user, &group, performer) {
                Ok(added) => {
                    if added {
                        tracing::info!("Restored {} to {} ({})", user.name, group, reason);
                    }
                    restored |= added;
                }
                Err(e) => tracing::warn!("Failed to restore {} to {}: {}", user.name, group, e),
            }
        }
        restored
    }
}
