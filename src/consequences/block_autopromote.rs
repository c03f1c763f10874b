use super::filter_message_params;
use crate::filter_user::FilterUser;
use crate::parameters::Parameters;
use crate::status::Message;
use crate::stores::AutopromoteStore;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Temporarily bars the user from automatic group promotion
pub struct BlockAutopromote {
    params: Parameters,
    days: u32,
    store: Arc<dyn AutopromoteStore>,
    filter_user: Arc<FilterUser>,
}

impl BlockAutopromote {
    /// `raw[0]`, when a positive number of days, overrides `default_days`
    pub fn new(
        params: Parameters,
        raw: &[String],
        default_days: u32,
        store: Arc<dyn AutopromoteStore>,
        filter_user: Arc<FilterUser>,
    ) -> Self {
        let days = raw
            .first()
            .and_then(|d| d.trim().parse::<u32>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(default_days);
        Self {
            params,
            days,
            store,
            filter_user,
        }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn execute(&self) -> bool {
        let user = self.params.user();
        if user.is_anonymous() {
            return false;
        }
        let performer = match self.filter_user.identity() {
            Ok(performer) => performer,
            Err(e) => {
                tracing::warn!("Cannot block autopromotion of {}: {}", user.name, e);
                return false;
            }
        };

        let Some(until) = Duration::try_days(i64::from(self.days))
            .and_then(|days| Utc::now().checked_add_signed(days))
        else {
            tracing::warn!(
                "Filter {}: autopromotion ban of {} days is out of range",
                self.params.filter_token(),
                self.days
            );
            return false;
        };
        match self.store.block_autopromote(user, until, performer) {
            Ok(()) => {
                tracing::info!(
                    "Filter {} blocked autopromotion of {} for {} days",
                    self.params.filter_token(),
                    user.name,
                    self.days
                );
                true
            }
            Err(e) => {
                tracing::warn!("Failed to block autopromotion of {}: {}", user.name, e);
                false
            }
        }
    }

    pub fn message(&self) -> Message {
        Message::new("abusefilter-autopromote-blocked", filter_message_params(&self.params))
    }
}
