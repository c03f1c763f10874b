use super::{filter_message_params, filter_reason, RevertInfo};
use crate::config::BlockConfig;
use crate::expiry::Expiry;
use crate::filter_user::FilterUser;
use crate::parameters::{Parameters, UserIdentity};
use crate::status::Message;
use crate::stores::{BlockPlacement, BlockRequest, BlockStore, BlockTarget};
use chrono::{DateTime, Utc};
use std::sync::Arc;

const BLOCKTALK: &str = "blocktalk";

/// Declared block parameters: `[("blocktalk")?, anon_duration, registered_duration]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockParams {
    pub prevent_talk_edit: bool,
    pub anon_duration: String,
    pub user_duration: String,
}

impl BlockParams {
    /// Parse raw parameters. Filters that declare no durations get the
    /// configured defaults; a single duration applies to everyone.
    pub fn parse(raw: &[String], defaults: &BlockConfig) -> Self {
        let prevent_talk_edit = raw.first().map(String::as_str) == Some(BLOCKTALK);
        let rest = if prevent_talk_edit { &raw[1..] } else { raw };

        let (anon_duration, user_duration) = match rest {
            [] => (defaults.anon_duration.clone(), defaults.user_duration.clone()),
            [both] => (both.clone(), both.clone()),
            [anon, user, ..] => (anon.clone(), user.clone()),
        };

        Self {
            prevent_talk_edit,
            anon_duration,
            user_duration,
        }
    }

    pub fn duration_for(&self, user: &UserIdentity) -> &str {
        if user.is_anonymous() {
            &self.anon_duration
        } else {
            &self.user_duration
        }
    }
}

/// Sitewide block of the user who triggered the filter
pub struct Block {
    params: Parameters,
    duration: String,
    prevent_talk_edit: bool,
    blocks: Arc<dyn BlockStore>,
    filter_user: Arc<FilterUser>,
}

impl Block {
    pub fn new(
        params: Parameters,
        block_params: BlockParams,
        blocks: Arc<dyn BlockStore>,
        filter_user: Arc<FilterUser>,
    ) -> Self {
        let duration = block_params.duration_for(params.user()).to_string();
        Self {
            params,
            duration,
            prevent_talk_edit: block_params.prevent_talk_edit,
            blocks,
            filter_user,
        }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Declared duration applying to this hit's user
    pub fn duration(&self) -> &str {
        &self.duration
    }

    pub fn prevents_talk_edit(&self) -> bool {
        self.prevent_talk_edit
    }

    pub fn resolved_expiry(&self, now: DateTime<Utc>) -> crate::error::Result<Expiry> {
        Expiry::parse(&self.duration, now)
    }

    pub fn target(&self) -> BlockTarget {
        BlockTarget::for_user(self.params.user())
    }

    pub fn execute(&self) -> bool {
        let expiry = match self.resolved_expiry(Utc::now()) {
            Ok(expiry) => expiry,
            Err(e) => {
                tracing::warn!(
                    "Filter {} declares an unusable block duration: {}",
                    self.params.filter_token(),
                    e
                );
                return false;
            }
        };
        place_block(
            self.blocks.as_ref(),
            &self.filter_user,
            &self.params,
            self.target(),
            expiry,
            self.prevent_talk_edit,
        )
    }

    pub fn message(&self) -> Message {
        Message::new("abusefilter-blocked-display", filter_message_params(&self.params))
    }

    /// Lift the block, but only if the block currently in force was placed
    /// by the filter user at or before the logged hit
    pub fn revert(&self, info: &RevertInfo, performer: &UserIdentity, reason: &str) -> bool {
        lift_own_block(
            self.blocks.as_ref(),
            &self.filter_user,
            &self.target(),
            info,
            performer,
            reason,
        )
    }
}

/// Place a block attributed to the filter user; false on any failure
pub(super) fn place_block(
    blocks: &dyn BlockStore,
    filter_user: &FilterUser,
    params: &Parameters,
    target: BlockTarget,
    expiry: Expiry,
    prevent_talk_edit: bool,
) -> bool {
    let performer = match filter_user.identity() {
        Ok(user) => user.clone(),
        Err(e) => {
            tracing::warn!("Cannot block {}: filter user unavailable: {}", target, e);
            return false;
        }
    };

    let request = BlockRequest {
        target,
        performer,
        reason: filter_reason("Automatically blocked", params),
        expiry,
        prevent_talk_edit,
    };

    match blocks.place_block(&request) {
        Ok(BlockPlacement::Placed(record)) => {
            tracing::info!(
                "Filter {} blocked {} until {}",
                params.filter_token(),
                record.target,
                record.expiry
            );
            true
        }
        Ok(BlockPlacement::Kept(existing)) => {
            tracing::info!(
                "Filter {}: {} is already blocked until {}, keeping that block",
                params.filter_token(),
                existing.target,
                existing.expiry
            );
            false
        }
        Err(e) => {
            tracing::warn!(
                "Filter {} failed to block {}: {}",
                params.filter_token(),
                request.target,
                e
            );
            false
        }
    }
}

/// Remove the active block on `target` if the filter user placed it no
/// later than the hit recorded in `info`. A newer block belongs to a later
/// hit and is left for that hit's own revert.
pub(super) fn lift_own_block(
    blocks: &dyn BlockStore,
    filter_user: &FilterUser,
    target: &BlockTarget,
    info: &RevertInfo,
    performer: &UserIdentity,
    reason: &str,
) -> bool {
    let active = match blocks.active_block(target) {
        Ok(Some(block)) => block,
        Ok(None) => return false,
        Err(e) => {
            tracing::warn!("Cannot read block on {}: {}", target, e);
            return false;
        }
    };

    if !filter_user.is_filter_user(&active.performer) {
        tracing::info!(
            "Block on {} was placed by {}, leaving it alone",
            target,
            active.performer.name
        );
        return false;
    }
    if active.created_at > info.timestamp {
        tracing::info!(
            "Block #{} on {} postdates log entry {}, leaving it alone",
            active.id,
            target,
            info.log_id
        );
        return false;
    }

    match blocks.remove_block(target, performer, reason) {
        Ok(removed) => removed,
        Err(e) => {
            tracing::warn!("Failed to unblock {}: {}", target, e);
            false
        }
    }
}
