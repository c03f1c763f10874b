use super::block::{lift_own_block, place_block};
use super::{filter_message_params, RevertInfo};
use crate::config::RangeBlockConfig;
use crate::expiry::Expiry;
use crate::filter_user::FilterUser;
use crate::parameters::{Parameters, UserIdentity};
use crate::status::Message;
use crate::stores::{BlockStore, BlockTarget};
use chrono::Utc;
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;

/// Block of the CIDR range around the request IP
pub struct RangeBlock {
    params: Parameters,
    request_ip: IpAddr,
    ipv4_prefix: u8,
    ipv6_prefix: u8,
    duration: String,
    blocks: Arc<dyn BlockStore>,
    filter_user: Arc<FilterUser>,
}

impl RangeBlock {
    pub fn new(
        params: Parameters,
        request_ip: IpAddr,
        config: &RangeBlockConfig,
        blocks: Arc<dyn BlockStore>,
        filter_user: Arc<FilterUser>,
    ) -> Self {
        // Never wider than the block store accepts
        Self {
            params,
            request_ip,
            ipv4_prefix: config.ipv4_prefix.max(config.core_ipv4_limit),
            ipv6_prefix: config.ipv6_prefix.max(config.core_ipv6_limit),
            duration: config.duration.clone(),
            blocks,
            filter_user,
        }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Range the block applies to, or None for a prefix the address family
    /// cannot hold
    pub fn range(&self) -> Option<IpNet> {
        let prefix = match self.request_ip {
            IpAddr::V4(_) => self.ipv4_prefix,
            IpAddr::V6(_) => self.ipv6_prefix,
        };
        IpNet::new(self.request_ip, prefix).ok().map(|net| net.trunc())
    }

    pub fn execute(&self) -> bool {
        let Some(range) = self.range() else {
            tracing::warn!(
                "Filter {}: no valid range around {}",
                self.params.filter_token(),
                self.request_ip
            );
            return false;
        };
        let expiry = match Expiry::parse(&self.duration, Utc::now()) {
            Ok(expiry) => expiry,
            Err(e) => {
                tracing::warn!("Range block duration is unusable: {}", e);
                return false;
            }
        };
        place_block(
            self.blocks.as_ref(),
            &self.filter_user,
            &self.params,
            BlockTarget::Range(range),
            expiry,
            false,
        )
    }

    pub fn message(&self) -> Message {
        Message::new("abusefilter-blocked-display", filter_message_params(&self.params))
    }

    pub fn revert(&self, info: &RevertInfo, performer: &UserIdentity, reason: &str) -> bool {
        match self.range() {
            Some(range) => lift_own_block(
                self.blocks.as_ref(),
                &self.filter_user,
                &BlockTarget::Range(range),
                info,
                performer,
                reason,
            ),
            None => false,
        }
    }
}
