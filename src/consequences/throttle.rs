use crate::config::ThrottleConfig;
use crate::deferred::DeferredUpdates;
use crate::error::{AbuseFilterError, Result};
use crate::parameters::{HitContext, Parameters};
use crate::stores::ThrottleStore;
use chrono::{DateTime, Duration, Utc};
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;

/// Longest accepted throttle window, one year
pub const MAX_PERIOD_SECS: u64 = 365 * 24 * 60 * 60;

/// Rate limit declaration: `count` hits per `period_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleRate {
    pub count: u64,
    pub period_secs: u64,
}

impl ThrottleRate {
    /// Parse the `"count,period"` parameter. The period must be positive
    /// and no longer than [`MAX_PERIOD_SECS`].
    pub fn parse(raw: &str) -> Option<Self> {
        let (count, period) = raw.split_once(',')?;
        let count = count.trim().parse().ok()?;
        let period_secs: u64 = period.trim().parse().ok()?;
        if period_secs == 0 || period_secs > MAX_PERIOD_SECS {
            return None;
        }
        Some(Self { count, period_secs })
    }

    pub fn period(&self) -> Option<Duration> {
        Duration::try_seconds(i64::try_from(self.period_secs).ok()?)
    }
}

/// Rate limiter for a filter's own hits. Once a group reaches the declared
/// rate, the filter's other consequences are suppressed for the hit.
pub struct Throttle {
    params: Parameters,
    throttle_id: String,
    rate: ThrottleRate,
    groups: Vec<String>,
    context: HitContext,
    range_prefixes: (u8, u8),
    store: Arc<dyn ThrottleStore>,
    deferred: Arc<DeferredUpdates>,
}

impl Throttle {
    /// Build from `[throttle_id, "count,period", groups...]`
    pub fn new(
        params: Parameters,
        raw: &[String],
        context: HitContext,
        config: &ThrottleConfig,
        store: Arc<dyn ThrottleStore>,
        deferred: Arc<DeferredUpdates>,
    ) -> Result<Self> {
        let invalid = |message: &str| AbuseFilterError::InvalidParameters {
            filter: params.filter_token(),
            action: "throttle".to_string(),
            message: message.to_string(),
        };

        let [throttle_id, rate, groups @ ..] = raw else {
            return Err(invalid("expected an id and a rate"));
        };
        let rate = ThrottleRate::parse(rate).ok_or_else(|| invalid("rate must be \"count,period\""))?;
        let mut groups: Vec<String> = groups.iter().map(|g| g.trim().to_string()).collect();
        if groups.is_empty() {
            groups.push("site".to_string());
        }

        Ok(Self {
            params,
            throttle_id: throttle_id.clone(),
            rate,
            groups,
            context,
            range_prefixes: (config.range_ipv4_prefix, config.range_ipv6_prefix),
            store,
            deferred,
        })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn rate(&self) -> ThrottleRate {
        self.rate
    }

    /// Whether any group has reached its limit within the current window
    pub fn is_over_limit(&self) -> bool {
        let Some(since) = self
            .rate
            .period()
            .and_then(|period| Utc::now().checked_sub_signed(period))
        else {
            tracing::warn!(
                "Filter {}: throttle period {}s is out of range",
                self.params.filter_token(),
                self.rate.period_secs
            );
            return false;
        };
        self.keys().iter().any(|key| match self.store.hits_since(key, since) {
            Ok(hits) => hits >= self.rate.count,
            Err(e) => {
                tracing::warn!("Cannot read throttle counter {}: {}", key, e);
                false
            }
        })
    }

    /// Queue a hit on every group counter
    pub fn execute(&self) -> bool {
        let keys = self.keys();
        if keys.is_empty() {
            return false;
        }
        let now = Utc::now();
        for key in keys {
            let store = self.store.clone();
            self.deferred
                .push(format!("throttle hit {}", key), move || store.record_hit(&key, now));
        }
        true
    }

    /// Counter keys, one per declared group
    pub fn keys(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter_map(|group| {
                let identifier = self.group_identifier(group)?;
                Some(format!(
                    "throttle:{}:{}:{}:{}",
                    self.params.filter_token(),
                    self.throttle_id,
                    group,
                    identifier
                ))
            })
            .collect()
    }

    /// Identifier of this hit within a group. Combined groups join the
    /// identifiers of their parts; unknown parts disable the group.
    fn group_identifier(&self, group: &str) -> Option<String> {
        let parts: Option<Vec<String>> = group
            .split(',')
            .map(|part| self.part_identifier(part.trim()))
            .collect();
        match parts {
            Some(parts) => Some(parts.join(",")),
            None => {
                tracing::warn!(
                    "Filter {} declares unknown throttle group '{}'",
                    self.params.filter_token(),
                    group
                );
                None
            }
        }
    }

    fn part_identifier(&self, part: &str) -> Option<String> {
        let user = &self.context.user;
        let vars = &self.context.vars;
        match part {
            "ip" => Some(self.context.request_ip.to_string()),
            "user" => Some(user.id.to_string()),
            "range" => Some(self.range_of(self.context.request_ip)),
            "site" | "none" => Some(String::new()),
            "page" => Some(self.context.target.clone()),
            "creationdate" => Some(
                vars.get("user_registration")
                    .and_then(|v| v.as_str().map(str::to_string).or_else(|| Some(v.to_string())))
                    .unwrap_or_default(),
            ),
            "editcount" => Some(
                vars.get_u64("user_editcount")
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
            ),
            _ => None,
        }
    }

    fn range_of(&self, ip: IpAddr) -> String {
        let prefix = match ip {
            IpAddr::V4(_) => self.range_prefixes.0,
            IpAddr::V6(_) => self.range_prefixes.1,
        };
        IpNet::new(ip, prefix)
            .map(|net| net.trunc().to_string())
            .unwrap_or_else(|_| ip.to_string())
    }
}
