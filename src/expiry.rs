//! Block and restriction expiries
//!
//! Filters declare durations as free-form strings ("4 hours", "1 week",
//! "infinite", "2h", an RFC 3339 timestamp). They are resolved against a
//! reference time so that declarations from different filters can be compared.

use crate::error::{AbuseFilterError, Result};
use chrono::{DateTime, Duration, Months, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(\d+)\s*(s|secs?|seconds?|m|mins?|minutes?|h|hrs?|hours?|d|days?|w|weeks?|months?|y|years?)$",
    )
    .expect("relative duration regex is valid")
});

const INFINITE_WORDS: &[&str] = &["infinite", "indefinite", "infinity", "never"];

/// Resolved end of a restriction. `Infinite` orders after every finite time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expiry {
    At(DateTime<Utc>),
    Infinite,
}

impl Expiry {
    /// Parse a declared duration relative to `now`
    pub fn parse(input: &str, now: DateTime<Utc>) -> Result<Self> {
        let trimmed = input.trim();
        if INFINITE_WORDS
            .iter()
            .any(|w| trimmed.eq_ignore_ascii_case(w))
        {
            return Ok(Expiry::Infinite);
        }

        if let Some(caps) = RELATIVE.captures(trimmed) {
            let amount: u32 = caps[1]
                .parse()
                .map_err(|_| AbuseFilterError::InvalidExpiry(input.to_string()))?;
            if amount == 0 {
                return Err(AbuseFilterError::InvalidExpiry(input.to_string()));
            }
            let unit = caps[2].to_ascii_lowercase();
            let end = match unit.chars().next() {
                Some('s') => now.checked_add_signed(Duration::seconds(amount.into())),
                Some('m') if unit.starts_with("mo") => now.checked_add_months(Months::new(amount)),
                Some('m') => now.checked_add_signed(Duration::minutes(amount.into())),
                Some('h') => now.checked_add_signed(Duration::hours(amount.into())),
                Some('d') => now.checked_add_signed(Duration::days(amount.into())),
                Some('w') => now.checked_add_signed(Duration::weeks(amount.into())),
                Some('y') => amount
                    .checked_mul(12)
                    .and_then(|months| now.checked_add_months(Months::new(months))),
                _ => None,
            };
            return end
                .map(Expiry::At)
                .ok_or_else(|| AbuseFilterError::InvalidExpiry(input.to_string()));
        }

        match DateTime::parse_from_rfc3339(trimmed) {
            Ok(at) if at.with_timezone(&Utc) > now => Ok(Expiry::At(at.with_timezone(&Utc))),
            _ => Err(AbuseFilterError::InvalidExpiry(input.to_string())),
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Expiry::Infinite)
    }

    /// Whether the restriction is no longer in force at `now`
    pub fn has_passed(&self, now: DateTime<Utc>) -> bool {
        match self {
            Expiry::At(at) => *at <= now,
            Expiry::Infinite => false,
        }
    }

    /// Storage form: "infinity" or an RFC 3339 timestamp
    pub fn to_db_string(&self) -> String {
        match self {
            Expiry::At(at) => at.to_rfc3339(),
            Expiry::Infinite => "infinity".to_string(),
        }
    }

    pub fn from_db_string(value: &str) -> Result<Self> {
        if value == "infinity" {
            return Ok(Expiry::Infinite);
        }
        DateTime::parse_from_rfc3339(value)
            .map(|at| Expiry::At(at.with_timezone(&Utc)))
            .map_err(|_| AbuseFilterError::InvalidExpiry(value.to_string()))
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiry::At(at) => write!(f, "{}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            Expiry::Infinite => write!(f, "infinite"),
        }
    }
}
