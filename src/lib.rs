//! AbuseFilter - consequence resolution and execution for wiki abuse filters
//!
//! When one or more filters match a user action, the engine resolves the
//! consequences they declare into a consistent set, executes them against the
//! wiki's stores, records the hit in the abuse log and reports a Status the
//! caller uses to allow or reject the action.

pub mod abuse_log;
pub mod cli;
pub mod config;
pub mod consequences;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod filter;
pub mod filter_user;
pub mod parameters;
pub mod revert;
pub mod status;
pub mod storage;
pub mod stores;

#[cfg(test)]
mod test_support;

pub use engine::{AbuseFilterEngine, FilterHit, HitOutcome};
pub use error::{AbuseFilterError, Result};
