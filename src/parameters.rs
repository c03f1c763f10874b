//! Per-hit context handed to consequences

use crate::error::{AbuseFilterError, Result};
use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Kind of action that was filtered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Edit,
    Move,
    Delete,
    CreateAccount,
    Upload,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Edit => "edit",
            ActionKind::Move => "move",
            ActionKind::Delete => "delete",
            ActionKind::CreateAccount => "createaccount",
            ActionKind::Upload => "upload",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = AbuseFilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "edit" => Ok(ActionKind::Edit),
            "move" => Ok(ActionKind::Move),
            "delete" => Ok(ActionKind::Delete),
            "createaccount" => Ok(ActionKind::CreateAccount),
            "upload" => Ok(ActionKind::Upload),
            other => Err(AbuseFilterError::Config(format!(
                "Unknown action kind: {}",
                other
            ))),
        }
    }
}

/// A user as known to the stores. Anonymous users have id 0 and their IP as name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: u64,
    pub name: String,
}

impl UserIdentity {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn anonymous(ip: IpAddr) -> Self {
        Self {
            id: 0,
            name: ip.to_string(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == 0
    }
}

/// Computed variables of a filtered action, as produced by the rule evaluator.
///
/// Only a few variables are read here (`user_groups`, `user_editcount`,
/// `user_age`); the rest are carried into the audit dump untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableHolder {
    vars: BTreeMap<String, serde_json::Value>,
}

impl VariableHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.vars.get(name)
    }

    /// String-list variable; missing or mistyped values read as empty
    pub fn get_string_list(&self, name: &str) -> Vec<String> {
        match self.vars.get(name) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.vars.get(name).and_then(|v| v.as_u64())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AbuseFilterError::Json {
            source: e,
            context: "Failed to serialize variable dump".to_string(),
        })
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| AbuseFilterError::Json {
            source: e,
            context: "Failed to deserialize variable dump".to_string(),
        })
    }
}

/// Everything known about one filtered action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitContext {
    pub user: UserIdentity,
    /// Page the action targets
    pub target: String,
    pub action: ActionKind,
    pub request_ip: IpAddr,
    /// Account being created, for `createaccount`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default)]
    pub vars: VariableHolder,
}

impl HitContext {
    /// Key under which tags for the resulting change are collected
    pub fn action_specifier(&self) -> String {
        let name = self.account_name.as_deref().unwrap_or(&self.user.name);
        format!("{}-{}-by-{}", self.action, self.target, name)
    }
}

/// Immutable per-(filter, action) parameters for a consequence
#[derive(Debug, Clone)]
pub struct Parameters {
    filter: Filter,
    is_global_filter: bool,
    user: UserIdentity,
    target: String,
    action: ActionKind,
}

impl Parameters {
    pub fn new(
        filter: Filter,
        is_global_filter: bool,
        user: UserIdentity,
        target: impl Into<String>,
        action: ActionKind,
    ) -> Self {
        Self {
            filter,
            is_global_filter,
            user,
            target: target.into(),
            action,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn is_global_filter(&self) -> bool {
        self.is_global_filter
    }

    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn action(&self) -> ActionKind {
        self.action
    }

    /// Filter token used in user-facing messages: `global-<id>` or `<id>`
    pub fn filter_token(&self) -> String {
        self.filter.key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterKey;

    #[test]
    fn test_action_kind_roundtrip() {
        for kind in [
            ActionKind::Edit,
            ActionKind::Move,
            ActionKind::Delete,
            ActionKind::CreateAccount,
            ActionKind::Upload,
        ] {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert!("purge".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_anonymous_user() {
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let anon = UserIdentity::anonymous(ip);
        assert!(anon.is_anonymous());
        assert_eq!(anon.name, "203.0.113.9");
        assert!(!UserIdentity::new(4, "Alice").is_anonymous());
    }

    #[test]
    fn test_variable_holder_lists() {
        let mut vars = VariableHolder::new();
        vars.set("user_groups", serde_json::json!(["*", "user", "sysop"]));
        vars.set("user_editcount", 12);
        vars.set("new_wikitext", "hello");

        assert_eq!(vars.get_string_list("user_groups"), vec!["*", "user", "sysop"]);
        assert!(vars.get_string_list("new_wikitext").is_empty());
        assert_eq!(vars.get_u64("user_editcount"), Some(12));

        let restored = VariableHolder::from_json(&vars.to_json().unwrap()).unwrap();
        assert_eq!(restored, vars);
    }

    #[test]
    fn test_action_specifier() {
        let ctx = HitContext {
            user: UserIdentity::new(3, "Alice"),
            target: "Main Page".to_string(),
            action: ActionKind::Edit,
            request_ip: "198.51.100.1".parse().unwrap(),
            account_name: None,
            vars: VariableHolder::new(),
        };
        assert_eq!(ctx.action_specifier(), "edit-Main Page-by-Alice");
    }

    #[test]
    fn test_filter_token() {
        let params = Parameters::new(
            Filter::new(FilterKey::global(7), "Spam"),
            true,
            UserIdentity::new(1, "Bob"),
            "Sandbox",
            ActionKind::Move,
        );
        assert_eq!(params.filter_token(), "global-7");
        assert!(params.is_global_filter());
    }
}
