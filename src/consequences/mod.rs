//! Consequences a matched filter can take, and the machinery that decides
//! which of them actually run.
//!
//! Each variant follows `constructed -> executed -> [reverted]`. Instances are
//! bound to one filtered action and hold nothing but their constructor inputs.

mod block;
mod block_autopromote;
mod degroup;
mod disallow;
mod executor;
mod factory;
mod lookup;
mod range_block;
mod registry;
mod tag;
mod throttle;
mod warn;

pub use block::{Block, BlockParams};
pub use block_autopromote::BlockAutopromote;
pub use degroup::Degroup;
pub use disallow::Disallow;
pub use executor::{ConsequencesExecutor, ExecutionResult};
pub use factory::{Constructor, ConsequencesFactory};
pub use lookup::ConsequencesLookup;
pub use range_block::RangeBlock;
pub use registry::ConsequencesRegistry;
pub use tag::Tag;
pub use throttle::Throttle;
pub use warn::Warn;

use crate::parameters::{Parameters, UserIdentity, VariableHolder};
use crate::status::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of consequence kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsequenceKind {
    Warn,
    Disallow,
    Block,
    RangeBlock,
    Degroup,
    Tag,
    Throttle,
    BlockAutopromote,
}

impl ConsequenceKind {
    pub const ALL: [ConsequenceKind; 8] = [
        ConsequenceKind::Warn,
        ConsequenceKind::Disallow,
        ConsequenceKind::Block,
        ConsequenceKind::RangeBlock,
        ConsequenceKind::Degroup,
        ConsequenceKind::Tag,
        ConsequenceKind::Throttle,
        ConsequenceKind::BlockAutopromote,
    ];

    /// Name used in filter declarations
    pub fn name(&self) -> &'static str {
        match self {
            ConsequenceKind::Warn => "warn",
            ConsequenceKind::Disallow => "disallow",
            ConsequenceKind::Block => "block",
            ConsequenceKind::RangeBlock => "rangeblock",
            ConsequenceKind::Degroup => "degroup",
            ConsequenceKind::Tag => "tag",
            ConsequenceKind::Throttle => "throttle",
            ConsequenceKind::BlockAutopromote => "blockautopromote",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Whether a consequence of this kind contributes an abort message
    pub fn aborts_action(&self) -> bool {
        !matches!(self, ConsequenceKind::Tag | ConsequenceKind::Throttle)
    }

    pub fn is_reversible(&self) -> bool {
        matches!(
            self,
            ConsequenceKind::Block | ConsequenceKind::RangeBlock | ConsequenceKind::Degroup
        )
    }
}

impl fmt::Display for ConsequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Audit information a revert is checked against
#[derive(Debug, Clone)]
pub struct RevertInfo {
    pub log_id: i64,
    /// User the logged hit was attributed to
    pub user: UserIdentity,
    /// Variables computed at hit time
    pub vars: VariableHolder,
    pub timestamp: DateTime<Utc>,
}

/// One resolvable side effect of a filter match
pub enum Consequence {
    Warn(Warn),
    Disallow(Disallow),
    Block(Block),
    RangeBlock(RangeBlock),
    Degroup(Degroup),
    Tag(Tag),
    Throttle(Throttle),
    BlockAutopromote(BlockAutopromote),
}

impl Consequence {
    pub fn kind(&self) -> ConsequenceKind {
        match self {
            Consequence::Warn(_) => ConsequenceKind::Warn,
            Consequence::Disallow(_) => ConsequenceKind::Disallow,
            Consequence::Block(_) => ConsequenceKind::Block,
            Consequence::RangeBlock(_) => ConsequenceKind::RangeBlock,
            Consequence::Degroup(_) => ConsequenceKind::Degroup,
            Consequence::Tag(_) => ConsequenceKind::Tag,
            Consequence::Throttle(_) => ConsequenceKind::Throttle,
            Consequence::BlockAutopromote(_) => ConsequenceKind::BlockAutopromote,
        }
    }

    pub fn parameters(&self) -> &Parameters {
        match self {
            Consequence::Warn(c) => c.parameters(),
            Consequence::Disallow(c) => c.parameters(),
            Consequence::Block(c) => c.parameters(),
            Consequence::RangeBlock(c) => c.parameters(),
            Consequence::Degroup(c) => c.parameters(),
            Consequence::Tag(c) => c.parameters(),
            Consequence::Throttle(c) => c.parameters(),
            Consequence::BlockAutopromote(c) => c.parameters(),
        }
    }

    /// Apply the side effect. False means it did not apply; never fatal.
    pub fn execute(&self) -> bool {
        match self {
            Consequence::Warn(c) => c.execute(),
            Consequence::Disallow(c) => c.execute(),
            Consequence::Block(c) => c.execute(),
            Consequence::RangeBlock(c) => c.execute(),
            Consequence::Degroup(c) => c.execute(),
            Consequence::Tag(c) => c.execute(),
            Consequence::Throttle(c) => c.execute(),
            Consequence::BlockAutopromote(c) => c.execute(),
        }
    }

    /// Hook-abort message, for kinds that stop the filtered action
    pub fn message(&self) -> Option<Message> {
        match self {
            Consequence::Warn(c) => Some(c.message()),
            Consequence::Disallow(c) => Some(c.message()),
            Consequence::Block(c) => Some(c.message()),
            Consequence::RangeBlock(c) => Some(c.message()),
            Consequence::Degroup(c) => Some(c.message()),
            Consequence::BlockAutopromote(c) => Some(c.message()),
            Consequence::Tag(_) | Consequence::Throttle(_) => None,
        }
    }

    /// Undo the side effect. Kinds that cannot be reverted return false.
    pub fn revert(&self, info: &RevertInfo, performer: &UserIdentity, reason: &str) -> bool {
        match self {
            Consequence::Block(c) => c.revert(info, performer, reason),
            Consequence::RangeBlock(c) => c.revert(info, performer, reason),
            Consequence::Degroup(c) => c.revert(info, performer, reason),
            _ => false,
        }
    }
}

impl fmt::Debug for Consequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consequence")
            .field("kind", &self.kind())
            .field("filter", &self.parameters().filter_token())
            .field("user", &self.parameters().user().name)
            .finish()
    }
}

/// `[name, token]` parameters shared by every filter-attributed message
pub(crate) fn filter_message_params(params: &Parameters) -> Vec<String> {
    vec![params.filter().name.clone(), params.filter_token()]
}

/// Reason recorded on side effects performed for a filter
pub(crate) fn filter_reason(summary: &str, params: &Parameters) -> String {
    format!(
        "{} by the abuse filter. Description of matched rule: {}",
        summary,
        params.filter().name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in ConsequenceKind::ALL {
            assert_eq!(ConsequenceKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ConsequenceKind::from_name("smite"), None);
    }

    #[test]
    fn test_kind_traits() {
        assert!(!ConsequenceKind::Tag.aborts_action());
        assert!(!ConsequenceKind::Throttle.aborts_action());
        assert!(ConsequenceKind::BlockAutopromote.aborts_action());
        assert!(ConsequenceKind::Degroup.is_reversible());
        assert!(!ConsequenceKind::BlockAutopromote.is_reversible());
    }
}
