//! The system account that performs every consequence side effect
//!
//! Reverts compare a block's or group change's performer against this
//! identity to tell the engine's own actions apart from an administrator's.

use crate::error::Result;
use crate::parameters::UserIdentity;
use crate::stores::UserStore;
use once_cell::sync::OnceCell;
use std::sync::Arc;

pub struct FilterUser {
    name: String,
    users: Arc<dyn UserStore>,
    identity: OnceCell<UserIdentity>,
}

impl FilterUser {
    pub fn new(name: impl Into<String>, users: Arc<dyn UserStore>) -> Self {
        Self {
            name: name.into(),
            users,
            identity: OnceCell::new(),
        }
    }

    /// The account, created on first use and cached afterwards
    pub fn identity(&self) -> Result<&UserIdentity> {
        self.identity.get_or_try_init(|| {
            let user = self.users.find_or_create_system_user(&self.name)?;
            tracing::debug!("Filter user resolved to {} (#{})", user.name, user.id);
            Ok(user)
        })
    }

    /// Whether `performer` is this account. False when the account cannot be
    /// resolved, so callers never act on an unverifiable authorship.
    pub fn is_filter_user(&self, performer: &UserIdentity) -> bool {
        match self.identity() {
            Ok(me) => me.id == performer.id && me.name == performer.name,
            Err(e) => {
                tracing::warn!("Cannot resolve filter user: {}", e);
                false
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for FilterUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterUser")
            .field("name", &self.name)
            .field("identity", &self.identity.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AbuseFilterError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingUsers {
        calls: AtomicUsize,
        fail: bool,
    }

    impl UserStore for CountingUsers {
        fn find_or_create_system_user(&self, name: &str) -> Result<UserIdentity> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AbuseFilterError::Config("no user table".to_string()));
            }
            Ok(UserIdentity::new(42, name))
        }
    }

    #[test]
    fn test_identity_is_cached() {
        let users = Arc::new(CountingUsers {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let filter_user = FilterUser::new("Abuse filter", users.clone());

        assert_eq!(filter_user.identity().unwrap().id, 42);
        assert_eq!(filter_user.identity().unwrap().name, "Abuse filter");
        assert_eq!(users.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_is_filter_user() {
        let users = Arc::new(CountingUsers {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let filter_user = FilterUser::new("Abuse filter", users);

        assert!(filter_user.is_filter_user(&UserIdentity::new(42, "Abuse filter")));
        assert!(!filter_user.is_filter_user(&UserIdentity::new(7, "Admin")));
    }

    #[test]
    fn test_unresolvable_user_is_never_matched() {
        let users = Arc::new(CountingUsers {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let filter_user = FilterUser::new("Abuse filter", users);

        assert!(filter_user.identity().is_err());
        assert!(!filter_user.is_filter_user(&UserIdentity::new(42, "Abuse filter")));
    }
}
