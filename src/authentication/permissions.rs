use crate::error::Error;
use crate::jwt::SessionData;
use crate::schema::Uuid;

/// Closed set of access policies. Each is a pure predicate over the caller
/// identity and whether the operation writes; no hidden state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Anyone may read; nobody may write.
    ReadOnly,
    /// Reads are open; writes require the record owner or an admin.
    OwnerOrAdmin { owner_id: Uuid },
    /// Reads are open; writes require the user themselves or an admin.
    SelfOrAdmin { user_id: Uuid },
    /// Staff/superuser identities only, for reads and writes alike.
    AdminOnly,
}

impl Policy {
    pub fn allows(&self, session: Option<&SessionData>, write: bool) -> bool {
        let is_admin = session.map(|s| s.is_admin()).unwrap_or(false);

        match self {
            Policy::ReadOnly => !write,
            Policy::OwnerOrAdmin { owner_id } => {
                !write || is_admin || session.map(|s| s.user_id == *owner_id).unwrap_or(false)
            }
            Policy::SelfOrAdmin { user_id } => {
                !write || is_admin || session.map(|s| s.user_id == *user_id).unwrap_or(false)
            }
            Policy::AdminOnly => is_admin,
        }
    }
}

pub fn authorize(policy: Policy, session: Option<&SessionData>, write: bool) -> Result<(), Error> {
    if policy.allows(session, write) {
        Ok(())
    } else {
        Err(Error::PermissionDenied(String::from(
            "You don't have permission to perform this action",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: Uuid, is_staff: bool) -> SessionData {
        SessionData {
            user_id,
            username: format!("user-{user_id}"),
            is_staff,
            is_superuser: false,
        }
    }

    #[test]
    fn reads_are_open_to_anyone() {
        assert!(Policy::OwnerOrAdmin { owner_id: 1 }.allows(None, false));
        assert!(Policy::SelfOrAdmin { user_id: 1 }.allows(None, false));
        assert!(Policy::ReadOnly.allows(None, false));
    }

    #[test]
    fn non_owner_cannot_write_a_recipe() {
        let other = session(2, false);
        let policy = Policy::OwnerOrAdmin { owner_id: 1 };

        assert!(!policy.allows(Some(&other), true));
        assert!(policy.allows(Some(&other), false));
        assert!(authorize(policy, Some(&other), true).is_err());
    }

    #[test]
    fn owner_and_admin_can_write() {
        let owner = session(1, false);
        let admin = session(9, true);
        let policy = Policy::OwnerOrAdmin { owner_id: 1 };

        assert!(policy.allows(Some(&owner), true));
        assert!(policy.allows(Some(&admin), true));
    }

    #[test]
    fn self_or_admin_guards_user_records() {
        let me = session(4, false);
        let stranger = session(5, false);
        let policy = Policy::SelfOrAdmin { user_id: 4 };

        assert!(policy.allows(Some(&me), true));
        assert!(!policy.allows(Some(&stranger), true));
    }

    #[test]
    fn admin_only_denies_everyone_else() {
        let user = session(3, false);
        let admin = session(6, true);

        assert!(!Policy::AdminOnly.allows(Some(&user), false));
        assert!(!Policy::AdminOnly.allows(None, false));
        assert!(Policy::AdminOnly.allows(Some(&admin), true));
    }
}
