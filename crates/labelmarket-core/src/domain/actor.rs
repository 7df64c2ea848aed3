//! Actor - 認証済みの呼び出し元と権限チェック
//!
//! JWT の検証は API 層の責務です。ここでは検証済みの (user_id, role) だけを扱います。

use serde::{Deserialize, Serialize};

use super::errors::LeaseError;
use super::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Labeler,
    Admin,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Allowed if admin or equal to any of `owners`.
    pub fn ensure_any_of(&self, owners: &[UserId], msg: &str) -> Result<(), LeaseError> {
        if owners.iter().any(|owner| is_allowed(self.role, self.user_id, *owner)) {
            Ok(())
        } else {
            Err(LeaseError::forbidden(msg))
        }
    }

    pub fn ensure_admin(&self, msg: &str) -> Result<(), LeaseError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(LeaseError::forbidden(msg))
        }
    }
}

/// Capability check shared by every operation: admins may act on anything,
/// everyone else only on resources they own.
pub fn is_allowed(role: Role, caller: UserId, owner: UserId) -> bool {
    role == Role::Admin || caller == owner
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::owner(Role::Labeler, true, true)]
    #[case::stranger(Role::Labeler, false, false)]
    #[case::admin_stranger(Role::Admin, false, true)]
    #[case::client_owner(Role::Client, true, true)]
    fn capability_check(#[case] role: Role, #[case] is_owner: bool, #[case] expected: bool) {
        let owner = UserId::random();
        let caller = if is_owner { owner } else { UserId::random() };
        assert_eq!(is_allowed(role, caller, owner), expected);
    }

    #[test]
    fn ensure_any_of_accepts_either_party() {
        let client = UserId::random();
        let labeler = UserId::random();
        let actor = Actor::new(labeler, Role::Labeler);

        assert!(actor.ensure_any_of(&[client, labeler], "no access").is_ok());
        assert!(matches!(
            actor.ensure_any_of(&[client], "no access"),
            Err(LeaseError::Forbidden(msg)) if msg == "no access"
        ));
    }
}
