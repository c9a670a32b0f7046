use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::ids::UserId;

pub const USER_ID_KEY: &str = "user_id";
pub const ROLE_KEY: &str = "role";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

impl Role {
    const fn rank(self) -> u8 {
        match self {
            Role::Student => 0,
            Role::Instructor => 1,
            Role::Admin => 2,
        }
    }
}

/// The authenticated identity passed into every core call. Built from the
/// session once at the edge so the core never reads request-scoped state.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub async fn from_session(session: &Session) -> Result<Self> {
        let user_id = session
            .get::<UserId>(USER_ID_KEY)
            .await
            .map_err(|e| Error::Session(e.to_string()))?
            .ok_or(Error::Unauthorized)?;
        let role = session
            .get::<Role>(ROLE_KEY)
            .await
            .map_err(|e| Error::Session(e.to_string()))?
            .unwrap_or(Role::Student);
        Ok(Self { user_id, role })
    }

    pub async fn persist(self, session: &Session) -> Result<()> {
        session
            .insert(USER_ID_KEY, self.user_id)
            .await
            .map_err(|e| Error::Session(e.to_string()))?;
        session
            .insert(ROLE_KEY, self.role)
            .await
            .map_err(|e| Error::Session(e.to_string()))?;
        Ok(())
    }

    /// Fails with `Forbidden` unless the principal holds at least the
    /// given role (admin passes every check).
    pub fn require(self, min: Role) -> Result<Self> {
        if self.role.rank() >= min.rank() {
            Ok(self)
        } else {
            Err(Error::Forbidden("insufficient role"))
        }
    }

    pub fn is_admin(self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;

    #[test]
    fn role_checks_are_ordered() {
        let student = Principal {
            user_id: UserId::new(1).unwrap(),
            role: Role::Student,
        };
        let admin = Principal {
            user_id: UserId::new(2).unwrap(),
            role: Role::Admin,
        };
        assert!(student.require(Role::Instructor).is_err());
        assert!(admin.require(Role::Instructor).is_ok());
        assert!(admin.require(Role::Admin).is_ok());
    }
}
