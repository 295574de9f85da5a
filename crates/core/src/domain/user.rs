use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known role values. The role column is an open string set so new
/// roles can appear without a schema or enum change.
pub const ROLE_EMPLOYEE: &str = "employee";
pub const ROLE_APPROVER: &str = "approver";
pub const ROLE_FINANCE: &str = "finance";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub role: String,
    /// Weak reference up the management forest. The reverse direction is a
    /// lookup, never an owned pointer.
    pub manager_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Role assigned at registration time. Registering into an empty
    /// registry elevates the account to admin; every later account starts
    /// as a plain employee.
    pub fn bootstrap_role(registry_is_empty: bool) -> &'static str {
        if registry_is_empty {
            ROLE_ADMIN
        } else {
            ROLE_EMPLOYEE
        }
    }

    /// Local part of the email address, used as the display name on
    /// dashboards and reports.
    pub fn display_name(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{User, UserId, ROLE_ADMIN, ROLE_EMPLOYEE};

    fn user(email: &str, role: &str) -> User {
        User {
            id: UserId::generate(),
            email: email.to_string(),
            role: role.to_string(),
            manager_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn first_registered_account_is_elevated_to_admin() {
        assert_eq!(User::bootstrap_role(true), ROLE_ADMIN);
        assert_eq!(User::bootstrap_role(false), ROLE_EMPLOYEE);
    }

    #[test]
    fn display_name_is_email_local_part() {
        let user = user("alice@example.com", ROLE_EMPLOYEE);
        assert_eq!(user.display_name(), "alice");
    }

    #[test]
    fn display_name_falls_back_to_raw_value_without_at_sign() {
        let user = user("not-an-email", ROLE_EMPLOYEE);
        assert_eq!(user.display_name(), "not-an-email");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(UserId::generate(), UserId::generate());
    }
}
