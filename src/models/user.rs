use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = i64;

/// Permission tier of an identity. Stored and reported by its upper-case name.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Researcher,
    User,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Researcher, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Researcher => "RESEARCHER",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single authorization grant, named after the role it was derived from.
#[derive(Debug, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct Authority(String);

impl Authority {
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Every role grants exactly one authority carrying the role's name.
pub fn authorities_for(role: Role) -> [Authority; 1] {
    [Authority(role.as_str().to_string())]
}

#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: Option<UserId>,
    pub name: String,
    pub username: String,
    pub password_hash: String,  // bcrypt hash, never plain text
    pub role: Role,
}

impl User {
    pub fn authorities(&self) -> [Authority; 1] {
        authorities_for(self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    // No account-state machine: every stored identity is usable.
    pub fn is_account_non_expired(&self) -> bool {
        true
    }

    pub fn is_account_non_locked(&self) -> bool {
        true
    }

    pub fn is_credentials_non_expired(&self) -> bool {
        true
    }

    pub fn is_enabled(&self) -> bool {
        true
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            username: self.username.clone(),
            role: self.role,
            authorities: self.authorities().to_vec(),
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Public view of an identity, safe to hand to callers.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UserProfile {
    pub id: Option<UserId>,
    pub name: String,
    pub username: String,
    pub role: Role,
    pub authorities: Vec<Authority>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: Some(1),
            name: "Ana".into(),
            username: "ana".into(),
            password_hash: "$2b$04$secret".into(),
            role,
        }
    }

    #[test]
    fn every_role_grants_exactly_its_own_name() {
        for role in Role::ALL {
            let grants = user(role).authorities();
            assert_eq!(grants.len(), 1);
            assert_eq!(grants[0].name(), role.as_str());
        }
    }

    #[test]
    fn role_serializes_by_name() {
        assert_eq!(serde_json::to_string(&Role::Researcher).unwrap(), "\"RESEARCHER\"");
        let role: Role = serde_json::from_str("\"ADMIN\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn account_is_always_active() {
        let u = user(Role::User);
        assert!(u.is_enabled());
        assert!(u.is_account_non_locked());
        assert!(u.is_account_non_expired());
        assert!(u.is_credentials_non_expired());
    }

    #[test]
    fn credential_hash_stays_out_of_profile_and_debug() {
        let u = user(Role::Researcher);
        let profile = serde_json::to_string(&u.profile()).unwrap();
        assert!(!profile.contains("secret"));
        assert!(!format!("{:?}", u).contains("secret"));
    }
}
