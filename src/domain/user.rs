use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// A registered ledger participant.
/// Users are created once and never modified by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Unique across the directory
    pub email: String,
    /// Opaque credential hash owned by the authentication layer
    #[serde(skip_serializing)]
    pub credential_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: normalize_email(&email.into()),
            credential_hash: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_credential_hash(mut self, hash: impl Into<String>) -> Self {
        self.credential_hash = Some(hash.into());
        self
    }
}

/// Emails compare case-insensitively and without surrounding whitespace.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_normalizes_email() {
        let user = User::new("Ada", "  Ada@Example.COM ");
        assert_eq!(user.email, "ada@example.com");
        assert!(user.credential_hash.is_none());
    }

    #[test]
    fn test_credential_hash_not_serialized() {
        let user = User::new("Ada", "ada@example.com").with_credential_hash("$2b$08$abc");
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("credential_hash"));
        assert!(json.contains("ada@example.com"));
    }
}
