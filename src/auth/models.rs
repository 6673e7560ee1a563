//! Authentication models.

use serde::{Deserialize, Serialize};

/// User account as stored in `rpg_users`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: String,
    pub created_at: String,
    pub password_hash: String, // bcrypt hash, never returned to clients
    pub activated: bool,
    pub version: i64,
}

/// Who is making the current request.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }
}

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// User response (sanitized)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub email: String,
    pub name: String,
    pub created_at: String,
    pub activated: bool,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
            created_at: user.created_at.clone(),
            activated: user.activated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_response_hides_password_hash() {
        let user = User {
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            activated: true,
            version: 3,
        };

        let json = serde_json::to_value(UserResponse::from_user(&user)).unwrap();
        assert_eq!(json["email"], "alice@example.com");
        assert!(json.get("password_hash").is_none());
        assert!(json.get("version").is_none());
    }

    #[test]
    fn test_identity_kinds() {
        assert!(Identity::Anonymous.is_anonymous());
        assert!(Identity::Anonymous.user().is_none());
    }
}
