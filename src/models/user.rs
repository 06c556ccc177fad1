use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::pagination::{deserialize_optional_bool, deserialize_optional_i64, PageRequest};

lazy_static! {
    /// Usernames: alphanumeric, underscores, hyphens.
    pub static ref USERNAME_REGEX: regex::Regex = regex::Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Role of an account. Corresponds to the `user_role` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

/// A user account as stored in the database.
///
/// The password hash is never serialized, so a `User` can be returned from
/// handlers as-is.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A partial set of profile changes. `None` leaves a field untouched; an empty
/// name clears it.
#[derive(Debug, Default, Clone)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

impl User {
    /// Creates an active `user`-role account. Username and email are normalized.
    pub fn new(
        username: &str,
        email: &str,
        password_hash: String,
        first_name: Option<String>,
        last_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            first_name: first_name.and_then(non_blank),
            last_name: last_name.and_then(non_blank),
            role: UserRole::User,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn apply(&mut self, changes: UserChanges, now: DateTime<Utc>) {
        if let Some(username) = changes.username {
            self.username = username.trim().to_string();
        }
        if let Some(email) = changes.email {
            self.email = normalize_email(&email);
        }
        if let Some(first_name) = changes.first_name {
            self.first_name = non_blank(first_name);
        }
        if let Some(last_name) = changes.last_name {
            self.last_name = non_blank(last_name);
        }
        if let Some(role) = changes.role {
            self.role = role;
        }
        if let Some(is_active) = changes.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Admin-side update of any account.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(
        length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"),
        regex(
            path = "USERNAME_REGEX",
            message = "Username may only contain letters, numbers, underscores, and hyphens"
        )
    )]
    pub username: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    #[validate(length(max = 50, message = "First name cannot exceed 50 characters"))]
    pub first_name: Option<String>,
    #[validate(length(max = 50, message = "Last name cannot exceed 50 characters"))]
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

impl From<UpdateUserRequest> for UserChanges {
    fn from(req: UpdateUserRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            role: req.role,
            is_active: req.is_active,
        }
    }
}

/// Query string of `GET /api/users`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub role: Option<UserRole>,
    #[serde(default, deserialize_with = "deserialize_optional_bool")]
    pub is_active: Option<bool>,
    pub search: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub limit: Option<i64>,
}

impl UserQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

/// Query string of `GET /api/users/search`.
#[derive(Debug, Default, Deserialize)]
pub struct UserSearchQuery {
    pub q: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn sample_user() -> User {
        User::new(
            "  alice ",
            " Alice@Example.COM ",
            "hash".into(),
            Some("Alice".into()),
            Some("   ".into()),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_user_is_normalized() {
        let user = sample_user();
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.first_name.as_deref(), Some("Alice"));
        assert_eq!(user.last_name, None);
        assert_eq!(user.role, UserRole::User);
        assert!(user.is_active);
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["isActive"], true);
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn test_apply_changes() {
        let mut user = sample_user();
        let before = user.updated_at;
        user.apply(
            UserChanges {
                email: Some("NEW@example.com".into()),
                first_name: Some(String::new()),
                role: Some(UserRole::Admin),
                ..Default::default()
            },
            before + chrono::Duration::seconds(5),
        );
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.first_name, None);
        assert!(user.is_admin());
        assert_eq!(user.username, "alice");
        assert!(user.updated_at > before);
    }

    #[test]
    fn test_update_user_request_validation() {
        let valid = UpdateUserRequest {
            username: Some("new_name".into()),
            email: Some("a@b.com".into()),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let invalid = UpdateUserRequest {
            username: Some("no spaces allowed".into()),
            email: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }
}
