pub mod extractors;
pub mod middleware;
pub mod password;
pub mod policy;
pub mod token;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::user::USERNAME_REGEX;
use crate::models::{User, UserChanges};

// Re-export necessary items
pub use extractors::{AdminUser, AuthenticatedUser};
pub use middleware::{AuthMiddleware, CurrentUser};
pub use password::{hash_password, verify_password};
pub use token::{generate_token, verify_token, AuthSettings, Claims};

/// Represents the payload for a user login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// 3 to 30 characters: letters, digits, underscores, hyphens.
    #[validate(
        length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"),
        regex(
            path = "USERNAME_REGEX",
            message = "Username may only contain letters, numbers, underscores, and hyphens"
        )
    )]
    pub username: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(max = 50, message = "First name cannot exceed 50 characters"))]
    pub first_name: Option<String>,
    #[validate(length(max = 50, message = "Last name cannot exceed 50 characters"))]
    pub last_name: Option<String>,
}

/// Payload of `PUT /api/auth/me`. Role and active flag are not reachable from here.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
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
}

impl From<UpdateProfileRequest> for UserChanges {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            ..Default::default()
        }
    }
}

/// Payload of `PUT /api/auth/me/password`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

/// Response after successful registration or login.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    /// The JWT for subsequent `Authorization: Bearer` headers.
    pub token: String,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn register(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            first_name: None,
            last_name: None,
        }
    }

    #[test]
    fn test_login_request_validation() {
        let valid_login = LoginRequest {
            email: "test@example.com".to_string(),
            password: "password123".to_string(),
        };
        assert!(valid_login.validate().is_ok());

        let invalid_email_login = LoginRequest {
            email: "testexample.com".to_string(),
            password: "password123".to_string(),
        };
        assert!(invalid_email_login.validate().is_err());

        let empty_password_login = LoginRequest {
            email: "test@example.com".to_string(),
            password: String::new(),
        };
        assert!(empty_password_login.validate().is_err());
    }

    #[test]
    fn test_register_request_validation() {
        assert!(register("test_user-123", "test@example.com", "password123")
            .validate()
            .is_ok());
        assert!(register("test user!", "test@example.com", "password123")
            .validate()
            .is_err());
        assert!(register("tu", "test@example.com", "password123")
            .validate()
            .is_err());
        assert!(register(&"a".repeat(31), "test@example.com", "password123")
            .validate()
            .is_err());
        assert!(register("test_user", "test@example.com", "12345")
            .validate()
            .is_err());
    }

    #[test]
    fn test_profile_update_cannot_touch_role() {
        let changes: UserChanges = UpdateProfileRequest {
            first_name: Some("Ada".into()),
            ..Default::default()
        }
        .into();
        assert!(changes.role.is_none());
        assert!(changes.is_active.is_none());
        assert_eq!(changes.first_name.as_deref(), Some("Ada"));
    }
}
