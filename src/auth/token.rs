use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Represents the claims encoded within a JWT.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject of the token: the user's id.
    pub sub: Uuid,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: usize,
    /// Expiration timestamp (seconds since epoch).
    pub exp: usize,
}

/// Signing keys and cost parameters shared by every request.
///
/// Registered once as `web::Data<AuthSettings>` so handlers and the auth
/// middleware never touch the environment.
#[derive(Clone)]
pub struct AuthSettings {
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl: Duration,
    bcrypt_cost: u32,
}

impl AuthSettings {
    pub fn new(secret: &str, token_ttl_hours: i64, bcrypt_cost: u32) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl: Duration::hours(token_ttl_hours),
            bcrypt_cost,
        }
    }

    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }
}

/// Issues an HS256 token for `user_id`, valid for the configured lifetime.
pub fn generate_token(settings: &AuthSettings, user_id: Uuid) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp() as usize,
        exp: (now + settings.token_ttl).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &settings.encoding)
        .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))
}

/// Verifies signature and expiry, returning the decoded claims.
///
/// Any failure (malformed, bad signature, expired) is an `AppError::Unauthorized`.
pub fn verify_token(settings: &AuthSettings, token: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(token, &settings.decoding, &Validation::default())?;
    Ok(data.claims)
}
