use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::auth::middleware::{AuthFailure, CurrentUser};
use crate::auth::policy::ensure_admin;
use crate::error::{AppError, AppResult};
use crate::models::User;

/// The authenticated user, as attached by `AuthMiddleware`.
///
/// Fails with 401 when the request is anonymous, carrying the reason the token
/// was rejected if there was one.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// An authenticated user holding the `admin` role; 403 otherwise.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

fn current_user(req: &HttpRequest) -> AppResult<User> {
    let extensions = req.extensions();
    if let Some(CurrentUser(user)) = extensions.get::<CurrentUser>() {
        return Ok(user.clone());
    }
    let message = extensions
        .get::<AuthFailure>()
        .map(|f| f.0.clone())
        .unwrap_or_else(|| "Not authorized, no token".to_string());
    Err(AppError::Unauthorized(message))
}

impl FromRequest for AuthenticatedUser {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(current_user(req).map(AuthenticatedUser).map_err(Into::into))
    }
}

impl FromRequest for AdminUser {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = current_user(req).and_then(|user| {
            ensure_admin(&user)?;
            Ok(AdminUser(user))
        });
        ready(result.map_err(Into::into))
    }
}
