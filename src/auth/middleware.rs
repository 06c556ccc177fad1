use std::rc::Rc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::auth::token::{verify_token, AuthSettings};
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::store::Repository;

/// The user a request is authenticated as, stored in request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Why an optional authentication attempt was rejected, kept so that extractors
/// can report it instead of a generic "no token".
#[derive(Debug, Clone)]
pub struct AuthFailure(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Resolve the user when a token is sent; anonymous requests pass through.
    Optional,
    /// Reject the request with 401 unless it carries a valid token.
    Required,
}

/// Verifies the bearer token, loads the user it names and attaches it to the request.
///
/// Needs `web::Data<AuthSettings>` and `web::Data<dyn Repository>` in app data.
/// Scopes can be nested: an inner middleware reuses a user resolved further out.
pub struct AuthMiddleware {
    policy: AuthPolicy,
}

impl AuthMiddleware {
    pub fn optional() -> Self {
        Self {
            policy: AuthPolicy::Optional,
        }
    }

    pub fn required() -> Self {
        Self {
            policy: AuthPolicy::Required,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            policy: self.policy,
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    policy: AuthPolicy,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let policy = self.policy;

        Box::pin(async move {
            if req.extensions().contains::<CurrentUser>() {
                return service.call(req).await;
            }

            match authenticate(&req).await {
                Ok(Some(user)) => {
                    req.extensions_mut().insert(CurrentUser(user));
                }
                Ok(None) => {
                    if policy == AuthPolicy::Required {
                        let failure = req.extensions().get::<AuthFailure>().cloned();
                        let message = failure
                            .map(|f| f.0)
                            .unwrap_or_else(|| "Not authorized, no token".to_string());
                        return Err(AppError::Unauthorized(message).into());
                    }
                }
                Err(AppError::Unauthorized(message)) if policy == AuthPolicy::Optional => {
                    log::debug!("Ignoring rejected token on optional route: {}", message);
                    req.extensions_mut().insert(AuthFailure(message));
                }
                Err(err) => return Err(err.into()),
            }

            service.call(req).await
        })
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// `Ok(None)` when no token was sent.
async fn authenticate(req: &ServiceRequest) -> AppResult<Option<User>> {
    let Some(token) = bearer_token(req) else {
        return Ok(None);
    };

    let settings = req
        .app_data::<web::Data<AuthSettings>>()
        .cloned()
        .ok_or_else(|| AppError::InternalServerError("AuthSettings not registered".into()))?;
    let repo = req
        .app_data::<web::Data<dyn Repository>>()
        .cloned()
        .ok_or_else(|| AppError::InternalServerError("Repository not registered".into()))?;

    let claims = verify_token(&settings, &token)?;
    let user = repo
        .find_user(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))?;

    if !user.is_active {
        return Err(AppError::Unauthorized("Account is deactivated".into()));
    }
    Ok(Some(user))
}
