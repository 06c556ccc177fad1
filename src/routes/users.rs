use crate::{
    auth::{
        policy::{ensure_can_delete_user, ensure_can_view_user},
        AdminUser, AuthenticatedUser,
    },
    error::AppError,
    models::{user::normalize_email, UpdateUserRequest, UserChanges, UserQuery, UserSearchQuery},
    pagination::{PageRequest, Paginated},
    store::{ensure_identity_available, Repository, UserFilter},
};
use actix_web::{delete, get, put, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".into())
}

/// List users (admin)
///
/// Supports `role`, `isActive`, `search`, `page` and `limit`.
#[get("")]
pub async fn list_users(
    repo: web::Data<dyn Repository>,
    _admin: AdminUser,
    query: web::Query<UserQuery>,
) -> Result<impl Responder, AppError> {
    let page = query.page_request();
    let (users, total) = repo.list_users(UserFilter::from_query(&query), page).await?;
    Ok(HttpResponse::Ok().json(Paginated::new(users, page, total)))
}

/// Search users by username, email or name (admin)
#[get("/search")]
pub async fn search_users(
    repo: web::Data<dyn Repository>,
    _admin: AdminUser,
    query: web::Query<UserSearchQuery>,
) -> Result<impl Responder, AppError> {
    let term = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::BadRequest("Search query is required".into()))?;

    let page = PageRequest::new(query.page, query.limit);
    let (users, total) = repo.list_users(UserFilter::search(term), page).await?;
    Ok(HttpResponse::Ok().json(Paginated::new(users, page, total)))
}

/// Get a user by id (admin, or the user themself)
#[get("/{id}")]
pub async fn get_user(
    repo: web::Data<dyn Repository>,
    AuthenticatedUser(actor): AuthenticatedUser,
    user_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let user_id = user_id.into_inner();
    ensure_can_view_user(&actor, user_id)?;

    let user = repo.find_user(user_id).await?.ok_or_else(user_not_found)?;
    Ok(HttpResponse::Ok().json(user))
}

/// Update any user, including role and active flag (admin)
#[put("/{id}")]
pub async fn update_user(
    repo: web::Data<dyn Repository>,
    _admin: AdminUser,
    user_id: web::Path<Uuid>,
    body: web::Json<UpdateUserRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let user_id = user_id.into_inner();
    let mut user = repo.find_user(user_id).await?.ok_or_else(user_not_found)?;

    let changes: UserChanges = body.into_inner().into();
    let username = changes.username.as_deref().map(str::trim);
    let email = changes.email.as_deref().map(normalize_email);
    ensure_identity_available(repo.get_ref(), username, email.as_deref(), Some(user.id)).await?;

    user.apply(changes, Utc::now());
    let user = repo.save_user(user).await?.ok_or_else(user_not_found)?;

    log::info!("User {} updated by admin", user.id);
    Ok(HttpResponse::Ok().json(user))
}

/// Delete a user and the tasks they created (admin, never oneself)
#[delete("/{id}")]
pub async fn delete_user(
    repo: web::Data<dyn Repository>,
    AuthenticatedUser(actor): AuthenticatedUser,
    user_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let user_id = user_id.into_inner();
    ensure_can_delete_user(&actor, user_id)?;

    if !repo.delete_user(user_id).await? {
        return Err(user_not_found());
    }

    log::info!("User {} deleted by admin {}", user_id, actor.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted successfully" })))
}
