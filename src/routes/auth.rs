use crate::{
    auth::{
        generate_token, hash_password, verify_password, AuthResponse, AuthSettings,
        AuthenticatedUser, ChangePasswordRequest, LoginRequest, RegisterRequest,
        UpdateProfileRequest,
    },
    error::AppError,
    models::{user::normalize_email, User, UserChanges},
    store::{ensure_identity_available, Repository},
};
use actix_web::{get, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".into())
}

/// Register a new user
///
/// Creates a `user`-role account and returns it together with a token.
/// Duplicate email or username is a 400.
#[post("/register")]
pub async fn register(
    repo: web::Data<dyn Repository>,
    settings: web::Data<AuthSettings>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    let input = register_data.into_inner();

    let email = normalize_email(&input.email);
    let username = input.username.trim().to_string();
    ensure_identity_available(repo.get_ref(), Some(&username), Some(&email), None).await?;

    let password_hash = hash_password(&input.password, settings.bcrypt_cost()).await?;
    let user = User::new(
        &username,
        &email,
        password_hash,
        input.first_name,
        input.last_name,
        Utc::now(),
    );
    let user = repo.insert_user(user).await?;
    let token = generate_token(&settings, user.id)?;

    log::info!("Registered user {} ({})", user.username, user.id);
    Ok(HttpResponse::Created().json(AuthResponse { token, user }))
}

/// Login user
///
/// Unknown email and wrong password produce the same 401 so the endpoint
/// cannot be used to probe for accounts.
#[post("/login")]
pub async fn login(
    repo: web::Data<dyn Repository>,
    settings: web::Data<AuthSettings>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    login_data.validate()?;

    let email = normalize_email(&login_data.email);
    let mut user = repo
        .find_user_by_email(&email)
        .await?
        .ok_or_else(invalid_credentials)?;

    if !verify_password(&login_data.password, &user.password_hash).await? {
        return Err(invalid_credentials());
    }
    if !user.is_active {
        return Err(AppError::Unauthorized("Account is deactivated".into()));
    }

    user.last_login_at = Some(Utc::now());
    let user = repo
        .save_user(user)
        .await?
        .ok_or_else(invalid_credentials)?;
    let token = generate_token(&settings, user.id)?;

    Ok(HttpResponse::Ok().json(AuthResponse { token, user }))
}

/// Current user
#[get("/me")]
pub async fn me(AuthenticatedUser(user): AuthenticatedUser) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(user))
}

/// Update the current user's profile
///
/// Username and email stay unique; role and active flag cannot be changed here.
#[put("/me")]
pub async fn update_me(
    repo: web::Data<dyn Repository>,
    AuthenticatedUser(mut user): AuthenticatedUser,
    profile: web::Json<UpdateProfileRequest>,
) -> Result<impl Responder, AppError> {
    profile.validate()?;
    let changes: UserChanges = profile.into_inner().into();

    let username = changes.username.as_deref().map(str::trim);
    let email = changes.email.as_deref().map(normalize_email);
    ensure_identity_available(repo.get_ref(), username, email.as_deref(), Some(user.id)).await?;

    user.apply(changes, Utc::now());
    let user = repo
        .save_user(user)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(HttpResponse::Ok().json(user))
}

/// Change the current user's password
#[put("/me/password")]
pub async fn change_password(
    repo: web::Data<dyn Repository>,
    settings: web::Data<AuthSettings>,
    AuthenticatedUser(mut user): AuthenticatedUser,
    body: web::Json<ChangePasswordRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;

    if !verify_password(&body.current_password, &user.password_hash).await? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    user.password_hash = hash_password(&body.new_password, settings.bcrypt_cost()).await?;
    user.updated_at = Utc::now();
    repo.save_user(user)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Password updated successfully" })))
}
