#![allow(dead_code)]

use std::sync::Arc;

use actix_cors::Cors;
use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::{header, StatusCode};
use actix_web::middleware::Logger;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use taskhub::auth::AuthSettings;
use taskhub::models::UserRole;
use taskhub::routes;
use taskhub::store::{MemoryRepository, Repository};
use uuid::Uuid;

pub const PASSWORD: &str = "Password123!";

/// bcrypt cost 4 keeps the suite fast.
pub fn auth_settings() -> AuthSettings {
    AuthSettings::new("integration-test-secret", 24, 4)
}

pub fn repository() -> Arc<dyn Repository> {
    Arc::new(MemoryRepository::new())
}

pub async fn init_app(
    repo: Arc<dyn Repository>,
) -> impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error> {
    test::init_service(
        App::new()
            .app_data(web::Data::from(repo))
            .app_data(web::Data::new(auth_settings()))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(routes::config),
    )
    .await
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

impl TestUser {
    pub fn bearer(&self) -> (header::HeaderName, String) {
        (header::AUTHORIZATION, format!("Bearer {}", self.token))
    }
}

/// Sends a request and returns the status and the JSON body (`Null` when empty).
pub async fn send(
    app: &impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>,
    req: Request,
) -> (StatusCode, Value) {
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let bytes = test::read_body(resp).await;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            panic!("Non-JSON body: {:?}", String::from_utf8_lossy(&bytes))
        })
    };
    (status, body)
}

pub async fn register_user(
    app: &impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>,
    username: &str,
) -> TestUser {
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": PASSWORD
        }))
        .to_request();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Registration failed. Body: {}", body);

    TestUser {
        id: body["user"]["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .expect("registration response carries the user id"),
        token: body["token"].as_str().expect("token").to_string(),
    }
}

/// Registers a user and flips their role to admin straight in the store.
pub async fn register_admin(
    app: &impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>,
    repo: &Arc<dyn Repository>,
    username: &str,
) -> TestUser {
    let admin = register_user(app, username).await;
    let mut user = repo
        .find_user(admin.id)
        .await
        .unwrap()
        .expect("admin was just registered");
    user.role = UserRole::Admin;
    repo.save_user(user).await.unwrap();
    admin
}

pub async fn create_task(
    app: &impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>,
    owner: &TestUser,
    payload: Value,
) -> Value {
    let req = test::TestRequest::post()
        .uri("/api/tasks")
        .append_header(owner.bearer())
        .set_json(payload)
        .to_request();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Create task failed. Body: {}", body);
    body
}

pub fn error_fields(body: &Value) -> Vec<String> {
    body["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e["field"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
