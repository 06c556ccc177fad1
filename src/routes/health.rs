use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

use crate::store::Repository;

/// Health check endpoint
///
/// Reports whether the database answers. 503 when it does not.
#[get("/health")]
pub async fn health(repo: web::Data<dyn Repository>) -> impl Responder {
    match repo.ping().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "database": "up",
            "timestamp": Utc::now()
        })),
        Err(err) => {
            log::warn!("Health check failed: {}", err);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "degraded",
                "database": "down",
                "timestamp": Utc::now()
            }))
        }
    }
}
