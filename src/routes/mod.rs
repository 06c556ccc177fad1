pub mod auth;
pub mod health;
pub mod tasks;
pub mod users;

use actix_web::web;

use crate::auth::AuthMiddleware;
use crate::error::AppError;

/// Registers every route plus the extractor configs that turn malformed JSON,
/// query strings and path ids into `AppError` responses.
///
/// Expects `web::Data<dyn Repository>` and `web::Data<AuthSettings>` in app data.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _req| {
            AppError::BadRequest(format!("Invalid request body: {}", err)).into()
        }),
    )
    .app_data(
        web::QueryConfig::default().error_handler(|err, _req| {
            AppError::BadRequest(format!("Invalid query string: {}", err)).into()
        }),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|_err, _req| AppError::NotFound("Resource not found".into()).into()),
    )
    .service(health::health)
    .service(
        web::scope("/api")
            .wrap(AuthMiddleware::optional())
            .service(
                web::scope("/auth")
                    .service(auth::register)
                    .service(auth::login)
                    .service(auth::me)
                    .service(auth::update_me)
                    .service(auth::change_password),
            )
            .service(
                web::scope("/users")
                    .wrap(AuthMiddleware::required())
                    .service(users::list_users)
                    .service(users::search_users)
                    .service(users::get_user)
                    .service(users::update_user)
                    .service(users::delete_user),
            )
            // Registered ahead of the `/tasks` scope so it stays reachable anonymously.
            .service(tasks::get_public_tasks)
            .service(
                web::scope("/tasks")
                    .wrap(AuthMiddleware::required())
                    .service(tasks::get_tasks)
                    .service(tasks::create_task)
                    .service(tasks::get_task_stats)
                    .service(tasks::get_task)
                    .service(tasks::update_task)
                    .service(tasks::update_task_status)
                    .service(tasks::delete_task),
            ),
    );
}
