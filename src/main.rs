use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use taskhub::config::Config;
use taskhub::routes;
use taskhub::store::{MemoryRepository, PgRepository, Repository};

fn to_io_error(err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

fn cors(origin: Option<&str>) -> Cors {
    let cors = match origin {
        Some(origin) => Cors::default().allowed_origin(origin),
        None => Cors::default().allow_any_origin(),
    };
    cors.allow_any_method().allow_any_header().max_age(3600)
}

async fn open_repository(config: &Config) -> io::Result<Arc<dyn Repository>> {
    if config.uses_memory_store() {
        log::warn!("DATABASE_URL selects the in-memory store; data is lost on restart");
        return Ok(Arc::new(MemoryRepository::new()));
    }

    let repo = PgRepository::connect(&config.database_url, config.database_max_connections)
        .await
        .map_err(to_io_error)?;
    repo.migrate().await.map_err(to_io_error)?;
    log::info!("Connected to PostgreSQL and applied migrations");
    Ok(Arc::new(repo))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let repo = web::Data::from(open_repository(&config).await?);
    let auth_settings = web::Data::new(config.auth_settings());
    let cors_origin = config.cors_origin.clone();

    log::info!("Starting taskhub server at {}", config.server_url());
    HttpServer::new(move || {
        App::new()
            .app_data(repo.clone())
            .app_data(auth_settings.clone())
            .wrap(cors(cors_origin.as_deref()))
            .wrap(Logger::default())
            .configure(routes::config)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
