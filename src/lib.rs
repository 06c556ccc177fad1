#![doc = "The `taskhub` library crate."]
#![doc = ""]
#![doc = "This crate contains the domain models, storage backends, authentication and"]
#![doc = "authorization, routing configuration, and error handling for the taskhub API."]
#![doc = "It is used by the main binary (`main.rs`) to construct and run the application,"]
#![doc = "and by the integration tests to build the same app over the in-memory store."]

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod pagination;
pub mod routes;
pub mod store;

pub use crate::error::{AppError, AppResult};
