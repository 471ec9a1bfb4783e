//! HTTP surface over the core operations.
//!
//! Handlers stay thin: extract the caller and the input, call into [`crate::core`],
//! serialize the result. Errors turn into JSON responses in [`error`].

/// Bearer-token and runner-token extractors
pub mod auth;
/// `IntoResponse` for the crate error type
pub mod error;
/// Request handlers grouped by resource
pub mod routes;
/// Router assembly and the listening loop
pub mod server;

pub use server::{build_router, serve};

use crate::{config::AppConfig, errors::Result};
use sea_orm::DatabaseConnection;
use std::time::Instant;

/// State shared by every handler
#[derive(Debug)]
pub struct AppState {
    /// Database connection pool
    pub db: DatabaseConnection,
    /// Runtime configuration
    pub config: AppConfig,
    /// Token signing secret, checked once at startup
    pub auth_secret: String,
    /// Server start, for the health endpoint
    pub started_at: Instant,
}

impl AppState {
    /// Builds the state, failing when no token secret is configured.
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Result<Self> {
        let auth_secret = config.require_auth_secret()?.to_string();
        Ok(Self {
            db,
            config,
            auth_secret,
            started_at: Instant::now(),
        })
    }
}
