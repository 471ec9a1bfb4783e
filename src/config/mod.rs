/// Seed catalog loading from formflow.toml
pub mod catalog;

/// Database configuration and connection management
pub mod database;

/// Runtime settings from environment variables
pub mod settings;

pub use settings::AppConfig;
