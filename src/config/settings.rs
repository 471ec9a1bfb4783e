//! Application settings loaded from environment variables.
//!
//! `main` loads `.env` with `dotenvy` before calling [`AppConfig::from_env`], so every
//! value can come from either the process environment or the `.env` file.

use crate::config::database::DEFAULT_DATABASE_URL;
use crate::core::settings::MAX_REMINDER_DAYS;
use crate::errors::{Error, Result};
use std::{net::SocketAddr, ops::RangeInclusive, path::PathBuf};

/// Accepted session token lifetimes: one hour up to a year
pub const TOKEN_TTL_HOURS_RANGE: RangeInclusive<i64> = 1..=8760;

/// Runtime configuration shared by the HTTP server and the CLI commands
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Connection string for `SeaORM`
    pub database_url: String,
    /// HMAC secret for session tokens; `None` means the server cannot start
    pub auth_secret: Option<String>,
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// Session token lifetime
    pub token_ttl_hours: i64,
    /// Directory holding `data/*.json` snapshots
    pub data_dir: PathBuf,
    /// TOML seed catalog
    pub seed_file: PathBuf,
    /// Whether self-service registration is open
    pub registration_enabled: bool,
    /// Allow any CORS origin instead of localhost only
    pub cors_permissive: bool,
    /// Default reminder window when no Apps Script config exists
    pub reminder_days_before: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            auth_secret: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            token_ttl_hours: 12,
            data_dir: PathBuf::from("data"),
            seed_file: PathBuf::from("formflow.toml"),
            registration_enabled: true,
            cors_permissive: false,
            reminder_days_before: 2,
        }
    }
}

impl AppConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Unset keys fall back to [`AppConfig::default`]; set but malformed keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let auth_secret = lookup("AUTH_SECRET").filter(|s| !s.trim().is_empty());

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            auth_secret,
            bind_addr: parse_or(&lookup, "BIND_ADDR", defaults.bind_addr)?,
            token_ttl_hours: parse_in_range(
                &lookup,
                "TOKEN_TTL_HOURS",
                defaults.token_ttl_hours,
                TOKEN_TTL_HOURS_RANGE,
            )?,
            data_dir: lookup("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            seed_file: lookup("SEED_FILE").map_or(defaults.seed_file, PathBuf::from),
            registration_enabled: parse_bool_or(
                &lookup,
                "REGISTRATION_ENABLED",
                defaults.registration_enabled,
            )?,
            cors_permissive: parse_bool_or(&lookup, "CORS_PERMISSIVE", defaults.cors_permissive)?,
            reminder_days_before: parse_in_range(
                &lookup,
                "REMINDER_DAYS_BEFORE",
                defaults.reminder_days_before,
                0..=i64::from(MAX_REMINDER_DAYS),
            )?,
        })
    }

    /// Returns the token secret, failing when it is not configured.
    pub fn require_auth_secret(&self) -> Result<&str> {
        self.auth_secret.as_deref().ok_or_else(|| Error::Config {
            message: "AUTH_SECRET must be set to issue session tokens".to_string(),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| Error::Config {
            message: format!("Invalid value for {key}: {e}"),
        }),
        None => Ok(default),
    }
}

fn parse_in_range<F>(
    lookup: &F,
    key: &str,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<i64>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(Error::Config {
            message: format!(
                "{key} must be between {} and {}, got {value}",
                range.start(),
                range.end()
            ),
        })
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(Error::Config {
            message: format!("Invalid boolean for {key}: {v}"),
        }),
    }
}
