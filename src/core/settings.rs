//! Admin-managed settings stored in single-row tables.
//!
//! Both tables hold at most one row with id 1. Reads fall back to defaults when the
//! row has never been saved; updates insert or overwrite that row.

use crate::{
    core::{audit, auth::constant_time_eq},
    entities::{AppscriptConfig, MailSetting, appscript_config, mail_setting},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

/// Primary key of the single settings row
pub const SETTINGS_ROW_ID: i64 = 1;
/// Largest accepted `reminder_days_before`
pub const MAX_REMINDER_DAYS: i32 = 30;
/// `reminder_days_before` used until an admin saves the config
pub const DEFAULT_REMINDER_DAYS: i32 = 2;

/// Replacement mail settings
#[derive(Debug, Clone, Deserialize)]
pub struct MailSettingsUpdate {
    /// SMTP server host name
    pub smtp_host: String,
    /// SMTP server port (1-65535)
    pub smtp_port: i32,
    /// SMTP login
    #[serde(default)]
    pub smtp_user: String,
    /// New SMTP password; absent or empty keeps the stored one
    #[serde(default)]
    pub smtp_password: Option<String>,
    /// Sender address
    pub from_address: String,
    /// Use TLS
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Notify approvers when a loan is submitted
    #[serde(default = "default_true")]
    pub notify_on_submit: bool,
    /// Notify borrowers when a decision is made
    #[serde(default = "default_true")]
    pub notify_on_decision: bool,
}

const fn default_true() -> bool {
    true
}

/// Mail settings as shown to clients, with the password masked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailSettingsView {
    /// SMTP server host name
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: i32,
    /// SMTP login
    pub smtp_user: String,
    /// Whether a password is stored
    pub has_password: bool,
    /// Sender address
    pub from_address: String,
    /// Use TLS
    pub use_tls: bool,
    /// Notify approvers when a loan is submitted
    pub notify_on_submit: bool,
    /// Notify borrowers when a decision is made
    pub notify_on_decision: bool,
}

impl From<mail_setting::Model> for MailSettingsView {
    fn from(model: mail_setting::Model) -> Self {
        Self {
            smtp_host: model.smtp_host,
            smtp_port: model.smtp_port,
            smtp_user: model.smtp_user,
            has_password: !model.smtp_password.is_empty(),
            from_address: model.from_address,
            use_tls: model.use_tls,
            notify_on_submit: model.notify_on_submit,
            notify_on_decision: model.notify_on_decision,
        }
    }
}

fn default_mail_settings() -> mail_setting::Model {
    mail_setting::Model {
        id: SETTINGS_ROW_ID,
        smtp_host: String::new(),
        smtp_port: 587,
        smtp_user: String::new(),
        smtp_password: String::new(),
        from_address: String::new(),
        use_tls: true,
        notify_on_submit: true,
        notify_on_decision: true,
        updated_at: Utc::now(),
    }
}

/// Returns the stored mail settings, or defaults when none were saved.
pub async fn get_mail_settings(db: &DatabaseConnection) -> Result<mail_setting::Model> {
    Ok(MailSetting::find_by_id(SETTINGS_ROW_ID)
        .one(db)
        .await?
        .unwrap_or_else(default_mail_settings))
}

/// Validates and stores new mail settings.
///
/// The stored password is kept when the update omits it or sends an empty string.
#[instrument(skip(db, update))]
pub async fn update_mail_settings(
    db: &DatabaseConnection,
    actor_id: i64,
    update: MailSettingsUpdate,
) -> Result<mail_setting::Model> {
    let smtp_host = update.smtp_host.trim().to_string();
    if smtp_host.is_empty() {
        return Err(Error::validation("smtp_host", "cannot be empty"));
    }
    if !(1..=65535).contains(&update.smtp_port) {
        return Err(Error::validation("smtp_port", "must be between 1 and 65535"));
    }
    let from_address = update.from_address.trim().to_string();
    if !from_address.contains('@') {
        return Err(Error::validation("from_address", "must be an email address"));
    }

    let txn = db.begin().await?;
    let existing = MailSetting::find_by_id(SETTINGS_ROW_ID).one(&txn).await?;
    let password_changed = update.smtp_password.as_deref().is_some_and(|p| !p.is_empty());
    let smtp_password = match update.smtp_password.filter(|p| !p.is_empty()) {
        Some(password) => password,
        None => existing
            .as_ref()
            .map(|m| m.smtp_password.clone())
            .unwrap_or_default(),
    };

    let row = mail_setting::ActiveModel {
        id: Set(SETTINGS_ROW_ID),
        smtp_host: Set(smtp_host),
        smtp_port: Set(update.smtp_port),
        smtp_user: Set(update.smtp_user.trim().to_string()),
        smtp_password: Set(smtp_password),
        from_address: Set(from_address),
        use_tls: Set(update.use_tls),
        notify_on_submit: Set(update.notify_on_submit),
        notify_on_decision: Set(update.notify_on_decision),
        updated_at: Set(Utc::now()),
    };
    let saved = if existing.is_some() {
        row.update(&txn).await?
    } else {
        row.insert(&txn).await?
    };

    audit::record(
        &txn,
        Some(actor_id),
        "settings.mail",
        "mail_setting",
        SETTINGS_ROW_ID,
        json!({
            "smtp_host": saved.smtp_host,
            "smtp_port": saved.smtp_port,
            "password_changed": password_changed,
        }),
    )
    .await?;
    txn.commit().await?;
    info!("Mail settings updated");
    Ok(saved)
}

/// Replacement Apps Script config
#[derive(Debug, Clone, Deserialize)]
pub struct AppscriptConfigUpdate {
    /// Deployed script URL (`https://...`)
    #[serde(default)]
    pub script_url: String,
    /// New shared secret; absent or empty keeps the stored one
    #[serde(default)]
    pub secret_token: Option<String>,
    /// Whether the external runner may report
    pub enabled: bool,
    /// How many days before the end date a loan counts as due soon
    #[serde(default = "default_reminder_days")]
    pub reminder_days_before: i32,
}

const fn default_reminder_days() -> i32 {
    DEFAULT_REMINDER_DAYS
}

/// Apps Script config as shown to clients, with the token masked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppscriptConfigView {
    /// Deployed script URL
    pub script_url: String,
    /// Whether a token is stored
    pub has_secret_token: bool,
    /// Whether the external runner may report
    pub enabled: bool,
    /// Due-soon window in days
    pub reminder_days_before: i32,
}

impl From<appscript_config::Model> for AppscriptConfigView {
    fn from(model: appscript_config::Model) -> Self {
        Self {
            script_url: model.script_url,
            has_secret_token: !model.secret_token.is_empty(),
            enabled: model.enabled,
            reminder_days_before: model.reminder_days_before,
        }
    }
}

fn default_appscript_config() -> appscript_config::Model {
    appscript_config::Model {
        id: SETTINGS_ROW_ID,
        script_url: String::new(),
        secret_token: String::new(),
        enabled: false,
        reminder_days_before: DEFAULT_REMINDER_DAYS,
        updated_at: Utc::now(),
    }
}

/// Returns the stored Apps Script config, or a disabled default.
pub async fn get_appscript_config(db: &DatabaseConnection) -> Result<appscript_config::Model> {
    Ok(AppscriptConfig::find_by_id(SETTINGS_ROW_ID)
        .one(db)
        .await?
        .unwrap_or_else(default_appscript_config))
}

/// Validates and stores a new Apps Script config.
#[instrument(skip(db, update))]
pub async fn update_appscript_config(
    db: &DatabaseConnection,
    actor_id: i64,
    update: AppscriptConfigUpdate,
) -> Result<appscript_config::Model> {
    let script_url = update.script_url.trim().to_string();
    if !script_url.is_empty() && !script_url.starts_with("https://") {
        return Err(Error::validation("script_url", "must start with https://"));
    }
    if !(0..=MAX_REMINDER_DAYS).contains(&update.reminder_days_before) {
        return Err(Error::validation(
            "reminder_days_before",
            format!("must be between 0 and {MAX_REMINDER_DAYS}"),
        ));
    }

    let txn = db.begin().await?;
    let existing = AppscriptConfig::find_by_id(SETTINGS_ROW_ID).one(&txn).await?;
    let secret_token = match update.secret_token.filter(|t| !t.trim().is_empty()) {
        Some(token) => token.trim().to_string(),
        None => existing
            .as_ref()
            .map(|m| m.secret_token.clone())
            .unwrap_or_default(),
    };
    if update.enabled && (script_url.is_empty() || secret_token.is_empty()) {
        return Err(Error::validation(
            "enabled",
            "script_url and secret_token are required when enabled",
        ));
    }

    let row = appscript_config::ActiveModel {
        id: Set(SETTINGS_ROW_ID),
        script_url: Set(script_url),
        secret_token: Set(secret_token),
        enabled: Set(update.enabled),
        reminder_days_before: Set(update.reminder_days_before),
        updated_at: Set(Utc::now()),
    };
    let saved = if existing.is_some() {
        row.update(&txn).await?
    } else {
        row.insert(&txn).await?
    };

    audit::record(
        &txn,
        Some(actor_id),
        "settings.appscript",
        "appscript_config",
        SETTINGS_ROW_ID,
        json!({
            "script_url": saved.script_url,
            "enabled": saved.enabled,
            "reminder_days_before": saved.reminder_days_before,
        }),
    )
    .await?;
    txn.commit().await?;
    info!(enabled = saved.enabled, "Apps Script config updated");
    Ok(saved)
}

/// Checks a token presented by the external reminder runner.
///
/// A disabled or unconfigured integration rejects every token.
pub async fn verify_appscript_token(db: &DatabaseConnection, presented: &str) -> Result<bool> {
    let config = get_appscript_config(db).await?;
    if !config.enabled || config.secret_token.is_empty() {
        warn!("Rejected Apps Script token: integration disabled");
        return Ok(false);
    }
    Ok(constant_time_eq(
        presented.trim().as_bytes(),
        config.secret_token.as_bytes(),
    ))
}

/// Due-soon window: the saved Apps Script config when one exists, else `fallback`.
pub async fn reminder_days_before(db: &DatabaseConnection, fallback: i64) -> Result<i64> {
    Ok(AppscriptConfig::find_by_id(SETTINGS_ROW_ID)
        .one(db)
        .await?
        .map_or(fallback, |config| i64::from(config.reminder_days_before)))
}
