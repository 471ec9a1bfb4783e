//! Admin settings and the audit trail.

use super::AppStateRef;
use crate::{
    api::auth::AdminUser,
    core::{
        audit::{self, AuditFilter},
        settings::{
            self, AppscriptConfigUpdate, AppscriptConfigView, MailSettingsUpdate, MailSettingsView,
        },
    },
    entities::audit_log,
    errors::Result,
};
use axum::{
    Json,
    extract::{Query, State},
};

/// GET /api/admin/mail-settings
pub async fn get_mail_settings(
    State(state): AppStateRef,
    AdminUser(_admin): AdminUser,
) -> Result<Json<MailSettingsView>> {
    let stored = settings::get_mail_settings(&state.db).await?;
    Ok(Json(stored.into()))
}

/// PUT /api/admin/mail-settings
pub async fn update_mail_settings(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Json(body): Json<MailSettingsUpdate>,
) -> Result<Json<MailSettingsView>> {
    let saved = settings::update_mail_settings(&state.db, admin.id, body).await?;
    Ok(Json(saved.into()))
}

/// GET /api/admin/appscript-config
pub async fn get_appscript_config(
    State(state): AppStateRef,
    AdminUser(_admin): AdminUser,
) -> Result<Json<AppscriptConfigView>> {
    let stored = settings::get_appscript_config(&state.db).await?;
    Ok(Json(stored.into()))
}

/// PUT /api/admin/appscript-config
pub async fn update_appscript_config(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Json(body): Json<AppscriptConfigUpdate>,
) -> Result<Json<AppscriptConfigView>> {
    let saved = settings::update_appscript_config(&state.db, admin.id, body).await?;
    Ok(Json(saved.into()))
}

/// GET /api/admin/audit-logs
pub async fn list_audit_logs(
    State(state): AppStateRef,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<AuditFilter>,
) -> Result<Json<Vec<audit_log::Model>>> {
    Ok(Json(audit::list(&state.db, filter).await?))
}
