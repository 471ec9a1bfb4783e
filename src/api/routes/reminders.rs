//! Reminder status and the external runner's reporting endpoints.
//!
//! The runner (a scheduled Apps Script) authenticates with the shared token in the
//! `X-Appscript-Token` header. It either reports a finished run in one call, or
//! opens a run and closes it once mails are out.

use super::AppStateRef;
use crate::{
    api::{
        AppState,
        auth::{AdminUser, ReminderReader, ReminderRunner},
    },
    core::{
        reminder::{self, DueLoan, ReminderKind, ReminderStatus, RunReport},
        settings,
    },
    entities::reminder_run,
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

async fn days_before(state: &Arc<AppState>) -> Result<i64> {
    settings::reminder_days_before(&state.db, state.config.reminder_days_before).await
}

/// GET /api/reminders/status
pub async fn reminder_status(
    State(state): AppStateRef,
    AdminUser(_admin): AdminUser,
) -> Result<Json<ReminderStatus>> {
    let days = days_before(&state).await?;
    let today = Utc::now().date_naive();
    Ok(Json(reminder::reminder_status(&state.db, today, days).await?))
}

/// GET /api/reminders/due
pub async fn due_loans(
    State(state): AppStateRef,
    _reader: ReminderReader,
) -> Result<Json<Vec<DueLoan>>> {
    let days = days_before(&state).await?;
    let today = Utc::now().date_naive();
    Ok(Json(reminder::find_due_loans(&state.db, today, days).await?))
}

/// POST /api/reminders/runs - one-shot report of a finished run
pub async fn record_run(
    State(state): AppStateRef,
    _runner: ReminderRunner,
    Json(report): Json<RunReport>,
) -> Result<(StatusCode, Json<reminder_run::Model>)> {
    let run = reminder::record_run(&state.db, report).await?;
    info!(run_id = run.id, kind = %run.kind, status = %run.status, "Reminder run reported");
    Ok((StatusCode::CREATED, Json(run)))
}

/// Body of `POST /api/reminders/runs/start`
#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    /// Reminder kind being sent
    pub kind: ReminderKind,
}

/// POST /api/reminders/runs/start
pub async fn start_run(
    State(state): AppStateRef,
    _runner: ReminderRunner,
    Json(body): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<reminder_run::Model>)> {
    let run = reminder::start_run(&state.db, body.kind).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

/// Body of `POST /api/reminders/runs/{id}/finish`
#[derive(Debug, Deserialize)]
pub struct FinishRunRequest {
    /// Mails sent
    pub sent_count: i32,
    /// Failure message; absent means success
    #[serde(default)]
    pub error: Option<String>,
}

/// POST /api/reminders/runs/{id}/finish
pub async fn finish_run(
    State(state): AppStateRef,
    _runner: ReminderRunner,
    Path(id): Path<i64>,
    Json(body): Json<FinishRunRequest>,
) -> Result<Json<reminder_run::Model>> {
    let run = reminder::finish_run(&state.db, id, body.sent_count, body.error).await?;
    Ok(Json(run))
}
