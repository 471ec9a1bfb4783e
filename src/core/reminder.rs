//! Reminder bookkeeping for the external notification runner.
//!
//! Delivery happens outside this service (an Apps Script trigger). This module tells
//! the runner which loans are due, records each run the runner reports and summarises
//! recent runs for the admin dashboard.

use crate::{
    core::loan_state::{LoanDocument, LoanStatus, ReturnStatus},
    entities::{Loan, ReminderRun, User, loan, reminder_run},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sea_orm::{PaginatorTrait, QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{info, instrument, warn};

/// Window used by [`reminder_status`] to count recent failures
pub const FAILURE_WINDOW_DAYS: i64 = 7;

/// Which reminder a run sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// End date is close
    DueSoon,
    /// End date has passed
    Overdue,
}

impl ReminderKind {
    /// Value stored in `reminder_runs.kind`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DueSoon => "due_soon",
            Self::Overdue => "overdue",
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Started, not yet reported back
    Running,
    /// Finished without error
    Success,
    /// Finished with an error
    Failed,
}

impl RunStatus {
    /// Value stored in `reminder_runs.status`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// A loan that needs a reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueLoan {
    /// Loan id
    pub loan_id: i64,
    /// Loan code
    pub code: String,
    /// Borrower id
    pub borrower_id: i64,
    /// Borrower display name
    pub borrower_name: Option<String>,
    /// Borrower address
    pub borrower_email: Option<String>,
    /// Due date
    pub end_date: NaiveDate,
    /// Days until the due date (negative when overdue)
    pub days_left: i64,
    /// Which reminder applies
    pub kind: ReminderKind,
}

/// A run reported in one call by an external runner
#[derive(Debug, Clone, Deserialize)]
pub struct RunReport {
    /// Which reminder was sent
    pub kind: ReminderKind,
    /// Number of reminders delivered
    #[serde(default)]
    pub sent_count: i32,
    /// Failure description; presence marks the run failed
    #[serde(default)]
    pub error: Option<String>,
    /// Free-form runner output
    #[serde(default)]
    pub details: Option<Value>,
    /// When the runner started; defaults to now
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// Dashboard summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderStatus {
    /// Most recent due-soon run
    pub last_due_soon: Option<reminder_run::Model>,
    /// Most recent overdue run
    pub last_overdue: Option<reminder_run::Model>,
    /// Failed runs started in the last [`FAILURE_WINDOW_DAYS`] days
    pub recent_failures: u64,
    /// Loans currently due soon
    pub due_soon: usize,
    /// Loans currently overdue
    pub overdue: usize,
    /// Window used for `due_soon`
    pub days_before: i64,
}

/// Loans in use that are due within `days_before` days of `today` or already
/// overdue, earliest end date first. Loans with an approved return are skipped.
pub async fn find_due_loans(
    db: &DatabaseConnection,
    today: NaiveDate,
    days_before: i64,
) -> Result<Vec<DueLoan>> {
    let horizon = Duration::try_days(days_before.max(0))
        .and_then(|window| today.checked_add_signed(window))
        .ok_or_else(|| Error::validation("days_before", "window is out of range"))?;
    let rows = Loan::find()
        .filter(loan::Column::Status.eq(LoanStatus::InUse.as_str()))
        .filter(loan::Column::Cancelled.eq(false))
        .filter(loan::Column::EndDate.lte(horizon))
        .order_by_asc(loan::Column::EndDate)
        .order_by_asc(loan::Column::Id)
        .find_also_related(User)
        .all(db)
        .await?;

    let due = rows
        .into_iter()
        .filter(|(loan, _)| {
            let (doc, _) = LoanDocument::decode(
                &Value::Null,
                &Value::Null,
                loan.return_request.as_ref(),
                &Value::Null,
            );
            doc.return_request
                .is_none_or(|r| r.status != ReturnStatus::Approved)
        })
        .map(|(loan, borrower)| {
            let days_left = (loan.end_date - today).num_days();
            DueLoan {
                loan_id: loan.id,
                code: loan.code,
                borrower_id: loan.borrower_id,
                borrower_name: borrower.as_ref().map(|u| u.full_name.clone()),
                borrower_email: borrower.map(|u| u.email),
                end_date: loan.end_date,
                days_left,
                kind: if days_left < 0 {
                    ReminderKind::Overdue
                } else {
                    ReminderKind::DueSoon
                },
            }
        })
        .collect();
    Ok(due)
}

/// Opens a run in `running` state.
#[instrument(skip(db))]
pub async fn start_run(db: &DatabaseConnection, kind: ReminderKind) -> Result<reminder_run::Model> {
    reminder_run::ActiveModel {
        kind: Set(kind.as_str().to_string()),
        status: Set(RunStatus::Running.as_str().to_string()),
        started_at: Set(Utc::now()),
        finished_at: Set(None),
        sent_count: Set(0),
        error: Set(None),
        details: Set(Value::Object(serde_json::Map::new())),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Closes a running run; an error marks it failed.
#[instrument(skip(db))]
pub async fn finish_run(
    db: &DatabaseConnection,
    run_id: i64,
    sent_count: i32,
    error: Option<String>,
) -> Result<reminder_run::Model> {
    let run = ReminderRun::find_by_id(run_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("reminder_run", run_id))?;
    if run.status != RunStatus::Running.as_str() {
        return Err(Error::InvalidTransition {
            action: "finish_run",
            state: run.status,
        });
    }
    if sent_count < 0 {
        return Err(Error::validation("sent_count", "cannot be negative"));
    }

    let error = error.filter(|e| !e.trim().is_empty());
    let status = if error.is_some() {
        RunStatus::Failed
    } else {
        RunStatus::Success
    };
    let mut active: reminder_run::ActiveModel = run.into();
    active.status = Set(status.as_str().to_string());
    active.finished_at = Set(Some(Utc::now()));
    active.sent_count = Set(sent_count);
    active.error = Set(error);
    let saved = active.update(db).await?;
    if status == RunStatus::Failed {
        warn!(run_id, "Reminder run failed: {:?}", saved.error);
    } else {
        info!(run_id, sent_count, "Reminder run finished");
    }
    Ok(saved)
}

/// Records a complete run reported by an external runner.
#[instrument(skip(db, report), fields(kind = %report.kind))]
pub async fn record_run(db: &DatabaseConnection, report: RunReport) -> Result<reminder_run::Model> {
    if report.sent_count < 0 {
        return Err(Error::validation("sent_count", "cannot be negative"));
    }
    let now = Utc::now();
    let error = report.error.filter(|e| !e.trim().is_empty());
    let status = if error.is_some() {
        RunStatus::Failed
    } else {
        RunStatus::Success
    };
    let saved = reminder_run::ActiveModel {
        kind: Set(report.kind.as_str().to_string()),
        status: Set(status.as_str().to_string()),
        started_at: Set(report.started_at.unwrap_or(now)),
        finished_at: Set(Some(now)),
        sent_count: Set(report.sent_count),
        error: Set(error),
        details: Set(report
            .details
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(run_id = saved.id, status = %saved.status, "Recorded reminder run");
    Ok(saved)
}

async fn last_run(db: &DatabaseConnection, kind: ReminderKind) -> Result<Option<reminder_run::Model>> {
    ReminderRun::find()
        .filter(reminder_run::Column::Kind.eq(kind.as_str()))
        .order_by_desc(reminder_run::Column::StartedAt)
        .order_by_desc(reminder_run::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Summarises recent runs and the loans currently needing reminders.
pub async fn reminder_status(
    db: &DatabaseConnection,
    today: NaiveDate,
    days_before: i64,
) -> Result<ReminderStatus> {
    let cutoff = (today - Duration::days(FAILURE_WINDOW_DAYS))
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| Error::validation("today", "out of range"))?;
    let recent_failures = ReminderRun::find()
        .filter(reminder_run::Column::Status.eq(RunStatus::Failed.as_str()))
        .filter(reminder_run::Column::StartedAt.gte(cutoff))
        .count(db)
        .await?;

    let due = find_due_loans(db, today, days_before).await?;
    let overdue = due
        .iter()
        .filter(|d| d.kind == ReminderKind::Overdue)
        .count();

    Ok(ReminderStatus {
        last_due_soon: last_run(db, ReminderKind::DueSoon).await?,
        last_overdue: last_run(db, ReminderKind::Overdue).await?,
        recent_failures,
        due_soon: due.len() - overdue,
        overdue,
        days_before,
    })
}
