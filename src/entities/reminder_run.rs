//! Reminder run entity - One execution of the reminder-notification job.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Reminder run database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reminder_runs")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// `due_soon` or `overdue`
    pub kind: String,
    /// `running`, `success` or `failed`
    pub status: String,
    /// When the run began
    pub started_at: DateTimeUtc,
    /// When the run ended
    pub finished_at: Option<DateTimeUtc>,
    /// Number of reminders delivered
    pub sent_count: i32,
    /// Failure description
    pub error: Option<String>,
    /// Free-form runner output (e.g. loan ids reminded)
    pub details: Json,
}

/// `ReminderRun` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
