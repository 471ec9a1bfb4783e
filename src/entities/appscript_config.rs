//! Apps Script configuration entity - Settings shared with the external
//! reminder runner. Single row, id = 1.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Apps Script configuration database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "appscript_config")]
pub struct Model {
    /// Always 1
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    /// Deployed web-app URL of the runner
    pub script_url: String,
    /// Shared secret the runner presents in `X-Appscript-Token`
    pub secret_token: String,
    /// Runner reports are rejected while disabled
    pub enabled: bool,
    /// How many days before the due date a reminder goes out
    pub reminder_days_before: i32,
    /// Last modification
    pub updated_at: DateTimeUtc,
}

/// `AppscriptConfig` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
