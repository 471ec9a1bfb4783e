//! Mail settings entity - SMTP configuration used for notification mail.
//! Single row, id = 1.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Mail settings database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mail_settings")]
pub struct Model {
    /// Always 1
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    /// SMTP server host name
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: i32,
    /// SMTP login
    pub smtp_user: String,
    /// SMTP password (never returned by the API)
    pub smtp_password: String,
    /// Envelope sender
    pub from_address: String,
    /// Use implicit TLS / STARTTLS
    pub use_tls: bool,
    /// Notify approvers when a loan is submitted
    pub notify_on_submit: bool,
    /// Notify borrowers when a decision is made
    pub notify_on_decision: bool,
    /// Last modification
    pub updated_at: DateTimeUtc,
}

/// `MailSetting` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
