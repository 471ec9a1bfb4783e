//! Audit log entity - Append-only record of administrative and workflow actions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit log database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who acted; `None` for system jobs
    pub actor_id: Option<i64>,
    /// Dotted action name (e.g. `loan.approve`)
    pub action: String,
    /// Kind of record touched (e.g. `loan`)
    pub entity_type: String,
    /// Identifier of the record touched
    pub entity_id: String,
    /// Action-specific payload
    pub details: Json,
    /// When the action happened
    pub created_at: DateTimeUtc,
}

/// `AuditLog` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
