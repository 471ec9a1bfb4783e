//! Audit log business logic.
//!
//! Workflow and admin operations call [`record`] with the same connection or
//! transaction they write through, so the log entry commits or rolls back with the
//! change it describes.

use crate::{
    entities::{AuditLog, audit_log},
    errors::Result,
};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use serde::Deserialize;
use serde_json::Value;

/// Default number of entries returned by [`list`]
pub const DEFAULT_LIMIT: u64 = 100;
/// Upper bound on entries returned by [`list`]
pub const MAX_LIMIT: u64 = 500;

/// Filter for [`list`]
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AuditFilter {
    /// Only entries about this kind of record
    pub entity_type: Option<String>,
    /// Only entries about this record
    pub entity_id: Option<String>,
    /// Only entries by this user
    pub actor_id: Option<i64>,
    /// Maximum number of entries (clamped to [`MAX_LIMIT`])
    pub limit: Option<u64>,
}

/// Appends an entry to the audit log.
pub async fn record<C>(
    db: &C,
    actor_id: Option<i64>,
    action: &str,
    entity_type: &str,
    entity_id: impl ToString,
    details: Value,
) -> Result<audit_log::Model>
where
    C: ConnectionTrait,
{
    let entry = audit_log::ActiveModel {
        actor_id: Set(actor_id),
        action: Set(action.to_string()),
        entity_type: Set(entity_type.to_string()),
        entity_id: Set(entity_id.to_string()),
        details: Set(details),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    entry.insert(db).await.map_err(Into::into)
}

/// Lists audit entries, newest first.
pub async fn list(db: &DatabaseConnection, filter: AuditFilter) -> Result<Vec<audit_log::Model>> {
    let mut query = AuditLog::find();
    if let Some(entity_type) = filter.entity_type {
        query = query.filter(audit_log::Column::EntityType.eq(entity_type));
    }
    if let Some(entity_id) = filter.entity_id {
        query = query.filter(audit_log::Column::EntityId.eq(entity_id));
    }
    if let Some(actor_id) = filter.actor_id {
        query = query.filter(audit_log::Column::ActorId.eq(actor_id));
    }

    let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    query
        .order_by_desc(audit_log::Column::CreatedAt)
        .order_by_desc(audit_log::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}
