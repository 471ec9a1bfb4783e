//! Directorate entity - Top-level grouping of entitas.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Directorate database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "directorates")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Short code (e.g. "DIR-OPS")
    #[sea_orm(unique)]
    pub code: String,
    /// Display name
    pub name: String,
}

/// Defines relationships between Directorate and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One directorate has many entitas
    #[sea_orm(has_many = "super::entitas::Entity")]
    Entitas,
}

impl Related<super::entitas::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entitas.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
