//! Entitas entity - Organisational units (departments / business entities).
//!
//! Users and loans are attached to an entitas; an entitas optionally sits under
//! a directorate.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Entitas database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "entitas")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Short code
    #[sea_orm(unique)]
    pub code: String,
    /// Display name
    pub name: String,
    /// Parent directorate, if any
    pub directorate_id: Option<i64>,
    /// Inactive units are hidden from new submissions
    pub is_active: bool,
}

/// Defines relationships between Entitas and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entitas may belong to one directorate
    #[sea_orm(
        belongs_to = "super::directorate::Entity",
        from = "Column::DirectorateId",
        to = "super::directorate::Column::Id"
    )]
    Directorate,
    /// One entitas has many loans
    #[sea_orm(has_many = "super::loan::Entity")]
    Loans,
    /// One entitas has many users
    #[sea_orm(has_many = "super::user::Entity")]
    Users,
}

impl Related<super::directorate::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Directorate.def()
    }
}

impl Related<super::loan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Loans.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
