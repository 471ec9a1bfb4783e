//! User entity - Accounts that submit, approve and handle loans.
//!
//! New registrations start in `pending` and must be approved by an admin before
//! they can log in. `mkt_company_id` names the marketing company an approver or
//! warehouse user acts for.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login name
    #[sea_orm(unique)]
    pub username: String,
    /// Contact address, also accepted as login identifier
    #[sea_orm(unique)]
    pub email: String,
    /// Display name
    pub full_name: String,
    /// bcrypt hash (legacy rows may still hold plaintext)
    pub password_hash: String,
    /// Assigned role
    pub role_id: i64,
    /// Organisational unit the user belongs to
    pub entitas_id: Option<i64>,
    /// Marketing company the user approves or handles stock for
    pub mkt_company_id: Option<i64>,
    /// `pending`, `active`, `rejected` or `disabled`
    pub status: String,
    /// When the account was registered
    pub created_at: DateTimeUtc,
    /// When the account was last modified
    pub updated_at: DateTimeUtc,
    /// When an admin approved the account
    pub approved_at: Option<DateTimeUtc>,
    /// Admin who approved the account
    pub approved_by: Option<i64>,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each user has one role
    #[sea_orm(
        belongs_to = "super::role::Entity",
        from = "Column::RoleId",
        to = "super::role::Column::Id"
    )]
    Role,
    /// A user may belong to one entitas
    #[sea_orm(
        belongs_to = "super::entitas::Entity",
        from = "Column::EntitasId",
        to = "super::entitas::Column::Id"
    )]
    Entitas,
    /// A user has many loans as borrower
    #[sea_orm(has_many = "super::loan::Entity")]
    Loans,
}

impl Related<super::role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Role.def()
    }
}

impl Related<super::entitas::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entitas.def()
    }
}

impl Related<super::loan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Loans.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
