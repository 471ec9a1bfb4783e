//! Loan entity - An internal borrowing request.
//!
//! The workflow state lives in four JSON columns whose shapes are decoded by
//! `core::loan_state`:
//! - `approvals`: company code -> approval entry
//! - `warehouse_status`: company code -> hand-over entry
//! - `return_request`: the borrower's return request, if any
//! - `need_details`: list of requested items
//!
//! `status` is a denormalised summary re-derived from those columns on every write.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Loan database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "loans")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-facing reference (`LN-YYYYMMDD-NNNN`)
    #[sea_orm(unique)]
    pub code: String,
    /// User who submitted the request
    pub borrower_id: i64,
    /// Organisational unit the loan is charged to
    pub entitas_id: i64,
    /// Why the items are needed
    pub purpose: String,
    /// Where the items will be used
    pub location: Option<String>,
    /// First day of use
    pub start_date: Date,
    /// Day the items are due back
    pub end_date: Date,
    /// Derived overall status
    pub status: String,
    /// Per-company approval entries
    pub approvals: Json,
    /// Per-company warehouse hand-over entries
    pub warehouse_status: Json,
    /// Borrower's return request
    pub return_request: Option<Json>,
    /// Requested items
    pub need_details: Json,
    /// Withdrawn by the borrower or an admin
    pub cancelled: bool,
    /// When the loan was submitted
    pub created_at: DateTimeUtc,
    /// When the loan was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Loan and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each loan has one borrower
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::BorrowerId",
        to = "super::user::Column::Id"
    )]
    Borrower,
    /// Each loan is charged to one entitas
    #[sea_orm(
        belongs_to = "super::entitas::Entity",
        from = "Column::EntitasId",
        to = "super::entitas::Column::Id"
    )]
    Entitas,
    /// Join rows linking this loan to companies
    #[sea_orm(has_many = "super::loan_mkt_company::Entity")]
    CompanyLinks,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Borrower.def()
    }
}

impl Related<super::entitas::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entitas.def()
    }
}

impl Related<super::loan_mkt_company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CompanyLinks.def()
    }
}

impl Related<super::mkt_company::Entity> for Entity {
    fn to() -> RelationDef {
        super::loan_mkt_company::Relation::MktCompany.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::loan_mkt_company::Relation::Loan.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
