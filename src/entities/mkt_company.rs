//! Marketing company entity - Companies whose stock is lent out.
//!
//! Each loan is linked to one or more companies through `loan_mkt_companies`;
//! every linked company approves and hands over its part independently.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Marketing company database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mkt_companies")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Short code, used as key inside loan approval documents
    #[sea_orm(unique)]
    pub code: String,
    /// Display name
    pub name: String,
    /// Inactive companies cannot be attached to new loans
    pub is_active: bool,
}

/// Defines relationships between `MktCompany` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Join rows linking this company to loans
    #[sea_orm(has_many = "super::loan_mkt_company::Entity")]
    LoanLinks,
}

impl Related<super::loan_mkt_company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoanLinks.def()
    }
}

impl Related<super::loan::Entity> for Entity {
    fn to() -> RelationDef {
        super::loan_mkt_company::Relation::Loan.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::loan_mkt_company::Relation::MktCompany.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
