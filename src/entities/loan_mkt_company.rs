//! Join table between loans and marketing companies.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Loan/company link
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "loan_mkt_companies")]
pub struct Model {
    /// Linked loan
    #[sea_orm(primary_key, auto_increment = false)]
    pub loan_id: i64,
    /// Linked company
    #[sea_orm(primary_key, auto_increment = false)]
    pub mkt_company_id: i64,
}

/// Both sides of the link
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The loan side
    #[sea_orm(
        belongs_to = "super::loan::Entity",
        from = "Column::LoanId",
        to = "super::loan::Column::Id",
        on_delete = "Cascade"
    )]
    Loan,
    /// The company side
    #[sea_orm(
        belongs_to = "super::mkt_company::Entity",
        from = "Column::MktCompanyId",
        to = "super::mkt_company::Column::Id"
    )]
    MktCompany,
}

impl Related<super::loan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Loan.def()
    }
}

impl Related<super::mkt_company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MktCompany.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
