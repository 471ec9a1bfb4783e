//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod appscript_config;
pub mod audit_log;
pub mod directorate;
pub mod entitas;
pub mod loan;
pub mod loan_mkt_company;
pub mod mail_setting;
pub mod mkt_company;
pub mod reminder_run;
pub mod role;
pub mod user;

// Re-export specific types to avoid conflicts
pub use appscript_config::{Entity as AppscriptConfig, Model as AppscriptConfigModel};
pub use audit_log::{Column as AuditLogColumn, Entity as AuditLog, Model as AuditLogModel};
pub use directorate::{Column as DirectorateColumn, Entity as Directorate, Model as DirectorateModel};
pub use entitas::{Column as EntitasColumn, Entity as Entitas, Model as EntitasModel};
pub use loan::{Column as LoanColumn, Entity as Loan, Model as LoanModel};
pub use loan_mkt_company::{
    Column as LoanMktCompanyColumn, Entity as LoanMktCompany, Model as LoanMktCompanyModel,
};
pub use mail_setting::{Entity as MailSetting, Model as MailSettingModel};
pub use mkt_company::{Column as MktCompanyColumn, Entity as MktCompany, Model as MktCompanyModel};
pub use reminder_run::{Column as ReminderRunColumn, Entity as ReminderRun, Model as ReminderRunModel};
pub use role::{Column as RoleColumn, Entity as Role, Model as RoleModel};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
