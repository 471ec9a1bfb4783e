//! Core business logic - framework-agnostic operations over the database.
//!
//! Nothing here knows about HTTP; the `api` layer and the CLI both call into these
//! modules and map their errors.

/// Audit log recording and queries
pub mod audit;
/// Password checks, login and session tokens
pub mod auth;
/// Loan submission and workflow steps
pub mod loan;
/// Typed view over the loan JSON columns and status derivation
pub mod loan_state;
/// Bulk loan normalisation
pub mod maintenance;
/// Roles, directorates, entitas and marketing companies
pub mod organization;
/// Reminder runs and due-loan queries
pub mod reminder;
/// Reference data seeding
pub mod seed;
/// Mail settings and Apps Script config
pub mod settings;
/// JSON snapshot export and import
pub mod snapshot;
/// Registration and account administration
pub mod user;
