//! Route handlers, one module per resource.

/// Settings and audit trail
pub mod admin;
/// Login, registration, own account
pub mod auth;
/// Liveness
pub mod health;
/// Loan workflow
pub mod loans;
/// Reference data
pub mod organization;
/// Reminder status and runner reports
pub mod reminders;
/// Account administration
pub mod users;

use crate::api::AppState;
use axum::extract::State;
use std::sync::Arc;

/// Shared state extractor used by every handler
pub type AppStateRef = State<Arc<AppState>>;
