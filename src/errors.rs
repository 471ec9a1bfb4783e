//! Unified error types and result handling.
//!
//! Every fallible operation in the crate returns [`Result`]. Each variant maps to a
//! stable string code (see [`Error::code`]) that the HTTP layer sends to clients.

use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Error reported by the ORM or the database driver
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem error (snapshots, seed files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML seed catalog could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Input failed validation
    #[error("{field}: {message}")]
    Validation {
        /// Offending field
        field: &'static str,
        /// Human-readable reason
        message: String,
    },

    /// A record does not exist
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of record (e.g. "loan")
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Login identifier matched no user
    #[error("User not found")]
    UserNotFound,

    /// Password did not match
    #[error("Invalid password")]
    InvalidPassword,

    /// Account is waiting for admin approval
    #[error("Account is awaiting approval")]
    AccountPending,

    /// Account was rejected or disabled
    #[error("Account is disabled")]
    AccountDisabled,

    /// Missing or invalid credentials on a request
    #[error("Authentication required")]
    Unauthorized,

    /// Authenticated but not allowed
    #[error("Forbidden: {reason}")]
    Forbidden {
        /// Why access was denied
        reason: String,
    },

    /// Unique constraint or state conflict
    #[error("Conflict: {message}")]
    Conflict {
        /// What collided
        message: String,
    },

    /// A workflow step was attempted from the wrong state
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        /// Attempted action
        action: &'static str,
        /// Current state of the record
        state: String,
    },

    /// bcrypt failure
    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    /// JWT encoding/decoding failure
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl Error {
    /// Stable machine-readable code sent to API clients
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::AccountPending => "ACCOUNT_PENDING",
            Self::AccountDisabled => "ACCOUNT_DISABLED",
            Self::Unauthorized | Self::Token(_) => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Conflict { .. } => "CONFLICT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Config { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Toml(_)
            | Self::PasswordHash(_) => "INTERNAL_ERROR",
        }
    }

    /// Shorthand for a validation failure
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Shorthand for a missing record
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a permission failure
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::UserNotFound.code(), "USER_NOT_FOUND");
        assert_eq!(Error::InvalidPassword.code(), "INVALID_PASSWORD");
        assert_eq!(Error::not_found("loan", 7).code(), "NOT_FOUND");
        assert_eq!(
            Error::Config {
                message: "x".to_string()
            }
            .code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(Error::not_found("loan", 7).to_string(), "loan '7' not found");
        let err = Error::InvalidTransition {
            action: "approve",
            state: "rejected".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot approve while rejected");
    }
}
