//! Error responses.
//!
//! Every error becomes `{"error": CODE, "message": text}` with a status derived from
//! the error kind. Internal failures are logged and answered with a generic message.

use crate::errors::Error;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

impl Error {
    /// HTTP status for this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            Self::UserNotFound | Self::InvalidPassword | Self::Unauthorized | Self::Token(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden { .. } | Self::AccountPending | Self::AccountDisabled => {
                StatusCode::FORBIDDEN
            }
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Log the actual error, return generic message
            tracing::error!("Internal error: {self}");
            "an internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": self.code(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_error_is_400() {
        let response = Error::validation("name", "cannot be empty").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response).await;
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_auth_errors_are_401_and_403() {
        assert_eq!(
            Error::InvalidPassword.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::UserNotFound.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::AccountPending.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let err = Error::Database(sea_orm::DbErr::Custom("disk on fire".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert_eq!(body["error"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "an internal error occurred");
    }

    #[tokio::test]
    async fn test_not_found_is_404() {
        let response = Error::not_found("loan", 7).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_of(response).await;
        assert_eq!(body["error"], "NOT_FOUND");
    }
}
