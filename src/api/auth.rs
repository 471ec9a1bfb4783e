//! Request authentication extractors.

use crate::{
    api::AppState,
    core::{
        auth::{self, Actor},
        settings,
    },
    errors::{Error, Result},
};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;

/// Header carrying the shared secret of the external reminder runner
pub const RUNNER_TOKEN_HEADER: &str = "x-appscript-token";

/// The caller behind a valid `Authorization: Bearer <token>` header.
///
/// Rejects with `401` when the header is missing, malformed or expired, and with
/// `403` when the account is no longer active.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Actor);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let token = bearer_token(parts).ok_or(Error::Unauthorized)?;
        let claims =
            auth::verify_token(token, &state.auth_secret).map_err(|_| Error::Unauthorized)?;
        let actor = auth::load_actor(&state.db, claims.sub).await?;
        Ok(Self(actor))
    }
}

/// An authenticated caller holding the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub Actor);

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let AuthUser(actor) = AuthUser::from_request_parts(parts, state).await?;
        actor.require_admin()?;
        Ok(Self(actor))
    }
}

/// The external reminder runner, identified by the `X-Appscript-Token` header
#[derive(Debug, Clone, Copy)]
pub struct ReminderRunner;

impl FromRequestParts<Arc<AppState>> for ReminderRunner {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let presented = parts
            .headers
            .get(RUNNER_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(Error::Unauthorized)?;
        if settings::verify_appscript_token(&state.db, presented).await? {
            Ok(Self)
        } else {
            Err(Error::Unauthorized)
        }
    }
}

/// Either an admin or the reminder runner
#[derive(Debug, Clone)]
pub enum ReminderReader {
    /// Signed-in admin
    Admin(Actor),
    /// External runner
    Runner,
}

impl FromRequestParts<Arc<AppState>> for ReminderReader {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        if parts.headers.contains_key(RUNNER_TOKEN_HEADER) {
            ReminderRunner::from_request_parts(parts, state).await?;
            return Ok(Self::Runner);
        }
        let AdminUser(actor) = AdminUser::from_request_parts(parts, state).await?;
        Ok(Self::Admin(actor))
    }
}

/// Fails with `FORBIDDEN` unless the actor holds one of `roles` (admins always pass).
pub fn require_role(actor: &Actor, roles: &[&str]) -> Result<()> {
    if roles.iter().any(|role| actor.has_role(role)) {
        Ok(())
    } else {
        Err(Error::forbidden(format!("requires role {}", roles.join(" or "))))
    }
}
