//! Login, registration and the caller's own account.

use super::AppStateRef;
use crate::{
    api::auth::AuthUser,
    core::{
        auth::{self, Actor},
        user::{self, NewUser, UserSummary},
    },
    errors::{Error, Result},
};
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/auth/login`
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub identifier: String,
    /// Plain password
    pub password: String,
}

/// Successful login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Bearer token for later requests
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
    /// The signed-in user
    pub user: Actor,
}

/// POST /api/auth/login
pub async fn login(
    State(state): AppStateRef,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let actor = auth::login(&state.db, &body.identifier, &body.password).await?;
    let ttl_hours = state.config.token_ttl_hours;
    let token = auth::issue_token(&actor, &state.auth_secret, ttl_hours)?;
    Ok(Json(LoginResponse {
        token,
        expires_in: ttl_hours * 3600,
        user: actor,
    }))
}

/// POST /api/auth/register - new accounts wait for approval
pub async fn register(
    State(state): AppStateRef,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<UserSummary>)> {
    if !state.config.registration_enabled {
        return Err(Error::forbidden("registration is closed"));
    }
    let created = user::register(&state.db, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/auth/me
pub async fn me(
    State(state): AppStateRef,
    AuthUser(actor): AuthUser,
) -> Result<Json<UserSummary>> {
    Ok(Json(user::get_user(&state.db, actor.id).await?))
}

/// Body of `POST /api/auth/password`
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    /// Password in use now
    pub current_password: String,
    /// Replacement
    pub new_password: String,
}

/// POST /api/auth/password
pub async fn change_password(
    State(state): AppStateRef,
    AuthUser(actor): AuthUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    auth::change_password(
        &state.db,
        actor.id,
        &body.current_password,
        &body.new_password,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
