//! Account administration (admin only).

use super::AppStateRef;
use crate::{
    api::auth::AdminUser,
    core::{
        auth::AccountStatus,
        user::{self, Affiliation, UserSummary},
    },
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

/// Query of `GET /api/users`
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    /// Only accounts in this state
    pub status: Option<AccountStatus>,
}

/// GET /api/users?status=
pub async fn list_users(
    State(state): AppStateRef,
    AdminUser(_admin): AdminUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<UserSummary>>> {
    Ok(Json(user::list_users(&state.db, query.status).await?))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): AppStateRef,
    AdminUser(_admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<UserSummary>> {
    Ok(Json(user::get_user(&state.db, id).await?))
}

/// POST /api/users/{id}/approve
pub async fn approve_user(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<UserSummary>> {
    Ok(Json(user::approve_user(&state.db, &admin, id).await?))
}

/// POST /api/users/{id}/reject
pub async fn reject_user(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<UserSummary>> {
    Ok(Json(user::reject_user(&state.db, &admin, id).await?))
}

/// POST /api/users/{id}/disable
pub async fn disable_user(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<UserSummary>> {
    Ok(Json(user::disable_user(&state.db, &admin, id).await?))
}

/// Body of `POST /api/users/{id}/reset-password`
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    /// Replacement password
    pub new_password: String,
}

/// POST /api/users/{id}/reset-password
pub async fn reset_password(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<StatusCode> {
    user::reset_password(&state.db, Some(admin.id), id, &body.new_password).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Body of `PUT /api/users/{id}/role`
#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    /// Role name
    pub role: String,
}

/// PUT /api/users/{id}/role
pub async fn set_role(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<SetRoleRequest>,
) -> Result<Json<UserSummary>> {
    Ok(Json(user::set_role(&state.db, &admin, id, &body.role).await?))
}

/// PUT /api/users/{id}/affiliation
pub async fn set_affiliation(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<Affiliation>,
) -> Result<Json<UserSummary>> {
    Ok(Json(user::set_affiliation(&state.db, &admin, id, body).await?))
}
