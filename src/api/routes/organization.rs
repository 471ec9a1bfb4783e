//! Reference data: roles, directorates, entitas and marketing companies.
//!
//! Any signed-in user may read; writes need the admin role.

use super::AppStateRef;
use crate::{
    api::auth::{AdminUser, AuthUser},
    core::organization::{self, EntitasUpdate, MktCompanyUpdate, NewEntitas},
    entities::{directorate, entitas, mkt_company, role},
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

/// Query accepted by the list endpoints of toggleable records
#[derive(Debug, Default, Deserialize)]
pub struct ActiveQuery {
    /// Hide inactive records
    #[serde(default)]
    pub active_only: bool,
}

/// Body for creating a coded record
#[derive(Debug, Deserialize)]
pub struct NewCoded {
    /// Unique code
    pub code: String,
    /// Display name
    pub name: String,
}

/// GET /api/roles
pub async fn list_roles(
    State(state): AppStateRef,
    AuthUser(_actor): AuthUser,
) -> Result<Json<Vec<role::Model>>> {
    Ok(Json(organization::list_roles(&state.db).await?))
}

/// GET /api/directorates
pub async fn list_directorates(
    State(state): AppStateRef,
    AuthUser(_actor): AuthUser,
) -> Result<Json<Vec<directorate::Model>>> {
    Ok(Json(organization::list_directorates(&state.db).await?))
}

/// POST /api/directorates
pub async fn create_directorate(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Json(body): Json<NewCoded>,
) -> Result<(StatusCode, Json<directorate::Model>)> {
    let created =
        organization::create_directorate(&state.db, Some(admin.id), &body.code, &body.name).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/entitas
pub async fn list_entitas(
    State(state): AppStateRef,
    AuthUser(_actor): AuthUser,
    Query(query): Query<ActiveQuery>,
) -> Result<Json<Vec<entitas::Model>>> {
    Ok(Json(
        organization::list_entitas(&state.db, query.active_only).await?,
    ))
}

/// POST /api/entitas
pub async fn create_entitas(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Json(body): Json<NewEntitas>,
) -> Result<(StatusCode, Json<entitas::Model>)> {
    let created = organization::create_entitas(&state.db, Some(admin.id), body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/entitas/{id}
pub async fn update_entitas(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<EntitasUpdate>,
) -> Result<Json<entitas::Model>> {
    Ok(Json(
        organization::update_entitas(&state.db, admin.id, id, body).await?,
    ))
}

/// GET /api/mkt-companies
pub async fn list_mkt_companies(
    State(state): AppStateRef,
    AuthUser(_actor): AuthUser,
    Query(query): Query<ActiveQuery>,
) -> Result<Json<Vec<mkt_company::Model>>> {
    Ok(Json(
        organization::list_mkt_companies(&state.db, query.active_only).await?,
    ))
}

/// POST /api/mkt-companies
pub async fn create_mkt_company(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Json(body): Json<NewCoded>,
) -> Result<(StatusCode, Json<mkt_company::Model>)> {
    let created =
        organization::create_mkt_company(&state.db, Some(admin.id), &body.code, &body.name).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/mkt-companies/{id}
pub async fn update_mkt_company(
    State(state): AppStateRef,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<MktCompanyUpdate>,
) -> Result<Json<mkt_company::Model>> {
    Ok(Json(
        organization::update_mkt_company(&state.db, admin.id, id, body).await?,
    ))
}
