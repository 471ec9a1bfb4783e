//! Organisation reference data - roles, directorates, entitas and marketing companies.
//!
//! Codes are trimmed and upper-cased before storage so lookups from the seed catalog,
//! the API and loan submissions agree regardless of how a client typed them.

use crate::{
    core::audit,
    entities::{
        Directorate, Entitas, MktCompany, Role, directorate, entitas, mkt_company, role,
    },
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

fn normalize_code(field: &'static str, raw: &str) -> Result<String> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() {
        return Err(Error::validation(field, "cannot be empty"));
    }
    if code.chars().any(char::is_whitespace) {
        return Err(Error::validation(field, "cannot contain whitespace"));
    }
    Ok(code)
}

fn require_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::validation("name", "cannot be empty"));
    }
    Ok(name.to_string())
}

// ----- roles -----

/// Lists all roles ordered by name.
pub async fn list_roles(db: &DatabaseConnection) -> Result<Vec<role::Model>> {
    Role::find()
        .order_by_asc(role::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds a role by its exact name.
pub async fn get_role_by_name<C>(db: &C, name: &str) -> Result<Option<role::Model>>
where
    C: ConnectionTrait,
{
    Role::find()
        .filter(role::Column::Name.eq(name.trim().to_lowercase()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Returns the named role, creating it first if it does not exist.
pub async fn ensure_role<C>(db: &C, name: &str, description: Option<String>) -> Result<role::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = get_role_by_name(db, name).await? {
        return Ok(existing);
    }
    let name = require_name(name)?.to_lowercase();
    info!("Creating role {name}");
    role::ActiveModel {
        name: Set(name),
        description: Set(description),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

// ----- directorates -----

/// Lists all directorates ordered by code.
pub async fn list_directorates(db: &DatabaseConnection) -> Result<Vec<directorate::Model>> {
    Directorate::find()
        .order_by_asc(directorate::Column::Code)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds a directorate by code.
pub async fn get_directorate_by_code<C>(db: &C, code: &str) -> Result<Option<directorate::Model>>
where
    C: ConnectionTrait,
{
    Directorate::find()
        .filter(directorate::Column::Code.eq(code.trim().to_uppercase()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Creates a directorate with a unique code.
#[instrument(skip(db))]
pub async fn create_directorate<C>(
    db: &C,
    actor_id: Option<i64>,
    code: &str,
    name: &str,
) -> Result<directorate::Model>
where
    C: ConnectionTrait,
{
    let code = normalize_code("code", code)?;
    let name = require_name(name)?;
    if get_directorate_by_code(db, &code).await?.is_some() {
        return Err(Error::Conflict {
            message: format!("directorate {code} already exists"),
        });
    }

    let created = directorate::ActiveModel {
        code: Set(code),
        name: Set(name),
        ..Default::default()
    }
    .insert(db)
    .await?;
    audit::record(
        db,
        actor_id,
        "directorate.create",
        "directorate",
        created.id,
        json!({ "code": created.code }),
    )
    .await?;
    Ok(created)
}

// ----- entitas -----

/// Input for [`create_entitas`]
#[derive(Debug, Clone, Deserialize)]
pub struct NewEntitas {
    /// Unique code
    pub code: String,
    /// Display name
    pub name: String,
    /// Parent directorate
    #[serde(default)]
    pub directorate_id: Option<i64>,
}

/// Partial update for [`update_entitas`]; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitasUpdate {
    /// New display name
    pub name: Option<String>,
    /// New parent directorate
    pub directorate_id: Option<i64>,
    /// Enable or retire the unit
    pub is_active: Option<bool>,
}

/// Lists entitas ordered by code, optionally only active ones.
pub async fn list_entitas(db: &DatabaseConnection, active_only: bool) -> Result<Vec<entitas::Model>> {
    let mut query = Entitas::find();
    if active_only {
        query = query.filter(entitas::Column::IsActive.eq(true));
    }
    query
        .order_by_asc(entitas::Column::Code)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves an entitas by id.
pub async fn get_entitas<C>(db: &C, id: i64) -> Result<entitas::Model>
where
    C: ConnectionTrait,
{
    Entitas::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("entitas", id))
}

/// Finds an entitas by code.
pub async fn get_entitas_by_code<C>(db: &C, code: &str) -> Result<Option<entitas::Model>>
where
    C: ConnectionTrait,
{
    Entitas::find()
        .filter(entitas::Column::Code.eq(code.trim().to_uppercase()))
        .one(db)
        .await
        .map_err(Into::into)
}

async fn ensure_directorate_exists<C>(db: &C, directorate_id: Option<i64>) -> Result<()>
where
    C: ConnectionTrait,
{
    if let Some(id) = directorate_id {
        Directorate::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| Error::not_found("directorate", id))?;
    }
    Ok(())
}

/// Creates an entitas, optionally under a directorate.
#[instrument(skip(db))]
pub async fn create_entitas<C>(db: &C, actor_id: Option<i64>, input: NewEntitas) -> Result<entitas::Model>
where
    C: ConnectionTrait,
{
    let code = normalize_code("code", &input.code)?;
    let name = require_name(&input.name)?;
    ensure_directorate_exists(db, input.directorate_id).await?;
    if get_entitas_by_code(db, &code).await?.is_some() {
        return Err(Error::Conflict {
            message: format!("entitas {code} already exists"),
        });
    }

    let created = entitas::ActiveModel {
        code: Set(code),
        name: Set(name),
        directorate_id: Set(input.directorate_id),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await?;
    audit::record(
        db,
        actor_id,
        "entitas.create",
        "entitas",
        created.id,
        json!({ "code": created.code }),
    )
    .await?;
    Ok(created)
}

/// Applies a partial update to an entitas.
#[instrument(skip(db))]
pub async fn update_entitas(
    db: &DatabaseConnection,
    actor_id: i64,
    id: i64,
    update: EntitasUpdate,
) -> Result<entitas::Model> {
    let existing = get_entitas(db, id).await?;
    let mut active: entitas::ActiveModel = existing.into();
    if let Some(name) = &update.name {
        active.name = Set(require_name(name)?);
    }
    if update.directorate_id.is_some() {
        ensure_directorate_exists(db, update.directorate_id).await?;
        active.directorate_id = Set(update.directorate_id);
    }
    if let Some(is_active) = update.is_active {
        active.is_active = Set(is_active);
    }
    let updated = active.update(db).await?;
    audit::record(
        db,
        Some(actor_id),
        "entitas.update",
        "entitas",
        id,
        json!({
            "name": update.name,
            "directorate_id": update.directorate_id,
            "is_active": update.is_active,
        }),
    )
    .await?;
    Ok(updated)
}

// ----- marketing companies -----

/// Partial update for [`update_mkt_company`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MktCompanyUpdate {
    /// New display name
    pub name: Option<String>,
    /// Allow or block the company on new loans
    pub is_active: Option<bool>,
}

/// Lists marketing companies ordered by code, optionally only active ones.
pub async fn list_mkt_companies(
    db: &DatabaseConnection,
    active_only: bool,
) -> Result<Vec<mkt_company::Model>> {
    let mut query = MktCompany::find();
    if active_only {
        query = query.filter(mkt_company::Column::IsActive.eq(true));
    }
    query
        .order_by_asc(mkt_company::Column::Code)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a marketing company by id.
pub async fn get_mkt_company<C>(db: &C, id: i64) -> Result<mkt_company::Model>
where
    C: ConnectionTrait,
{
    MktCompany::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("mkt_company", id))
}

/// Finds a marketing company by code.
pub async fn get_mkt_company_by_code<C>(db: &C, code: &str) -> Result<Option<mkt_company::Model>>
where
    C: ConnectionTrait,
{
    MktCompany::find()
        .filter(mkt_company::Column::Code.eq(code.trim().to_uppercase()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Creates a marketing company with a unique code.
#[instrument(skip(db))]
pub async fn create_mkt_company<C>(
    db: &C,
    actor_id: Option<i64>,
    code: &str,
    name: &str,
) -> Result<mkt_company::Model>
where
    C: ConnectionTrait,
{
    let code = normalize_code("code", code)?;
    let name = require_name(name)?;
    if get_mkt_company_by_code(db, &code).await?.is_some() {
        return Err(Error::Conflict {
            message: format!("marketing company {code} already exists"),
        });
    }

    let created = mkt_company::ActiveModel {
        code: Set(code),
        name: Set(name),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await?;
    audit::record(
        db,
        actor_id,
        "mkt_company.create",
        "mkt_company",
        created.id,
        json!({ "code": created.code }),
    )
    .await?;
    Ok(created)
}

/// Applies a partial update to a marketing company.
#[instrument(skip(db))]
pub async fn update_mkt_company(
    db: &DatabaseConnection,
    actor_id: i64,
    id: i64,
    update: MktCompanyUpdate,
) -> Result<mkt_company::Model> {
    let existing = get_mkt_company(db, id).await?;
    let mut active: mkt_company::ActiveModel = existing.into();
    if let Some(name) = &update.name {
        active.name = Set(require_name(name)?);
    }
    if let Some(is_active) = update.is_active {
        active.is_active = Set(is_active);
    }
    let updated = active.update(db).await?;
    audit::record(
        db,
        Some(actor_id),
        "mkt_company.update",
        "mkt_company",
        id,
        json!({ "name": update.name, "is_active": update.is_active }),
    )
    .await?;
    Ok(updated)
}
