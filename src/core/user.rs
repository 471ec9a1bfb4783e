//! User registration and account administration.
//!
//! Self-registered accounts start as `pending` with the plain `user` role. An admin
//! approves or rejects them, assigns roles and links approvers and warehouse staff to
//! the marketing company they act for. Every mutation lands in the audit log.

use crate::{
    core::{
        audit,
        auth::{self, AccountStatus, Actor, ROLE_USER},
        organization,
    },
    entities::{Role, User, role, user},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Condition, QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

/// Registration input
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Login name (3-32 chars of `a-z 0-9 . _ -`)
    pub username: String,
    /// Contact address
    pub email: String,
    /// Display name
    pub full_name: String,
    /// Plain password, hashed before storage
    pub password: String,
    /// Organisational unit, if known at registration
    #[serde(default)]
    pub entitas_id: Option<i64>,
}

/// Organisational links of an account; both fields are replaced as a whole.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Affiliation {
    /// Organisational unit
    pub entitas_id: Option<i64>,
    /// Company an approver or warehouse user acts for
    pub mkt_company_id: Option<i64>,
}

/// A user as shown to clients, without the password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    /// User id
    pub id: i64,
    /// Login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Display name
    pub full_name: String,
    /// Role name
    pub role: String,
    /// Account status
    pub status: String,
    /// Organisational unit
    pub entitas_id: Option<i64>,
    /// Company the user acts for
    pub mkt_company_id: Option<i64>,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Approval time
    pub approved_at: Option<DateTime<Utc>>,
}

impl UserSummary {
    fn from_parts(user: user::Model, role: Option<role::Model>) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role: role.map(|r| r.name).unwrap_or_default(),
            status: user.status,
            entitas_id: user.entitas_id,
            mkt_company_id: user.mkt_company_id,
            created_at: user.created_at,
            approved_at: user.approved_at,
        }
    }
}

fn normalize_username(raw: &str) -> Result<String> {
    let username = raw.trim().to_lowercase();
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(Error::validation("username", "must be 3 to 32 characters"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(Error::validation(
            "username",
            "may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    Ok(username)
}

fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(Error::validation("email", "must be a valid email address"));
    }
    Ok(email)
}

async fn find_model<C>(db: &C, id: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    User::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("user", id))
}

/// Registers a new account in `pending` state with the default role.
///
/// # Errors
/// - `VALIDATION_ERROR` for malformed username, email, name or password
/// - `CONFLICT` when the username or email is already taken
/// - `NOT_FOUND` when `entitas_id` does not exist
#[instrument(skip(db, input), fields(username = %input.username))]
pub async fn register(db: &DatabaseConnection, input: NewUser) -> Result<UserSummary> {
    let username = normalize_username(&input.username)?;
    let email = normalize_email(&input.email)?;
    let full_name = input.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(Error::validation("full_name", "cannot be empty"));
    }
    auth::validate_new_password(&input.password)?;
    let password_hash = auth::hash_password(&input.password)?;
    let txn = db.begin().await?;
    if let Some(entitas_id) = input.entitas_id {
        organization::get_entitas(&txn, entitas_id).await?;
    }

    let taken = User::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(username.clone()))
                .add(user::Column::Email.eq(email.clone())),
        )
        .one(&txn)
        .await?;
    if let Some(existing) = taken {
        let what = if existing.username == username {
            "username"
        } else {
            "email"
        };
        return Err(Error::Conflict {
            message: format!("{what} is already registered"),
        });
    }

    let role = organization::ensure_role(&txn, ROLE_USER, None).await?;
    let now = Utc::now();
    let created = user::ActiveModel {
        username: Set(username),
        email: Set(email),
        full_name: Set(full_name),
        password_hash: Set(password_hash),
        role_id: Set(role.id),
        entitas_id: Set(input.entitas_id),
        mkt_company_id: Set(None),
        status: Set(AccountStatus::Pending.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        approved_at: Set(None),
        approved_by: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    audit::record(
        &txn,
        None,
        "user.register",
        "user",
        created.id,
        json!({ "username": created.username }),
    )
    .await?;
    txn.commit().await?;
    info!(user_id = created.id, "Registered new account awaiting approval");
    Ok(UserSummary::from_parts(created, Some(role)))
}

/// Lists users, optionally filtered by status, oldest registration first.
pub async fn list_users(
    db: &DatabaseConnection,
    status: Option<AccountStatus>,
) -> Result<Vec<UserSummary>> {
    let mut query = User::find();
    if let Some(status) = status {
        query = query.filter(user::Column::Status.eq(status.as_str()));
    }
    let rows = query
        .order_by_asc(user::Column::CreatedAt)
        .order_by_asc(user::Column::Id)
        .find_also_related(Role)
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(user, role)| UserSummary::from_parts(user, role))
        .collect())
}

/// Retrieves one user.
pub async fn get_user(db: &DatabaseConnection, id: i64) -> Result<UserSummary> {
    let (user, role) = User::find_by_id(id)
        .find_also_related(Role)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("user", id))?;
    Ok(UserSummary::from_parts(user, role))
}

async fn transition(
    db: &DatabaseConnection,
    actor: &Actor,
    id: i64,
    action: &'static str,
    allowed_from: &[AccountStatus],
    to: AccountStatus,
) -> Result<UserSummary> {
    actor.require_admin()?;
    let txn = db.begin().await?;
    let existing = find_model(&txn, id).await?;
    let from = AccountStatus::from_stored(&existing.status);
    if !allowed_from.contains(&from) {
        return Err(Error::InvalidTransition {
            action,
            state: existing.status,
        });
    }

    let now = Utc::now();
    let mut active: user::ActiveModel = existing.into();
    active.status = Set(to.as_str().to_string());
    active.updated_at = Set(now);
    if to == AccountStatus::Active {
        active.approved_at = Set(Some(now));
        active.approved_by = Set(Some(actor.id));
    }
    active.update(&txn).await?;

    audit::record(
        &txn,
        Some(actor.id),
        &format!("user.{action}"),
        "user",
        id,
        json!({ "from": from.as_str(), "to": to.as_str() }),
    )
    .await?;
    txn.commit().await?;
    info!(user_id = id, actor_id = actor.id, "User {action}");
    get_user(db, id).await
}

/// Activates a pending registration.
#[instrument(skip(db, actor), fields(actor_id = actor.id))]
pub async fn approve_user(db: &DatabaseConnection, actor: &Actor, id: i64) -> Result<UserSummary> {
    transition(
        db,
        actor,
        id,
        "approve",
        &[AccountStatus::Pending],
        AccountStatus::Active,
    )
    .await
}

/// Refuses a pending registration.
#[instrument(skip(db, actor), fields(actor_id = actor.id))]
pub async fn reject_user(db: &DatabaseConnection, actor: &Actor, id: i64) -> Result<UserSummary> {
    transition(
        db,
        actor,
        id,
        "reject",
        &[AccountStatus::Pending],
        AccountStatus::Rejected,
    )
    .await
}

/// Switches off an account. Admins cannot disable themselves.
#[instrument(skip(db, actor), fields(actor_id = actor.id))]
pub async fn disable_user(db: &DatabaseConnection, actor: &Actor, id: i64) -> Result<UserSummary> {
    if actor.id == id {
        return Err(Error::forbidden("cannot disable your own account"));
    }
    transition(
        db,
        actor,
        id,
        "disable",
        &[AccountStatus::Pending, AccountStatus::Active],
        AccountStatus::Disabled,
    )
    .await
}

/// Assigns a role by name.
#[instrument(skip(db, actor), fields(actor_id = actor.id))]
pub async fn set_role(
    db: &DatabaseConnection,
    actor: &Actor,
    id: i64,
    role_name: &str,
) -> Result<UserSummary> {
    actor.require_admin()?;
    let txn = db.begin().await?;
    let role = organization::get_role_by_name(&txn, role_name)
        .await?
        .ok_or_else(|| Error::not_found("role", role_name.trim()))?;
    if actor.id == id && role.name != auth::ROLE_ADMIN {
        return Err(Error::forbidden("cannot remove your own admin role"));
    }
    let existing = find_model(&txn, id).await?;
    let previous_role = existing.role_id;

    let mut active: user::ActiveModel = existing.into();
    active.role_id = Set(role.id);
    active.updated_at = Set(Utc::now());
    active.update(&txn).await?;

    audit::record(
        &txn,
        Some(actor.id),
        "user.set_role",
        "user",
        id,
        json!({ "from_role_id": previous_role, "role": role.name }),
    )
    .await?;
    txn.commit().await?;
    get_user(db, id).await
}

/// Replaces the entitas and marketing company links of a user.
#[instrument(skip(db, actor), fields(actor_id = actor.id))]
pub async fn set_affiliation(
    db: &DatabaseConnection,
    actor: &Actor,
    id: i64,
    affiliation: Affiliation,
) -> Result<UserSummary> {
    actor.require_admin()?;
    let txn = db.begin().await?;
    if let Some(entitas_id) = affiliation.entitas_id {
        organization::get_entitas(&txn, entitas_id).await?;
    }
    if let Some(company_id) = affiliation.mkt_company_id {
        organization::get_mkt_company(&txn, company_id).await?;
    }
    let existing = find_model(&txn, id).await?;

    let mut active: user::ActiveModel = existing.into();
    active.entitas_id = Set(affiliation.entitas_id);
    active.mkt_company_id = Set(affiliation.mkt_company_id);
    active.updated_at = Set(Utc::now());
    active.update(&txn).await?;

    audit::record(
        &txn,
        Some(actor.id),
        "user.set_affiliation",
        "user",
        id,
        serde_json::to_value(&affiliation)?,
    )
    .await?;
    txn.commit().await?;
    get_user(db, id).await
}

/// Overwrites a user's password. Callers are responsible for authorising the reset
/// (admin API or the operator CLI).
#[instrument(skip(db, new_password))]
pub async fn reset_password(
    db: &DatabaseConnection,
    actor_id: Option<i64>,
    id: i64,
    new_password: &str,
) -> Result<()> {
    auth::validate_new_password(new_password)?;
    let password_hash = auth::hash_password(new_password)?;
    let txn = db.begin().await?;
    let existing = find_model(&txn, id).await?;

    let mut active: user::ActiveModel = existing.into();
    active.password_hash = Set(password_hash);
    active.updated_at = Set(Utc::now());
    active.update(&txn).await?;

    audit::record(&txn, actor_id, "user.reset_password", "user", id, json!({})).await?;
    txn.commit().await?;
    info!(user_id = id, "Password reset");
    Ok(())
}
