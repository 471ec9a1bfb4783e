//! Authentication business logic - password checks, login and session tokens.
//!
//! Passwords are stored as bcrypt hashes. Rows imported from the previous system may
//! still hold plaintext; those are compared directly and re-hashed on the first
//! successful login. Sessions are stateless HS256 tokens signed with `AUTH_SECRET`.

use crate::{
    entities::{Role, User, user},
    errors::{Error, Result},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{Condition, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Full access to every screen and workflow step
pub const ROLE_ADMIN: &str = "admin";
/// Decides approvals for their marketing company
pub const ROLE_APPROVER: &str = "approver";
/// Moves warehouse entries and confirms returns for their marketing company
pub const ROLE_WAREHOUSE: &str = "warehouse";
/// Submits and tracks own loans
pub const ROLE_USER: &str = "user";

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

/// Account lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Registered, waiting for an admin
    Pending,
    /// May log in
    Active,
    /// Registration refused
    Rejected,
    /// Switched off by an admin
    Disabled,
}

impl AccountStatus {
    /// Value stored in `users.status`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Disabled => "disabled",
        }
    }

    /// Parses a stored value; unknown values are treated as disabled.
    #[must_use]
    pub fn from_stored(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "active" => Self::Active,
            "rejected" => Self::Rejected,
            _ => Self::Disabled,
        }
    }
}

/// The authenticated user behind a request or a workflow call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    /// User id
    pub id: i64,
    /// Login name
    pub username: String,
    /// Display name
    pub full_name: String,
    /// Role name
    pub role: String,
    /// Organisational unit
    pub entitas_id: Option<i64>,
    /// Company the user acts for
    pub mkt_company_id: Option<i64>,
}

impl Actor {
    /// Whether the actor holds the admin role
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Whether the actor holds `role` (admins hold every role)
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.is_admin() || self.role == role
    }

    /// Fails with `FORBIDDEN` unless the actor is an admin
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::forbidden("admin role required"))
        }
    }
}

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    /// Login name at issue time
    pub username: String,
    /// Role at issue time
    pub role: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Hashes a password with bcrypt.
pub fn hash_password(plain: &str) -> Result<String> {
    bcrypt::hash(plain, HASH_COST).map_err(Into::into)
}

/// Whether a stored value is a bcrypt hash rather than a legacy plaintext password
#[must_use]
pub fn is_bcrypt_hash(stored: &str) -> bool {
    ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .any(|prefix| stored.starts_with(prefix))
}

/// Checks `plain` against a stored hash or legacy plaintext value.
pub fn verify_password(plain: &str, stored: &str) -> Result<bool> {
    if is_bcrypt_hash(stored) {
        return bcrypt::verify(plain, stored).map_err(Into::into);
    }
    Ok(constant_time_eq(plain.as_bytes(), stored.as_bytes()))
}

/// Compares two secrets touching every byte, so timing does not reveal the length
/// of the common prefix.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = a.len() ^ b.len();
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= usize::from(x ^ y);
    }
    diff == 0
}

/// Rejects passwords that are too short or blank.
pub fn validate_new_password(plain: &str) -> Result<()> {
    if plain.trim().chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

/// Finds a user by username or email (case-insensitive).
pub async fn find_by_identifier<C>(db: &C, identifier: &str) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    let needle = identifier.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(None);
    }
    User::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(needle.clone()))
                .add(user::Column::Email.eq(needle)),
        )
        .one(db)
        .await
        .map_err(Into::into)
}

/// Builds an [`Actor`] from a user row, resolving the role name.
pub async fn actor_for<C>(db: &C, user: &user::Model) -> Result<Actor>
where
    C: ConnectionTrait,
{
    let role = Role::find_by_id(user.role_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("role", user.role_id))?;

    Ok(Actor {
        id: user.id,
        username: user.username.clone(),
        full_name: user.full_name.clone(),
        role: role.name,
        entitas_id: user.entitas_id,
        mkt_company_id: user.mkt_company_id,
    })
}

fn ensure_can_log_in(user: &user::Model) -> Result<()> {
    match AccountStatus::from_stored(&user.status) {
        AccountStatus::Active => Ok(()),
        AccountStatus::Pending => Err(Error::AccountPending),
        AccountStatus::Rejected | AccountStatus::Disabled => Err(Error::AccountDisabled),
    }
}

/// Loads the actor for a token subject; the account must still be active.
pub async fn load_actor(db: &DatabaseConnection, user_id: i64) -> Result<Actor> {
    let user = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(Error::Unauthorized)?;
    ensure_can_log_in(&user)?;
    actor_for(db, &user).await
}

/// Authenticates by username or email and password.
///
/// # Errors
/// - `USER_NOT_FOUND` when nothing matches the identifier
/// - `INVALID_PASSWORD` when the password is wrong
/// - `ACCOUNT_PENDING` / `ACCOUNT_DISABLED` when the account cannot log in
#[instrument(skip(db, password))]
pub async fn login(db: &DatabaseConnection, identifier: &str, password: &str) -> Result<Actor> {
    let user = find_by_identifier(db, identifier)
        .await?
        .ok_or(Error::UserNotFound)?;

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = user.id, "Rejected login with wrong password");
        return Err(Error::InvalidPassword);
    }
    ensure_can_log_in(&user)?;

    let user = if is_bcrypt_hash(&user.password_hash) {
        user
    } else {
        info!(user_id = user.id, "Upgrading legacy plaintext password");
        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(hash_password(password)?);
        active.updated_at = Set(Utc::now());
        active.update(db).await?
    };

    actor_for(db, &user).await
}

/// Changes the caller's own password after re-checking the current one.
#[instrument(skip(db, current, new))]
pub async fn change_password(
    db: &DatabaseConnection,
    user_id: i64,
    current: &str,
    new: &str,
) -> Result<()> {
    validate_new_password(new)?;
    let user = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("user", user_id))?;

    if !verify_password(current, &user.password_hash)? {
        return Err(Error::InvalidPassword);
    }

    let password_hash = hash_password(new)?;
    let txn = db.begin().await?;
    let mut active: user::ActiveModel = user.into();
    active.password_hash = Set(password_hash);
    active.updated_at = Set(Utc::now());
    active.update(&txn).await?;
    crate::core::audit::record(
        &txn,
        Some(user_id),
        "user.change_password",
        "user",
        user_id,
        serde_json::json!({}),
    )
    .await?;
    txn.commit().await?;
    Ok(())
}

/// Signs a session token for `actor`.
pub fn issue_token(actor: &Actor, secret: &str, ttl_hours: i64) -> Result<String> {
    let now = Utc::now();
    let expires = Duration::try_hours(ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| Error::Config {
            message: format!("token lifetime of {ttl_hours} hours is out of range"),
        })?;
    let claims = Claims {
        sub: actor.id,
        username: actor.username.clone(),
        role: actor.role.clone(),
        iat: now.timestamp(),
        exp: expires.timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(Into::into)
}

/// Verifies signature and expiry of a session token.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(is_bcrypt_hash(&hash));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_verify_legacy_plaintext() {
        assert!(verify_password("secret123", "secret123").unwrap());
        assert!(!verify_password("secret12", "secret123").unwrap());
        assert!(!verify_password("", "secret123").unwrap());
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("short").is_err());
        assert!(validate_new_password("        ").is_err());
        assert!(validate_new_password("long enough").is_ok());
    }

    #[test]
    fn test_token_round_trip_and_tamper() {
        let actor = Actor {
            id: 42,
            username: "dina".to_string(),
            full_name: "Dina".to_string(),
            role: ROLE_APPROVER.to_string(),
            entitas_id: None,
            mkt_company_id: Some(3),
        };
        let token = issue_token(&actor, "secret", 1).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, ROLE_APPROVER);

        assert!(matches!(
            verify_token(&token, "other-secret"),
            Err(Error::Token(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let actor = Actor {
            id: 1,
            username: "old".to_string(),
            full_name: "Old".to_string(),
            role: ROLE_USER.to_string(),
            entitas_id: None,
            mkt_company_id: None,
        };
        let token = issue_token(&actor, "secret", -2).unwrap();
        assert!(verify_token(&token, "secret").is_err());

        assert!(matches!(
            issue_token(&actor, "secret", i64::MAX),
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_login_by_username_and_email() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "budi", ROLE_USER).await?;

        let actor = login(&db, "budi", TEST_PASSWORD).await?;
        assert_eq!(actor.id, user.id);
        assert_eq!(actor.role, ROLE_USER);

        let actor = login(&db, "  BUDI@example.com ", TEST_PASSWORD).await?;
        assert_eq!(actor.id, user.id);

        Ok(())
    }

    #[tokio::test]
    async fn test_login_error_codes() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, "budi", ROLE_USER).await?;

        let err = login(&db, "nobody", TEST_PASSWORD).await.unwrap_err();
        assert_eq!(err.code(), "USER_NOT_FOUND");

        let err = login(&db, "budi", "not-the-password").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_PASSWORD");

        Ok(())
    }

    #[tokio::test]
    async fn test_login_refuses_pending_and_disabled() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "sari", ROLE_USER).await?;
        set_user_status(&db, user.id, AccountStatus::Pending).await?;
        let err = login(&db, "sari", TEST_PASSWORD).await.unwrap_err();
        assert!(matches!(err, Error::AccountPending));

        set_user_status(&db, user.id, AccountStatus::Disabled).await?;
        let err = login(&db, "sari", TEST_PASSWORD).await.unwrap_err();
        assert!(matches!(err, Error::AccountDisabled));

        Ok(())
    }

    #[tokio::test]
    async fn test_login_upgrades_plaintext_password() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "legacy", ROLE_USER).await?;
        let mut active: user::ActiveModel = user.clone().into();
        active.password_hash = Set("plain-old-pass".to_string());
        active.update(&db).await?;

        login(&db, "legacy", "plain-old-pass").await?;

        let stored = User::find_by_id(user.id).one(&db).await?.unwrap();
        assert!(is_bcrypt_hash(&stored.password_hash));
        login(&db, "legacy", "plain-old-pass").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_change_password() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "budi", ROLE_USER).await?;

        let err = change_password(&db, user.id, "wrong", "new-password-1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPassword));

        change_password(&db, user.id, TEST_PASSWORD, "new-password-1").await?;
        assert!(login(&db, "budi", "new-password-1").await.is_ok());
        assert!(matches!(
            login(&db, "budi", TEST_PASSWORD).await,
            Err(Error::InvalidPassword)
        ));

        // Only the successful change is logged
        let entries = crate::core::audit::list(
            &db,
            crate::core::audit::AuditFilter {
                actor_id: Some(user.id),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "user.change_password");
        Ok(())
    }

    #[tokio::test]
    async fn test_load_actor_requires_active_account() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "budi", ROLE_ADMIN).await?;
        let actor = load_actor(&db, user.id).await?;
        assert!(actor.is_admin());
        assert!(actor.has_role(ROLE_WAREHOUSE));

        set_user_status(&db, user.id, AccountStatus::Disabled).await?;
        assert!(load_actor(&db, user.id).await.is_err());
        assert!(matches!(
            load_actor(&db, 9999).await,
            Err(Error::Unauthorized)
        ));
        Ok(())
    }
}
