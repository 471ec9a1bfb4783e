//! Shared test utilities for `FormFlow`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        auth::{self, AccountStatus, Actor, ROLE_ADMIN},
        loan::{self, Decision, NewLoan},
        loan_state::{NeedItem, WarehouseStage},
        organization::{self, NewEntitas},
    },
    entities::{self, MktCompany, User},
    errors::Result,
};
use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{PaginatorTrait, Set, prelude::*};

/// Password of every user created by [`create_test_user`]
pub const TEST_PASSWORD: &str = "password123";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output through the test harness; safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("formflow=debug")
        .with_test_writer()
        .try_init();
}

/// Creates an active user with the given role (created if missing).
///
/// # Defaults
/// * `email`: `"{username}@example.com"`
/// * `full_name`: the username
/// * `password`: [`TEST_PASSWORD`]
pub async fn create_test_user(
    db: &DatabaseConnection,
    username: &str,
    role: &str,
) -> Result<entities::user::Model> {
    let role = organization::ensure_role(db, role, None).await?;
    let now = Utc::now();
    let user = entities::user::ActiveModel {
        username: Set(username.to_lowercase()),
        email: Set(format!("{}@example.com", username.to_lowercase())),
        full_name: Set(username.to_string()),
        password_hash: Set(auth::hash_password(TEST_PASSWORD)?),
        role_id: Set(role.id),
        entitas_id: Set(None),
        mkt_company_id: Set(None),
        status: Set(AccountStatus::Active.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        approved_at: Set(Some(now)),
        approved_by: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(user)
}

/// Creates an active user and returns it as an [`Actor`].
pub async fn create_test_actor(db: &DatabaseConnection, username: &str, role: &str) -> Result<Actor> {
    let user = create_test_user(db, username, role).await?;
    auth::actor_for(db, &user).await
}

/// Creates an active user acting for a marketing company.
pub async fn create_company_actor(
    db: &DatabaseConnection,
    username: &str,
    role: &str,
    mkt_company_id: i64,
) -> Result<Actor> {
    let user = create_test_user(db, username, role).await?;
    let mut active: entities::user::ActiveModel = user.into();
    active.mkt_company_id = Set(Some(mkt_company_id));
    let user = active.update(db).await?;
    auth::actor_for(db, &user).await
}

/// Overwrites a user's account status.
pub async fn set_user_status(db: &DatabaseConnection, user_id: i64, status: AccountStatus) -> Result<()> {
    let user = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| crate::errors::Error::not_found("user", user_id))?;
    let mut active: entities::user::ActiveModel = user.into();
    active.status = Set(status.as_str().to_string());
    active.update(db).await?;
    Ok(())
}

/// Creates an active marketing company named after its code.
pub async fn create_test_company(
    db: &DatabaseConnection,
    code: &str,
) -> Result<entities::mkt_company::Model> {
    organization::create_mkt_company(db, None, code, &format!("{code} Company")).await
}

/// Creates an active entitas without a directorate.
pub async fn create_test_entitas(
    db: &DatabaseConnection,
    code: &str,
) -> Result<entities::entitas::Model> {
    organization::create_entitas(
        db,
        None,
        NewEntitas {
            code: code.to_string(),
            name: format!("{code} Unit"),
            directorate_id: None,
        },
    )
    .await
}

/// Submits a pending loan and returns its id.
///
/// # Defaults
/// * dates: 2026-03-01 to 2026-03-05
/// * needs: two projectors
pub async fn create_test_loan(
    db: &DatabaseConnection,
    borrower_id: i64,
    entitas_id: i64,
    mkt_company_ids: &[i64],
) -> Result<i64> {
    let detail = loan::submit_loan(
        db,
        borrower_id,
        NewLoan {
            entitas_id,
            purpose: "Test loan".to_string(),
            location: None,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap_or_default(),
            mkt_company_ids: mkt_company_ids.to_vec(),
            needs: vec![NeedItem {
                name: "Projector".to_string(),
                quantity: 2,
                unit: Some("pcs".to_string()),
                note: None,
            }],
        },
    )
    .await?;
    Ok(detail.loan.id)
}

/// Creates a loan that is approved and picked up, due back on `end_date`.
///
/// A fresh company and entitas are created for every call.
pub async fn create_loan_in_use(
    db: &DatabaseConnection,
    borrower_id: i64,
    end_date: NaiveDate,
) -> Result<i64> {
    let n = MktCompany::find().count(db).await? + 1;
    let company = create_test_company(db, &format!("MKT-T{n}")).await?;
    let entitas = create_test_entitas(db, &format!("ENT-T{n}")).await?;
    let admin = Actor {
        id: borrower_id,
        username: "fixture-admin".to_string(),
        full_name: "Fixture Admin".to_string(),
        role: ROLE_ADMIN.to_string(),
        entitas_id: None,
        mkt_company_id: None,
    };

    let detail = loan::submit_loan(
        db,
        borrower_id,
        NewLoan {
            entitas_id: entitas.id,
            purpose: "Test loan".to_string(),
            location: None,
            start_date: end_date - Duration::days(3),
            end_date,
            mkt_company_ids: vec![company.id],
            needs: vec![NeedItem {
                name: "Banner".to_string(),
                quantity: 1,
                unit: None,
                note: None,
            }],
        },
    )
    .await?;
    let id = detail.loan.id;
    loan::decide_approval(db, &admin, id, &company.code, Decision::Approve, None).await?;
    loan::update_warehouse(db, &admin, id, &company.code, WarehouseStage::PickedUp, None).await?;
    Ok(id)
}
