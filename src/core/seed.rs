//! Reference data seeding from the `formflow.toml` catalog.
//!
//! Seeding only inserts what is missing, so it runs safely on every `init-db` and
//! server start. Existing rows are matched by name (roles) or code (everything else)
//! and never modified.

use crate::{
    config::catalog::Catalog,
    core::{
        auth::{self, AccountStatus, ROLE_ADMIN, ROLE_APPROVER, ROLE_USER, ROLE_WAREHOUSE},
        organization::{self, NewEntitas},
    },
    entities::{User, user},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*};
use serde::Serialize;
use tracing::{info, warn};

/// Roles every installation needs regardless of the catalog
pub const BUILTIN_ROLES: [&str; 4] = [ROLE_ADMIN, ROLE_APPROVER, ROLE_WAREHOUSE, ROLE_USER];

/// Rows inserted by [`seed_catalog`]
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Roles created
    pub roles: usize,
    /// Directorates created
    pub directorates: usize,
    /// Entitas created
    pub entitas: usize,
    /// Marketing companies created
    pub mkt_companies: usize,
    /// Whether the bootstrap admin was created
    pub admin_created: bool,
}

/// Inserts the built-in roles and every catalog entry that does not exist yet.
pub async fn seed_catalog(db: &DatabaseConnection, catalog: &Catalog) -> Result<SeedReport> {
    let txn = db.begin().await?;
    let mut report = SeedReport::default();

    let builtin = BUILTIN_ROLES.iter().map(|name| (String::from(*name), None));
    let listed = catalog
        .roles
        .iter()
        .map(|r| (r.name.clone(), r.description.clone()));
    for (name, description) in builtin.chain(listed) {
        if organization::get_role_by_name(&txn, &name).await?.is_none() {
            organization::ensure_role(&txn, &name, description).await?;
            report.roles += 1;
        }
    }

    for dir in &catalog.directorates {
        if organization::get_directorate_by_code(&txn, &dir.code)
            .await?
            .is_none()
        {
            organization::create_directorate(&txn, None, &dir.code, &dir.name).await?;
            report.directorates += 1;
        }
    }

    for ent in &catalog.entitas {
        if organization::get_entitas_by_code(&txn, &ent.code).await?.is_some() {
            continue;
        }
        let directorate_id = match &ent.directorate {
            Some(code) => Some(
                organization::get_directorate_by_code(&txn, code)
                    .await?
                    .ok_or_else(|| Error::Config {
                        message: format!(
                            "entitas {} references unknown directorate {code}",
                            ent.code
                        ),
                    })?
                    .id,
            ),
            None => None,
        };
        organization::create_entitas(
            &txn,
            None,
            NewEntitas {
                code: ent.code.clone(),
                name: ent.name.clone(),
                directorate_id,
            },
        )
        .await?;
        report.entitas += 1;
    }

    for company in &catalog.mkt_companies {
        if organization::get_mkt_company_by_code(&txn, &company.code)
            .await?
            .is_none()
        {
            organization::create_mkt_company(&txn, None, &company.code, &company.name).await?;
            report.mkt_companies += 1;
        }
    }

    if let Some(admin) = &catalog.admin {
        let admin_role = organization::ensure_role(&txn, ROLE_ADMIN, None).await?;
        let has_admin = User::find()
            .filter(user::Column::RoleId.eq(admin_role.id))
            .one(&txn)
            .await?
            .is_some();
        if has_admin {
            info!("Admin account already present, skipping bootstrap admin");
        } else if auth::find_by_identifier(&txn, &admin.username).await?.is_some() {
            warn!(
                "Bootstrap admin {} collides with an existing non-admin user",
                admin.username
            );
        } else {
            auth::validate_new_password(&admin.password)?;
            let now = Utc::now();
            user::ActiveModel {
                username: Set(admin.username.trim().to_lowercase()),
                email: Set(admin.email.trim().to_lowercase()),
                full_name: Set(admin.full_name.clone()),
                password_hash: Set(auth::hash_password(&admin.password)?),
                role_id: Set(admin_role.id),
                status: Set(AccountStatus::Active.as_str().to_string()),
                created_at: Set(now),
                updated_at: Set(now),
                approved_at: Set(Some(now)),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            report.admin_created = true;
            info!("Created bootstrap admin {}", admin.username);
        }
    }

    txn.commit().await?;
    info!(
        roles = report.roles,
        directorates = report.directorates,
        entitas = report.entitas,
        mkt_companies = report.mkt_companies,
        "Seed catalog applied"
    );
    Ok(report)
}
