//! JSON snapshots of the whole database under `data/*.json`.
//!
//! Each table is written as one pretty-printed JSON array named after the table
//! (`roles.json`, `users.json`, ...). Snapshots are full backups and include password
//! hashes and settings secrets, so the directory must be treated as sensitive.
//!
//! Import is additive: rows whose primary key already exists are left untouched, so
//! importing the same snapshot twice is harmless.

use crate::{
    entities::{
        AppscriptConfig, AuditLog, Directorate, Entitas, Loan, LoanMktCompany, MailSetting,
        MktCompany, ReminderRun, Role, User, appscript_config, audit_log, directorate, entitas,
        loan, loan_mkt_company, mail_setting, mkt_company, reminder_run, role, user,
    },
    errors::{Error, Result},
};
use sea_orm::{
    ActiveModelBehavior, IntoActiveModel, Iterable, PrimaryKeyToColumn, QueryOrder,
    TransactionTrait, TryIntoModel, prelude::*, sea_query::OnConflict,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Table files in dependency order: every table only references tables before it.
pub const TABLES: [&str; 11] = [
    "roles",
    "directorates",
    "entitas",
    "mkt_companies",
    "users",
    "loans",
    "loan_mkt_companies",
    "mail_settings",
    "appscript_config",
    "reminder_runs",
    "audit_logs",
];

/// Row counts per table file
pub type TableCounts = BTreeMap<String, usize>;

fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.json"))
}

async fn export_table<E>(db: &DatabaseConnection, dir: &Path, table: &str) -> Result<usize>
where
    E: EntityTrait,
    E::Model: Serialize,
{
    let mut query = E::find();
    for key in E::PrimaryKey::iter() {
        query = query.order_by_asc(key.into_column());
    }
    let rows = query.all(db).await?;
    let path = table_path(dir, table);
    std::fs::write(&path, serde_json::to_string_pretty(&rows)?)?;
    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

/// Writes every table to `dir`, creating the directory if needed.
pub async fn export_all(db: &DatabaseConnection, dir: &Path) -> Result<TableCounts> {
    std::fs::create_dir_all(dir)?;
    let mut counts = TableCounts::new();
    let [roles, directorates, entitas_t, companies, users, loans, links, mail, appscript, runs, audit] =
        TABLES;

    counts.insert(roles.into(), export_table::<Role>(db, dir, roles).await?);
    counts.insert(directorates.into(), export_table::<Directorate>(db, dir, directorates).await?);
    counts.insert(entitas_t.into(), export_table::<Entitas>(db, dir, entitas_t).await?);
    counts.insert(companies.into(), export_table::<MktCompany>(db, dir, companies).await?);
    counts.insert(users.into(), export_table::<User>(db, dir, users).await?);
    counts.insert(loans.into(), export_table::<Loan>(db, dir, loans).await?);
    counts.insert(links.into(), export_table::<LoanMktCompany>(db, dir, links).await?);
    counts.insert(mail.into(), export_table::<MailSetting>(db, dir, mail).await?);
    counts.insert(appscript.into(), export_table::<AppscriptConfig>(db, dir, appscript).await?);
    counts.insert(runs.into(), export_table::<ReminderRun>(db, dir, runs).await?);
    counts.insert(audit.into(), export_table::<AuditLog>(db, dir, audit).await?);

    info!("Exported {} tables to {}", counts.len(), dir.display());
    Ok(counts)
}

async fn import_table<A, C>(db: &C, dir: &Path, table: &str) -> Result<usize>
where
    C: ConnectionTrait,
    A: ActiveModelTrait + ActiveModelBehavior + TryIntoModel<<A::Entity as EntityTrait>::Model> + Send,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A> + DeserializeOwned + Serialize,
{
    let path = table_path(dir, table);
    if !path.exists() {
        warn!("{} not found, skipping", path.display());
        return Ok(0);
    }
    let contents = std::fs::read_to_string(&path)?;
    let rows: Vec<Value> = serde_json::from_str(&contents).map_err(|e| Error::Config {
        message: format!("{} is not a JSON array of rows: {e}", path.display()),
    })?;

    let keys = <A::Entity as EntityTrait>::PrimaryKey::iter().map(PrimaryKeyToColumn::into_column);
    let mut inserted = 0;
    for row in rows {
        let model = A::from_json(row)?;
        let affected = <A::Entity as EntityTrait>::insert(model)
            .on_conflict(OnConflict::columns(keys.clone()).do_nothing().to_owned())
            .exec_without_returning(db)
            .await?;
        inserted += usize::try_from(affected).unwrap_or(usize::MAX);
    }
    debug!("Inserted {inserted} rows from {}", path.display());
    Ok(inserted)
}

/// Loads every table file found in `dir` in one transaction, skipping rows that
/// already exist. Returns the number of inserted rows per table.
///
/// TODO: advance Postgres id sequences past the imported ids.
pub async fn import_all(db: &DatabaseConnection, dir: &Path) -> Result<TableCounts> {
    if !dir.is_dir() {
        return Err(Error::Config {
            message: format!("snapshot directory {} does not exist", dir.display()),
        });
    }
    let txn = db.begin().await?;
    let mut counts = TableCounts::new();
    let [roles, directorates, entitas_t, companies, users, loans, links, mail, appscript, runs, audit] =
        TABLES;

    counts.insert(roles.into(), import_table::<role::ActiveModel, _>(&txn, dir, roles).await?);
    counts.insert(
        directorates.into(),
        import_table::<directorate::ActiveModel, _>(&txn, dir, directorates).await?,
    );
    counts.insert(
        entitas_t.into(),
        import_table::<entitas::ActiveModel, _>(&txn, dir, entitas_t).await?,
    );
    counts.insert(
        companies.into(),
        import_table::<mkt_company::ActiveModel, _>(&txn, dir, companies).await?,
    );
    counts.insert(users.into(), import_table::<user::ActiveModel, _>(&txn, dir, users).await?);
    counts.insert(loans.into(), import_table::<loan::ActiveModel, _>(&txn, dir, loans).await?);
    counts.insert(
        links.into(),
        import_table::<loan_mkt_company::ActiveModel, _>(&txn, dir, links).await?,
    );
    counts.insert(
        mail.into(),
        import_table::<mail_setting::ActiveModel, _>(&txn, dir, mail).await?,
    );
    counts.insert(
        appscript.into(),
        import_table::<appscript_config::ActiveModel, _>(&txn, dir, appscript).await?,
    );
    counts.insert(
        runs.into(),
        import_table::<reminder_run::ActiveModel, _>(&txn, dir, runs).await?,
    );
    counts.insert(
        audit.into(),
        import_table::<audit_log::ActiveModel, _>(&txn, dir, audit).await?,
    );

    txn.commit().await?;
    info!(
        "Imported {} rows from {}",
        counts.values().sum::<usize>(),
        dir.display()
    );
    Ok(counts)
}
