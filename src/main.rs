use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use formflow::{
    api::{self, AppState},
    config::{AppConfig, catalog, database},
    core::{auth, maintenance, seed, snapshot, user},
    errors::{Error, Result},
};
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Loan request and approval backend
#[derive(Debug, Parser)]
#[command(name = "formflow", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Create tables and seed the reference catalog
    InitDb,
    /// Write every table to `<dir>/<table>.json`
    Export {
        /// Target directory (defaults to DATA_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Insert rows from `<dir>/<table>.json` that are not present yet
    Import {
        /// Source directory (defaults to DATA_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Repair legacy loan JSON and re-derive statuses
    NormalizeLoans {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Overwrite a user's password
    ResetPassword {
        /// Username or email
        #[arg(long)]
        user: String,
        /// New password
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can be set externally
    if dotenv().is_ok() {
        info!("Loaded .env file");
    }

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let config = AppConfig::from_env()?;
    let db = database::create_connection(&config.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;

    match command {
        Command::Serve => {
            database::create_tables(&db).await?;
            let catalog = catalog::load_catalog_if_present(&config.seed_file)?;
            let report = seed::seed_catalog(&db, &catalog).await?;
            info!(?report, "Reference data ready");
            let state = AppState::new(db, config)?;
            api::serve(Arc::new(state)).await
        }
        Command::InitDb => {
            database::create_tables(&db).await?;
            let catalog = catalog::load_catalog_if_present(&config.seed_file)?;
            let report = seed::seed_catalog(&db, &catalog).await?;
            info!(
                roles = report.roles,
                directorates = report.directorates,
                entitas = report.entitas,
                mkt_companies = report.mkt_companies,
                admin_created = report.admin_created,
                "Database initialized"
            );
            Ok(())
        }
        Command::Export { dir } => {
            let dir = dir.unwrap_or(config.data_dir);
            let counts = snapshot::export_all(&db, &dir).await?;
            for (table, count) in &counts {
                info!("{table}: {count} rows exported");
            }
            Ok(())
        }
        Command::Import { dir } => {
            database::create_tables(&db).await?;
            let dir = dir.unwrap_or(config.data_dir);
            let counts = snapshot::import_all(&db, &dir).await?;
            for (table, count) in &counts {
                info!("{table}: {count} rows inserted");
            }
            Ok(())
        }
        Command::NormalizeLoans { dry_run } => {
            let report = maintenance::normalize_loans(&db, dry_run).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::ResetPassword { user: identifier, password } => {
            let target = auth::find_by_identifier(&db, &identifier)
                .await?
                .ok_or(Error::UserNotFound)?;
            user::reset_password(&db, None, target.id, &password).await?;
            info!("Password reset for {}", target.username);
            Ok(())
        }
    }
}
