use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing_subscriber::EnvFilter;

use attendance_escalation::config::{self, ServerConfig};
use attendance_escalation::db::{self, PgStore};
use attendance_escalation::engine::Engine;
use attendance_escalation::models::parse_date;
use attendance_escalation::store::{MemoryStore, Store};
use attendance_escalation::{import, report, server, sweep};

#[derive(Parser)]
#[command(name = "attendance-escalation")]
#[command(about = "Daily attendance tracking with automatic absence escalation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Replay attendance marks from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Evaluate every active student as of a closed day (default: yesterday)
    Sweep {
        #[arg(long)]
        date: Option<String>,
    },
    /// Generate a markdown escalation report
    Report {
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Serve the HTTP API
    Serve {
        /// Keep all state in memory instead of Postgres
        #[arg(long)]
        memory: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env()?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let engine = pg_engine(&config).await?;
            let summary = import::import_csv(&engine, &csv).await?;
            println!(
                "Marked {} records ({} unchanged) from {}, {} escalation events emitted.",
                summary.marked,
                summary.unchanged,
                csv.display(),
                summary.events_emitted
            );
        }
        Commands::Sweep { date } => {
            let engine = pg_engine(&config).await?;
            let as_of = match date.as_deref() {
                Some(raw) => parse_date(raw)?,
                None => sweep::default_sweep_date(),
            };
            let summary = sweep::run_once(&engine, as_of).await?;
            println!(
                "Evaluated {} students as of {as_of}: {} events, {} reports, {} suspended.",
                summary.evaluated, summary.events_emitted, summary.reports_opened, summary.suspended
            );
            if !summary.busy.is_empty() {
                println!(
                    "Skipped {} busy students; rerun the sweep to cover them.",
                    summary.busy.len()
                );
            }
        }
        Commands::Report { since_days, out } => {
            let pool = connect(&config).await?;
            let store = PgStore::new(pool);
            let cutoff: NaiveDate = Utc::now().date_naive() - Duration::days(since_days);
            let students = store.list_students().await?;
            let events = store.list_events().await?;
            let reports = store.list_reports().await?;

            let report = report::build_report(cutoff, &students, &events, &reports);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Serve { memory } => {
            let engine = if memory {
                tracing::warn!("serving from an in-memory store, nothing will be persisted");
                Engine::new(Arc::new(MemoryStore::new()), config.lock_timeout)
            } else {
                let pool = connect(&config).await?;
                db::init_db(&pool).await?;
                Engine::new(Arc::new(PgStore::new(pool)), config.lock_timeout)
            };
            server::run_server(config, engine).await?;
        }
    }

    Ok(())
}

async fn connect(config: &ServerConfig) -> anyhow::Result<PgPool> {
    let database_url = config::database_url()?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn pg_engine(config: &ServerConfig) -> anyhow::Result<Engine> {
    let pool = connect(config).await?;
    Ok(Engine::new(Arc::new(PgStore::new(pool)), config.lock_timeout))
}
