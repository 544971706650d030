//! Booking sweep scheduler
//!
//! `booking_scheduler` (or `booking_scheduler run`) registers the cron sweeps
//! and runs until interrupted. `booking_scheduler sweep <kind>` runs a single
//! sweep once and prints its stats as JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use booking_core::domains::bookings::{SweepKind, SweepRunner, SweepWindows};
use booking_core::kernel::scheduled_tasks::run_with_retry;
use booking_core::kernel::{BookingScheduler, LogCollaborators, ServerDeps};
use booking_core::Config;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "booking_scheduler")]
#[command(about = "Time-based booking lifecycle sweeps")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all sweeps on their cron schedules until Ctrl-C
    Run,

    /// Run one sweep immediately and print its stats
    Sweep {
        #[arg(value_enum)]
        kind: SweepArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SweepArg {
    ExpireRequests,
    StartSessions,
    EndSessions,
}

impl From<SweepArg> for SweepKind {
    fn from(arg: SweepArg) -> Self {
        match arg {
            SweepArg::ExpireRequests => SweepKind::ExpireRequests,
            SweepArg::StartSessions => SweepKind::StartSessions,
            SweepArg::EndSessions => SweepKind::EndSessions,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,booking_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = connect(&config).await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    // Notifications, meetings, credits and payments live in other services;
    // this process only logs what it would hand to them.
    let collaborators = Arc::new(LogCollaborators);
    let deps = ServerDeps::new(
        pool,
        collaborators.clone(),
        collaborators.clone(),
        collaborators.clone(),
        collaborators,
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_scheduler(deps, &config).await,
        Commands::Sweep { kind } => run_once(deps, &config, kind.into()).await,
    }
}

async fn connect(config: &Config) -> Result<PgPool> {
    let statement_timeout_ms = config.database_statement_timeout_ms;

    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                if let Some(ms) = statement_timeout_ms {
                    conn.execute(format!("SET statement_timeout = {}", ms).as_str())
                        .await?;
                }
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")
}

async fn run_scheduler(deps: ServerDeps, config: &Config) -> Result<()> {
    tracing::info!("Starting booking scheduler");

    let mut scheduler = BookingScheduler::new(deps, config.sweeps.clone());
    scheduler.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutdown signal received");
    scheduler.shutdown().await
}

async fn run_once(deps: ServerDeps, config: &Config, kind: SweepKind) -> Result<()> {
    let runner = SweepRunner::new(deps, SweepWindows::from(&config.sweeps));
    let stats = run_with_retry(
        &runner,
        kind,
        config.sweeps.max_attempts,
        config.sweeps.retry_base_delay,
    )
    .await?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
