//! Fleet Planner Worker - recurring transport schedule engine
//!
//! Expands recurring route schedules into dated instances, detects resource
//! conflicts and proposes route chaining, served over NATS.

mod cli;
mod config;
mod db;
mod defaults;
mod error;
mod handlers;
mod services;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::services::clock::SystemClock;
use crate::services::distance_cache::DistanceCache;
use crate::services::planner::Planner;
use crate::services::routing::{create_routing_provider_with_fallback, RoutingProvider};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,fleet_planner_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())  // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    info!("Starting Fleet Planner Worker...");

    let config = config::Config::from_env()?;
    info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    db::run_migrations(&pool).await?;
    info!("Database migrations complete");

    if matches!(command, Command::Migrate) {
        return Ok(());
    }

    let settings = config.planner_settings();
    let store = Arc::new(db::PgStore::new(pool));
    let clock = Arc::new(SystemClock);
    let provider: Arc<dyn RoutingProvider> =
        Arc::from(create_routing_provider_with_fallback(config.routing_config()).await);
    info!("Routing provider: {}", provider.name());

    let cache =
        DistanceCache::new(store.clone(), provider, clock.clone(), settings.routing_timeout);
    let planner = Arc::new(Planner::new(store, cache, clock, settings));

    match command {
        Command::Migrate => Ok(()),
        Command::SweepCache => {
            let deleted = planner.sweep_expired_cache_entries().await?;
            info!("Deleted {} expired distance cache entries", deleted);
            Ok(())
        }
        Command::RunDay { date } => {
            let report = planner.run_daily_planning(date, &CancellationToken::new()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_complete() {
                anyhow::bail!("daily planning for {} finished with a failed pass", date);
            }
            Ok(())
        }
        Command::Serve => serve(&config, planner).await,
    }
}

async fn serve(config: &config::Config, planner: Arc<Planner>) -> Result<()> {
    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    let shutdown = CancellationToken::new();

    // Periodic sweep of expired distance cache entries
    let sweep_planner = Arc::clone(&planner);
    let sweep_shutdown = shutdown.clone();
    let sweep_interval = Duration::from_secs(config.cache_sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            tokio::select! {
                _ = sweep_shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = sweep_planner.sweep_expired_cache_entries().await {
                        warn!("Distance cache sweep failed: {}", e);
                    }
                }
            }
        }
    });

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            ctrl_c_shutdown.cancel();
        }
    });

    let handler_result = handlers::start_handlers(nats_client, planner, shutdown).await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}
