//! Configuration management

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::defaults::{
    DEFAULT_CACHE_SWEEP_INTERVAL_SECS, DEFAULT_COST_PER_KM, DEFAULT_HORIZON_DAYS,
    DEFAULT_IDLE_COST_PER_MINUTE, DEFAULT_MAX_IDLE_GAP_MINUTES, DEFAULT_MIN_GAP_MINUTES,
    DEFAULT_ROUTING_TIMEOUT_SECS, MAX_HORIZON_DAYS, ROUTE_LOOKUP_CONCURRENCY,
};
use crate::services::routing::TomTomConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Routing API base URL (optional, falls back to mock if unavailable)
    pub routing_url: Option<String>,

    pub routing_api_key: Option<String>,

    /// Per-call routing timeout
    pub routing_timeout_secs: u64,

    pub max_idle_gap_minutes: i64,

    /// Minimum turnaround between two chained jobs
    pub min_gap_minutes: i64,

    pub cost_per_km: f64,

    pub idle_cost_per_minute: f64,

    /// How often expired distance cache entries are swept
    pub cache_sweep_interval_secs: u64,

    pub default_horizon_days: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let nats_url = std::env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let routing_url = std::env::var("ROUTING_URL").ok().filter(|u| !u.is_empty());
        let routing_api_key = std::env::var("ROUTING_API_KEY").ok().filter(|k| !k.is_empty());

        let config = Self {
            nats_url,
            database_url,
            routing_url,
            routing_api_key,
            routing_timeout_secs: env_or("ROUTING_TIMEOUT_SECS", DEFAULT_ROUTING_TIMEOUT_SECS)?,
            max_idle_gap_minutes: env_or("MAX_IDLE_GAP_MINUTES", DEFAULT_MAX_IDLE_GAP_MINUTES)?,
            min_gap_minutes: env_or("MIN_GAP_MINUTES", DEFAULT_MIN_GAP_MINUTES)?,
            cost_per_km: env_or("COST_PER_KM", DEFAULT_COST_PER_KM)?,
            idle_cost_per_minute: env_or("IDLE_COST_PER_MINUTE", DEFAULT_IDLE_COST_PER_MINUTE)?,
            cache_sweep_interval_secs: env_or(
                "CACHE_SWEEP_INTERVAL_SECS",
                DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
            )?,
            default_horizon_days: env_or("DEFAULT_HORIZON_DAYS", DEFAULT_HORIZON_DAYS)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_idle_gap_minutes < 0 {
            anyhow::bail!("MAX_IDLE_GAP_MINUTES must not be negative");
        }
        if self.min_gap_minutes < 0 || self.min_gap_minutes > self.max_idle_gap_minutes {
            anyhow::bail!("MIN_GAP_MINUTES must be between 0 and MAX_IDLE_GAP_MINUTES");
        }
        if !(0..=MAX_HORIZON_DAYS).contains(&self.default_horizon_days) {
            anyhow::bail!("DEFAULT_HORIZON_DAYS must be between 0 and {}", MAX_HORIZON_DAYS);
        }
        if self.routing_timeout_secs == 0 {
            anyhow::bail!("ROUTING_TIMEOUT_SECS must be at least 1");
        }
        if self.cache_sweep_interval_secs == 0 {
            anyhow::bail!("CACHE_SWEEP_INTERVAL_SECS must be at least 1");
        }
        Ok(())
    }

    /// Routing client settings, if a routing API is configured
    pub fn routing_config(&self) -> Option<TomTomConfig> {
        self.routing_url.as_ref().map(|url| {
            TomTomConfig::new(url.clone(), self.routing_api_key.clone())
                .with_timeout(self.routing_timeout_secs)
        })
    }

    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings {
            max_idle_gap_minutes: self.max_idle_gap_minutes,
            min_gap_minutes: self.min_gap_minutes,
            cost_per_km: self.cost_per_km,
            idle_cost_per_minute: self.idle_cost_per_minute,
            default_horizon_days: self.default_horizon_days,
            routing_timeout: Duration::from_secs(self.routing_timeout_secs),
            lookup_concurrency: ROUTE_LOOKUP_CONCURRENCY,
        }
    }
}

/// Engine tunables
#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub max_idle_gap_minutes: i64,
    pub min_gap_minutes: i64,
    pub cost_per_km: f64,
    pub idle_cost_per_minute: f64,
    pub default_horizon_days: i64,
    pub routing_timeout: Duration,
    pub lookup_concurrency: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_idle_gap_minutes: DEFAULT_MAX_IDLE_GAP_MINUTES,
            min_gap_minutes: DEFAULT_MIN_GAP_MINUTES,
            cost_per_km: DEFAULT_COST_PER_KM,
            idle_cost_per_minute: DEFAULT_IDLE_COST_PER_MINUTE,
            default_horizon_days: DEFAULT_HORIZON_DAYS,
            routing_timeout: Duration::from_secs(DEFAULT_ROUTING_TIMEOUT_SECS),
            lookup_concurrency: ROUTE_LOOKUP_CONCURRENCY,
        }
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        _ => Ok(default),
    }
}
