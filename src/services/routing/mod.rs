//! Routing provider for point-to-point travel distance/time
//!
//! Uses a TomTom-compatible routing API in production, a haversine estimate
//! when no provider is configured or reachable.

mod tomtom;

pub use tomtom::{TomTomClient, TomTomConfig};

use anyhow::Result;
use async_trait::async_trait;

use crate::types::Coordinates;

/// Summary of one routed leg, in provider units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteSummary {
    pub length_meters: f64,
    pub travel_time_seconds: f64,
    pub traffic_delay_seconds: f64,
}

/// Routing provider trait for abstraction (TomTom, mock, etc.)
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// Route from `origin` to `destination`; one external call per invocation
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> Result<RouteSummary>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Mock routing provider for development and tests
/// Uses Haversine distance × coefficient for estimation
pub struct MockRoutingProvider {
    /// Coefficient for converting straight-line to road distance (default: 1.3)
    road_coefficient: f64,
    /// Average speed in km/h for time estimation (default: 40)
    average_speed_kmh: f64,
}

impl Default for MockRoutingProvider {
    fn default() -> Self {
        Self {
            road_coefficient: 1.3,
            average_speed_kmh: 40.0,
        }
    }
}

impl MockRoutingProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoutingProvider for MockRoutingProvider {
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> Result<RouteSummary> {
        use crate::services::geo::haversine_distance;

        let road_km = haversine_distance(&origin, &destination) * self.road_coefficient;

        Ok(RouteSummary {
            length_meters: road_km * 1000.0,
            travel_time_seconds: road_km / self.average_speed_kmh * 3600.0,
            traffic_delay_seconds: 0.0,
        })
    }

    fn name(&self) -> &str {
        "MockRouting"
    }
}

/// Create routing provider with automatic detection and fallback
///
/// Tries the configured routing API if a URL is provided. Falls back to the
/// mock provider if it is unavailable or not configured.
pub async fn create_routing_provider_with_fallback(
    config: Option<TomTomConfig>,
) -> Box<dyn RoutingProvider> {
    use tracing::{info, warn};

    if let Some(cfg) = config {
        let base_url = cfg.base_url.clone();
        match TomTomClient::new(cfg) {
            Ok(client) => match check_routing_health(&base_url).await {
                Ok(()) => {
                    info!("Routing provider available at {}", base_url);
                    return Box::new(client);
                }
                Err(e) => {
                    warn!(
                        "Routing provider not available at {}: {}. Falling back to mock routing.",
                        base_url, e
                    );
                }
            },
            Err(e) => {
                warn!("Failed to build routing client: {}. Falling back to mock routing.", e);
            }
        }
    }

    info!("Using mock routing provider (routing API not configured or unavailable)");
    Box::new(MockRoutingProvider::new())
}

/// Check that the routing host answers at all
async fn check_routing_health(base_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let response = client.get(base_url).send().await?;

    if response.status().is_server_error() {
        anyhow::bail!("routing provider returned status {}", response.status())
    }
    Ok(())
}

/// Scripted provider for tests: fixed answer, call counter, optional delay and failure
#[cfg(test)]
pub struct StubRoutingProvider {
    summary: RouteSummary,
    delay: std::time::Duration,
    failing: std::sync::atomic::AtomicBool,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl StubRoutingProvider {
    /// Every leg is `km` long and takes `minutes`, with no traffic delay
    pub fn new(km: f64, minutes: f64) -> Self {
        Self {
            summary: RouteSummary {
                length_meters: km * 1000.0,
                travel_time_seconds: minutes * 60.0,
                traffic_delay_seconds: 0.0,
            },
            delay: std::time::Duration::ZERO,
            failing: std::sync::atomic::AtomicBool::new(false),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn with_traffic_delay(mut self, seconds: f64) -> Self {
        self.summary.traffic_delay_seconds = seconds;
        self
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl RoutingProvider for StubRoutingProvider {
    async fn route(&self, _origin: Coordinates, _destination: Coordinates) -> Result<RouteSummary> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("routing provider returned error 503");
        }
        Ok(self.summary)
    }

    fn name(&self) -> &str {
        "Stub"
    }
}
