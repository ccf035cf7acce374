//! TomTom Routing API client
//!
//! API documentation:
//! https://developer.tomtom.com/routing-api/documentation/routing/calculate-route

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{RouteSummary, RoutingProvider};
use crate::types::Coordinates;

/// TomTom client configuration
#[derive(Debug, Clone)]
pub struct TomTomConfig {
    /// Base URL of the routing API (e.g., "https://api.tomtom.com")
    pub base_url: String,
    /// API key, sent as the `key` query parameter
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for TomTomConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tomtom.com".to_string(),
            api_key: None,
            timeout_seconds: 10,
        }
    }
}

impl TomTomConfig {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// TomTom routing client
pub struct TomTomClient {
    client: Client,
    config: TomTomConfig,
}

impl TomTomClient {
    pub fn new(config: TomTomConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// Build the calculateRoute URL for a single origin -> destination leg
    fn build_route_url(&self, origin: &Coordinates, destination: &Coordinates) -> String {
        let mut url = format!(
            "{}/routing/1/calculateRoute/{},{}:{},{}/json?traffic=true",
            self.config.base_url.trim_end_matches('/'),
            origin.lat,
            origin.lng,
            destination.lat,
            destination.lng,
        );
        if let Some(key) = &self.config.api_key {
            url.push_str("&key=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }
}

#[async_trait]
impl RoutingProvider for TomTomClient {
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> Result<RouteSummary> {
        let url = self.build_route_url(&origin, &destination);

        debug!(
            "Requesting route from ({}, {}) to ({}, {})",
            origin.lat, origin.lng, destination.lat, destination.lng
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request to routing provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Routing provider returned error {}: {}", status, body);
        }

        let parsed: CalculateRouteResponse = response
            .json()
            .await
            .context("Failed to parse routing provider response")?;

        summary_from_response(parsed)
    }

    fn name(&self) -> &str {
        "TomTom"
    }
}

fn summary_from_response(response: CalculateRouteResponse) -> Result<RouteSummary> {
    let route = response
        .routes
        .into_iter()
        .next()
        .context("Routing provider returned no routes")?;

    Ok(RouteSummary {
        length_meters: route.summary.length_in_meters,
        travel_time_seconds: route.summary.travel_time_in_seconds,
        traffic_delay_seconds: route.summary.traffic_delay_in_seconds,
    })
}

// TomTom API types

#[derive(Debug, Deserialize)]
struct CalculateRouteResponse {
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    summary: Summary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    length_in_meters: f64,
    travel_time_in_seconds: f64,
    #[serde(default)]
    traffic_delay_in_seconds: f64,
}
