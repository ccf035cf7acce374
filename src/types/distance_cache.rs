//! Route distance cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Cached travel leg between the destination of `from_route_id` and the
/// origin of `to_route_id`. Direction matters.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RouteDistanceCacheEntry {
    pub from_route_id: Uuid,
    pub to_route_id: Uuid,
    pub distance_km: f64,
    pub travel_time_minutes: f64,
    pub traffic_factor: f64,
    pub last_updated: DateTime<Utc>,
}

impl RouteDistanceCacheEntry {
    pub fn leg(&self) -> RouteLeg {
        RouteLeg {
            distance_km: self.distance_km,
            travel_minutes: self.travel_time_minutes,
            traffic_factor: self.traffic_factor,
        }
    }
}

/// Distance/time between two route endpoints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
    pub distance_km: f64,
    pub travel_minutes: f64,
    pub traffic_factor: f64,
}
