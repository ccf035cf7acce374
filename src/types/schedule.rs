//! Route schedule (template) and schedule instance (occurrence) types

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Coordinates;

/// How a template recurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "schedule_type", rename_all = "snake_case")]
pub enum ScheduleType {
    Single,
    Recurring,
}

/// Template lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "schedule_status", rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Inactive,
    Draft,
}

/// Recurring schedule template for a route
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RouteSchedule {
    pub id: Uuid,
    pub route_id: Uuid,
    pub schedule_name: String,
    pub schedule_type: ScheduleType,
    /// ISO weekdays, 1 = Monday ... 7 = Sunday
    pub days_of_week: Vec<i16>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub standby_time: NaiveTime,
    pub departure_time: NaiveTime,
    pub default_driver_id: Option<Uuid>,
    pub default_vehicle_id: Option<Uuid>,
    pub priority: i32,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "instance_status", rename_all = "snake_case")]
pub enum InstanceStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

/// Concrete dated occurrence of a schedule template
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInstance {
    pub id: Uuid,
    pub route_schedule_id: Uuid,
    pub schedule_date: NaiveDate,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub standby_date: NaiveDate,
    pub standby_time: NaiveTime,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub status: InstanceStatus,
    pub is_override: bool,
    pub is_deleted: bool,
    pub override_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only view of an instance joined with its template and route,
/// as consumed by the conflict detector and the suggestion engine.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub instance_id: Uuid,
    pub schedule_id: Uuid,
    pub route_id: Uuid,
    pub schedule_date: NaiveDate,
    pub standby_time: NaiveTime,
    pub departure_time: NaiveTime,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub status: InstanceStatus,
    pub is_deleted: bool,
    pub priority: i32,
    pub origin_lat: Option<f64>,
    pub origin_lng: Option<f64>,
    pub destination_lat: Option<f64>,
    pub destination_lng: Option<f64>,
}

impl Occurrence {
    /// Cancelled and soft-deleted instances never take part in planning
    pub fn is_active(&self) -> bool {
        !self.is_deleted && self.status != InstanceStatus::Cancelled
    }

    /// No driver and no vehicle assigned
    pub fn is_unassigned(&self) -> bool {
        self.driver_id.is_none() && self.vehicle_id.is_none()
    }

    pub fn origin(&self) -> Option<Coordinates> {
        match (self.origin_lat, self.origin_lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }

    pub fn destination(&self) -> Option<Coordinates> {
        match (self.destination_lat, self.destination_lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }
}
