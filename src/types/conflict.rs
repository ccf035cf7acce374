//! Conflict check types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which resource is double-booked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "conflict_type", rename_all = "snake_case")]
pub enum ConflictType {
    DriverOverlap,
    VehicleOverlap,
}

/// Conflict severity.
///
/// `Low` is reserved for near-miss gap warnings and is never produced for a
/// hard double-booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "conflict_severity", rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "conflict_status", rename_all = "snake_case")]
pub enum ConflictStatus {
    Open,
    Resolved,
    Ignored,
}

impl ConflictStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConflictStatus::Open => "open",
            ConflictStatus::Resolved => "resolved",
            ConflictStatus::Ignored => "ignored",
        }
    }

    /// Open -> Resolved | Ignored; everything else is terminal
    pub fn can_transition_to(self, next: ConflictStatus) -> bool {
        matches!(
            (self, next),
            (ConflictStatus::Open, ConflictStatus::Resolved)
                | (ConflictStatus::Open, ConflictStatus::Ignored)
        )
    }
}

/// Persisted conflict record (kept as history, never auto-deleted)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCheck {
    pub id: Uuid,
    pub check_date: NaiveDate,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    /// Sorted instance ids, always at least two
    pub conflicting_schedules: Vec<Uuid>,
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub status: ConflictStatus,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ConflictCheck {
    pub fn from_draft(draft: ConflictDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            check_date: draft.check_date,
            driver_id: draft.driver_id,
            vehicle_id: draft.vehicle_id,
            conflicting_schedules: draft.instance_ids,
            conflict_type: draft.conflict_type,
            severity: draft.severity,
            status: ConflictStatus::Open,
            resolution_notes: None,
            created_at: now,
            resolved_at: None,
        }
    }

    /// Same resource axis and exactly the same instance set
    pub fn covers(&self, draft: &ConflictDraft) -> bool {
        self.conflict_type == draft.conflict_type
            && self.driver_id == draft.driver_id
            && self.vehicle_id == draft.vehicle_id
            && self.conflicting_schedules == draft.instance_ids
    }
}

/// A conflict found by a detection pass, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDraft {
    pub check_date: NaiveDate,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub instance_ids: Vec<Uuid>,
    pub conflict_type: ConflictType,
    pub severity: Severity,
}
