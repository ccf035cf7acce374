//! Smart suggestion types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "suggestion_status", rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl SuggestionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Accepted => "accepted",
            SuggestionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SuggestionStatus::Pending)
    }
}

/// Proposed back-to-back pairing of two routes on a date
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SmartSuggestion {
    pub id: Uuid,
    pub from_route_id: Uuid,
    pub to_route_id: Uuid,
    pub suggestion_date: NaiveDate,
    pub gap_minutes: i32,
    pub distance_km: f64,
    pub travel_time_minutes: f64,
    pub efficiency_score: f64,
    pub cost_savings_estimate: f64,
    pub status: SuggestionStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SmartSuggestion {
    pub fn from_draft(draft: &SuggestionDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_route_id: draft.from_route_id,
            to_route_id: draft.to_route_id,
            suggestion_date: draft.suggestion_date,
            gap_minutes: draft.gap_minutes,
            distance_km: draft.distance_km,
            travel_time_minutes: draft.travel_time_minutes,
            efficiency_score: draft.efficiency_score,
            cost_savings_estimate: draft.cost_savings_estimate,
            status: SuggestionStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite metrics of a still-pending suggestion with a fresh draft
    pub fn refresh_from(&mut self, draft: &SuggestionDraft, now: DateTime<Utc>) {
        self.gap_minutes = draft.gap_minutes;
        self.distance_km = draft.distance_km;
        self.travel_time_minutes = draft.travel_time_minutes;
        self.efficiency_score = draft.efficiency_score;
        self.cost_savings_estimate = draft.cost_savings_estimate;
        self.updated_at = now;
    }

    pub fn key(&self) -> SuggestionKey {
        SuggestionKey {
            date: self.suggestion_date,
            from_route_id: self.from_route_id,
            to_route_id: self.to_route_id,
        }
    }
}

/// Idempotence key of a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuggestionKey {
    pub date: NaiveDate,
    pub from_route_id: Uuid,
    pub to_route_id: Uuid,
}

/// A suggestion computed by a generation pass, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionDraft {
    pub from_route_id: Uuid,
    pub to_route_id: Uuid,
    pub from_instance_id: Uuid,
    pub to_instance_id: Uuid,
    pub suggestion_date: NaiveDate,
    pub gap_minutes: i32,
    pub distance_km: f64,
    pub travel_time_minutes: f64,
    pub efficiency_score: f64,
    pub cost_savings_estimate: f64,
    /// Sum of both templates' priorities, used for ordering
    pub priority: i32,
}

impl SuggestionDraft {
    pub fn key(&self) -> SuggestionKey {
        SuggestionKey {
            date: self.suggestion_date,
            from_route_id: self.from_route_id,
            to_route_id: self.to_route_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(score: f64) -> SuggestionDraft {
        SuggestionDraft {
            from_route_id: Uuid::new_v4(),
            to_route_id: Uuid::new_v4(),
            from_instance_id: Uuid::new_v4(),
            to_instance_id: Uuid::new_v4(),
            suggestion_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            gap_minutes: 60,
            distance_km: 20.0,
            travel_time_minutes: 25.0,
            efficiency_score: score,
            cost_savings_estimate: 100.0,
            priority: 0,
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SuggestionStatus::Pending.is_terminal());
        assert!(SuggestionStatus::Accepted.is_terminal());
        assert!(SuggestionStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_refresh_keeps_identity_and_status() {
        let first = draft(0.5);
        let mut suggestion = SmartSuggestion::from_draft(&first, Utc::now());
        let id = suggestion.id;

        let mut second = draft(0.8);
        second.from_route_id = first.from_route_id;
        second.to_route_id = first.to_route_id;
        suggestion.refresh_from(&second, Utc::now());

        assert_eq!(suggestion.id, id);
        assert_eq!(suggestion.status, SuggestionStatus::Pending);
        assert_eq!(suggestion.efficiency_score, 0.8);
        assert_eq!(suggestion.key(), second.key());
    }
}
