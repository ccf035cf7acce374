//! Planner error taxonomy

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::services::run_lock::RunKind;

#[derive(Debug, Error)]
pub enum PlannerError {
    /// Malformed input, rejected before any write
    #[error("validation failed: {0}")]
    Validation(String),

    /// Another run of the same kind already holds the token for this date
    #[error("a {kind} run for {date} is already in progress")]
    ConcurrentRun { kind: RunKind, date: NaiveDate },

    #[error("routing provider unavailable: {0}")]
    RoutingUnavailable(String),

    #[error("persistence failure: {0:#}")]
    Persistence(#[source] anyhow::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("cannot move {entity} {id} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: Uuid,
        from: &'static str,
        to: &'static str,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl PlannerError {
    /// Wire error code used in NATS error responses
    pub fn code(&self) -> &'static str {
        match self {
            PlannerError::Validation(_) => "VALIDATION_ERROR",
            PlannerError::ConcurrentRun { .. } => "RUN_IN_PROGRESS",
            PlannerError::RoutingUnavailable(_) => "ROUTING_UNAVAILABLE",
            PlannerError::Persistence(_) => "DATABASE_ERROR",
            PlannerError::NotFound { .. } => "NOT_FOUND",
            PlannerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            PlannerError::Cancelled => "CANCELLED",
        }
    }
}

impl From<anyhow::Error> for PlannerError {
    fn from(err: anyhow::Error) -> Self {
        PlannerError::Persistence(err)
    }
}

pub type PlannerResult<T> = std::result::Result<T, PlannerError>;
