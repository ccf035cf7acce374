//! Smart suggestion queries

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{SmartSuggestion, SuggestionStatus};

const SUGGESTION_COLUMNS: &str = r#"
    id, from_route_id, to_route_id, suggestion_date, gap_minutes,
    distance_km, travel_time_minutes, efficiency_score, cost_savings_estimate,
    status, notes, created_at, updated_at
"#;

/// List suggestions of a date, optionally filtered by status
pub async fn list_suggestions(
    pool: &PgPool,
    date: NaiveDate,
    status: Option<SuggestionStatus>,
) -> Result<Vec<SmartSuggestion>> {
    let sql = format!(
        "SELECT {} FROM smart_suggestions \
         WHERE suggestion_date = $1 AND ($2::suggestion_status IS NULL OR status = $2) \
         ORDER BY efficiency_score DESC, id",
        SUGGESTION_COLUMNS
    );

    let suggestions = sqlx::query_as::<_, SmartSuggestion>(&sql)
        .bind(date)
        .bind(status)
        .fetch_all(pool)
        .await?;

    Ok(suggestions)
}

pub async fn get_suggestion(pool: &PgPool, id: Uuid) -> Result<Option<SmartSuggestion>> {
    let sql = format!("SELECT {} FROM smart_suggestions WHERE id = $1", SUGGESTION_COLUMNS);

    let suggestion = sqlx::query_as::<_, SmartSuggestion>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(suggestion)
}

/// Accept or reject a pending suggestion (no-op if it is already terminal)
pub async fn transition_suggestion(
    pool: &PgPool,
    id: Uuid,
    to: SuggestionStatus,
    at: DateTime<Utc>,
) -> Result<Option<SmartSuggestion>> {
    let sql = format!(
        "UPDATE smart_suggestions SET status = $2, updated_at = $3 \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {}",
        SUGGESTION_COLUMNS
    );

    let suggestion = sqlx::query_as::<_, SmartSuggestion>(&sql)
        .bind(id)
        .bind(to)
        .bind(at)
        .fetch_optional(pool)
        .await?;

    Ok(suggestion)
}

/// Persist the outcome of one generation run atomically
pub async fn commit_suggestion_run(
    pool: &PgPool,
    create: &[SmartSuggestion],
    refresh: &[SmartSuggestion],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for s in create {
        sqlx::query(
            r#"
            INSERT INTO smart_suggestions (
                id, from_route_id, to_route_id, suggestion_date, gap_minutes,
                distance_km, travel_time_minutes, efficiency_score, cost_savings_estimate,
                status, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (suggestion_date, from_route_id, to_route_id) DO NOTHING
            "#
        )
        .bind(s.id)
        .bind(s.from_route_id)
        .bind(s.to_route_id)
        .bind(s.suggestion_date)
        .bind(s.gap_minutes)
        .bind(s.distance_km)
        .bind(s.travel_time_minutes)
        .bind(s.efficiency_score)
        .bind(s.cost_savings_estimate)
        .bind(s.status)
        .bind(&s.notes)
        .bind(s.created_at)
        .bind(s.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    for s in refresh {
        sqlx::query(
            r#"
            UPDATE smart_suggestions SET
                gap_minutes = $2,
                distance_km = $3,
                travel_time_minutes = $4,
                efficiency_score = $5,
                cost_savings_estimate = $6,
                updated_at = $7
            WHERE id = $1 AND status = 'pending'
            "#
        )
        .bind(s.id)
        .bind(s.gap_minutes)
        .bind(s.distance_km)
        .bind(s.travel_time_minutes)
        .bind(s.efficiency_score)
        .bind(s.cost_savings_estimate)
        .bind(s.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
