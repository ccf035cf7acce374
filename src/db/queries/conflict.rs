//! Conflict check queries

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{ConflictCheck, ConflictStatus};

const CONFLICT_COLUMNS: &str = r#"
    id, check_date, driver_id, vehicle_id, conflicting_schedules,
    conflict_type, severity, status, resolution_notes, created_at, resolved_at
"#;

/// List conflict checks of a date, optionally filtered by status
pub async fn list_conflicts(
    pool: &PgPool,
    date: NaiveDate,
    status: Option<ConflictStatus>,
) -> Result<Vec<ConflictCheck>> {
    let sql = format!(
        "SELECT {} FROM conflict_checks \
         WHERE check_date = $1 AND ($2::conflict_status IS NULL OR status = $2) \
         ORDER BY created_at, id",
        CONFLICT_COLUMNS
    );

    let checks = sqlx::query_as::<_, ConflictCheck>(&sql)
        .bind(date)
        .bind(status)
        .fetch_all(pool)
        .await?;

    Ok(checks)
}

pub async fn get_conflict(pool: &PgPool, id: Uuid) -> Result<Option<ConflictCheck>> {
    let sql = format!("SELECT {} FROM conflict_checks WHERE id = $1", CONFLICT_COLUMNS);

    let check = sqlx::query_as::<_, ConflictCheck>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(check)
}

/// Move an open check to a terminal status (no-op if it is no longer open)
pub async fn transition_conflict(
    pool: &PgPool,
    id: Uuid,
    to: ConflictStatus,
    notes: Option<&str>,
    at: DateTime<Utc>,
) -> Result<Option<ConflictCheck>> {
    let sql = format!(
        "UPDATE conflict_checks SET \
             status = $2, \
             resolution_notes = COALESCE($3, resolution_notes), \
             resolved_at = $4 \
         WHERE id = $1 AND status = 'open' \
         RETURNING {}",
        CONFLICT_COLUMNS
    );

    let check = sqlx::query_as::<_, ConflictCheck>(&sql)
        .bind(id)
        .bind(to)
        .bind(notes)
        .bind(at)
        .fetch_optional(pool)
        .await?;

    Ok(check)
}

/// Persist the outcome of one detection run atomically
pub async fn commit_conflict_run(
    pool: &PgPool,
    create: &[ConflictCheck],
    auto_resolve: &[(Uuid, String)],
    at: DateTime<Utc>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for (id, note) in auto_resolve {
        sqlx::query(
            r#"
            UPDATE conflict_checks
            SET status = 'resolved', resolution_notes = $2, resolved_at = $3
            WHERE id = $1 AND status = 'open'
            "#
        )
        .bind(id)
        .bind(note)
        .bind(at)
        .execute(&mut *tx)
        .await?;
    }

    for check in create {
        sqlx::query(
            r#"
            INSERT INTO conflict_checks (
                id, check_date, driver_id, vehicle_id, conflicting_schedules,
                conflict_type, severity, status, resolution_notes, created_at, resolved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#
        )
        .bind(check.id)
        .bind(check.check_date)
        .bind(check.driver_id)
        .bind(check.vehicle_id)
        .bind(&check.conflicting_schedules)
        .bind(check.conflict_type)
        .bind(check.severity)
        .bind(check.status)
        .bind(&check.resolution_notes)
        .bind(check.created_at)
        .bind(check.resolved_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
