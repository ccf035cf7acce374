//! Route schedule and schedule instance queries

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{Occurrence, RouteSchedule, ScheduleInstance};

const INSTANCE_COLUMNS: &str = r#"
    id, route_schedule_id, schedule_date, driver_id, vehicle_id,
    standby_date, standby_time, departure_date, departure_time,
    status, is_override, is_deleted, override_reason, notes,
    created_at, updated_at
"#;

/// Get a schedule template by id
pub async fn get_schedule(pool: &PgPool, id: Uuid) -> Result<Option<RouteSchedule>> {
    let schedule = sqlx::query_as::<_, RouteSchedule>(
        r#"
        SELECT
            id, route_id, schedule_name, schedule_type, days_of_week,
            start_date, end_date, standby_time, departure_time,
            default_driver_id, default_vehicle_id, priority, status,
            created_at, updated_at
        FROM route_schedules
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(schedule)
}

/// List all instances of a template between two dates (inclusive)
pub async fn list_instances_for_schedule(
    pool: &PgPool,
    schedule_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<ScheduleInstance>> {
    let sql = format!(
        "SELECT {} FROM schedule_instances \
         WHERE route_schedule_id = $1 AND schedule_date BETWEEN $2 AND $3 \
         ORDER BY schedule_date, created_at",
        INSTANCE_COLUMNS
    );

    let instances = sqlx::query_as::<_, ScheduleInstance>(&sql)
        .bind(schedule_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

    Ok(instances)
}

/// Insert generated instances and refresh regenerated ones atomically
pub async fn commit_expansion(
    pool: &PgPool,
    create: &[ScheduleInstance],
    refresh: &[ScheduleInstance],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for instance in create {
        sqlx::query(
            r#"
            INSERT INTO schedule_instances (
                id, route_schedule_id, schedule_date, driver_id, vehicle_id,
                standby_date, standby_time, departure_date, departure_time,
                status, is_override, is_deleted, override_reason, notes,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#
        )
        .bind(instance.id)
        .bind(instance.route_schedule_id)
        .bind(instance.schedule_date)
        .bind(instance.driver_id)
        .bind(instance.vehicle_id)
        .bind(instance.standby_date)
        .bind(instance.standby_time)
        .bind(instance.departure_date)
        .bind(instance.departure_time)
        .bind(instance.status)
        .bind(instance.is_override)
        .bind(instance.is_deleted)
        .bind(&instance.override_reason)
        .bind(&instance.notes)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    // Only rows that are still generated and scheduled are refreshed; a
    // concurrent manual override wins.
    for instance in refresh {
        sqlx::query(
            r#"
            UPDATE schedule_instances SET
                driver_id = $2,
                vehicle_id = $3,
                standby_date = $4,
                standby_time = $5,
                departure_date = $6,
                departure_time = $7,
                updated_at = $8
            WHERE id = $1
              AND is_override = FALSE
              AND is_deleted = FALSE
              AND status = 'scheduled'
            "#
        )
        .bind(instance.id)
        .bind(instance.driver_id)
        .bind(instance.vehicle_id)
        .bind(instance.standby_date)
        .bind(instance.standby_time)
        .bind(instance.departure_date)
        .bind(instance.departure_time)
        .bind(instance.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Active instances of a date with template priority and route endpoints.
///
/// Cross-day instances of the previous date are included, since they are
/// still running after midnight.
pub async fn list_occurrences(pool: &PgPool, date: NaiveDate) -> Result<Vec<Occurrence>> {
    let occurrences = sqlx::query_as::<_, Occurrence>(
        r#"
        SELECT
            si.id AS instance_id,
            rs.id AS schedule_id,
            r.id AS route_id,
            si.schedule_date,
            si.standby_time,
            si.departure_time,
            si.driver_id,
            si.vehicle_id,
            si.status,
            si.is_deleted,
            rs.priority,
            r.origin_lat,
            r.origin_lng,
            r.destination_lat,
            r.destination_lng
        FROM schedule_instances si
        INNER JOIN route_schedules rs ON rs.id = si.route_schedule_id
        INNER JOIN routes r ON r.id = rs.route_id
        WHERE (
                si.schedule_date = $1
                OR (si.schedule_date = $1 - 1 AND si.departure_time < si.standby_time)
            )
          AND si.is_deleted = FALSE
          AND si.status <> 'cancelled'
        ORDER BY si.schedule_date, si.standby_time, si.id
        "#
    )
    .bind(date)
    .fetch_all(pool)
    .await?;

    Ok(occurrences)
}
