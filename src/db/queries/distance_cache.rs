//! Route distance cache queries

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::RouteDistanceCacheEntry;

pub async fn get_entry(
    pool: &PgPool,
    from_route_id: Uuid,
    to_route_id: Uuid,
) -> Result<Option<RouteDistanceCacheEntry>> {
    let entry = sqlx::query_as::<_, RouteDistanceCacheEntry>(
        r#"
        SELECT from_route_id, to_route_id, distance_km, travel_time_minutes,
               traffic_factor, last_updated
        FROM route_distance_cache
        WHERE from_route_id = $1 AND to_route_id = $2
        "#
    )
    .bind(from_route_id)
    .bind(to_route_id)
    .fetch_optional(pool)
    .await?;

    Ok(entry)
}

/// Insert or refresh the entry for an ordered route pair
pub async fn upsert_entry(pool: &PgPool, entry: &RouteDistanceCacheEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO route_distance_cache (
            from_route_id, to_route_id, distance_km, travel_time_minutes,
            traffic_factor, last_updated
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (from_route_id, to_route_id)
        DO UPDATE SET
            distance_km = EXCLUDED.distance_km,
            travel_time_minutes = EXCLUDED.travel_time_minutes,
            traffic_factor = EXCLUDED.traffic_factor,
            last_updated = EXCLUDED.last_updated
        "#
    )
    .bind(entry.from_route_id)
    .bind(entry.to_route_id)
    .bind(entry.distance_km)
    .bind(entry.travel_time_minutes)
    .bind(entry.traffic_factor)
    .bind(entry.last_updated)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete entries last updated before `cutoff`
pub async fn delete_older_than(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM route_distance_cache WHERE last_updated < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
