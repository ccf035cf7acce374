//! Persistence seams used by the planner
//!
//! `PgStore` implements them on PostgreSQL through the query modules; tests
//! use the in-memory implementation in `db::memory`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::queries;
use crate::types::{
    ConflictCheck, ConflictStatus, Occurrence, RouteDistanceCacheEntry, RouteSchedule,
    ScheduleInstance, SmartSuggestion, SuggestionStatus,
};

/// Storage for the route distance cache
#[async_trait]
pub trait DistanceCacheStore: Send + Sync {
    async fn get_distance_entry(
        &self,
        from_route_id: Uuid,
        to_route_id: Uuid,
    ) -> Result<Option<RouteDistanceCacheEntry>>;

    /// Insert or replace the entry for its `(from, to)` pair
    async fn upsert_distance_entry(&self, entry: &RouteDistanceCacheEntry) -> Result<()>;

    /// Delete entries last updated before `cutoff`, returning how many were removed
    async fn delete_distance_entries_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Storage for templates, instances, conflicts and suggestions
#[async_trait]
pub trait PlanningStore: Send + Sync {
    async fn get_schedule(&self, id: Uuid) -> Result<Option<RouteSchedule>>;

    /// All instances of a template in `[from, to]`, soft-deleted ones included
    async fn list_instances_for_schedule(
        &self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleInstance>>;

    /// Insert new instances and update refreshed ones in one transaction
    async fn commit_expansion(
        &self,
        create: &[ScheduleInstance],
        refresh: &[ScheduleInstance],
    ) -> Result<()>;

    /// Non-cancelled, non-deleted instances of `date` joined with template and
    /// route, plus cross-day instances of the previous date
    async fn list_occurrences(&self, date: NaiveDate) -> Result<Vec<Occurrence>>;

    async fn list_conflicts(
        &self,
        date: NaiveDate,
        status: Option<ConflictStatus>,
    ) -> Result<Vec<ConflictCheck>>;

    /// Move an `Open` check to `to`. Returns `None` when the check is no longer open.
    async fn transition_conflict(
        &self,
        id: Uuid,
        to: ConflictStatus,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<ConflictCheck>>;

    async fn get_conflict(&self, id: Uuid) -> Result<Option<ConflictCheck>>;

    /// Insert new checks and auto-resolve stale open ones in one transaction
    async fn commit_conflict_run(
        &self,
        create: &[ConflictCheck],
        auto_resolve: &[(Uuid, String)],
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn list_suggestions(
        &self,
        date: NaiveDate,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<SmartSuggestion>>;

    async fn get_suggestion(&self, id: Uuid) -> Result<Option<SmartSuggestion>>;

    /// Move a `Pending` suggestion to `to`. Returns `None` when it is no longer pending.
    async fn transition_suggestion(
        &self,
        id: Uuid,
        to: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<SmartSuggestion>>;

    /// Insert new suggestions and refresh pending ones in one transaction
    async fn commit_suggestion_run(
        &self,
        create: &[SmartSuggestion],
        refresh: &[SmartSuggestion],
    ) -> Result<()>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DistanceCacheStore for PgStore {
    async fn get_distance_entry(
        &self,
        from_route_id: Uuid,
        to_route_id: Uuid,
    ) -> Result<Option<RouteDistanceCacheEntry>>  {
        queries::distance_cache::get_entry(&self.pool, from_route_id, to_route_id).await
    }

    async fn upsert_distance_entry(&self, entry: &RouteDistanceCacheEntry) -> Result<()> {
        queries::distance_cache::upsert_entry(&self.pool, entry).await
    }

    async fn delete_distance_entries_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        queries::distance_cache::delete_older_than(&self.pool, cutoff).await
    }
}

#[async_trait]
impl PlanningStore for PgStore {
    async fn get_schedule(&self, id: Uuid) -> Result<Option<RouteSchedule>> {
        queries::schedule::get_schedule(&self.pool, id).await
    }

    async fn list_instances_for_schedule(
        &self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleInstance>> {
        queries::schedule::list_instances_for_schedule(&self.pool, schedule_id, from, to).await
    }

    async fn commit_expansion(
        &self,
        create: &[ScheduleInstance],
        refresh: &[ScheduleInstance],
    ) -> Result<()>  {
        queries::schedule::commit_expansion(&self.pool, create, refresh).await
    }

    async fn list_occurrences(&self, date: NaiveDate) -> Result<Vec<Occurrence>> {
        queries::schedule::list_occurrences(&self.pool, date).await
    }

    async fn list_conflicts(
        &self,
        date: NaiveDate,
        status: Option<ConflictStatus>,
    ) -> Result<Vec<ConflictCheck>>  {
        queries::conflict::list_conflicts(&self.pool, date, status).await
    }

    async fn transition_conflict(
        &self,
        id: Uuid,
        to: ConflictStatus,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<ConflictCheck>> {
        queries::conflict::transition_conflict(&self.pool, id, to, notes, at).await
    }

    async fn get_conflict(&self, id: Uuid) -> Result<Option<ConflictCheck>> {
        queries::conflict::get_conflict(&self.pool, id).await
    }

    async fn commit_conflict_run(
        &self,
        create: &[ConflictCheck],
        auto_resolve: &[(Uuid, String)],
        at: DateTime<Utc>,
    ) -> Result<()> {
        queries::conflict::commit_conflict_run(&self.pool, create, auto_resolve, at).await
    }

    async fn list_suggestions(
        &self,
        date: NaiveDate,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<SmartSuggestion>>  {
        queries::suggestion::list_suggestions(&self.pool, date, status).await
    }

    async fn get_suggestion(&self, id: Uuid) -> Result<Option<SmartSuggestion>> {
        queries::suggestion::get_suggestion(&self.pool, id).await
    }

    async fn transition_suggestion(
        &self,
        id: Uuid,
        to: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<SmartSuggestion>> {
        queries::suggestion::transition_suggestion(&self.pool, id, to, at).await
    }

    async fn commit_suggestion_run(
        &self,
        create: &[SmartSuggestion],
        refresh: &[SmartSuggestion],
    ) -> Result<()>  {
        queries::suggestion::commit_suggestion_run(&self.pool, create, refresh).await
    }
}
