//! In-memory store for service tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::store::{DistanceCacheStore, PlanningStore};
use crate::services::time_window::spills_into;
use crate::types::{
    ConflictCheck, ConflictStatus, InstanceStatus, Occurrence, Route, RouteDistanceCacheEntry,
    RouteSchedule, ScheduleInstance, SmartSuggestion, SuggestionStatus,
};

#[derive(Default)]
struct Tables {
    routes: HashMap<Uuid, Route>,
    schedules: HashMap<Uuid, RouteSchedule>,
    instances: Vec<ScheduleInstance>,
    conflicts: Vec<ConflictCheck>,
    suggestions: Vec<SmartSuggestion>,
    distances: HashMap<(Uuid, Uuid), RouteDistanceCacheEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_commits: AtomicBool,
    fail_distance_upserts: AtomicBool,
    distance_upserts: AtomicUsize,
    read_delay: Mutex<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_route(&self, route: Route) {
        self.tables.lock().routes.insert(route.id, route);
    }

    pub fn insert_schedule(&self, schedule: RouteSchedule) {
        self.tables.lock().schedules.insert(schedule.id, schedule);
    }

    pub fn insert_instance(&self, instance: ScheduleInstance) {
        self.tables.lock().instances.push(instance);
    }

    pub fn insert_conflict(&self, check: ConflictCheck) {
        self.tables.lock().conflicts.push(check);
    }

    pub fn insert_suggestion(&self, suggestion: SmartSuggestion) {
        self.tables.lock().suggestions.push(suggestion);
    }

    pub fn insert_distance(&self, entry: RouteDistanceCacheEntry) {
        self.tables
            .lock()
            .distances
            .insert((entry.from_route_id, entry.to_route_id), entry);
    }

    /// Apply `f` to a stored instance, e.g. to mark it overridden or deleted
    pub fn update_instance(&self, id: Uuid, f: impl FnOnce(&mut ScheduleInstance)) {
        if let Some(instance) = self.tables.lock().instances.iter_mut().find(|i| i.id == id) {
            f(instance);
        }
    }

    pub fn instances(&self) -> Vec<ScheduleInstance> {
        self.tables.lock().instances.clone()
    }

    pub fn conflicts(&self) -> Vec<ConflictCheck> {
        self.tables.lock().conflicts.clone()
    }

    pub fn suggestions(&self) -> Vec<SmartSuggestion> {
        self.tables.lock().suggestions.clone()
    }

    pub fn distance(&self, from: Uuid, to: Uuid) -> Option<RouteDistanceCacheEntry> {
        self.tables.lock().distances.get(&(from, to)).cloned()
    }

    pub fn distance_upserts(&self) -> usize {
        self.distance_upserts.load(Ordering::SeqCst)
    }

    /// Make every multi-row commit fail without writing anything
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Make distance cache writes fail, leaving planning commits working
    pub fn fail_distance_upserts(&self, fail: bool) {
        self.fail_distance_upserts.store(fail, Ordering::SeqCst);
    }

    /// Hold every occurrence read for `delay`, like a slow query
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock() = delay;
    }

    fn check_commit(&self) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            bail!("simulated commit failure");
        }
        Ok(())
    }
}

#[async_trait]
impl DistanceCacheStore for MemoryStore {
    async fn get_distance_entry(
        &self,
        from_route_id: Uuid,
        to_route_id: Uuid,
    ) -> Result<Option<RouteDistanceCacheEntry>> {
        Ok(self.distance(from_route_id, to_route_id))
    }

    async fn upsert_distance_entry(&self, entry: &RouteDistanceCacheEntry) -> Result<()> {
        if self.fail_distance_upserts.load(Ordering::SeqCst) {
            bail!("simulated distance cache write failure");
        }
        self.distance_upserts.fetch_add(1, Ordering::SeqCst);
        self.insert_distance(entry.clone());
        Ok(())
    }

    async fn delete_distance_entries_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock();
        let before = tables.distances.len();
        tables.distances.retain(|_, e| e.last_updated >= cutoff);
        Ok((before - tables.distances.len()) as u64)
    }
}

#[async_trait]
impl PlanningStore for MemoryStore {
    async fn get_schedule(&self, id: Uuid) -> Result<Option<RouteSchedule>> {
        Ok(self.tables.lock().schedules.get(&id).cloned())
    }

    async fn list_instances_for_schedule(
        &self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleInstance>> {
        Ok(self
            .tables
            .lock()
            .instances
            .iter()
            .filter(|i| i.route_schedule_id == schedule_id)
            .filter(|i| i.schedule_date >= from && i.schedule_date <= to)
            .cloned()
            .collect())
    }

    async fn commit_expansion(
        &self,
        create: &[ScheduleInstance],
        refresh: &[ScheduleInstance],
    ) -> Result<()> {
        self.check_commit()?;
        let mut tables = self.tables.lock();
        tables.instances.extend(create.iter().cloned());
        for updated in refresh {
            if let Some(row) = tables.instances.iter_mut().find(|i| {
                i.id == updated.id
                    && !i.is_override
                    && !i.is_deleted
                    && i.status == InstanceStatus::Scheduled
            }) {
                *row = updated.clone();
            }
        }
        Ok(())
    }

    async fn list_occurrences(&self, date: NaiveDate) -> Result<Vec<Occurrence>> {
        let delay = *self.read_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let tables = self.tables.lock();
        let mut occurrences: Vec<Occurrence> = tables
            .instances
            .iter()
            .filter(|i| !i.is_deleted && i.status != InstanceStatus::Cancelled)
            .filter(|i| {
                i.schedule_date == date
                    || spills_into(i.schedule_date, i.standby_time, i.departure_time, date)
            })
            .filter_map(|i| {
                let schedule = tables.schedules.get(&i.route_schedule_id)?;
                let route = tables.routes.get(&schedule.route_id)?;
                Some(Occurrence {
                    instance_id: i.id,
                    schedule_id: schedule.id,
                    route_id: route.id,
                    schedule_date: i.schedule_date,
                    standby_time: i.standby_time,
                    departure_time: i.departure_time,
                    driver_id: i.driver_id,
                    vehicle_id: i.vehicle_id,
                    status: i.status,
                    is_deleted: i.is_deleted,
                    priority: schedule.priority,
                    origin_lat: route.origin_lat,
                    origin_lng: route.origin_lng,
                    destination_lat: route.destination_lat,
                    destination_lng: route.destination_lng,
                })
            })
            .collect();
        occurrences.sort_by_key(|o| (o.schedule_date, o.standby_time, o.instance_id));
        Ok(occurrences)
    }

    async fn list_conflicts(
        &self,
        date: NaiveDate,
        status: Option<ConflictStatus>,
    ) -> Result<Vec<ConflictCheck>> {
        Ok(self
            .tables
            .lock()
            .conflicts
            .iter()
            .filter(|c| c.check_date == date && status.map_or(true, |s| c.status == s))
            .cloned()
            .collect())
    }

    async fn transition_conflict(
        &self,
        id: Uuid,
        to: ConflictStatus,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<ConflictCheck>> {
        let mut tables = self.tables.lock();
        let Some(check) = tables
            .conflicts
            .iter_mut()
            .find(|c| c.id == id && c.status.can_transition_to(to))
        else {
            return Ok(None);
        };
        check.status = to;
        if let Some(notes) = notes {
            check.resolution_notes = Some(notes.to_string());
        }
        check.resolved_at = Some(at);
        Ok(Some(check.clone()))
    }

    async fn get_conflict(&self, id: Uuid) -> Result<Option<ConflictCheck>> {
        Ok(self.tables.lock().conflicts.iter().find(|c| c.id == id).cloned())
    }

    async fn commit_conflict_run(
        &self,
        create: &[ConflictCheck],
        auto_resolve: &[(Uuid, String)],
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_commit()?;
        let mut tables = self.tables.lock();
        for (id, note) in auto_resolve {
            if let Some(check) = tables
                .conflicts
                .iter_mut()
                .find(|c| c.id == *id && c.status == ConflictStatus::Open)
            {
                check.status = ConflictStatus::Resolved;
                check.resolution_notes = Some(note.clone());
                check.resolved_at = Some(at);
            }
        }
        tables.conflicts.extend(create.iter().cloned());
        Ok(())
    }

    async fn list_suggestions(
        &self,
        date: NaiveDate,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<SmartSuggestion>> {
        Ok(self
            .tables
            .lock()
            .suggestions
            .iter()
            .filter(|s| s.suggestion_date == date && status.map_or(true, |st| s.status == st))
            .cloned()
            .collect())
    }

    async fn get_suggestion(&self, id: Uuid) -> Result<Option<SmartSuggestion>> {
        Ok(self.tables.lock().suggestions.iter().find(|s| s.id == id).cloned())
    }

    async fn transition_suggestion(
        &self,
        id: Uuid,
        to: SuggestionStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<SmartSuggestion>> {
        let mut tables = self.tables.lock();
        let Some(suggestion) = tables
            .suggestions
            .iter_mut()
            .find(|s| s.id == id && s.status == SuggestionStatus::Pending)
        else {
            return Ok(None);
        };
        suggestion.status = to;
        suggestion.updated_at = at;
        Ok(Some(suggestion.clone()))
    }

    async fn commit_suggestion_run(
        &self,
        create: &[SmartSuggestion],
        refresh: &[SmartSuggestion],
    ) -> Result<()> {
        self.check_commit()?;
        let mut tables = self.tables.lock();
        for suggestion in create {
            let exists = tables.suggestions.iter().any(|s| s.key() == suggestion.key());
            if !exists {
                tables.suggestions.push(suggestion.clone());
            }
        }
        for updated in refresh {
            if let Some(row) = tables
                .suggestions
                .iter_mut()
                .find(|s| s.id == updated.id && s.status == SuggestionStatus::Pending)
            {
                *row = updated.clone();
            }
        }
        Ok(())
    }
}
