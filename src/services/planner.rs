//! Planner facade
//!
//! Wires the pure engines (recurrence expander, conflict detector,
//! suggestion engine) to the store, the distance cache, the clock and the
//! per-date run tokens. Every run reads one occurrence snapshot and writes
//! its outcome in a single store transaction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PlannerSettings;
use crate::db::PlanningStore;
use crate::error::{PlannerError, PlannerResult};
use crate::services::clock::Clock;
use crate::services::conflict_detector::detect_conflicts;
use crate::services::distance_cache::DistanceCache;
use crate::services::recurrence::{expand, plan_expansion, validate_horizon, validate_template};
use crate::services::run_lock::{RunKind, RunLocks};
use crate::services::suggestion_engine::suggest;
use crate::types::{
    ConflictCheck, ConflictStatus, Occurrence, ScheduleStatus, SmartSuggestion, SuggestionStatus,
};

const AUTO_RESOLVE_NOTE: &str =
    "Auto-resolved: the conflicting instances no longer overlap as recorded";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionReport {
    pub template_id: Uuid,
    pub horizon_start: NaiveDate,
    pub horizon_end: NaiveDate,
    pub created: usize,
    pub refreshed: usize,
    pub preserved_overrides: usize,
    pub suppressed_deleted: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRunReport {
    pub date: NaiveDate,
    /// Open checks for the date after the run
    pub checks: Vec<ConflictCheck>,
    pub created: usize,
    pub unchanged: usize,
    pub auto_resolved: usize,
    /// Clusters matching a check the user already chose to ignore
    pub suppressed_ignored: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRunReport {
    pub date: NaiveDate,
    /// Suggestions created or refreshed by the run, best first
    pub suggestions: Vec<SmartSuggestion>,
    pub created: usize,
    pub refreshed: usize,
    /// Pairs whose key already has an accepted or rejected suggestion
    pub skipped_terminal: usize,
    /// Pairs dropped on routing failure
    pub skipped_pairs: usize,
    pub missing_endpoints: usize,
}

/// How one pass of a daily run ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PassOutcome<T> {
    Completed { report: T },
    Failed { code: String, message: String },
}

impl<T> PassOutcome<T> {
    pub fn report(&self) -> Option<&T> {
        match self {
            PassOutcome::Completed { report } => Some(report),
            PassOutcome::Failed { .. } => None,
        }
    }
}

impl<T> From<PlannerResult<T>> for PassOutcome<T> {
    fn from(result: PlannerResult<T>) -> Self {
        match result {
            Ok(report) => PassOutcome::Completed { report },
            Err(e) => PassOutcome::Failed {
                code: e.code().to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// Each pass commits on its own; a failed pass does not undo the other
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPlanningReport {
    pub date: NaiveDate,
    pub conflicts: PassOutcome<ConflictRunReport>,
    pub suggestions: PassOutcome<SuggestionRunReport>,
}

impl DailyPlanningReport {
    pub fn is_complete(&self) -> bool {
        self.conflicts.report().is_some() && self.suggestions.report().is_some()
    }
}

/// Race a store call against `cancel`. An interrupted commit drops its
/// transaction, which rolls back.
async fn until_cancelled<T, F>(cancel: &CancellationToken, call: F) -> PlannerResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PlannerError::Cancelled),
        result = call => Ok(result?),
    }
}

pub struct Planner {
    store: Arc<dyn PlanningStore>,
    cache: DistanceCache,
    clock: Arc<dyn Clock>,
    locks: RunLocks,
    settings: PlannerSettings,
}

impl Planner {
    pub fn new(
        store: Arc<dyn PlanningStore>,
        cache: DistanceCache,
        clock: Arc<dyn Clock>,
        settings: PlannerSettings,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            locks: RunLocks::new(),
            settings,
        }
    }

    /// Default horizon: today through today + configured days
    fn default_horizon(&self) -> PlannerResult<(NaiveDate, NaiveDate)> {
        let today = self.clock.today();
        let end = u64::try_from(self.settings.default_horizon_days)
            .ok()
            .and_then(|days| today.checked_add_days(Days::new(days)))
            .ok_or_else(|| {
                PlannerError::Validation(format!(
                    "default horizon of {} days from {} is out of range",
                    self.settings.default_horizon_days, today
                ))
            })?;
        Ok((today, end))
    }

    /// Materialize a template's occurrences in the horizon, idempotently
    pub async fn expand_schedules(
        &self,
        template_id: Uuid,
        horizon_start: Option<NaiveDate>,
        horizon_end: Option<NaiveDate>,
    ) -> PlannerResult<ExpansionReport> {
        let (horizon_start, horizon_end) = match (horizon_start, horizon_end) {
            (Some(start), Some(end)) => (start, end),
            (start, end) => {
                let (default_start, default_end) = self.default_horizon()?;
                (start.unwrap_or(default_start), end.unwrap_or(default_end))
            }
        };
        validate_horizon(horizon_start, horizon_end)?;

        let template = self
            .store
            .get_schedule(template_id)
            .await?
            .ok_or(PlannerError::NotFound { entity: "schedule", id: template_id })?;
        validate_template(&template)?;

        let mut report = ExpansionReport {
            template_id,
            horizon_start,
            horizon_end,
            created: 0,
            refreshed: 0,
            preserved_overrides: 0,
            suppressed_deleted: 0,
            unchanged: 0,
        };

        if template.status != ScheduleStatus::Active {
            info!(
                "Schedule {} is {:?}, nothing to expand",
                template_id, template.status
            );
            return Ok(report);
        }

        let drafts = expand(&template, horizon_start, horizon_end)?;
        let existing = self
            .store
            .list_instances_for_schedule(template_id, horizon_start, horizon_end)
            .await?;
        let plan = plan_expansion(drafts, &existing, self.clock.now());

        if !plan.create.is_empty() || !plan.refresh.is_empty() {
            self.store.commit_expansion(&plan.create, &plan.refresh).await?;
        }

        report.created = plan.create.len();
        report.refreshed = plan.refresh.len();
        report.preserved_overrides = plan.preserved_overrides;
        report.suppressed_deleted = plan.suppressed_deleted;
        report.unchanged = plan.unchanged;

        info!(
            "Expanded schedule {} over {}..{}: {} created, {} refreshed, {} overrides kept, \
             {} unchanged",
            template_id,
            horizon_start,
            horizon_end,
            report.created,
            report.refreshed,
            report.preserved_overrides,
            report.unchanged
        );
        Ok(report)
    }

    pub async fn run_conflict_check(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> PlannerResult<ConflictRunReport> {
        let _guard = self.locks.try_acquire(RunKind::ConflictCheck, date)?;
        let snapshot = until_cancelled(cancel, self.store.list_occurrences(date)).await?;
        self.conflict_pass(date, &snapshot, cancel).await
    }

    pub async fn run_suggestion_generation(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> PlannerResult<SuggestionRunReport> {
        let _guard = self.locks.try_acquire(RunKind::SuggestionGeneration, date)?;
        let snapshot = until_cancelled(cancel, self.store.list_occurrences(date)).await?;
        self.suggestion_pass(date, &snapshot, cancel).await
    }

    /// Both engines over one snapshot, concurrently.
    ///
    /// Fails only when neither pass committed. If one pass fails, the report
    /// carries its error next to the other pass's committed outcome.
    pub async fn run_daily_planning(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> PlannerResult<DailyPlanningReport> {
        let _conflict_guard = self.locks.try_acquire(RunKind::ConflictCheck, date)?;
        let _suggestion_guard = self.locks.try_acquire(RunKind::SuggestionGeneration, date)?;

        let snapshot = until_cancelled(cancel, self.store.list_occurrences(date)).await?;
        let (conflicts, suggestions) = tokio::join!(
            self.conflict_pass(date, &snapshot, cancel),
            self.suggestion_pass(date, &snapshot, cancel),
        );

        match (conflicts, suggestions) {
            (Err(conflict_err), Err(suggestion_err)) => {
                warn!("Daily planning for {}: suggestion pass failed: {}", date, suggestion_err);
                Err(conflict_err)
            }
            (conflicts, suggestions) => {
                if let Err(e) = &conflicts {
                    warn!("Daily planning for {}: conflict pass failed: {}", date, e);
                }
                if let Err(e) = &suggestions {
                    warn!("Daily planning for {}: suggestion pass failed: {}", date, e);
                }
                Ok(DailyPlanningReport {
                    date,
                    conflicts: conflicts.into(),
                    suggestions: suggestions.into(),
                })
            }
        }
    }

    async fn conflict_pass(
        &self,
        date: NaiveDate,
        snapshot: &[Occurrence],
        cancel: &CancellationToken,
    ) -> PlannerResult<ConflictRunReport> {
        let drafts = detect_conflicts(date, snapshot);
        let existing = until_cancelled(cancel, self.store.list_conflicts(date, None)).await?;
        let now = self.clock.now();

        let mut checks = Vec::new();
        let mut create = Vec::new();
        let mut unchanged = 0;
        let mut suppressed_ignored = 0;

        for draft in drafts {
            if let Some(open) = existing
                .iter()
                .find(|c| c.status == ConflictStatus::Open && c.covers(&draft))
            {
                unchanged += 1;
                checks.push(open.clone());
            } else if existing
                .iter()
                .any(|c| c.status == ConflictStatus::Ignored && c.covers(&draft))
            {
                suppressed_ignored += 1;
            } else {
                let check = ConflictCheck::from_draft(draft, now);
                checks.push(check.clone());
                create.push(check);
            }
        }

        let auto_resolve: Vec<(Uuid, String)> = existing
            .iter()
            .filter(|c| c.status == ConflictStatus::Open)
            .filter(|c| !checks.iter().any(|kept| kept.id == c.id))
            .map(|c| (c.id, AUTO_RESOLVE_NOTE.to_string()))
            .collect();

        if cancel.is_cancelled() {
            return Err(PlannerError::Cancelled);
        }

        if !create.is_empty() || !auto_resolve.is_empty() {
            until_cancelled(cancel, self.store.commit_conflict_run(&create, &auto_resolve, now))
                .await?;
        }

        info!(
            "Conflict check for {}: {} created, {} unchanged, {} auto-resolved, {} ignored",
            date,
            create.len(),
            unchanged,
            auto_resolve.len(),
            suppressed_ignored
        );

        Ok(ConflictRunReport {
            date,
            checks,
            created: create.len(),
            unchanged,
            auto_resolved: auto_resolve.len(),
            suppressed_ignored,
        })
    }

    async fn suggestion_pass(
        &self,
        date: NaiveDate,
        snapshot: &[Occurrence],
        cancel: &CancellationToken,
    ) -> PlannerResult<SuggestionRunReport> {
        let outcome = suggest(date, snapshot, &self.cache, &self.settings, cancel).await?;
        let existing = until_cancelled(cancel, self.store.list_suggestions(date, None)).await?;
        let by_key: HashMap<_, &SmartSuggestion> = existing.iter().map(|s| (s.key(), s)).collect();
        let now = self.clock.now();

        let mut suggestions = Vec::new();
        let mut create = Vec::new();
        let mut refresh = Vec::new();
        let mut skipped_terminal = 0;

        for draft in &outcome.drafts {
            match by_key.get(&draft.key()) {
                Some(current) if current.status.is_terminal() => skipped_terminal += 1,
                Some(current) => {
                    let mut updated = (*current).clone();
                    updated.refresh_from(draft, now);
                    suggestions.push(updated.clone());
                    refresh.push(updated);
                }
                None => {
                    let suggestion = SmartSuggestion::from_draft(draft, now);
                    suggestions.push(suggestion.clone());
                    create.push(suggestion);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(PlannerError::Cancelled);
        }

        if !create.is_empty() || !refresh.is_empty() {
            until_cancelled(cancel, self.store.commit_suggestion_run(&create, &refresh)).await?;
        }

        if outcome.skipped_pairs > 0 {
            warn!(
                "Suggestion run for {} skipped {} pairs on routing failure ({})",
                date,
                outcome.skipped_pairs,
                self.cache.provider_name()
            );
        }
        info!(
            "Suggestion run for {}: {} created, {} refreshed, {} terminal kept, \
             {} missing endpoints",
            date,
            create.len(),
            refresh.len(),
            skipped_terminal,
            outcome.missing_endpoints
        );

        Ok(SuggestionRunReport {
            date,
            suggestions,
            created: create.len(),
            refreshed: refresh.len(),
            skipped_terminal,
            skipped_pairs: outcome.skipped_pairs,
            missing_endpoints: outcome.missing_endpoints,
        })
    }

    pub async fn resolve_conflict(
        &self,
        id: Uuid,
        notes: Option<String>,
    ) -> PlannerResult<ConflictCheck> {
        self.transition_conflict(id, ConflictStatus::Resolved, notes.as_deref()).await
    }

    pub async fn ignore_conflict(&self, id: Uuid) -> PlannerResult<ConflictCheck> {
        self.transition_conflict(id, ConflictStatus::Ignored, None).await
    }

    async fn transition_conflict(
        &self,
        id: Uuid,
        to: ConflictStatus,
        notes: Option<&str>,
    ) -> PlannerResult<ConflictCheck> {
        let current = self
            .store
            .get_conflict(id)
            .await?
            .ok_or(PlannerError::NotFound { entity: "conflict", id })?;
        let invalid = |from: ConflictStatus| PlannerError::InvalidTransition {
            entity: "conflict",
            id,
            from: from.as_str(),
            to: to.as_str(),
        };
        if !current.status.can_transition_to(to) {
            return Err(invalid(current.status));
        }

        let now: DateTime<Utc> = self.clock.now();
        if let Some(check) = self.store.transition_conflict(id, to, notes, now).await? {
            info!("Conflict {} moved to {}", id, to.as_str());
            return Ok(check);
        }

        // Another writer moved the check between the read and the update
        match self.store.get_conflict(id).await? {
            None => Err(PlannerError::NotFound { entity: "conflict", id }),
            Some(check) => Err(invalid(check.status)),
        }
    }

    pub async fn accept_suggestion(&self, id: Uuid) -> PlannerResult<SmartSuggestion> {
        self.transition_suggestion(id, SuggestionStatus::Accepted).await
    }

    pub async fn reject_suggestion(&self, id: Uuid) -> PlannerResult<SmartSuggestion> {
        self.transition_suggestion(id, SuggestionStatus::Rejected).await
    }

    async fn transition_suggestion(
        &self,
        id: Uuid,
        to: SuggestionStatus,
    ) -> PlannerResult<SmartSuggestion> {
        let now = self.clock.now();
        if let Some(suggestion) = self.store.transition_suggestion(id, to, now).await? {
            info!("Suggestion {} moved to {}", id, to.as_str());
            return Ok(suggestion);
        }

        match self.store.get_suggestion(id).await? {
            None => Err(PlannerError::NotFound { entity: "suggestion", id }),
            Some(suggestion) => Err(PlannerError::InvalidTransition {
                entity: "suggestion",
                id,
                from: suggestion.status.as_str(),
                to: to.as_str(),
            }),
        }
    }

    pub async fn list_conflicts(
        &self,
        date: NaiveDate,
        status: Option<ConflictStatus>,
    ) -> PlannerResult<Vec<ConflictCheck>> {
        Ok(self.store.list_conflicts(date, status).await?)
    }

    /// Suggestions of a date, best first
    pub async fn list_suggestions(
        &self,
        date: NaiveDate,
        status: Option<SuggestionStatus>,
    ) -> PlannerResult<Vec<SmartSuggestion>> {
        let mut suggestions = self.store.list_suggestions(date, status).await?;
        suggestions.sort_by(|a, b| {
            b.efficiency_score
                .total_cmp(&a.efficiency_score)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(suggestions)
    }

    pub async fn sweep_expired_cache_entries(&self) -> PlannerResult<u64> {
        let deleted = self.cache.sweep_expired().await?;
        info!("Swept {} expired distance cache entries", deleted);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{NaiveTime, TimeZone};

    use crate::db::memory::MemoryStore;
    use crate::services::clock::FixedClock;
    use crate::services::routing::StubRoutingProvider;
    use crate::types::{
        InstanceStatus, Route, RouteDistanceCacheEntry, RouteSchedule, ScheduleInstance,
        ScheduleType,
    };

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn june(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        provider: Arc<StubRoutingProvider>,
        clock: Arc<FixedClock>,
        planner: Planner,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(StubRoutingProvider::new(20.0, 25.0));
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 31, 18, 0, 0).unwrap()));
        let timeout = Duration::from_secs(5);
        let cache = DistanceCache::new(store.clone(), provider.clone(), clock.clone(), timeout);
        let planner = Planner::new(store.clone(), cache, clock.clone(), PlannerSettings::default());
        Fixture { store, provider, clock, planner }
    }

    fn planner_with(f: &Fixture, settings: PlannerSettings) -> Planner {
        let cache = DistanceCache::new(
            f.store.clone(),
            f.provider.clone(),
            f.clock.clone(),
            Duration::from_secs(5),
        );
        Planner::new(f.store.clone(), cache, f.clock.clone(), settings)
    }

    fn route(store: &MemoryStore, code: &str) -> Route {
        let route = Route {
            id: Uuid::new_v4(),
            route_code: code.to_string(),
            name: format!("Route {}", code),
            origin_name: Some("Depot".to_string()),
            origin_lat: Some(13.67),
            origin_lng: Some(100.60),
            destination_name: Some("Port".to_string()),
            destination_lat: Some(13.08),
            destination_lng: Some(100.88),
            estimated_distance_km: None,
            estimated_duration_minutes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_route(route.clone());
        route
    }

    fn schedule(
        store: &MemoryStore,
        route: &Route,
        standby: NaiveTime,
        departure: NaiveTime,
        driver: Option<Uuid>,
    ) -> RouteSchedule {
        let schedule = RouteSchedule {
            id: Uuid::new_v4(),
            route_id: route.id,
            schedule_name: format!("{} daily", route.route_code),
            schedule_type: ScheduleType::Recurring,
            days_of_week: vec![1, 2, 3, 4, 5, 6, 7],
            start_date: june(1),
            end_date: None,
            standby_time: standby,
            departure_time: departure,
            default_driver_id: driver,
            default_vehicle_id: None,
            priority: 1,
            status: ScheduleStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_schedule(schedule.clone());
        schedule
    }

    fn instance_on(store: &MemoryStore, schedule_id: Uuid, date: NaiveDate) -> ScheduleInstance {
        store
            .instances()
            .into_iter()
            .find(|i| i.route_schedule_id == schedule_id && i.schedule_date == date)
            .unwrap()
    }

    async fn expand_june_1(f: &Fixture, schedule: &RouteSchedule) -> ExpansionReport {
        f.planner
            .expand_schedules(schedule.id, Some(june(1)), Some(june(1)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_expansion_is_idempotent_and_keeps_overrides() {
        let f = fixture();
        let r = route(&f.store, "R1");
        let s = schedule(&f.store, &r, hm(8, 0), hm(9, 0), Some(Uuid::new_v4()));

        let first = f.planner.expand_schedules(s.id, Some(june(1)), Some(june(7))).await.unwrap();
        assert_eq!(first.created, 7);

        let override_id = instance_on(&f.store, s.id, june(3)).id;
        f.store.update_instance(override_id, |i| {
            i.is_override = true;
            i.standby_time = hm(7, 0);
        });

        let second = f.planner.expand_schedules(s.id, Some(june(1)), Some(june(7))).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.preserved_overrides, 1);
        assert_eq!(second.unchanged, 6);
        assert_eq!(f.store.instances().len(), 7);
        assert_eq!(instance_on(&f.store, s.id, june(3)).standby_time, hm(7, 0));
    }

    #[tokio::test]
    async fn test_expansion_default_horizon_uses_clock() {
        let f = fixture();
        let r = route(&f.store, "R1");
        let s = schedule(&f.store, &r, hm(8, 0), hm(9, 0), None);
        f.clock.set(Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap());

        let report = f.planner.expand_schedules(s.id, None, None).await.unwrap();

        assert_eq!(report.horizon_start, june(10));
        assert_eq!(report.horizon_end, NaiveDate::from_ymd_opt(2024, 7, 8).unwrap());
        assert_eq!(report.created, 29);
    }

    #[tokio::test]
    async fn test_default_horizon_past_calendar_end_is_validation_error() {
        let f = fixture();
        let r = route(&f.store, "R1");
        let s = schedule(&f.store, &r, hm(8, 0), hm(9, 0), None);
        let settings = PlannerSettings {
            default_horizon_days: i64::MAX,
            ..PlannerSettings::default()
        };
        let planner = planner_with(&f, settings);

        let err = planner.expand_schedules(s.id, None, None).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(f.store.instances().is_empty());

        // an explicit horizon does not consult the default
        let report = planner.expand_schedules(s.id, Some(june(1)), Some(june(2))).await.unwrap();
        assert_eq!(report.created, 2);
    }

    #[tokio::test]
    async fn test_expansion_rejects_bad_template_before_writing() {
        let f = fixture();
        let r = route(&f.store, "R1");
        let mut s = schedule(&f.store, &r, hm(8, 0), hm(9, 0), None);
        s.end_date = Some(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        f.store.insert_schedule(s.clone());

        let err = f
            .planner
            .expand_schedules(s.id, Some(june(1)), Some(june(7)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(f.store.instances().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_template_expands_to_nothing() {
        let f = fixture();
        let r = route(&f.store, "R1");
        let mut s = schedule(&f.store, &r, hm(8, 0), hm(9, 0), None);
        s.status = ScheduleStatus::Draft;
        f.store.insert_schedule(s.clone());

        let report = f.planner.expand_schedules(s.id, Some(june(1)), Some(june(7))).await.unwrap();
        assert_eq!(report.created, 0);
        assert!(f.store.instances().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_template_is_not_found() {
        let f = fixture();
        let err = f
            .planner
            .expand_schedules(Uuid::new_v4(), Some(june(1)), Some(june(2)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_conflict_scenario_and_rerun_idempotence() {
        let f = fixture();
        let driver = Some(Uuid::new_v4());
        let s_a = schedule(&f.store, &route(&f.store, "A"), hm(8, 0), hm(9, 0), driver);
        let s_b = schedule(&f.store, &route(&f.store, "B"), hm(8, 30), hm(9, 30), driver);
        expand_june_1(&f, &s_a).await;
        expand_june_1(&f, &s_b).await;
        let a = instance_on(&f.store, s_a.id, june(1));
        let b = instance_on(&f.store, s_b.id, june(1));

        let cancel = CancellationToken::new();
        let report = f.planner.run_conflict_check(june(1), &cancel).await.unwrap();

        assert_eq!(report.created, 1);
        let check = &report.checks[0];
        assert_eq!(check.conflict_type, crate::types::ConflictType::DriverOverlap);
        assert_eq!(check.severity, crate::types::Severity::High);
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(check.conflicting_schedules, expected);

        let rerun = f.planner.run_conflict_check(june(1), &cancel).await.unwrap();
        assert_eq!(rerun.created, 0);
        assert_eq!(rerun.unchanged, 1);
        assert_eq!(f.store.conflicts().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_instance_auto_resolves_open_check() {
        let f = fixture();
        let driver = Some(Uuid::new_v4());
        let s_a = schedule(&f.store, &route(&f.store, "A"), hm(8, 0), hm(9, 0), driver);
        let s_b = schedule(&f.store, &route(&f.store, "B"), hm(8, 30), hm(9, 30), driver);
        expand_june_1(&f, &s_a).await;
        expand_june_1(&f, &s_b).await;
        let cancel = CancellationToken::new();
        f.planner.run_conflict_check(june(1), &cancel).await.unwrap();

        let b = instance_on(&f.store, s_b.id, june(1));
        f.store.update_instance(b.id, |i| i.status = InstanceStatus::Cancelled);

        let report = f.planner.run_conflict_check(june(1), &cancel).await.unwrap();
        assert_eq!(report.auto_resolved, 1);
        assert!(report.checks.is_empty());

        let stored = &f.store.conflicts()[0];
        assert_eq!(stored.status, ConflictStatus::Resolved);
        assert_eq!(stored.resolution_notes.as_deref(), Some(AUTO_RESOLVE_NOTE));
        assert!(stored.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_ignored_conflict_is_not_recreated() {
        let f = fixture();
        let driver = Some(Uuid::new_v4());
        let s_a = schedule(&f.store, &route(&f.store, "A"), hm(8, 0), hm(9, 0), driver);
        let s_b = schedule(&f.store, &route(&f.store, "B"), hm(8, 30), hm(9, 30), driver);
        expand_june_1(&f, &s_a).await;
        expand_june_1(&f, &s_b).await;
        let cancel = CancellationToken::new();
        let report = f.planner.run_conflict_check(june(1), &cancel).await.unwrap();

        let ignored = f.planner.ignore_conflict(report.checks[0].id).await.unwrap();
        assert_eq!(ignored.status, ConflictStatus::Ignored);

        let rerun = f.planner.run_conflict_check(june(1), &cancel).await.unwrap();
        assert_eq!(rerun.created, 0);
        assert_eq!(rerun.suppressed_ignored, 1);
        assert_eq!(f.store.conflicts().len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_transitions() {
        let f = fixture();
        let driver = Some(Uuid::new_v4());
        let s_a = schedule(&f.store, &route(&f.store, "A"), hm(8, 0), hm(9, 0), driver);
        let s_b = schedule(&f.store, &route(&f.store, "B"), hm(8, 30), hm(9, 30), driver);
        expand_june_1(&f, &s_a).await;
        expand_june_1(&f, &s_b).await;
        let cancel = CancellationToken::new();
        let report = f.planner.run_conflict_check(june(1), &cancel).await.unwrap();
        let id = report.checks[0].id;

        let resolved = f
            .planner
            .resolve_conflict(id, Some("Swapped driver on B".to_string()))
            .await
            .unwrap();
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(resolved.resolution_notes.as_deref(), Some("Swapped driver on B"));

        let err = f.planner.ignore_conflict(id).await.unwrap_err();
        assert!(matches!(
            err,
            PlannerError::InvalidTransition { from: "resolved", to: "ignored", .. }
        ));
        let stored = f.store.conflicts().into_iter().find(|c| c.id == id).unwrap();
        assert_eq!(stored.status, ConflictStatus::Resolved);
        assert_eq!(stored.resolved_at, resolved.resolved_at);

        let err = f.planner.resolve_conflict(Uuid::new_v4(), None).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_concurrent_run_for_same_date_is_rejected() {
        let f = fixture();
        let _held = f.planner.locks.try_acquire(RunKind::ConflictCheck, june(1)).unwrap();

        let err = f
            .planner
            .run_conflict_check(june(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RUN_IN_PROGRESS");

        // another date is unaffected
        assert!(f.planner.run_conflict_check(june(2), &CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_no_partial_writes() {
        let f = fixture();
        let driver = Some(Uuid::new_v4());
        let s_a = schedule(&f.store, &route(&f.store, "A"), hm(8, 0), hm(9, 0), driver);
        let s_b = schedule(&f.store, &route(&f.store, "B"), hm(8, 30), hm(9, 30), driver);
        expand_june_1(&f, &s_a).await;
        expand_june_1(&f, &s_b).await;

        f.store.fail_commits(true);
        let err = f
            .planner
            .run_conflict_check(june(1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "DATABASE_ERROR");
        assert!(f.store.conflicts().is_empty());
        // token released after failure
        f.store.fail_commits(false);
        assert!(f.planner.run_conflict_check(june(1), &CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let f = fixture();
        let driver = Some(Uuid::new_v4());
        let s_a = schedule(&f.store, &route(&f.store, "A"), hm(8, 0), hm(9, 0), driver);
        let s_b = schedule(&f.store, &route(&f.store, "B"), hm(8, 30), hm(9, 30), driver);
        expand_june_1(&f, &s_a).await;
        expand_june_1(&f, &s_b).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = f.planner.run_conflict_check(june(1), &cancel).await.unwrap_err();

        assert!(matches!(err, PlannerError::Cancelled));
        assert!(f.store.conflicts().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_slow_snapshot_read() {
        let f = fixture();
        let driver = Some(Uuid::new_v4());
        let s_a = schedule(&f.store, &route(&f.store, "A"), hm(8, 0), hm(9, 0), driver);
        let s_b = schedule(&f.store, &route(&f.store, "B"), hm(8, 30), hm(9, 30), driver);
        expand_june_1(&f, &s_a).await;
        expand_june_1(&f, &s_b).await;
        f.store.set_read_delay(Duration::from_secs(30));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            f.planner.run_conflict_check(june(1), &cancel),
        )
        .await
        .expect("run should stop once cancelled");

        assert!(matches!(result, Err(PlannerError::Cancelled)));
        assert!(f.store.conflicts().is_empty());
        assert!(f.planner.locks.try_acquire(RunKind::ConflictCheck, june(1)).is_ok());
    }

    #[tokio::test]
    async fn test_cross_midnight_job_conflicts_with_next_morning() {
        let f = fixture();
        let driver = Some(Uuid::new_v4());
        let night = schedule(&f.store, &route(&f.store, "N"), hm(22, 0), hm(2, 0), driver);
        let early = schedule(&f.store, &route(&f.store, "E"), hm(1, 0), hm(3, 0), driver);
        f.planner.expand_schedules(night.id, Some(june(1)), Some(june(1))).await.unwrap();
        f.planner.expand_schedules(early.id, Some(june(2)), Some(june(2))).await.unwrap();
        let night_job = instance_on(&f.store, night.id, june(1));
        let early_job = instance_on(&f.store, early.id, june(2));
        let cancel = CancellationToken::new();

        let first_day = f.planner.run_conflict_check(june(1), &cancel).await.unwrap();
        assert_eq!(first_day.created, 0);

        let report = f.planner.run_conflict_check(june(2), &cancel).await.unwrap();
        assert_eq!(report.created, 1);
        let check = &report.checks[0];
        assert_eq!(check.check_date, june(2));
        assert_eq!(check.severity, crate::types::Severity::High);
        let mut expected = vec![night_job.id, early_job.id];
        expected.sort();
        assert_eq!(check.conflicting_schedules, expected);
    }

    async fn chained_pair(f: &Fixture) -> (Route, Route) {
        let driver = Some(Uuid::new_v4());
        let r_a = route(&f.store, "A");
        let r_b = route(&f.store, "B");
        let s_a = schedule(&f.store, &r_a, hm(8, 0), hm(9, 0), driver);
        let s_b = schedule(&f.store, &r_b, hm(10, 0), hm(11, 0), driver);
        expand_june_1(f, &s_a).await;
        expand_june_1(f, &s_b).await;
        (r_a, r_b)
    }

    #[tokio::test]
    async fn test_suggestion_scenario_and_pending_refresh() {
        let f = fixture();
        let (r_a, r_b) = chained_pair(&f).await;
        let cancel = CancellationToken::new();

        let report = f.planner.run_suggestion_generation(june(1), &cancel).await.unwrap();
        assert_eq!(report.created, 1);
        let suggestion = &report.suggestions[0];
        assert_eq!(suggestion.from_route_id, r_a.id);
        assert_eq!(suggestion.to_route_id, r_b.id);
        assert_eq!(suggestion.gap_minutes, 60);
        assert!((suggestion.efficiency_score - 0.5833).abs() < 1e-3);
        assert_eq!(suggestion.status, SuggestionStatus::Pending);

        let rerun = f.planner.run_suggestion_generation(june(1), &cancel).await.unwrap();
        assert_eq!(rerun.created, 0);
        assert_eq!(rerun.refreshed, 1);
        assert_eq!(rerun.suggestions[0].id, suggestion.id);
        assert_eq!(f.store.suggestions().len(), 1);
        // second run hit the cache
        assert_eq!(f.provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_terminal_suggestion_is_not_resurrected() {
        let f = fixture();
        chained_pair(&f).await;
        let cancel = CancellationToken::new();
        let report = f.planner.run_suggestion_generation(june(1), &cancel).await.unwrap();
        let id = report.suggestions[0].id;

        let rejected = f.planner.reject_suggestion(id).await.unwrap();
        assert_eq!(rejected.status, SuggestionStatus::Rejected);

        let rerun = f.planner.run_suggestion_generation(june(1), &cancel).await.unwrap();
        assert_eq!(rerun.created, 0);
        assert_eq!(rerun.skipped_terminal, 1);
        let stored = f.store.suggestions();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, SuggestionStatus::Rejected);

        let err = f.planner.accept_suggestion(id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn test_routing_outage_reports_skipped_pairs() {
        let f = fixture();
        chained_pair(&f).await;
        f.provider.set_failing(true);

        let report = f
            .planner
            .run_suggestion_generation(june(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.skipped_pairs, 1);
        assert_eq!(report.created, 0);
        assert!(f.store.suggestions().is_empty());
    }

    #[tokio::test]
    async fn test_daily_planning_runs_both_engines() {
        let f = fixture();
        chained_pair(&f).await;
        let driver = Some(Uuid::new_v4());
        let s_c = schedule(&f.store, &route(&f.store, "C"), hm(13, 0), hm(14, 0), driver);
        let s_d = schedule(&f.store, &route(&f.store, "D"), hm(13, 45), hm(14, 30), driver);
        expand_june_1(&f, &s_c).await;
        expand_june_1(&f, &s_d).await;

        let report = f
            .planner
            .run_daily_planning(june(1), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_complete());
        let conflicts = report.conflicts.report().unwrap();
        assert_eq!(conflicts.created, 1);
        assert_eq!(conflicts.checks[0].severity, crate::types::Severity::Medium);
        assert_eq!(report.suggestions.report().unwrap().created, 1);
        assert!(f.planner.locks.try_acquire(RunKind::ConflictCheck, june(1)).is_ok());
    }

    #[tokio::test]
    async fn test_daily_planning_reports_committed_pass_beside_failed_one() {
        let f = fixture();
        chained_pair(&f).await;
        let driver = Some(Uuid::new_v4());
        let s_c = schedule(&f.store, &route(&f.store, "C"), hm(13, 0), hm(14, 0), driver);
        let s_d = schedule(&f.store, &route(&f.store, "D"), hm(13, 45), hm(14, 30), driver);
        expand_june_1(&f, &s_c).await;
        expand_june_1(&f, &s_d).await;
        f.store.fail_distance_upserts(true);

        let report = f
            .planner
            .run_daily_planning(june(1), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.conflicts.report().unwrap().created, 1);
        assert_eq!(f.store.conflicts().len(), 1);
        match &report.suggestions {
            PassOutcome::Failed { code, .. } => assert_eq!(code, "DATABASE_ERROR"),
            other => panic!("expected failed suggestion pass, got {:?}", other),
        }
        assert!(f.store.suggestions().is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["conflicts"]["status"], "completed");
        assert_eq!(json["suggestions"]["status"], "failed");
    }

    #[tokio::test]
    async fn test_daily_planning_fails_when_no_pass_commits() {
        let f = fixture();
        chained_pair(&f).await;
        let driver = Some(Uuid::new_v4());
        let s_c = schedule(&f.store, &route(&f.store, "C"), hm(13, 0), hm(14, 0), driver);
        let s_d = schedule(&f.store, &route(&f.store, "D"), hm(13, 45), hm(14, 30), driver);
        expand_june_1(&f, &s_c).await;
        expand_june_1(&f, &s_d).await;
        f.store.fail_commits(true);

        let err = f
            .planner
            .run_daily_planning(june(1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "DATABASE_ERROR");
        assert!(f.store.conflicts().is_empty());
        assert!(f.store.suggestions().is_empty());
    }

    #[tokio::test]
    async fn test_listing_filters_by_status_and_orders_by_score() {
        let f = fixture();
        chained_pair(&f).await;
        let cancel = CancellationToken::new();
        f.planner.run_suggestion_generation(june(1), &cancel).await.unwrap();

        let pending = f
            .planner
            .list_suggestions(june(1), Some(SuggestionStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        let accepted = f
            .planner
            .list_suggestions(june(1), Some(SuggestionStatus::Accepted))
            .await
            .unwrap();
        assert!(accepted.is_empty());
        assert!(f.planner.list_conflicts(june(1), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_uses_injected_clock() {
        let f = fixture();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        f.store.insert_distance(RouteDistanceCacheEntry {
            from_route_id: a,
            to_route_id: b,
            distance_km: 1.0,
            travel_time_minutes: 1.0,
            traffic_factor: 1.0,
            last_updated: f.clock.now(),
        });

        assert_eq!(f.planner.sweep_expired_cache_entries().await.unwrap(), 0);
        f.clock.advance(chrono::Duration::days(31));
        assert_eq!(f.planner.sweep_expired_cache_entries().await.unwrap(), 1);
    }
}
