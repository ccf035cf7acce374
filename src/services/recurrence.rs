//! Recurrence expander.
//!
//! Turns a `RouteSchedule` template into dated draft occurrences inside a
//! caller-supplied horizon, then reconciles the drafts with the instances
//! already stored for the template so re-expansion is idempotent.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::defaults::MAX_HORIZON_DAYS;
use crate::error::{PlannerError, PlannerResult};
use crate::services::time_window::{resolve_cross_day, ResolvedTimes};
use crate::types::{InstanceStatus, RouteSchedule, ScheduleInstance, ScheduleType};

/// One occurrence produced from a template, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftInstance {
    pub route_schedule_id: Uuid,
    pub schedule_date: NaiveDate,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub times: ResolvedTimes,
}

impl DraftInstance {
    pub fn into_instance(self, now: DateTime<Utc>) -> ScheduleInstance {
        ScheduleInstance {
            id: Uuid::new_v4(),
            route_schedule_id: self.route_schedule_id,
            schedule_date: self.schedule_date,
            driver_id: self.driver_id,
            vehicle_id: self.vehicle_id,
            standby_date: self.times.standby_date,
            standby_time: self.times.standby_time,
            departure_date: self.times.departure_date,
            departure_time: self.times.departure_time,
            status: InstanceStatus::Scheduled,
            is_override: false,
            is_deleted: false,
            override_reason: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn matches(&self, instance: &ScheduleInstance) -> bool {
        instance.driver_id == self.driver_id
            && instance.vehicle_id == self.vehicle_id
            && instance.standby_date == self.times.standby_date
            && instance.standby_time == self.times.standby_time
            && instance.departure_date == self.times.departure_date
            && instance.departure_time == self.times.departure_time
    }
}

/// Reject malformed templates before anything is written.
///
/// An empty weekday set is valid: it is how a recurring template is disabled.
pub fn validate_template(template: &RouteSchedule) -> PlannerResult<()> {
    if let Some(end) = template.end_date {
        if end < template.start_date {
            return Err(PlannerError::Validation(format!(
                "schedule {} ends ({}) before it starts ({})",
                template.id, end, template.start_date
            )));
        }
    }

    if let Some(bad) = template.days_of_week.iter().find(|d| !(1..=7).contains(*d)) {
        return Err(PlannerError::Validation(format!(
            "schedule {} has weekday {} outside 1..=7",
            template.id, bad
        )));
    }

    Ok(())
}

pub fn validate_horizon(horizon_start: NaiveDate, horizon_end: NaiveDate) -> PlannerResult<()> {
    if horizon_end < horizon_start {
        return Err(PlannerError::Validation(format!(
            "horizon end {} is before horizon start {}",
            horizon_end, horizon_start
        )));
    }
    if (horizon_end - horizon_start).num_days() > MAX_HORIZON_DAYS {
        return Err(PlannerError::Validation(format!(
            "horizon {}..{} is longer than {} days",
            horizon_start, horizon_end, MAX_HORIZON_DAYS
        )));
    }
    Ok(())
}

/// Expand a template into drafts for every matching date in `[horizon_start, horizon_end]`.
///
/// `Single` templates yield at most one draft, on their start date.
/// `Recurring` templates never run past `horizon_end`, even when open-ended.
pub fn expand(
    template: &RouteSchedule,
    horizon_start: NaiveDate,
    horizon_end: NaiveDate,
) -> PlannerResult<Vec<DraftInstance>> {
    match template.schedule_type {
        ScheduleType::Single => {
            let date = template.start_date;
            if date >= horizon_start && date <= horizon_end {
                Ok(vec![draft_for(template, date)?])
            } else {
                Ok(vec![])
            }
        }
        ScheduleType::Recurring => {
            if template.days_of_week.is_empty() {
                return Ok(vec![]);
            }

            let first = template.start_date.max(horizon_start);
            let last = template
                .end_date
                .map_or(horizon_end, |end| end.min(horizon_end));

            first
                .iter_days()
                .take_while(|d| *d <= last)
                .filter(|d| {
                    let weekday = d.weekday().number_from_monday() as i16;
                    template.days_of_week.contains(&weekday)
                })
                .map(|d| draft_for(template, d))
                .collect()
        }
    }
}

fn draft_for(template: &RouteSchedule, date: NaiveDate) -> PlannerResult<DraftInstance> {
    Ok(DraftInstance {
        route_schedule_id: template.id,
        schedule_date: date,
        driver_id: template.default_driver_id,
        vehicle_id: template.default_vehicle_id,
        times: resolve_cross_day(date, template.standby_time, template.departure_time)?,
    })
}

/// Writes needed to bring stored instances in line with a fresh expansion
#[derive(Debug, Default)]
pub struct ExpansionPlan {
    pub create: Vec<ScheduleInstance>,
    pub refresh: Vec<ScheduleInstance>,
    pub preserved_overrides: usize,
    pub suppressed_deleted: usize,
    pub unchanged: usize,
}

/// Reconcile drafts against the template's existing instances in the horizon.
///
/// - no instance for the date: create one
/// - a non-deleted override: keep it untouched
/// - a soft-deleted instance: do not recreate it
/// - a generated instance still `Scheduled`: refresh it from the template defaults
/// - anything else: leave alone
pub fn plan_expansion(
    drafts: Vec<DraftInstance>,
    existing: &[ScheduleInstance],
    now: DateTime<Utc>,
) -> ExpansionPlan {
    let mut by_date: HashMap<NaiveDate, Vec<&ScheduleInstance>> = HashMap::new();
    for instance in existing {
        by_date.entry(instance.schedule_date).or_default().push(instance);
    }

    let mut plan = ExpansionPlan::default();

    for draft in drafts {
        let rows = by_date.get(&draft.schedule_date).map(Vec::as_slice).unwrap_or(&[]);
        let live: Vec<&ScheduleInstance> = rows.iter().copied().filter(|i| !i.is_deleted).collect();

        if live.is_empty() {
            if rows.is_empty() {
                plan.create.push(draft.into_instance(now));
            } else {
                plan.suppressed_deleted += 1;
            }
            continue;
        }

        if live.iter().any(|i| i.is_override) {
            plan.preserved_overrides += 1;
            continue;
        }

        let current = live[0];
        if current.status == InstanceStatus::Scheduled && !draft.matches(current) {
            let mut refreshed = current.clone();
            refreshed.driver_id = draft.driver_id;
            refreshed.vehicle_id = draft.vehicle_id;
            refreshed.standby_date = draft.times.standby_date;
            refreshed.standby_time = draft.times.standby_time;
            refreshed.departure_date = draft.times.departure_date;
            refreshed.departure_time = draft.times.departure_time;
            refreshed.updated_at = now;
            plan.refresh.push(refreshed);
        } else {
            plan.unchanged += 1;
        }
    }

    plan
}
