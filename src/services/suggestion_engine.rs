//! Route-chaining suggestion engine
//!
//! Looks for ordered pairs of jobs on one date that a single resource could
//! serve back to back: A finishes (departs), the resource repositions from
//! A's route destination to B's route origin, then stands by for B.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PlannerSettings;
use crate::error::{PlannerError, PlannerResult};
use crate::services::distance_cache::{DistanceCache, LegRequest};
use crate::services::time_window::TimeWindow;
use crate::types::{Occurrence, RouteLeg, SuggestionDraft, SuggestionKey};

/// Result of one suggestion pass
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionOutcome {
    /// Best draft per `(date, from_route, to_route)`, best first
    pub drafts: Vec<SuggestionDraft>,
    /// Pairs dropped because the routing provider failed or timed out
    pub skipped_pairs: usize,
    /// Pairs dropped because a route has no coordinates for the needed endpoint
    pub missing_endpoints: usize,
}

/// Same driver, same vehicle, or both jobs still fully unassigned
fn can_share_resource(a: &Occurrence, b: &Occurrence) -> bool {
    let same_driver = a.driver_id.is_some() && a.driver_id == b.driver_id;
    let same_vehicle = a.vehicle_id.is_some() && a.vehicle_id == b.vehicle_id;
    same_driver || same_vehicle || (a.is_unassigned() && b.is_unassigned())
}

/// Fraction of the gap left after repositioning, in `[0, 1]`
pub fn efficiency_score(travel_minutes: f64, gap_minutes: i64) -> f64 {
    if gap_minutes <= 0 {
        return if travel_minutes <= 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - travel_minutes / gap_minutes as f64).clamp(0.0, 1.0)
}

/// Avoided empty running plus idle time saved compared to the longest acceptable wait
pub fn cost_savings(leg: &RouteLeg, gap_minutes: i64, settings: &PlannerSettings) -> f64 {
    let idle_saved = (settings.max_idle_gap_minutes - gap_minutes).max(0) as f64;
    settings.cost_per_km * leg.distance_km + settings.idle_cost_per_minute * idle_saved
}

struct Candidate<'a> {
    from: &'a Occurrence,
    to: &'a Occurrence,
    gap_minutes: i64,
    request: LegRequest,
}

/// Score every feasible back-to-back pair of active jobs on `date`.
///
/// Routing failures only drop the affected pair; a storage failure of the
/// distance cache aborts the pass. Cancelling `cancel` drops all in-flight
/// routing calls and returns `Cancelled`.
pub async fn suggest(
    date: NaiveDate,
    occurrences: &[Occurrence],
    cache: &DistanceCache,
    settings: &PlannerSettings,
    cancel: &CancellationToken,
) -> PlannerResult<SuggestionOutcome> {
    let active: Vec<(&Occurrence, TimeWindow)> = occurrences
        .iter()
        .filter(|o| o.is_active() && o.schedule_date == date)
        .map(|o| (o, TimeWindow::for_job(o.schedule_date, o.standby_time, o.departure_time)))
        .collect();

    let mut outcome = SuggestionOutcome::default();
    let mut candidates = Vec::new();

    for (a, a_window) in &active {
        for (b, b_window) in &active {
            if a.instance_id == b.instance_id || !can_share_resource(a, b) {
                continue;
            }

            let gap_minutes = a_window.gap_until(b_window);
            let gap_range = settings.min_gap_minutes..=settings.max_idle_gap_minutes;
            if !gap_range.contains(&gap_minutes) {
                continue;
            }

            let (Some(from_endpoint), Some(to_endpoint)) = (a.destination(), b.origin()) else {
                outcome.missing_endpoints += 1;
                continue;
            };

            candidates.push(Candidate {
                from: *a,
                to: *b,
                gap_minutes,
                request: LegRequest {
                    from_route_id: a.route_id,
                    to_route_id: b.route_id,
                    from_endpoint,
                    to_endpoint,
                },
            });
        }
    }

    debug!("{} candidate pairs for {}", candidates.len(), date);

    let lookups = stream::iter(candidates)
        .map(|candidate| async move {
            let leg = cache.get_or_compute(candidate.request).await;
            (candidate, leg)
        })
        .buffer_unordered(settings.lookup_concurrency.max(1))
        .boxed()
        .collect::<Vec<_>>();

    let results = tokio::select! {
        _ = cancel.cancelled() => return Err(PlannerError::Cancelled),
        results = lookups => results,
    };

    let mut best: HashMap<SuggestionKey, SuggestionDraft> = HashMap::new();

    for (candidate, leg) in results {
        let leg = match leg {
            Ok(leg) => leg,
            Err(PlannerError::RoutingUnavailable(reason)) => {
                warn!(
                    "Skipping pair {} -> {} on {}: {}",
                    candidate.from.instance_id, candidate.to.instance_id, date, reason
                );
                outcome.skipped_pairs += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        if leg.travel_minutes > candidate.gap_minutes as f64 {
            continue;
        }

        let draft = SuggestionDraft {
            from_route_id: candidate.from.route_id,
            to_route_id: candidate.to.route_id,
            from_instance_id: candidate.from.instance_id,
            to_instance_id: candidate.to.instance_id,
            suggestion_date: date,
            gap_minutes: i32::try_from(candidate.gap_minutes).unwrap_or(i32::MAX),
            distance_km: leg.distance_km,
            travel_time_minutes: leg.travel_minutes,
            efficiency_score: efficiency_score(leg.travel_minutes, candidate.gap_minutes),
            cost_savings_estimate: cost_savings(&leg, candidate.gap_minutes, settings),
            priority: candidate.from.priority + candidate.to.priority,
        };

        let key = draft.key();
        let improves = best
            .get(&key)
            .map_or(true, |current| rank(&draft, current) == Ordering::Less);
        if improves {
            best.insert(key, draft);
        }
    }

    let mut drafts: Vec<SuggestionDraft> = best.into_values().collect();
    drafts.sort_by(rank);
    outcome.drafts = drafts;

    Ok(outcome)
}

/// Best first: efficiency, then combined priority, then a stable id order
fn rank(a: &SuggestionDraft, b: &SuggestionDraft) -> Ordering {
    b.efficiency_score
        .total_cmp(&a.efficiency_score)
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.from_instance_id.cmp(&b.from_instance_id))
        .then_with(|| a.to_instance_id.cmp(&b.to_instance_id))
}
