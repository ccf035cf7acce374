//! Conflict detector.
//!
//! Finds drivers and vehicles that are double-booked on a date. Instances are
//! grouped per resource, each group is swept in start order, and overlapping
//! windows are merged into clusters with a union-find so that three or more
//! mutually overlapping jobs produce one conflict rather than every pair.

use std::collections::HashMap;

use chrono::NaiveDate;
use union_find::{QuickUnionUf, UnionBySize, UnionFind};
use uuid::Uuid;

use crate::services::time_window::{spills_into, TimeWindow};
use crate::types::{ConflictDraft, ConflictType, Occurrence, Severity};

/// Overlap share of the shorter window at or above which a conflict is `High`
pub const HIGH_SEVERITY_OVERLAP_RATIO: f64 = 0.5;

/// Severity of a hard double-booking between two windows
pub fn severity_for(a: &TimeWindow, b: &TimeWindow) -> Option<Severity> {
    let overlap = a.overlap_minutes(b);
    if overlap <= 0 {
        return None;
    }
    let shorter = a.duration_minutes().min(b.duration_minutes());
    if overlap as f64 >= shorter as f64 * HIGH_SEVERITY_OVERLAP_RATIO {
        Some(Severity::High)
    } else {
        Some(Severity::Medium)
    }
}

/// A set of instances sharing one resource whose windows overlap transitively
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub instance_ids: Vec<Uuid>,
    pub severity: Severity,
}

/// Sweep the windows in start order and union every overlapping pair.
///
/// The active set only keeps windows that end after the current start, so the
/// work per window is bounded by how many jobs are running at that moment.
pub fn find_clusters(jobs: &[(Uuid, TimeWindow)]) -> Vec<Cluster> {
    if jobs.len() < 2 {
        return vec![];
    }

    let mut order: Vec<usize> = (0..jobs.len()).collect();
    order.sort_by(|&a, &b| jobs[a].1.cmp(&jobs[b].1).then_with(|| jobs[a].0.cmp(&jobs[b].0)));

    let mut uf = QuickUnionUf::<UnionBySize>::new(jobs.len());
    let mut pair_severity: Vec<(usize, Severity)> = Vec::new();
    let mut active: Vec<usize> = Vec::new();

    for &current in &order {
        let window = &jobs[current].1;
        active.retain(|&other| jobs[other].1.end_abs() > window.start_abs());

        for &other in &active {
            if let Some(severity) = severity_for(&jobs[other].1, window) {
                uf.union(other, current);
                pair_severity.push((current, severity));
            }
        }

        if window.duration_minutes() > 0 {
            active.push(current);
        }
    }

    if pair_severity.is_empty() {
        return vec![];
    }

    let mut severity_by_root: HashMap<usize, Severity> = HashMap::new();
    for (member, severity) in pair_severity {
        let root = uf.find(member);
        let entry = severity_by_root.entry(root).or_insert(severity);
        *entry = (*entry).max(severity);
    }

    let mut members_by_root: HashMap<usize, Vec<Uuid>> = HashMap::new();
    for (idx, (id, _)) in jobs.iter().enumerate() {
        let root = uf.find(idx);
        if severity_by_root.contains_key(&root) {
            members_by_root.entry(root).or_default().push(*id);
        }
    }

    let mut clusters: Vec<Cluster> = members_by_root
        .into_iter()
        .map(|(root, mut ids)| {
            ids.sort();
            ids.dedup();
            Cluster {
                instance_ids: ids,
                severity: severity_by_root[&root],
            }
        })
        .filter(|c| c.instance_ids.len() >= 2)
        .collect();

    clusters.sort_by(|a, b| a.instance_ids.cmp(&b.instance_ids));
    clusters
}

/// Detect double-bookings among the active occurrences of `date`.
///
/// Cross-day jobs of the previous date still running on `date` take part,
/// but a cluster is reported for `date` only when it holds at least one job
/// scheduled on `date`; clusters entirely on the previous date belong to
/// that date's run.
///
/// Instances without a driver are not part of the driver pass, and the same
/// for vehicles; a fully unassigned instance is never a conflict subject. An
/// instance double-booked on both axes yields one draft per axis.
pub fn detect_conflicts(date: NaiveDate, occurrences: &[Occurrence]) -> Vec<ConflictDraft> {
    let active: Vec<&Occurrence> = occurrences
        .iter()
        .filter(|o| o.is_active())
        .filter(|o| {
            o.schedule_date == date
                || spills_into(o.schedule_date, o.standby_time, o.departure_time, date)
        })
        .collect();

    let mut drafts = Vec::new();
    drafts.extend(detect_on_axis(date, &active, ConflictType::DriverOverlap, |o| o.driver_id));
    drafts.extend(detect_on_axis(date, &active, ConflictType::VehicleOverlap, |o| o.vehicle_id));
    drafts
}

fn detect_on_axis<F>(
    date: NaiveDate,
    active: &[&Occurrence],
    conflict_type: ConflictType,
    resource_of: F,
) -> Vec<ConflictDraft>
where
    F: Fn(&Occurrence) -> Option<Uuid>,
{
    let mut groups: HashMap<Uuid, Vec<(Uuid, TimeWindow)>> = HashMap::new();
    for occ in active {
        if let Some(resource) = resource_of(occ) {
            let window =
                TimeWindow::for_job(occ.schedule_date, occ.standby_time, occ.departure_time);
            groups.entry(resource).or_default().push((occ.instance_id, window));
        }
    }

    let mut resources: Vec<Uuid> = groups.keys().copied().collect();
    resources.sort();

    let mut drafts = Vec::new();
    for resource in resources {
        let jobs = &groups[&resource];
        for cluster in find_clusters(jobs) {
            let touches_date = jobs
                .iter()
                .any(|(id, window)| window.date == date && cluster.instance_ids.contains(id));
            if !touches_date {
                continue;
            }
            let (driver_id, vehicle_id) = match conflict_type {
                ConflictType::DriverOverlap => (Some(resource), None),
                ConflictType::VehicleOverlap => (None, Some(resource)),
            };
            drafts.push(ConflictDraft {
                check_date: date,
                driver_id,
                vehicle_id,
                instance_ids: cluster.instance_ids,
                conflict_type,
                severity: cluster.severity,
            });
        }
    }
    drafts
}
