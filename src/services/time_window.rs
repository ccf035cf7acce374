//! Time windows for jobs that may cross midnight.
//!
//! A job is described by a nominal schedule date plus a standby and a
//! departure time of day. `is_cross_day` is the one place that decides
//! whether the departure lands on the next calendar date. The expander
//! anchors dates through `resolve_cross_day`; the conflict detector and the
//! suggestion engine build their `TimeWindow`s from the same rule.

use std::cmp::Ordering;

use chrono::{Datelike, Days, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;

use crate::error::{PlannerError, PlannerResult};

pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Minutes since midnight (seconds are truncated)
pub fn time_to_minutes(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

/// True when the departure time of day is earlier than the standby time of day
pub fn is_cross_day(standby: NaiveTime, departure: NaiveTime) -> bool {
    time_to_minutes(departure) < time_to_minutes(standby)
}

/// True when a job scheduled on `schedule_date` is still running on `date`
pub fn spills_into(
    schedule_date: NaiveDate,
    standby: NaiveTime,
    departure: NaiveTime,
    date: NaiveDate,
) -> bool {
    is_cross_day(standby, departure) && schedule_date.succ_opt() == Some(date)
}

/// Standby/departure anchored to calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTimes {
    pub standby_date: NaiveDate,
    pub standby_time: NaiveTime,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub crosses_midnight: bool,
}

/// Anchor a standby/departure pair to the nominal `date`.
///
/// Standby always lands on `date`. Departure lands on the following date when
/// it is earlier in the day than standby, otherwise on `date` as well. A
/// cross-day job on the last representable date has no departure date and is
/// rejected.
pub fn resolve_cross_day(
    date: NaiveDate,
    standby: NaiveTime,
    departure: NaiveTime,
) -> PlannerResult<ResolvedTimes> {
    let crosses_midnight = is_cross_day(standby, departure);
    let departure_date = if crosses_midnight {
        date.checked_add_days(Days::new(1)).ok_or_else(|| {
            PlannerError::Validation(format!(
                "departure after {} is out of the supported date range",
                date
            ))
        })?
    } else {
        date
    };

    Ok(ResolvedTimes {
        standby_date: date,
        standby_time: standby,
        departure_date,
        departure_time: departure,
        crosses_midnight,
    })
}

/// Half-open interval `[standby, departure)` of a job on the absolute timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub date: NaiveDate,
    pub start_minute: u32,
    pub end_minute: u32,
    pub crosses_midnight: bool,
}

impl TimeWindow {
    /// Build the window of a job after cross-day resolution
    pub fn for_job(date: NaiveDate, standby: NaiveTime, departure: NaiveTime) -> Self {
        Self {
            date,
            start_minute: time_to_minutes(standby),
            end_minute: time_to_minutes(departure),
            crosses_midnight: is_cross_day(standby, departure),
        }
    }

    fn day_offset(&self) -> i64 {
        i64::from(self.date.num_days_from_ce()) * MINUTES_PER_DAY
    }

    /// Absolute start, in minutes on a continuous timeline
    pub fn start_abs(&self) -> i64 {
        self.day_offset() + i64::from(self.start_minute)
    }

    /// Absolute end, in minutes on a continuous timeline
    pub fn end_abs(&self) -> i64 {
        let next_day = if self.crosses_midnight { MINUTES_PER_DAY } else { 0 };
        self.day_offset() + i64::from(self.end_minute) + next_day
    }

    pub fn duration_minutes(&self) -> i64 {
        self.end_abs() - self.start_abs()
    }

    /// Length of the intersection; touching windows share zero minutes
    pub fn overlap_minutes(&self, other: &TimeWindow) -> i64 {
        let start = self.start_abs().max(other.start_abs());
        let end = self.end_abs().min(other.end_abs());
        (end - start).max(0)
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.overlap_minutes(other) > 0
    }

    /// Minutes from the end of `self` to the start of `next` (negative when `next` starts earlier)
    pub fn gap_until(&self, next: &TimeWindow) -> i64 {
        next.start_abs() - self.end_abs()
    }
}

impl PartialOrd for TimeWindow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeWindow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start_abs()
            .cmp(&other.start_abs())
            .then_with(|| self.end_abs().cmp(&other.end_abs()))
    }
}
