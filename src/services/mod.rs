//! Business logic services

pub mod clock;
pub mod conflict_detector;
pub mod distance_cache;
pub mod geo;
pub mod planner;
pub mod recurrence;
pub mod routing;
pub mod run_lock;
pub mod suggestion_engine;
pub mod time_window;
