//! Database queries

pub mod conflict;
pub mod distance_cache;
pub mod schedule;
pub mod suggestion;
