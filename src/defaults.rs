//! Engine tunables used when the environment does not override them

/// Gaps longer than this are not worth chaining
pub const DEFAULT_MAX_IDLE_GAP_MINUTES: i64 = 240;

/// Shorter gaps leave no turnaround time and are not suggested
pub const DEFAULT_MIN_GAP_MINUTES: i64 = 10;

pub const DEFAULT_COST_PER_KM: f64 = 12.0;

pub const DEFAULT_IDLE_COST_PER_MINUTE: f64 = 1.5;

/// Expansion horizon when a request omits one
pub const DEFAULT_HORIZON_DAYS: i64 = 28;

/// Longest horizon a single expansion may cover
pub const MAX_HORIZON_DAYS: i64 = 731;

pub const DEFAULT_ROUTING_TIMEOUT_SECS: u64 = 10;

/// Six hours
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 21_600;

/// Distance lookups issued in parallel during one suggestion pass
pub const ROUTE_LOOKUP_CONCURRENCY: usize = 8;
