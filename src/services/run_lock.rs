//! Per-date run tokens
//!
//! At most one conflict-detection run and one suggestion-generation run may
//! be in flight for a given date. A run that cannot take its token is
//! rejected immediately; nothing is queued. The token is released when the
//! returned `RunGuard` is dropped.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::error::{PlannerError, PlannerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    ConflictCheck,
    SuggestionGeneration,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::ConflictCheck => f.write_str("conflict check"),
            RunKind::SuggestionGeneration => f.write_str("suggestion generation"),
        }
    }
}

/// RAII guard holding a run token; released on drop
pub struct RunGuard {
    key: (RunKind, NaiveDate),
    registry: RunLocks,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.held.lock().remove(&self.key);
    }
}

/// Thread-safe registry of held run tokens
#[derive(Clone, Default)]
pub struct RunLocks {
    held: Arc<Mutex<HashSet<(RunKind, NaiveDate)>>>,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the token for `(kind, date)` or fail with `ConcurrentRun`
    pub fn try_acquire(&self, kind: RunKind, date: NaiveDate) -> PlannerResult<RunGuard> {
        let key = (kind, date);
        if !self.held.lock().insert(key) {
            return Err(PlannerError::ConcurrentRun { kind, date });
        }
        Ok(RunGuard {
            key,
            registry: self.clone(),
        })
    }

    #[cfg(test)]
    fn is_held(&self, kind: RunKind, date: NaiveDate) -> bool {
        self.held.lock().contains(&(kind, date))
    }
}
