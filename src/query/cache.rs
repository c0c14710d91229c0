//! Per-instance memoization of generated text, executed result and total
//! record count.
//!
//! The state only ever moves `Configured -> TextCached -> Executed`. A
//! mutation of the settings resets it to `Configured`; [`QueryCache::reset`]
//! drops the result and total but keeps the text.

use crate::data::DataSet;
use crate::query::parameters::QueryParameters;
use std::sync::{Arc, Mutex, MutexGuard};

/// Derived state of a query instance.
#[derive(Debug, Clone, Default)]
pub enum CacheState {
    /// Nothing generated since the last mutation
    #[default]
    Configured,
    /// Text generated; the total may be known from a count round-trip
    TextCached {
        parameters: Arc<QueryParameters>,
        total: Option<u64>,
    },
    /// Executed; the total may be known from the source or a count
    Executed {
        parameters: Arc<QueryParameters>,
        result: Arc<DataSet>,
        total: Option<u64>,
    },
}

impl CacheState {
    pub fn parameters(&self) -> Option<&Arc<QueryParameters>> {
        match self {
            CacheState::Configured => None,
            CacheState::TextCached { parameters, .. } | CacheState::Executed { parameters, .. } => {
                Some(parameters)
            }
        }
    }

    pub fn result(&self) -> Option<&Arc<DataSet>> {
        match self {
            CacheState::Executed { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn total(&self) -> Option<u64> {
        match self {
            CacheState::Configured => None,
            CacheState::TextCached { total, .. } | CacheState::Executed { total, .. } => *total,
        }
    }

    /// Record a total; ignored until text exists for it to belong to.
    pub fn set_total(&mut self, value: u64) {
        match self {
            CacheState::Configured => {}
            CacheState::TextCached { total, .. } | CacheState::Executed { total, .. } => {
                *total = Some(value)
            }
        }
    }
}

/// Lock-guarded [`CacheState`].
///
/// Readers hold the lock while they compute, so concurrent readers of an
/// unchanged query generate and execute once.
#[derive(Debug, Default)]
pub struct QueryCache {
    state: Mutex<CacheState>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the state for a check-then-act sequence.
    pub(crate) fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CacheState {
        self.lock().clone()
    }

    /// Drop everything; exclusive access means no reader can interleave.
    pub fn invalidate(&mut self) {
        *self.state.get_mut().unwrap_or_else(|e| e.into_inner()) = CacheState::Configured;
    }

    /// Keep the generated text, forget the result and the total.
    pub fn reset(&self) {
        let mut state = self.lock();
        if let Some(parameters) = state.parameters().cloned() {
            *state = CacheState::TextCached {
                parameters,
                total: None,
            };
        }
    }
}

impl Clone for QueryCache {
    /// A clone starts unexecuted; results are never shared between instances.
    fn clone(&self) -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parameters::QueryKind;

    fn parameters() -> Arc<QueryParameters> {
        Arc::new(QueryParameters::new("SELECT 1", QueryKind::Select))
    }

    #[test]
    fn test_reset_keeps_text() {
        let cache = QueryCache::new();
        *cache.lock() = CacheState::Executed {
            parameters: parameters(),
            result: Arc::new(DataSet::default()),
            total: Some(5),
        };
        cache.reset();
        let state = cache.state();
        assert!(matches!(state, CacheState::TextCached { total: None, .. }));
        assert_eq!(state.parameters().unwrap().text(), "SELECT 1");
    }

    #[test]
    fn test_invalidate_clears_everything() {
        let mut cache = QueryCache::new();
        *cache.lock() = CacheState::TextCached {
            parameters: parameters(),
            total: Some(1),
        };
        cache.invalidate();
        assert!(matches!(cache.state(), CacheState::Configured));
    }

    #[test]
    fn test_set_total_requires_text() {
        let mut state = CacheState::Configured;
        state.set_total(3);
        assert_eq!(state.total(), None);

        let mut state = CacheState::TextCached {
            parameters: parameters(),
            total: None,
        };
        state.set_total(3);
        assert_eq!(state.total(), Some(3));
    }

    #[test]
    fn test_reset_on_configured_is_noop() {
        let cache = QueryCache::new();
        cache.reset();
        assert!(matches!(cache.state(), CacheState::Configured));
    }
}
