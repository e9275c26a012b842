//! Tracker Registry
//!
//! Hosts that hold the [`UnloadHandle`](crate::tracker::UnloadHandle) of a
//! tracker should use it directly. Hosts that can only find trackers by name
//! use a registry: every tracker registers under the key recorded in its
//! module's instrumentation map, and the host unloads by key. Looking up an
//! absent key is a no-op, not an error.
//!
//! A single process-lifetime registry is available through
//! [`TrackerRegistry::init`]. Tests that touch it must call
//! [`TrackerRegistry::reset`] between cases.

use crate::tracker::{FlushOutcome, ModuleTracker};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Prefix of every registry key
pub const TRACKER_KEY_PREFIX: &str = "covweave.tracker.";

static GLOBAL: OnceLock<Arc<TrackerRegistry>> = OnceLock::new();

/// Registry key for a module's tracker
#[must_use]
pub fn tracker_key(module: &str) -> String {
    format!("{TRACKER_KEY_PREFIX}{module}")
}

/// Trackers grouped by key; one key may hold several module instances
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    trackers: Mutex<BTreeMap<String, Vec<Arc<ModuleTracker>>>>,
}

impl TrackerRegistry {
    /// Create an empty, standalone registry
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry, created on first use
    pub fn init() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(Self::new))
    }

    /// Drop every tracker held by the process-wide registry without flushing
    pub fn reset() {
        if let Some(global) = GLOBAL.get() {
            global.clear();
        }
    }

    /// Register a tracker under its key
    pub fn register(&self, tracker: Arc<ModuleTracker>) {
        let mut trackers = self.trackers.lock().unwrap_or_else(PoisonError::into_inner);
        trackers
            .entry(tracker.key().to_string())
            .or_default()
            .push(tracker);
    }

    /// Trackers registered under `key`
    #[must_use]
    pub fn lookup(&self, key: &str) -> Vec<Arc<ModuleTracker>> {
        self.trackers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Unload every tracker registered under `key`
    ///
    /// Returns an empty list when nothing is registered under `key`.
    pub fn unload(&self, key: &str) -> Vec<FlushOutcome> {
        let removed = self
            .trackers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .unwrap_or_default();
        removed.iter().map(|t| t.flush()).collect()
    }

    /// Unload every registered tracker
    pub fn unload_all(&self) -> Vec<(String, FlushOutcome)> {
        let drained = std::mem::take(
            &mut *self.trackers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        drained
            .into_iter()
            .flat_map(|(key, trackers)| {
                trackers
                    .into_iter()
                    .map(move |t| (key.clone(), t.flush()))
            })
            .collect()
    }

    /// Number of registered trackers
    #[must_use]
    pub fn len(&self) -> usize {
        self.trackers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self) {
        let drained = std::mem::take(
            &mut *self.trackers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for tracker in drained.into_values().flatten() {
            // Mark as flushed so dropping the last reference does not publish.
            let _ = tracker.discard();
        }
    }
}
