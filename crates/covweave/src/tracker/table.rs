//! Sparse Hit Table
//!
//! Counters are created on the first hit of each point, so excluded or
//! never-reached points cost nothing. Increments of existing counters take a
//! shared lock and an atomic add; only a point's first hit takes the
//! exclusive lock.

use crate::model::PointId;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Concurrent, lazily populated point → count table
#[derive(Debug, Default)]
pub struct HitTable {
    counters: RwLock<HashMap<PointId, AtomicU64>>,
}

impl HitTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one hit of `point`
    #[inline]
    pub fn increment(&self, point: PointId) {
        {
            let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(counter) = counters.get(&point) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        counters
            .entry(point)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current count of `point`
    #[must_use]
    pub fn get(&self, point: PointId) -> u64 {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&point)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Number of points hit at least once since creation
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no point was ever hit
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current counts, leaving them in place
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<PointId, u64> {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(p, c)| (*p, c.load(Ordering::Acquire)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    /// Copy of the current counts, resetting each counter as it is read
    ///
    /// Each counter is swapped to zero atomically: an increment racing with
    /// the swap lands either in the returned snapshot or in the table, never
    /// in both.
    #[must_use]
    pub fn take(&self) -> BTreeMap<PointId, u64> {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(p, c)| (*p, c.swap(0, Ordering::AcqRel)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}
