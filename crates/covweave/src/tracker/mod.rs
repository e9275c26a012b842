//! Runtime Tracker
//!
//! One [`ModuleTracker`] lives per instrumented module instance. Probes call
//! [`ModuleTracker::hit`]; the first hit moves the tracker from
//! `Uninitialized` to `Active` and registers its unload hook. Unload moves it
//! to `Flushed` exactly once, publishing a hit-file.
//!
//! [`ModuleTracker::flush`] is the single place where errors are
//! deliberately discarded: a failed flush is logged and reported as a
//! [`FlushOutcome`], never propagated into the host.

mod hitfile;
mod table;

pub use hitfile::{
    hit_file_name, hit_file_pattern, HitFile, HIT_FILE_EXTENSION, HIT_FILE_MAGIC,
    HIT_FILE_VERSION,
};
pub use table::HitTable;

use crate::config::RunSettings;
use crate::log::{CoverageLogger, NullLogger};
use crate::map::ModuleMap;
use crate::model::PointId;
use crate::registry::TrackerRegistry;
use crate::result::{CovError, CovResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

static NEXT_INSTANCE: AtomicU32 = AtomicU32::new(0);

/// Lifecycle state of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Created, no probe has fired yet
    Uninitialized,
    /// Counting hits, unload hook registered
    Active,
    /// Hit-file published (or flush attempted); further flushes are no-ops
    Flushed,
}

impl TrackerState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Active,
            _ => Self::Flushed,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Active => 1,
            Self::Flushed => 2,
        }
    }
}

/// Result of a flush request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Hit-file published at this path
    Written(PathBuf),
    /// An earlier flush already ran
    AlreadyFlushed,
    /// Collection is disabled for this run
    Disabled,
    /// Flush failed; the error was logged and swallowed
    Failed(String),
}

impl FlushOutcome {
    /// Whether a hit-file was written by this call
    #[must_use]
    pub const fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Hit counter and unload hook for one instrumented module instance
pub struct ModuleTracker {
    module: String,
    key: String,
    fingerprint: String,
    settings: RunSettings,
    instance: u32,
    table: HitTable,
    state: AtomicU8,
    registry: Option<Arc<TrackerRegistry>>,
    logger: Arc<dyn CoverageLogger>,
    me: Weak<ModuleTracker>,
}

impl std::fmt::Debug for ModuleTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleTracker")
            .field("module", &self.module)
            .field("key", &self.key)
            .field("instance", &self.instance)
            .field("state", &self.state())
            .field("points_hit", &self.table.len())
            .finish()
    }
}

impl ModuleTracker {
    /// Tracker for a module described by `map`, not attached to any registry
    #[must_use]
    pub fn new(map: &ModuleMap, settings: RunSettings) -> Arc<Self> {
        Self::create(map, settings, None, Arc::new(NullLogger))
    }

    /// Tracker that registers itself with `registry` on its first hit
    #[must_use]
    pub fn attached(
        map: &ModuleMap,
        settings: RunSettings,
        registry: Arc<TrackerRegistry>,
        logger: Arc<dyn CoverageLogger>,
    ) -> Arc<Self> {
        Self::create(map, settings, Some(registry), logger)
    }

    /// Tracker with an optional registry and an explicit logger
    #[must_use]
    pub fn create(
        map: &ModuleMap,
        settings: RunSettings,
        registry: Option<Arc<TrackerRegistry>>,
        logger: Arc<dyn CoverageLogger>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            module: map.module.clone(),
            key: map.tracker_key.clone(),
            fingerprint: map.fingerprint.clone(),
            settings,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            table: HitTable::new(),
            state: AtomicU8::new(TrackerState::Uninitialized.as_u8()),
            registry,
            logger,
            me: me.clone(),
        })
    }

    /// Module identifier
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Registry key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> TrackerState {
        TrackerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Current count of a point
    #[must_use]
    pub fn count(&self, point: PointId) -> u64 {
        self.table.get(point)
    }

    /// Record one execution of `point`
    #[inline]
    pub fn hit(&self, point: PointId) {
        if self.state.load(Ordering::Relaxed) == TrackerState::Uninitialized.as_u8() {
            self.activate();
        }
        self.table.increment(point);
    }

    fn activate(&self) {
        let won = self
            .state
            .compare_exchange(
                TrackerState::Uninitialized.as_u8(),
                TrackerState::Active.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !won {
            return;
        }
        if let (Some(registry), Some(me)) = (&self.registry, self.me.upgrade()) {
            registry.register(me);
        }
        self.logger
            .verbose(&format!("tracker for {} active", self.module));
    }

    /// Handle that unloads this tracker, usable after the caller drops its `Arc`
    #[must_use]
    pub fn unload_handle(&self) -> UnloadHandle {
        UnloadHandle {
            tracker: self.me.clone(),
        }
    }

    /// Path this instance publishes its hit-file to
    #[must_use]
    pub fn hit_file_path(&self) -> PathBuf {
        self.settings.hits_dir.join(hit_file_name(
            &self.module,
            &self.settings.run_id,
            std::process::id(),
            self.instance,
        ))
    }

    /// Publish the hit-file once; later calls are no-ops
    ///
    /// Never fails and never panics past this boundary: any error is logged and
    /// returned as [`FlushOutcome::Failed`].
    pub fn flush(&self) -> FlushOutcome {
        let previous = self
            .state
            .swap(TrackerState::Flushed.as_u8(), Ordering::AcqRel);
        if previous == TrackerState::Flushed.as_u8() {
            return FlushOutcome::AlreadyFlushed;
        }
        if !self.settings.enabled {
            return FlushOutcome::Disabled;
        }
        match catch_unwind(AssertUnwindSafe(|| self.write_hits())) {
            Ok(Ok(path)) => {
                self.logger.verbose(&format!(
                    "hits for {} written to {}",
                    self.module,
                    path.display()
                ));
                FlushOutcome::Written(path)
            }
            Ok(Err(error)) => {
                self.logger.error_cause(&error);
                FlushOutcome::Failed(error.to_string())
            }
            Err(_) => {
                let message = format!("flush of {} panicked", self.module);
                self.logger.error(&message);
                FlushOutcome::Failed(message)
            }
        }
    }

    /// Move to `Flushed` without publishing; returns the state it left
    pub fn discard(&self) -> TrackerState {
        TrackerState::from_u8(
            self.state
                .swap(TrackerState::Flushed.as_u8(), Ordering::AcqRel),
        )
    }

    fn write_hits(&self) -> CovResult<PathBuf> {
        let path = self.hit_file_path();
        let file = HitFile::new(
            &self.module,
            &self.settings.run_id,
            &self.fingerprint,
            self.table.take(),
        );
        file.write(&path).map_err(|e| CovError::Flush {
            module: self.module.clone(),
            message: e.to_string(),
        })?;
        Ok(path)
    }
}

impl Drop for ModuleTracker {
    fn drop(&mut self) {
        if self.state() == TrackerState::Active {
            let _ = self.flush();
        }
    }
}

/// Typed unload capability for one tracker
#[derive(Debug, Clone)]
pub struct UnloadHandle {
    tracker: Weak<ModuleTracker>,
}

impl UnloadHandle {
    /// Flush the tracker if it is still alive
    pub fn unload(&self) -> Option<FlushOutcome> {
        self.tracker.upgrade().map(|t| t.flush())
    }
}
