//! Coverage Session
//!
//! Drives a whole run from one [`CoverageConfig`]: instrument a set of
//! module files and persist the map, then later collect the hit-files of a
//! run into a [`CoverageResult`] and a threshold verdict.

use crate::aggregate::{evaluate, Aggregator, CoverageResult, ThresholdVerdict};
use crate::config::CoverageConfig;
use crate::log::{CoverageLogger, NullLogger};
use crate::map::InstrumentationMap;
use crate::merge::{discover, HitMerger};
use crate::rewrite::{Instrument, LoggingInstrumenter, ModuleInstrumenter};
use crate::result::{CovError, CovResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What an instrumentation pass produced
#[derive(Debug, Clone)]
pub struct InstrumentReport {
    /// Map of every instrumented module, already saved
    pub map: InstrumentationMap,
    /// Rewritten module files
    pub written: Vec<PathBuf>,
    /// Module files left alone, with the reason
    pub refused: Vec<(PathBuf, String)>,
}

/// What a collection pass produced
#[derive(Debug, Clone)]
pub struct CollectReport {
    /// Aggregated coverage
    pub result: CoverageResult,
    /// Threshold verdict over `result`
    pub verdict: ThresholdVerdict,
    /// Hit-files merged
    pub hit_files: usize,
}

/// One coverage run
pub struct CoverageSession {
    config: CoverageConfig,
    logger: Arc<dyn CoverageLogger>,
}

impl std::fmt::Debug for CoverageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CoverageSession {
    /// Session over `config`, logging nowhere
    #[must_use]
    pub fn new(config: CoverageConfig) -> Self {
        Self {
            config,
            logger: Arc::new(NullLogger),
        }
    }

    /// Report progress to `logger`
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn CoverageLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &CoverageConfig {
        &self.config
    }

    fn destination(&self, source: &Path) -> PathBuf {
        match (&self.config.output_dir, source.file_name()) {
            (Some(dir), Some(name)) => dir.join(name),
            _ => source.to_path_buf(),
        }
    }

    /// Instrument every module file in `paths` and save the map
    ///
    /// A module that fails to load, is refused, cannot be written, or repeats
    /// a module already instrumented in this pass is skipped; the pass fails
    /// only when no module at all could be instrumented.
    pub fn instrument_paths<P: AsRef<Path>>(&self, paths: &[P]) -> CovResult<InstrumentReport> {
        let mut map = InstrumentationMap::new();
        let mut written = Vec::new();
        let mut refused = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let instrumenter = LoggingInstrumenter::new(
                ModuleInstrumenter::from_path(path, &self.config.exclusions)?
                    .with_logger(Arc::clone(&self.logger)),
                path.display().to_string(),
                Arc::clone(&self.logger),
            );
            let outcome = instrumenter
                .can_instrument()
                .and_then(|()| instrumenter.instrument());
            let done = match outcome {
                Ok(done) => done,
                Err(e) if e.is_isolated() => {
                    refused.push((path.to_path_buf(), e.to_string()));
                    continue;
                }
                Err(e) => return Err(e),
            };
            if map.module(&done.map.module).is_some() {
                let reason = format!(
                    "module {} was already instrumented from another file",
                    done.map.module
                );
                self.logger.warning(&format!("{}: {reason}", path.display()));
                refused.push((path.to_path_buf(), reason));
                continue;
            }
            let target = self.destination(path);
            if let Err(e) = done.module.save(&target) {
                self.logger.error_cause(&e);
                refused.push((path.to_path_buf(), e.to_string()));
                continue;
            }
            map.insert(done.map);
            written.push(target);
        }

        if map.modules.is_empty() {
            return Err(CovError::NoModulesInstrumented {
                attempted: paths.len(),
            });
        }
        map.save(&self.config.map_path)?;
        self.logger.info(
            &format!(
                "instrumentation map with {} points in {} modules written to {}",
                map.point_count(),
                map.modules.len(),
                self.config.map_path.display()
            ),
            true,
        );
        Ok(InstrumentReport {
            map,
            written,
            refused,
        })
    }

    /// Merge the hit-files of `run_id` (or of every run) and evaluate thresholds
    pub fn collect(&self, run_id: Option<&str>) -> CovResult<CollectReport> {
        let map = InstrumentationMap::load(&self.config.map_path)?;
        let files = discover(&self.config.hits_dir, run_id)?;
        if files.is_empty() {
            self.logger.warning(&format!(
                "no hit-files found in {}",
                self.config.hits_dir.display()
            ));
        }
        let hits = HitMerger::new(&map)
            .with_logger(self.logger.as_ref())
            .merge_files(&files)?;
        let result = Aggregator::with_exclusions(&self.config.exclusions)?.aggregate(&map, &hits);
        let verdict = evaluate(&result, &self.config.thresholds);
        for failure in verdict.failures() {
            self.logger.warning(&format!(
                "threshold {} not met: {:.2}% (modules below: {})",
                failure.rule,
                failure.actual,
                failure.offending.join(", ")
            ));
        }
        Ok(CollectReport {
            result,
            verdict,
            hit_files: files.len(),
        })
    }
}
