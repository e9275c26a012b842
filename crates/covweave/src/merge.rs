//! Hit-File Merging
//!
//! Sums hit-files per `(module, point)`. A hit-file that is missing
//! contributes nothing; one that cannot be decoded, or that was written
//! against a different instrumentation map, fails the whole merge.

use crate::log::{CoverageLogger, NullLogger};
use crate::map::InstrumentationMap;
use crate::model::PointId;
use crate::result::{CovError, CovResult};
use crate::tracker::{hit_file_pattern, HitFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Summed counts of every module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedHits {
    modules: BTreeMap<String, BTreeMap<PointId, u64>>,
}

impl MergedHits {
    /// Empty set of counts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` hits of `point` in `module`
    pub fn add(&mut self, module: &str, point: PointId, count: u64) {
        if count == 0 {
            return;
        }
        let slot = self
            .modules
            .entry(module.to_string())
            .or_default()
            .entry(point)
            .or_insert(0);
        *slot = slot.saturating_add(count);
    }

    /// Add every count of a hit-file
    pub fn add_file(&mut self, file: &HitFile) {
        for (point, count) in &file.hits {
            self.add(&file.module, *point, *count);
        }
    }

    /// Sum of `self` and `other`
    #[must_use]
    pub fn merge(mut self, other: &Self) -> Self {
        for (module, points) in &other.modules {
            for (point, count) in points {
                self.add(module, *point, *count);
            }
        }
        self
    }

    /// Count of one point; 0 when never hit
    #[must_use]
    pub fn count(&self, module: &str, point: PointId) -> u64 {
        self.modules
            .get(module)
            .and_then(|points| points.get(&point))
            .copied()
            .unwrap_or(0)
    }

    /// Counts of one module
    #[must_use]
    pub fn module(&self, module: &str) -> Option<&BTreeMap<PointId, u64>> {
        self.modules.get(module)
    }

    /// Modules with at least one hit
    pub fn modules(&self) -> impl Iterator<Item = &str> + '_ {
        self.modules.keys().map(String::as_str)
    }

    /// Sum of every count
    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.modules
            .values()
            .flat_map(BTreeMap::values)
            .fold(0u64, |acc, c| acc.saturating_add(*c))
    }

    /// Whether nothing was hit
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Hit-files in `dir` belonging to `run_id` (any run when `None`), sorted
pub fn discover(dir: &Path, run_id: Option<&str>) -> CovResult<Vec<PathBuf>> {
    let dir_text = dir
        .to_str()
        .ok_or_else(|| CovError::config(format!("hit directory {} is not UTF-8", dir.display())))?;
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(dir_text),
        hit_file_pattern(run_id)
    );
    let paths = glob::glob(&pattern)
        .map_err(|e| CovError::config(format!("invalid hit-file pattern {pattern}: {e}")))?;
    let mut found = Vec::new();
    for entry in paths {
        found.push(entry.map_err(|e| CovError::Io(e.into_error()))?);
    }
    found.sort();
    Ok(found)
}

/// Reads hit-files and checks them against an instrumentation map
pub struct HitMerger<'m> {
    map: &'m InstrumentationMap,
    logger: &'m dyn CoverageLogger,
}

impl std::fmt::Debug for HitMerger<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HitMerger")
            .field("modules", &self.map.modules.len())
            .finish_non_exhaustive()
    }
}

impl<'m> HitMerger<'m> {
    /// Merger validating against `map`
    #[must_use]
    pub fn new(map: &'m InstrumentationMap) -> Self {
        Self {
            map,
            logger: &NullLogger,
        }
    }

    /// Report missing files to `logger`
    #[must_use]
    pub fn with_logger(mut self, logger: &'m dyn CoverageLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Check a decoded hit-file against the map
    pub fn validate(&self, file: &HitFile, path: &Path) -> CovResult<()> {
        let module = self.map.module(&file.module).ok_or_else(|| {
            CovError::corrupt(
                path,
                format!("module {} is not in the instrumentation map", file.module),
            )
        })?;
        if module.fingerprint != file.fingerprint {
            return Err(CovError::corrupt(
                path,
                format!(
                    "written against map {} but the map of {} is {}",
                    short(&file.fingerprint),
                    file.module,
                    short(&module.fingerprint)
                ),
            ));
        }
        if let Some(point) = file.hits.keys().find(|p| module.point(**p).is_none()) {
            return Err(CovError::UnknownPoint {
                module: file.module.clone(),
                point: point.as_u32(),
            });
        }
        Ok(())
    }

    /// Read one hit-file; `None` when it does not exist
    pub fn read(&self, path: &Path) -> CovResult<Option<HitFile>> {
        let Some(file) = HitFile::read(path)? else {
            self.logger
                .warning(&format!("hit-file {} not found, counted as zero", path.display()));
            return Ok(None);
        };
        self.validate(&file, path)?;
        Ok(Some(file))
    }

    /// Merge a list of hit-files
    pub fn merge_files<P: AsRef<Path>>(&self, paths: &[P]) -> CovResult<MergedHits> {
        let mut merged = MergedHits::new();
        for path in paths {
            if let Some(file) = self.read(path.as_ref())? {
                merged.add_file(&file);
            }
        }
        self.logger.verbose(&format!(
            "merged {} hit-files, {} hits",
            paths.len(),
            merged.total_hits()
        ));
        Ok(merged)
    }

    /// Merge every hit-file of a run found in `dir`
    pub fn merge_dir(&self, dir: &Path, run_id: Option<&str>) -> CovResult<MergedHits> {
        let paths = discover(dir, run_id)?;
        if paths.is_empty() {
            self.logger
                .warning(&format!("no hit-files found in {}", dir.display()));
        }
        self.merge_files(&paths)
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
