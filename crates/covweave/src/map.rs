//! Instrumentation Map
//!
//! The persisted join key between runtime hit-files and the aggregator:
//! for every instrumented module, the ordered point table (point id → source
//! location and owning method), the method table, and the members that were
//! left uninstrumented. The map is written once and read back without the
//! original module.

use crate::fsutil::write_atomic;
use crate::model::{MethodId, PointId, SourceSpan};
use crate::result::{CovError, CovResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// Map format version
pub const MAP_VERSION: u32 = 1;

/// What a point tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointKind {
    /// Execution reached a source statement
    Line,
    /// Execution left a decision site through one edge
    Branch {
        /// Decision site ordinal on its source line
        ordinal: u32,
        /// Edge index at the site; 0 is fall-through
        edge: u32,
        /// Number of edges at the site
        edges: u32,
    },
}

/// One instrumentable point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRecord {
    /// Point id
    pub id: PointId,
    /// Line or branch edge
    #[serde(flatten)]
    pub kind: PointKind,
    /// Source method the point is attributed to
    pub method: MethodId,
    /// Source location
    pub span: SourceSpan,
}

/// One source method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRecord {
    /// Method id
    pub id: MethodId,
    /// Full name of the declaring type
    pub type_name: String,
    /// Readable method name (generated names resolved to their source form)
    pub name: String,
    /// Readable name of the lexically enclosing method, for local functions and lambdas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Source file of the first point
    pub file: String,
    /// First line touched by the method's points
    pub first_line: u32,
    /// Last line touched by the method's points
    pub last_line: u32,
}

impl MethodRecord {
    /// `Type::method` display form
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.type_name, self.name)
    }
}

/// A member the rewriter left untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedMember {
    /// `Type::member`
    pub member: String,
    /// Why it was skipped
    pub reason: String,
}

/// Map of a single module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMap {
    /// Module identifier
    pub module: String,
    /// Registry key the module's tracker is registered under
    pub tracker_key: String,
    /// SHA-256 of the point table, echoed by hit-files
    pub fingerprint: String,
    /// Points ordered by id
    pub points: Vec<PointRecord>,
    /// Methods ordered by id
    pub methods: Vec<MethodRecord>,
    /// Members that were not instrumented
    #[serde(default)]
    pub skipped: Vec<SkippedMember>,
}

impl ModuleMap {
    /// Build a module map and compute its fingerprint
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        points: Vec<PointRecord>,
        methods: Vec<MethodRecord>,
        skipped: Vec<SkippedMember>,
    ) -> Self {
        let module = module.into();
        let fingerprint = fingerprint(&module, &points);
        Self {
            tracker_key: crate::registry::tracker_key(&module),
            module,
            fingerprint,
            points,
            methods,
            skipped,
        }
    }

    /// Look up a point
    #[must_use]
    pub fn point(&self, id: PointId) -> Option<&PointRecord> {
        self.points
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|i| &self.points[i])
    }

    /// Look up a method
    #[must_use]
    pub fn method(&self, id: MethodId) -> Option<&MethodRecord> {
        self.methods.get(id.index()).filter(|m| m.id == id)
    }

    /// Whether the point table still matches the stored fingerprint
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        fingerprint(&self.module, &self.points) == self.fingerprint
    }
}

fn fingerprint(module: &str, points: &[PointRecord]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(module.as_bytes());
    for point in points {
        hasher.update(point.id.as_u32().to_le_bytes());
        hasher.update(point.method.as_u32().to_le_bytes());
        match point.kind {
            PointKind::Line => hasher.update([0u8]),
            PointKind::Branch {
                ordinal,
                edge,
                edges,
            } => {
                hasher.update([1u8]);
                hasher.update(ordinal.to_le_bytes());
                hasher.update(edge.to_le_bytes());
                hasher.update(edges.to_le_bytes());
            }
        }
        hasher.update(point.span.file.as_bytes());
        hasher.update(point.span.start_line.to_le_bytes());
        hasher.update(point.span.start_column.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Instrumentation map for a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationMap {
    /// Format version
    pub version: u32,
    /// Module maps keyed by module identifier
    pub modules: BTreeMap<String, ModuleMap>,
}

impl Default for InstrumentationMap {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentationMap {
    /// Empty map
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: MAP_VERSION,
            modules: BTreeMap::new(),
        }
    }

    /// Add or replace a module's map
    pub fn insert(&mut self, map: ModuleMap) {
        let _ = self.modules.insert(map.module.clone(), map);
    }

    /// Look up a module's map
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&ModuleMap> {
        self.modules.get(name)
    }

    /// Total number of points across modules
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.modules.values().map(|m| m.points.len()).sum()
    }

    /// Persist the map atomically
    pub fn save(&self, path: &Path) -> CovResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }

    /// Read a map written by [`InstrumentationMap::save`]
    pub fn load(path: &Path) -> CovResult<Self> {
        let read_err = |message: String| CovError::MapRead {
            path: path.to_path_buf(),
            message,
        };
        let bytes = std::fs::read(path).map_err(|e| read_err(e.to_string()))?;
        let map: Self = serde_json::from_slice(&bytes).map_err(|e| read_err(e.to_string()))?;
        if map.version != MAP_VERSION {
            return Err(read_err(format!(
                "unsupported map version {} (expected {MAP_VERSION})",
                map.version
            )));
        }
        if let Some(bad) = map.modules.values().find(|m| !m.is_consistent()) {
            return Err(read_err(format!(
                "point table of {} does not match its fingerprint",
                bad.module
            )));
        }
        Ok(map)
    }
}
