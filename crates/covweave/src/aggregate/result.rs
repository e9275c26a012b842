//! Coverage Result Schema

use super::threshold::Metric;
use crate::fsutil::write_atomic;
use crate::map::SkippedMember;
use crate::result::CovResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Covered over total for one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageStats {
    /// Covered items
    pub covered: usize,
    /// All items
    pub total: usize,
}

impl CoverageStats {
    /// Stats from counts
    #[must_use]
    pub const fn new(covered: usize, total: usize) -> Self {
        Self { covered, total }
    }

    /// Count one item
    pub fn record(&mut self, covered: bool) {
        self.total += 1;
        if covered {
            self.covered += 1;
        }
    }

    /// Sum of two stats
    #[must_use]
    pub const fn combine(self, other: Self) -> Self {
        Self {
            covered: self.covered + other.covered,
            total: self.total + other.total,
        }
    }

    /// Coverage percentage; nothing to cover reads as 100%
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.covered as f64 * 100.0 / self.total as f64
        }
    }
}

/// One decision site: `(line, ordinal)` within a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSite {
    /// Source line of the decision
    pub line: u32,
    /// Ordinal among the decisions of that line
    pub ordinal: u32,
    /// Hits per edge; index 0 is fall-through
    pub edges: Vec<u64>,
}

impl BranchSite {
    /// Edges taken at least once
    #[must_use]
    pub fn covered_edges(&self) -> usize {
        self.edges.iter().filter(|h| **h > 0).count()
    }

    /// Edge stats of the site
    #[must_use]
    pub fn stats(&self) -> CoverageStats {
        CoverageStats::new(self.covered_edges(), self.edges.len())
    }
}

/// Coverage of one source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCoverage {
    /// Source file path as recorded in the map
    pub path: String,
    /// Line → hits
    pub lines: BTreeMap<u32, u64>,
    /// Decision sites ordered by line, then ordinal
    pub branches: Vec<BranchSite>,
}

impl FileCoverage {
    /// Hits of a line, if the line is instrumented
    #[must_use]
    pub fn line_hits(&self, line: u32) -> Option<u64> {
        self.lines.get(&line).copied()
    }

    /// Look up a decision site
    #[must_use]
    pub fn branch(&self, line: u32, ordinal: u32) -> Option<&BranchSite> {
        self.branches
            .iter()
            .find(|b| b.line == line && b.ordinal == ordinal)
    }

    /// Line stats
    #[must_use]
    pub fn line_stats(&self) -> CoverageStats {
        let covered = self.lines.values().filter(|h| **h > 0).count();
        CoverageStats::new(covered, self.lines.len())
    }

    /// Edge stats over every site
    #[must_use]
    pub fn branch_stats(&self) -> CoverageStats {
        self.branches
            .iter()
            .fold(CoverageStats::default(), |acc, b| acc.combine(b.stats()))
    }
}

/// Coverage of one source method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCoverage {
    /// Declaring source type
    pub type_name: String,
    /// Readable method name
    pub name: String,
    /// Enclosing method of a local function or lambda
    pub parent: Option<String>,
    /// Source file
    pub file: String,
    /// First source line
    pub first_line: u32,
    /// Last source line
    pub last_line: u32,
    /// Own points hit over own points
    pub points: CoverageStats,
}

impl MethodCoverage {
    /// Whether any of the method's own points was hit
    #[must_use]
    pub const fn is_covered(&self) -> bool {
        self.points.covered > 0
    }

    /// `Type::Method`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.type_name, self.name)
    }
}

/// Coverage of one module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCoverage {
    /// Module identifier
    pub module: String,
    /// Files keyed by path
    pub files: BTreeMap<String, FileCoverage>,
    /// Methods in map order
    pub methods: Vec<MethodCoverage>,
    /// Members that were not instrumented
    #[serde(default)]
    pub skipped: Vec<SkippedMember>,
}

impl ModuleCoverage {
    /// Stats of one metric
    #[must_use]
    pub fn stats(&self, metric: Metric) -> CoverageStats {
        match metric {
            Metric::Line => self
                .files
                .values()
                .fold(CoverageStats::default(), |acc, f| acc.combine(f.line_stats())),
            Metric::Branch => self
                .files
                .values()
                .fold(CoverageStats::default(), |acc, f| acc.combine(f.branch_stats())),
            Metric::Method => {
                let covered = self.methods.iter().filter(|m| m.is_covered()).count();
                CoverageStats::new(covered, self.methods.len())
            }
        }
    }

    /// Percentage of one metric
    #[must_use]
    pub fn percent(&self, metric: Metric) -> f64 {
        self.stats(metric).percent()
    }

    /// Look up a method by `Type::Method`
    #[must_use]
    pub fn method(&self, full_name: &str) -> Option<&MethodCoverage> {
        self.methods.iter().find(|m| m.full_name() == full_name)
    }
}

/// Coverage of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageResult {
    /// Modules keyed by identifier
    pub modules: BTreeMap<String, ModuleCoverage>,
}

impl CoverageResult {
    /// Look up a module
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&ModuleCoverage> {
        self.modules.get(name)
    }

    /// Stats of one metric summed over every module
    #[must_use]
    pub fn stats(&self, metric: Metric) -> CoverageStats {
        self.modules
            .values()
            .fold(CoverageStats::default(), |acc, m| acc.combine(m.stats(metric)))
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> CovResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON written by [`CoverageResult::to_json`]
    pub fn from_json(json: &str) -> CovResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write as JSON atomically
    pub fn save(&self, path: &Path) -> CovResult<()> {
        write_atomic(path, self.to_json()?.as_bytes())
    }
}
