//! Map × hits → coverage

use super::result::{BranchSite, CoverageResult, CoverageStats, FileCoverage, MethodCoverage, ModuleCoverage};
use crate::config::ExclusionConfig;
use crate::map::{InstrumentationMap, ModuleMap, PointKind};
use crate::merge::MergedHits;
use crate::model::PointId;
use crate::result::CovResult;
use crate::select::ExclusionFilter;
use std::collections::BTreeMap;

/// Builds [`CoverageResult`]s
///
/// Optionally drops source files excluded at report time; exclusions applied
/// during instrumentation are already reflected in the map.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    filter: Option<ExclusionFilter>,
}

impl Aggregator {
    /// Aggregator keeping every file of the map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator dropping files matched by `exclusions`
    pub fn with_exclusions(exclusions: &ExclusionConfig) -> CovResult<Self> {
        Ok(Self {
            filter: Some(ExclusionFilter::new(exclusions)?),
        })
    }

    fn keeps(&self, file: &str) -> bool {
        self.filter.as_ref().map_or(true, |f| !f.file_excluded(file))
    }

    /// Coverage of every module in `map`
    #[must_use]
    pub fn aggregate(&self, map: &InstrumentationMap, hits: &MergedHits) -> CoverageResult {
        let modules = map
            .modules
            .values()
            .map(|module| (module.module.clone(), self.module(module, hits)))
            .collect();
        CoverageResult { modules }
    }

    /// Coverage of one module
    #[must_use]
    pub fn module(&self, map: &ModuleMap, hits: &MergedHits) -> ModuleCoverage {
        let counts = hits.module(&map.module);
        let hits_of = |point: PointId| counts.and_then(|c| c.get(&point)).copied().unwrap_or(0);

        let mut files: BTreeMap<String, FileCoverage> = BTreeMap::new();
        let mut sites: BTreeMap<(String, u32, u32), BranchSite> = BTreeMap::new();
        let mut method_points: BTreeMap<usize, CoverageStats> = BTreeMap::new();

        for point in &map.points {
            let file = &point.span.file;
            if !self.keeps(file) {
                continue;
            }
            let count = hits_of(point.id);
            method_points
                .entry(point.method.index())
                .or_default()
                .record(count > 0);
            match point.kind {
                PointKind::Line => {
                    let coverage = files.entry(file.clone()).or_insert_with(|| FileCoverage {
                        path: file.clone(),
                        ..FileCoverage::default()
                    });
                    for line in point.span.lines() {
                        let slot = coverage.lines.entry(line).or_insert(0);
                        *slot = (*slot).max(count);
                    }
                }
                PointKind::Branch {
                    ordinal,
                    edge,
                    edges,
                } => {
                    let line = point.span.start_line;
                    let site = sites
                        .entry((file.clone(), line, ordinal))
                        .or_insert_with(|| BranchSite {
                            line,
                            ordinal,
                            edges: vec![0; edges as usize],
                        });
                    if let Some(slot) = site.edges.get_mut(edge as usize) {
                        *slot = slot.saturating_add(count);
                    }
                }
            }
        }

        for ((file, _, _), site) in sites {
            files
                .entry(file.clone())
                .or_insert_with(|| FileCoverage {
                    path: file,
                    ..FileCoverage::default()
                })
                .branches
                .push(site);
        }

        let methods = map
            .methods
            .iter()
            .filter(|m| self.keeps(&m.file))
            .map(|m| MethodCoverage {
                type_name: m.type_name.clone(),
                name: m.name.clone(),
                parent: m.parent.clone(),
                file: m.file.clone(),
                first_line: m.first_line,
                last_line: m.last_line,
                points: method_points.get(&m.id.index()).copied().unwrap_or_default(),
            })
            .collect();

        ModuleCoverage {
            module: map.module.clone(),
            files,
            methods,
            skipped: map.skipped.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregate::Metric;
    use crate::map::{MethodRecord, PointRecord};
    use crate::model::{MethodId, SourceSpan};

    fn line(id: u32, method: u32, file: &str, at: u32) -> PointRecord {
        PointRecord {
            id: PointId::new(id),
            kind: PointKind::Line,
            method: MethodId::new(method),
            span: SourceSpan::line(file, at),
        }
    }

    fn edge(id: u32, method: u32, at: u32, ordinal: u32, edge: u32, edges: u32) -> PointRecord {
        PointRecord {
            id: PointId::new(id),
            kind: PointKind::Branch {
                ordinal,
                edge,
                edges,
            },
            method: MethodId::new(method),
            span: SourceSpan::line("a.cs", at),
        }
    }

    fn method(id: u32, name: &str, file: &str) -> MethodRecord {
        MethodRecord {
            id: MethodId::new(id),
            type_name: "App.Program".into(),
            name: name.into(),
            parent: None,
            file: file.into(),
            first_line: 1,
            last_line: 9,
        }
    }

    fn hits(module: &str, counts: &[(u32, u64)]) -> MergedHits {
        let mut merged = MergedHits::new();
        for (p, c) in counts {
            merged.add(module, PointId::new(*p), *c);
        }
        merged
    }

    #[test]
    fn test_line_hits_use_max() {
        let map = ModuleMap::new(
            "App",
            vec![line(0, 0, "a.cs", 4), line(1, 0, "a.cs", 4)],
            vec![method(0, "F", "a.cs")],
            Vec::new(),
        );
        let coverage = Aggregator::new().module(&map, &hits("App", &[(0, 2), (1, 7)]));
        assert_eq!(coverage.files["a.cs"].line_hits(4), Some(7));
    }

    #[test]
    fn test_multi_line_span_covers_each_line() {
        let mut point = line(0, 0, "a.cs", 3);
        point.span.end_line = 5;
        let map = ModuleMap::new("App", vec![point], vec![method(0, "F", "a.cs")], Vec::new());
        let coverage = Aggregator::new().module(&map, &hits("App", &[(0, 1)]));
        assert_eq!(coverage.stats(Metric::Line), CoverageStats::new(3, 3));
    }

    #[test]
    fn test_sites_keyed_by_line_and_ordinal() {
        let map = ModuleMap::new(
            "App",
            vec![
                edge(0, 0, 6, 0, 0, 2),
                edge(1, 0, 6, 0, 1, 2),
                edge(2, 0, 6, 1, 0, 3),
                edge(3, 0, 6, 1, 1, 3),
                edge(4, 0, 6, 1, 2, 3),
            ],
            vec![method(0, "F", "a.cs")],
            Vec::new(),
        );
        let coverage = Aggregator::new().module(&map, &hits("App", &[(1, 4), (2, 1), (4, 1)]));
        let file = &coverage.files["a.cs"];
        assert_eq!(file.branch(6, 0).unwrap().edges, vec![0, 4]);
        assert_eq!(file.branch(6, 1).unwrap().stats(), CoverageStats::new(2, 3));
        assert_eq!(coverage.stats(Metric::Branch), CoverageStats::new(3, 5));
        assert!(file.lines.is_empty());
    }

    #[test]
    fn test_method_covered_by_own_points_only() {
        let map = ModuleMap::new(
            "App",
            vec![line(0, 0, "a.cs", 1), line(1, 1, "a.cs", 2)],
            vec![method(0, "Main", "a.cs"), {
                let mut local = method(1, "Local", "a.cs");
                local.parent = Some("Main".into());
                local
            }],
            Vec::new(),
        );
        let coverage = Aggregator::new().module(&map, &hits("App", &[(1, 1)]));
        assert!(!coverage.method("App.Program::Main").unwrap().is_covered());
        assert!(coverage.method("App.Program::Local").unwrap().is_covered());
        assert_eq!(coverage.stats(Metric::Method), CoverageStats::new(1, 2));
    }

    #[test]
    fn test_unhit_module_is_reported() {
        let mut map = InstrumentationMap::new();
        map.insert(ModuleMap::new(
            "Cold",
            vec![line(0, 0, "c.cs", 1)],
            vec![method(0, "M", "c.cs")],
            Vec::new(),
        ));
        let result = Aggregator::new().aggregate(&map, &MergedHits::new());
        assert_eq!(result.module("Cold").unwrap().percent(Metric::Line), 0.0);
    }

    #[test]
    fn test_report_time_file_exclusion() {
        let map = ModuleMap::new(
            "App",
            vec![line(0, 0, "a.cs", 1), line(1, 1, "gen/b.cs", 1)],
            vec![method(0, "A", "a.cs"), method(1, "B", "gen/b.cs")],
            Vec::new(),
        );
        let aggregator =
            Aggregator::with_exclusions(&ExclusionConfig::default().exclude_file("gen/*")).unwrap();
        let coverage = aggregator.module(&map, &hits("App", &[(0, 1)]));
        assert_eq!(coverage.files.len(), 1);
        assert_eq!(coverage.methods.len(), 1);
        assert_eq!(coverage.percent(Metric::Line), 100.0);
    }
}
