//! Point selection
//!
//! Walks a module in declaration order and decides which instructions get a
//! probe. Every member is first resolved to a *lineage*: the source method its
//! points are attributed to, and the exclusion (if any) that applies to it.
//! State-machine members inherit the lineage of the member they were compiled
//! from; local functions and lambdas get their own record whose parent is the
//! enclosing member's lineage, and inherit its exclusion.

use super::filter::ExclusionFilter;
use super::origin::{readable_name, source_type_name, GeneratedName};
use crate::config::ExclusionConfig;
use crate::map::{MethodRecord, ModuleMap, PointKind, PointRecord, SkippedMember};
use crate::model::{Body, MemberRef, MethodId, Module, PointId, SourceSpan};
use crate::result::{CovError, CovResult};
use std::collections::{BTreeMap, HashMap};

/// Lineage nesting deeper than this is treated as unresolvable
const MAX_LINEAGE_DEPTH: usize = 32;

/// Probes planned for one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPlan {
    /// Member the probes go into
    pub member: MemberRef,
    /// `Type::member`
    pub name: String,
    /// Line point by instruction index
    pub line_probes: BTreeMap<usize, PointId>,
    /// Branch edge points by decision instruction index, in edge order
    pub edge_probes: BTreeMap<usize, Vec<PointId>>,
}

impl MemberPlan {
    /// Number of points planned for the member
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.line_probes.len() + self.edge_probes.values().map(Vec::len).sum::<usize>()
    }
}

/// Outcome of point selection for one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Module identifier
    pub module: String,
    /// Point records ordered by id
    pub points: Vec<PointRecord>,
    /// Method records ordered by id
    pub methods: Vec<MethodRecord>,
    /// Per-member probe plans, in declaration order
    pub plans: Vec<MemberPlan>,
    /// Members left out by exclusion rules
    pub excluded: Vec<SkippedMember>,
    /// Members that cannot be instrumented safely
    pub skipped: Vec<SkippedMember>,
    /// Set when the whole module is excluded
    pub module_exclusion: Option<String>,
}

impl Selection {
    /// Number of selected points
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Build the module's instrumentation map
    #[must_use]
    pub fn into_map(self) -> ModuleMap {
        ModuleMap::new(self.module, self.points, self.methods, self.skipped)
    }
}

#[derive(Debug, Clone)]
struct Lineage {
    /// Member owning the method record
    owner: MemberRef,
    type_name: String,
    name: String,
    parent: Option<String>,
    exclusion: Option<String>,
}

/// Chooses instrumentable points
#[derive(Debug, Clone)]
pub struct PointSelector {
    filter: ExclusionFilter,
}

impl PointSelector {
    /// Selector applying `exclusions`
    pub fn new(exclusions: &ExclusionConfig) -> CovResult<Self> {
        Ok(Self {
            filter: ExclusionFilter::new(exclusions)?,
        })
    }

    /// Compiled exclusion rules
    #[must_use]
    pub const fn filter(&self) -> &ExclusionFilter {
        &self.filter
    }

    /// Select the points of `module`
    #[must_use]
    pub fn select(&self, module: &Module) -> Selection {
        self.select_with(module, &BTreeMap::new())
    }

    /// Select the points of `module`, treating `forced` members as not instrumentable
    #[must_use]
    pub fn select_with(&self, module: &Module, forced: &BTreeMap<MemberRef, String>) -> Selection {
        let mut selection = Selection {
            module: module.name.clone(),
            points: Vec::new(),
            methods: Vec::new(),
            plans: Vec::new(),
            excluded: Vec::new(),
            skipped: Vec::new(),
            module_exclusion: self.filter.module_exclusion(module),
        };
        if selection.module_exclusion.is_some() {
            return selection;
        }

        let mut resolver = LineageResolver::new(module, &self.filter);
        let mut records: HashMap<MemberRef, MethodId> = HashMap::new();
        let mut ordinals: HashMap<(String, u32), u32> = HashMap::new();
        let mut next_point = PointId::new(0);

        for (at, member) in module.members() {
            let Some(body) = &member.body else {
                continue;
            };
            let lineage = resolver.resolve(at, 0);
            let name = module.member_name(at);
            if let Some(reason) = &lineage.exclusion {
                selection.excluded.push(SkippedMember {
                    member: name,
                    reason: reason.clone(),
                });
                continue;
            }
            let blocked = forced.get(&at).cloned().or_else(|| {
                rewrite_blocker(body)
                    .map(|message| CovError::unsupported(&module.name, &name, message).to_string())
            });
            if let Some(reason) = blocked {
                selection.skipped.push(SkippedMember {
                    member: name,
                    reason,
                });
                continue;
            }

            let mut plan = MemberPlan {
                member: at,
                name,
                line_probes: BTreeMap::new(),
                edge_probes: BTreeMap::new(),
            };
            let mut points = Vec::new();
            for (index, instruction) in body.instructions.iter().enumerate() {
                if let Some(span) = instruction.span.as_ref().filter(|s| self.is_user_code(s)) {
                    let _ = plan.line_probes.insert(index, next_point);
                    points.push((next_point, PointKind::Line, span.clone()));
                    next_point = next_point.next();
                }
                if !instruction.op.is_decision() {
                    continue;
                }
                let Some(span) = body.effective_span(index).filter(|s| self.is_user_code(s))
                else {
                    continue;
                };
                let slot = ordinals
                    .entry((span.file.clone(), span.start_line))
                    .or_insert(0);
                let ordinal = *slot;
                *slot += 1;
                let edges = u32::try_from(instruction.op.targets().len() + 1).unwrap_or(u32::MAX);
                let mut ids = Vec::new();
                for edge in 0..edges {
                    ids.push(next_point);
                    points.push((
                        next_point,
                        PointKind::Branch {
                            ordinal,
                            edge,
                            edges,
                        },
                        span.clone(),
                    ));
                    next_point = next_point.next();
                }
                let _ = plan.edge_probes.insert(index, ids);
            }
            if points.is_empty() {
                continue;
            }

            let method = *records.entry(lineage.owner).or_insert_with(|| {
                let id = MethodId::new(u32::try_from(selection.methods.len()).unwrap_or(u32::MAX));
                selection.methods.push(MethodRecord {
                    id,
                    type_name: lineage.type_name.clone(),
                    name: lineage.name.clone(),
                    parent: lineage.parent.clone(),
                    file: points[0].2.file.clone(),
                    first_line: u32::MAX,
                    last_line: 0,
                });
                id
            });
            let record = &mut selection.methods[method.index()];
            for (id, kind, span) in points {
                record.first_line = record.first_line.min(span.start_line);
                record.last_line = record.last_line.max(span.end_line);
                selection.points.push(PointRecord {
                    id,
                    kind,
                    method,
                    span,
                });
            }
            selection.plans.push(plan);
        }
        selection
    }

    fn is_user_code(&self, span: &SourceSpan) -> bool {
        !span.is_hidden() && !self.filter.file_excluded(&span.file)
    }
}

/// Why a body cannot be rewritten safely, if it cannot
fn rewrite_blocker(body: &Body) -> Option<String> {
    if body.has_probes() {
        return Some("body already contains probes".to_string());
    }
    body.stack_depths().err()
}

struct LineageResolver<'m> {
    module: &'m Module,
    filter: &'m ExclusionFilter,
    /// State-machine type name to the member that links it explicitly
    links: HashMap<&'m str, MemberRef>,
    cache: HashMap<MemberRef, Lineage>,
}

impl<'m> LineageResolver<'m> {
    fn new(module: &'m Module, filter: &'m ExclusionFilter) -> Self {
        let links = module
            .members()
            .filter_map(|(at, m)| m.state_machine.as_deref().map(|sm| (sm, at)))
            .collect();
        Self {
            module,
            filter,
            links,
            cache: HashMap::new(),
        }
    }

    fn resolve(&mut self, at: MemberRef, depth: usize) -> Lineage {
        if let Some(hit) = self.cache.get(&at) {
            return hit.clone();
        }
        let lineage = self.compute(at, depth);
        let _ = self.cache.insert(at, lineage.clone());
        lineage
    }

    fn compute(&mut self, at: MemberRef, depth: usize) -> Lineage {
        let module = self.module;
        let ty = &module.types[at.type_index];
        let member = &ty.members[at.member_index];
        let own_exclusion = self
            .filter
            .member_exclusion(member)
            .or_else(|| self.filter.type_exclusion(module, ty));
        let own = Lineage {
            owner: at,
            type_name: source_type_name(&ty.name).to_string(),
            name: readable_name(&member.name),
            parent: None,
            exclusion: own_exclusion.clone(),
        };
        if depth >= MAX_LINEAGE_DEPTH {
            return own;
        }

        if let Some(origin) = self.state_machine_origin(at.type_index) {
            if origin != at {
                let mut lineage = self.resolve(origin, depth + 1);
                lineage.exclusion = lineage.exclusion.or(own_exclusion);
                return lineage;
            }
        }

        match GeneratedName::parse(&member.name) {
            Some(GeneratedName::LocalFunction { origin, .. } | GeneratedName::Lambda { origin, .. }) => {
                let parent = self
                    .find_upwards(at.type_index, origin)
                    .map(|p| self.resolve(p, depth + 1));
                match parent {
                    Some(parent) => Lineage {
                        type_name: parent.type_name.clone(),
                        parent: Some(parent.name.clone()),
                        exclusion: own_exclusion.or(parent.exclusion),
                        ..own
                    },
                    None => Lineage {
                        parent: Some(readable_name(origin)),
                        ..own
                    },
                }
            }
            _ => own,
        }
    }

    /// Member a state-machine type was compiled from
    fn state_machine_origin(&self, type_index: usize) -> Option<MemberRef> {
        let ty = &self.module.types[type_index];
        if let Some(at) = self.links.get(ty.name.as_str()) {
            return Some(*at);
        }
        let Some(GeneratedName::StateMachine { origin }) = GeneratedName::parse(ty.simple_name())
        else {
            return None;
        };
        let outer = ty.declaring_type.as_deref()?;
        let (outer_index, _) = self.module.find_type(outer)?;
        self.find_upwards(outer_index, origin)
    }

    /// Member named `name` in the type or the nearest enclosing type declaring it
    fn find_upwards(&self, type_index: usize, name: &str) -> Option<MemberRef> {
        let mut current = Some(type_index);
        let mut steps = 0;
        while let Some(ti) = current {
            let ty = &self.module.types[ti];
            if let Some(mi) = ty.members.iter().position(|m| m.name == name) {
                return Some(MemberRef::new(ti, mi));
            }
            steps += 1;
            if steps > self.module.types.len() {
                return None;
            }
            current = ty
                .declaring_type
                .as_deref()
                .and_then(|outer| self.module.find_type(outer))
                .map(|(i, _)| i);
        }
        None
    }
}
