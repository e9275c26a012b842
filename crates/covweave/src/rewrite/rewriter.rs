//! Probe Injection
//!
//! # Layout
//!
//! For original instruction `i` the rewritten body contains, in order:
//!
//! ```text
//! [probe line(i)]            only when i carries a line point
//! i                          targets remapped
//! [probe edge0(i)            only when i is an instrumented decision
//!  jump  first(i + 1)
//!  probe edge1(i); jump first(target1)
//!  ...
//!  probe edgeK(i); jump first(targetK)]
//! ```
//!
//! `first(j)` is the first instruction emitted for original `j` (its line
//! probe when it has one). Every branch target and exception-region boundary
//! that named `j` now names `first(j)`, so region contents are preserved and
//! no probe sits between a protected range and its handler. Probes neither
//! push nor pop, so stack depth at every original instruction is unchanged;
//! [`verify_rewrite`] checks exactly that.

use crate::log::CoverageLogger;
use crate::model::{
    Body, ExceptionRegion, Instruction, MemberRef, Module, OpCode, INSTRUMENTED_MARKER,
};
use crate::result::{CovError, CovResult};
use crate::select::{MemberPlan, PointSelector, Selection};
use std::collections::BTreeMap;

/// Where each original instruction landed in a rewritten body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    /// `first[j]`: first emitted index for original `j`; `first[len]` is the new length
    pub first: Vec<usize>,
    /// New index of original instruction `j` itself
    pub position: Vec<usize>,
}

/// Rewrite one body of `module` according to `plan`
///
/// Returns the new body and the relocation table, or
/// [`CovError::UnsupportedConstruct`] naming why the body cannot be rewritten.
pub fn rewrite_body(module: &str, body: &Body, plan: &MemberPlan) -> CovResult<(Body, Relocation)> {
    let reject = |message: String| CovError::unsupported(module, &plan.name, message);
    body.check_structure().map_err(reject)?;
    let len = body.len();
    if let Some(bad) = plan
        .line_probes
        .keys()
        .chain(plan.edge_probes.keys())
        .find(|&&i| i >= len)
    {
        return Err(reject(format!("probe planned at instruction {bad}, body has {len}")));
    }
    for (&index, edges) in &plan.edge_probes {
        let op = &body.instructions[index].op;
        if !op.is_decision() || edges.len() != op.targets().len() + 1 {
            return Err(reject(format!(
                "instruction {index} does not have {} successor edges",
                edges.len()
            )));
        }
    }

    // Pass 1: layout
    let mut first = Vec::with_capacity(len + 1);
    let mut position = Vec::with_capacity(len);
    let mut cursor = 0usize;
    for index in 0..len {
        first.push(cursor);
        if plan.line_probes.contains_key(&index) {
            cursor += 1;
        }
        position.push(cursor);
        cursor += 1;
        if let Some(edges) = plan.edge_probes.get(&index) {
            cursor += 2 * edges.len();
        }
    }
    first.push(cursor);

    // Pass 2: emit
    let mut out: Vec<Instruction> = Vec::with_capacity(cursor);
    for (index, instruction) in body.instructions.iter().enumerate() {
        if let Some(point) = plan.line_probes.get(&index) {
            out.push(Instruction::probe(*point));
        }
        let mut rewritten = instruction.clone();
        match plan.edge_probes.get(&index) {
            None => rewritten.op.retarget(|t| first[t]),
            Some(edges) => {
                let originals = instruction.op.targets();
                let stub_base = position[index] + 3;
                let stubs: Vec<usize> = (0..originals.len()).map(|k| stub_base + 2 * k).collect();
                redirect(&mut rewritten.op, &stubs);
                out.push(rewritten);
                out.push(Instruction::probe(edges[0]));
                out.push(Instruction::new(OpCode::Jump {
                    target: first[index + 1],
                }));
                for (point, target) in edges[1..].iter().zip(originals) {
                    out.push(Instruction::probe(*point));
                    out.push(Instruction::new(OpCode::Jump {
                        target: first[target],
                    }));
                }
                continue;
            }
        }
        out.push(rewritten);
    }

    let regions = body
        .regions
        .iter()
        .map(|r| ExceptionRegion {
            kind: r.kind,
            try_start: first[r.try_start],
            try_end: first[r.try_end],
            handler_start: first[r.handler_start],
            handler_end: first[r.handler_end],
        })
        .collect();
    let rewritten = Body {
        instructions: out,
        regions,
        locals: body.locals,
        max_stack: body.max_stack,
    };
    let relocation = Relocation { first, position };
    verify_rewrite(module, &plan.name, body, &rewritten, &relocation)?;
    Ok((rewritten, relocation))
}

/// Point the explicit targets of a decision at its edge stubs
fn redirect(op: &mut OpCode, stubs: &[usize]) {
    match op {
        OpCode::Branch { target, .. } => {
            if let Some(stub) = stubs.first() {
                *target = *stub;
            }
        }
        OpCode::Switch { targets } => *targets = stubs.to_vec(),
        _ => {}
    }
}

/// Check a rewritten body of `module::member` against its original
///
/// Every original instruction must be reachable at the same stack depth as
/// before, the first emitted instruction for it must see that depth too, and
/// the locals and declared maximum stack must be untouched.
pub fn verify_rewrite(
    module: &str,
    member: &str,
    original: &Body,
    rewritten: &Body,
    relocation: &Relocation,
) -> CovResult<()> {
    let reject = |message: String| CovError::unsupported(module, member, message);
    if rewritten.locals != original.locals {
        return Err(reject("local slot count changed".to_string()));
    }
    if rewritten.max_stack != original.max_stack {
        return Err(reject("declared maximum stack changed".to_string()));
    }
    if rewritten.regions.len() != original.regions.len() {
        return Err(reject("exception region count changed".to_string()));
    }
    let before = original.stack_depths().map_err(reject)?;
    let after = rewritten.stack_depths().map_err(reject)?;
    for (index, depth) in before.iter().enumerate() {
        let Some(depth) = depth else {
            continue;
        };
        let moved = relocation.position[index];
        let (was, now) = (&original.instructions[index].op, &rewritten.instructions[moved].op);
        if std::mem::discriminant(was) != std::mem::discriminant(now)
            || was.pops() != now.pops()
            || was.pushes() != now.pushes()
        {
            return Err(reject(format!("instruction {index} was not preserved")));
        }
        for at in [relocation.first[index], moved] {
            if after[at] != Some(*depth) {
                return Err(reject(format!(
                    "stack depth at instruction {index} changed from {depth} to {:?}",
                    after[at]
                )));
            }
        }
    }
    let peak = |depths: &[Option<u16>]| depths.iter().flatten().copied().max().unwrap_or(0);
    if peak(&after) > peak(&before) {
        return Err(reject(format!("probes raised the stack peak to {}", peak(&after))));
    }
    Ok(())
}

/// Rewrites whole modules
#[derive(Debug, Clone)]
pub struct Rewriter {
    selector: PointSelector,
}

/// A rewritten module together with the selection that produced it
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// The instrumented module
    pub module: Module,
    /// Points, methods, exclusions and skipped members
    pub selection: Selection,
}

impl Rewriter {
    /// Rewriter selecting points with `selector`
    #[must_use]
    pub const fn new(selector: PointSelector) -> Self {
        Self { selector }
    }

    /// Point selector in use
    #[must_use]
    pub const fn selector(&self) -> &PointSelector {
        &self.selector
    }

    /// Rewrite `module`, leaving any member that fails verification untouched
    ///
    /// A member whose rewrite is rejected is recorded as skipped and the
    /// points are selected again without it, so ids stay dense.
    pub fn rewrite(&self, module: &Module, logger: &dyn CoverageLogger) -> RewriteOutcome {
        let mut forced: BTreeMap<MemberRef, String> = BTreeMap::new();
        loop {
            let selection = self.selector.select_with(module, &forced);
            match apply(module, &selection) {
                Ok(mut rewritten) => {
                    rewritten.attributes.push(INSTRUMENTED_MARKER.to_string());
                    for excluded in &selection.excluded {
                        logger.verbose(&format!(
                            "excluded {}: {}",
                            excluded.member, excluded.reason
                        ));
                    }
                    for skipped in &selection.skipped {
                        logger.warning(&format!(
                            "not instrumented {}: {}",
                            skipped.member, skipped.reason
                        ));
                    }
                    return RewriteOutcome {
                        module: rewritten,
                        selection,
                    };
                }
                Err(failures) => {
                    for (at, error) in failures {
                        let _ = forced.insert(at, error.to_string());
                    }
                }
            }
        }
    }
}

/// Apply every plan of `selection`; on failure, the members that failed
pub(super) fn apply(
    module: &Module,
    selection: &Selection,
) -> Result<Module, BTreeMap<MemberRef, CovError>> {
    let mut rewritten = module.clone();
    let mut failures = BTreeMap::new();
    for plan in &selection.plans {
        let Some(body) = module.member(plan.member).and_then(|m| m.body.as_ref()) else {
            let _ = failures.insert(
                plan.member,
                CovError::unsupported(&module.name, &plan.name, "member has no body"),
            );
            continue;
        };
        match rewrite_body(&module.name, body, plan) {
            Ok((new_body, _)) => {
                if let Some(member) = rewritten.member_mut(plan.member) {
                    member.body = Some(new_body);
                }
            }
            Err(error) => {
                let _ = failures.insert(plan.member, error);
            }
        }
    }
    if failures.is_empty() {
        Ok(rewritten)
    } else {
        Err(failures)
    }
}

