//! Execution Harness
//!
//! A small interpreter for [`Body`] used to drive original and rewritten
//! bodies along the same path and compare what they do. Decisions are
//! resolved by a [`PathOracle`] keyed by the dynamic decision count, so one
//! script steers both bodies identically even though the rewritten one has
//! extra probes and jumps.
//!
//! Exceptions: `throw` transfers to the innermost catch or filter handler
//! protecting the throwing instruction, entering with one value on the stack.
//! Finally and fault handlers run only when reached by ordinary control flow.

use crate::model::{Body, OpCode, PointId};
use crate::tracker::ModuleTracker;
use thiserror::Error;

/// Default bound on executed instructions
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// Errors raised while interpreting a body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// Control reached an index outside the body
    #[error("control reached instruction {pc} of a {len}-instruction body")]
    OutOfRange {
        /// Instruction index
        pc: usize,
        /// Body length
        len: usize,
    },
    /// An instruction popped more than the stack held
    #[error("stack underflow at instruction {pc}")]
    StackUnderflow {
        /// Instruction index
        pc: usize,
    },
    /// Execution did not finish within the step limit
    #[error("step limit of {limit} exceeded")]
    StepLimit {
        /// Limit in force
        limit: usize,
    },
}

/// Chooses the edge taken at each executed decision
pub trait PathOracle {
    /// Edge to take at the `decision`-th decision executed (0-based); `edges` ≥ 2
    fn choose(&mut self, decision: usize, edges: usize) -> usize;
}

/// Oracle replaying a fixed list of edge choices, then falling through
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptedPath {
    choices: Vec<usize>,
}

impl ScriptedPath {
    /// Script taking `choices[k]` at the k-th decision
    #[must_use]
    pub fn new(choices: impl Into<Vec<usize>>) -> Self {
        Self {
            choices: choices.into(),
        }
    }

    /// Script that always falls through
    #[must_use]
    pub fn fall_through() -> Self {
        Self::default()
    }
}

impl PathOracle for ScriptedPath {
    fn choose(&mut self, decision: usize, edges: usize) -> usize {
        self.choices
            .get(decision)
            .copied()
            .unwrap_or(0)
            .min(edges.saturating_sub(1))
    }
}

/// How an execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A `return` ran
    Returned,
    /// A `throw` found no handler
    Threw,
}

/// Observable behavior of one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Mnemonics of the plain operations executed, in order
    pub trace: Vec<String>,
    /// Edge taken at each decision, in order
    pub decisions: Vec<usize>,
    /// How the execution ended
    pub completion: Completion,
    /// Probes fired, in order
    pub probes: Vec<PointId>,
}

impl Execution {
    /// Whether two executions did the same thing, ignoring probes
    #[must_use]
    pub fn same_behavior(&self, other: &Self) -> bool {
        self.trace == other.trace
            && self.decisions == other.decisions
            && self.completion == other.completion
    }
}

/// Body interpreter
#[derive(Debug, Clone, Copy)]
pub struct Interpreter {
    step_limit: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }
}

impl Interpreter {
    /// Interpreter with a custom step limit
    #[must_use]
    pub const fn with_step_limit(step_limit: usize) -> Self {
        Self { step_limit }
    }

    /// Run `body`, reporting each probe to `on_probe`
    pub fn run(
        &self,
        body: &Body,
        oracle: &mut dyn PathOracle,
        on_probe: &mut dyn FnMut(PointId),
    ) -> Result<Execution, ExecError> {
        let len = body.len();
        let mut pc = 0usize;
        let mut depth = 0usize;
        let mut decision = 0usize;
        let mut execution = Execution {
            trace: Vec::new(),
            decisions: Vec::new(),
            completion: Completion::Returned,
            probes: Vec::new(),
        };

        for _ in 0..self.step_limit {
            let instruction = body
                .instructions
                .get(pc)
                .ok_or(ExecError::OutOfRange { pc, len })?;
            let op = &instruction.op;
            depth = depth
                .checked_sub(usize::from(op.pops()))
                .ok_or(ExecError::StackUnderflow { pc })?
                + usize::from(op.pushes());

            pc = match op {
                OpCode::Op { mnemonic, .. } => {
                    execution.trace.push(mnemonic.clone());
                    pc + 1
                }
                OpCode::Probe { point } => {
                    execution.probes.push(*point);
                    on_probe(*point);
                    pc + 1
                }
                OpCode::Jump { target } => *target,
                OpCode::Leave { target } => {
                    depth = 0;
                    *target
                }
                OpCode::Branch { .. } | OpCode::Switch { .. } => {
                    let targets = op.targets();
                    let edge = oracle.choose(decision, targets.len() + 1);
                    decision += 1;
                    execution.decisions.push(edge);
                    if edge == 0 {
                        pc + 1
                    } else {
                        targets[edge - 1]
                    }
                }
                OpCode::Return { .. } => {
                    execution.completion = Completion::Returned;
                    return Ok(execution);
                }
                OpCode::Throw => {
                    execution.trace.push("throw".to_string());
                    match handler_for(body, pc) {
                        Some(handler) => {
                            depth = 1;
                            handler
                        }
                        None => {
                            execution.completion = Completion::Threw;
                            return Ok(execution);
                        }
                    }
                }
            };
        }
        Err(ExecError::StepLimit {
            limit: self.step_limit,
        })
    }

    /// Run `body`, counting probes on `tracker`
    pub fn run_tracked(
        &self,
        body: &Body,
        oracle: &mut dyn PathOracle,
        tracker: &ModuleTracker,
    ) -> Result<Execution, ExecError> {
        self.run(body, oracle, &mut |point| tracker.hit(point))
    }
}

/// Innermost catch or filter handler protecting `pc`
fn handler_for(body: &Body, pc: usize) -> Option<usize> {
    use crate::model::RegionKind;
    body.regions
        .iter()
        .filter(|r| r.protects(pc) && matches!(r.kind, RegionKind::Catch | RegionKind::Filter))
        .min_by_key(|r| r.try_end - r.try_start)
        .map(|r| r.handler_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExceptionRegion, Instruction, RegionKind};

    fn op(name: &str, pop: u16, push: u16) -> Instruction {
        Instruction::new(OpCode::op(name, pop, push))
    }

    fn diamond() -> Body {
        Body::new(vec![
            op("ldarg", 0, 1),
            Instruction::new(OpCode::Branch { target: 4, pop: 1 }),
            op("then", 0, 0),
            Instruction::new(OpCode::Jump { target: 5 }),
            op("else", 0, 0),
            Instruction::new(OpCode::Return { pop: 0 }),
        ])
    }

    fn run(body: &Body, script: &[usize]) -> Execution {
        Interpreter::default()
            .run(body, &mut ScriptedPath::new(script), &mut |_| {})
            .unwrap()
    }

    #[test]
    fn test_fall_through_and_taken() {
        assert_eq!(run(&diamond(), &[0]).trace, vec!["ldarg", "then"]);
        assert_eq!(run(&diamond(), &[1]).trace, vec!["ldarg", "else"]);
    }

    #[test]
    fn test_script_clamps_edge() {
        let exec = run(&diamond(), &[9]);
        assert_eq!(exec.decisions, vec![1]);
    }

    #[test]
    fn test_probes_reported() {
        let body = Body::new(vec![
            Instruction::probe(PointId::new(4)),
            Instruction::new(OpCode::Return { pop: 0 }),
        ]);
        let mut seen = Vec::new();
        let exec = Interpreter::default()
            .run(&body, &mut ScriptedPath::fall_through(), &mut |p| seen.push(p))
            .unwrap();
        assert_eq!(seen, vec![PointId::new(4)]);
        assert_eq!(exec.probes, seen);
    }

    #[test]
    fn test_throw_enters_catch() {
        let body = Body::new(vec![
            op("newobj", 0, 1),
            Instruction::new(OpCode::Throw),
            op("pop", 1, 0),
            Instruction::new(OpCode::Leave { target: 4 }),
            Instruction::new(OpCode::Return { pop: 0 }),
        ])
        .with_region(ExceptionRegion {
            kind: RegionKind::Catch,
            try_start: 0,
            try_end: 2,
            handler_start: 2,
            handler_end: 4,
        });
        let exec = run(&body, &[]);
        assert_eq!(exec.trace, vec!["newobj", "throw", "pop"]);
        assert_eq!(exec.completion, Completion::Returned);
    }

    #[test]
    fn test_uncaught_throw() {
        let body = Body::new(vec![op("newobj", 0, 1), Instruction::new(OpCode::Throw)]);
        assert_eq!(run(&body, &[]).completion, Completion::Threw);
    }

    #[test]
    fn test_step_limit() {
        let body = Body {
            instructions: vec![Instruction::new(OpCode::Jump { target: 0 })],
            ..Body::default()
        };
        let err = Interpreter::with_step_limit(10)
            .run(&body, &mut ScriptedPath::fall_through(), &mut |_| {})
            .unwrap_err();
        assert_eq!(err, ExecError::StepLimit { limit: 10 });
    }

    #[test]
    fn test_out_of_range() {
        let body = Body {
            instructions: vec![Instruction::new(OpCode::Jump { target: 3 })],
            ..Body::default()
        };
        let err = Interpreter::default()
            .run(&body, &mut ScriptedPath::fall_through(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, ExecError::OutOfRange { pc: 3, .. }));
    }
}
