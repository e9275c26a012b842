//! Method bodies: instructions, source spans, exception regions and the
//! stack-depth verifier used before and after rewriting.

use super::PointId;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Source range an instruction was compiled from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    /// Source file path
    pub file: String,
    /// First line (1-based)
    pub start_line: u32,
    /// First column (1-based)
    pub start_column: u32,
    /// Last line (inclusive)
    pub end_line: u32,
    /// Column after the last character
    pub end_column: u32,
}

impl SourceSpan {
    /// Line number debug info uses for compiler-generated code
    pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

    /// Create a span
    #[must_use]
    pub fn new(
        file: impl Into<String>,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            file: file.into(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Span covering a single whole line
    #[must_use]
    pub fn line(file: impl Into<String>, line: u32) -> Self {
        Self::new(file, line, 1, line, 2)
    }

    /// Hidden span marking compiler-generated code
    #[must_use]
    pub fn hidden(file: impl Into<String>) -> Self {
        Self::new(file, Self::HIDDEN_LINE, 0, Self::HIDDEN_LINE, 0)
    }

    /// Whether the span marks compiler-generated code
    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        self.start_line == Self::HIDDEN_LINE
    }

    /// Whether the span describes a real, ordered source range
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        if self.is_hidden() {
            return true;
        }
        if self.file.is_empty() || self.start_line == 0 || self.end_line < self.start_line {
            return false;
        }
        self.end_line > self.start_line || self.end_column >= self.start_column
    }

    /// All lines the span touches
    #[must_use]
    pub fn lines(&self) -> RangeInclusive<u32> {
        self.start_line..=self.end_line
    }
}

/// Operation performed by an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpCode {
    /// Straight-line operation with a fixed stack effect
    Op {
        /// Mnemonic, informational only
        mnemonic: String,
        /// Values popped
        pop: u16,
        /// Values pushed
        push: u16,
    },
    /// Conditional branch: falls through or jumps to `target`
    Branch {
        /// Target instruction index
        target: usize,
        /// Values popped to make the decision
        pop: u16,
    },
    /// Multi-way branch: falls through (edge 0) or jumps to `targets[k]` (edge k + 1)
    Switch {
        /// Target instruction indices
        targets: Vec<usize>,
    },
    /// Unconditional jump
    Jump {
        /// Target instruction index
        target: usize,
    },
    /// Exit from a protected region, empties the stack
    Leave {
        /// Target instruction index
        target: usize,
    },
    /// Method return
    Return {
        /// Values popped (0 or 1)
        pop: u16,
    },
    /// Throw the exception on top of the stack
    Throw,
    /// Injected hit probe
    Probe {
        /// Counter addressed by the probe
        point: PointId,
    },
}

impl OpCode {
    /// Plain operation
    #[must_use]
    pub fn op(mnemonic: &str, pop: u16, push: u16) -> Self {
        Self::Op {
            mnemonic: mnemonic.to_string(),
            pop,
            push,
        }
    }

    /// Values removed from the stack before the instruction's successors run
    #[must_use]
    pub const fn pops(&self) -> u16 {
        match self {
            Self::Op { pop, .. } | Self::Branch { pop, .. } | Self::Return { pop } => *pop,
            Self::Switch { .. } | Self::Throw => 1,
            Self::Jump { .. } | Self::Leave { .. } | Self::Probe { .. } => 0,
        }
    }

    /// Values added to the stack
    #[must_use]
    pub const fn pushes(&self) -> u16 {
        match self {
            Self::Op { push, .. } => *push,
            _ => 0,
        }
    }

    /// Whether the instruction has two or more successor edges
    #[must_use]
    pub fn is_decision(&self) -> bool {
        match self {
            Self::Branch { .. } => true,
            Self::Switch { targets } => !targets.is_empty(),
            _ => false,
        }
    }

    /// Whether execution can continue to the next instruction
    #[must_use]
    pub const fn falls_through(&self) -> bool {
        matches!(
            self,
            Self::Op { .. } | Self::Branch { .. } | Self::Switch { .. } | Self::Probe { .. }
        )
    }

    /// Explicit jump targets, in edge order (fall-through excluded)
    #[must_use]
    pub fn targets(&self) -> Vec<usize> {
        match self {
            Self::Branch { target, .. } | Self::Jump { target } | Self::Leave { target } => {
                vec![*target]
            }
            Self::Switch { targets } => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Rewrite every explicit jump target through `map`
    pub fn retarget(&mut self, map: impl Fn(usize) -> usize) {
        match self {
            Self::Branch { target, .. } | Self::Jump { target } | Self::Leave { target } => {
                *target = map(*target);
            }
            Self::Switch { targets } => {
                for t in targets.iter_mut() {
                    *t = map(*t);
                }
            }
            _ => {}
        }
    }
}

/// One instruction of a body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Operation
    #[serde(flatten)]
    pub op: OpCode,
    /// Sequence point starting at this instruction, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

impl Instruction {
    /// Instruction without source mapping
    #[must_use]
    pub const fn new(op: OpCode) -> Self {
        Self { op, span: None }
    }

    /// Instruction starting a sequence point
    #[must_use]
    pub const fn at(op: OpCode, span: SourceSpan) -> Self {
        Self {
            op,
            span: Some(span),
        }
    }

    /// Injected probe
    #[must_use]
    pub const fn probe(point: PointId) -> Self {
        Self::new(OpCode::Probe { point })
    }

    /// Whether this is an injected probe
    #[must_use]
    pub const fn is_probe(&self) -> bool {
        matches!(self.op, OpCode::Probe { .. })
    }
}

/// Kind of exception handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Typed catch, entered with the exception on the stack
    Catch,
    /// Filter block, entered with the exception on the stack
    Filter,
    /// Finally block
    Finally,
    /// Fault block
    Fault,
}

impl RegionKind {
    /// Stack depth at handler entry
    #[must_use]
    pub const fn entry_depth(self) -> u16 {
        match self {
            Self::Catch | Self::Filter => 1,
            Self::Finally | Self::Fault => 0,
        }
    }
}

/// Protected region and its handler, as half-open instruction index ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRegion {
    /// Handler kind
    pub kind: RegionKind,
    /// First protected instruction
    pub try_start: usize,
    /// One past the last protected instruction
    pub try_end: usize,
    /// First handler instruction
    pub handler_start: usize,
    /// One past the last handler instruction
    pub handler_end: usize,
}

impl ExceptionRegion {
    /// Every boundary index, in declaration order
    #[must_use]
    pub const fn boundaries(&self) -> [usize; 4] {
        [
            self.try_start,
            self.try_end,
            self.handler_start,
            self.handler_end,
        ]
    }

    /// Whether `index` lies in the protected range
    #[must_use]
    pub const fn protects(&self, index: usize) -> bool {
        index >= self.try_start && index < self.try_end
    }
}

/// Executable body of a member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// Instructions in layout order
    pub instructions: Vec<Instruction>,
    /// Exception-handling regions
    #[serde(default)]
    pub regions: Vec<ExceptionRegion>,
    /// Number of local variable slots
    #[serde(default)]
    pub locals: u16,
    /// Declared maximum stack depth
    #[serde(default)]
    pub max_stack: u16,
}

impl Body {
    /// Body from instructions, no locals or regions
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let mut body = Self {
            instructions,
            ..Self::default()
        };
        body.max_stack = body.stack_depths().map_or(8, |d| max_depth(&d));
        body
    }

    /// Add an exception region
    #[must_use]
    pub fn with_region(mut self, region: ExceptionRegion) -> Self {
        self.regions.push(region);
        self.max_stack = self.stack_depths().map_or(self.max_stack, |d| max_depth(&d));
        self
    }

    /// Set the local slot count
    #[must_use]
    pub const fn with_locals(mut self, locals: u16) -> Self {
        self.locals = locals;
        self
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the body has no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Whether the body already carries probes
    #[must_use]
    pub fn has_probes(&self) -> bool {
        self.instructions.iter().any(Instruction::is_probe)
    }

    /// Span in effect at `index`: its own, else the nearest preceding one
    #[must_use]
    pub fn effective_span(&self, index: usize) -> Option<&SourceSpan> {
        self.instructions[..=index.min(self.len().saturating_sub(1))]
            .iter()
            .rev()
            .find_map(|i| i.span.as_ref())
    }

    /// Check that every target and region bound is inside the body
    pub fn check_structure(&self) -> Result<(), String> {
        let len = self.len();
        for (index, instruction) in self.instructions.iter().enumerate() {
            for target in instruction.op.targets() {
                if target >= len {
                    return Err(format!(
                        "instruction {index} targets {target}, body has {len} instructions"
                    ));
                }
            }
            if let Some(span) = &instruction.span {
                if !span.is_well_formed() {
                    return Err(format!(
                        "instruction {index} has malformed span {}:{}-{}",
                        span.file, span.start_line, span.end_line
                    ));
                }
            }
        }
        for region in &self.regions {
            let ordered = region.try_start < region.try_end
                && region.handler_start < region.handler_end
                && region.try_end <= len
                && region.handler_end <= len;
            if !ordered {
                return Err(format!("exception region {region:?} is out of range"));
            }
        }
        Ok(())
    }

    /// Stack depth on entry to each instruction (`None` when unreachable)
    pub fn stack_depths(&self) -> Result<Vec<Option<u16>>, String> {
        self.check_structure()?;
        let len = self.len();
        let mut depths: Vec<Option<u16>> = vec![None; len];
        let mut work: Vec<(usize, u16)> = Vec::new();
        if len > 0 {
            work.push((0, 0));
        }
        for region in &self.regions {
            work.push((region.handler_start, region.kind.entry_depth()));
        }

        while let Some((index, depth)) = work.pop() {
            match depths[index] {
                Some(seen) if seen == depth => continue,
                Some(seen) => {
                    return Err(format!(
                        "instruction {index} reached with stack depth {depth} and {seen}"
                    ))
                }
                None => depths[index] = Some(depth),
            }

            let op = &self.instructions[index].op;
            let after_pop = depth.checked_sub(op.pops()).ok_or_else(|| {
                format!("instruction {index} pops {} from depth {depth}", op.pops())
            })?;
            let out = after_pop.checked_add(op.pushes()).ok_or_else(|| {
                format!("instruction {index} overflows the stack pushing {}", op.pushes())
            })?;

            if op.falls_through() {
                if index + 1 >= len {
                    return Err(format!("instruction {index} falls off the end of the body"));
                }
                work.push((index + 1, out));
            }
            let exit_depth = if matches!(op, OpCode::Leave { .. }) {
                0
            } else {
                out
            };
            for target in op.targets() {
                work.push((target, exit_depth));
            }
        }
        Ok(depths)
    }
}

fn max_depth(depths: &[Option<u16>]) -> u16 {
    depths.iter().flatten().copied().max().unwrap_or(0).saturating_add(1)
}
