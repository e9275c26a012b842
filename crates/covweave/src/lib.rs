//! Covweave: Probe-Injection Code Coverage for Compiled Modules
//!
//! Covweave rewrites the executable members of a compiled module so that
//! reaching a source line, or leaving a decision through one of its edges,
//! bumps a counter. Counters are flushed to hit-files once per module
//! lifetime and merged offline with the instrumentation map into line,
//! branch and method coverage.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    COVWEAVE Pipeline                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Module     │    │ Point      │    │ Rewriter   │──► module' │
//! │   │ (model)    │───►│ Selector   │───►│ + verifier │──► map     │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! │                                                                 │
//! │   module' runs ──► ModuleTracker ──► flush once ──► hit-files   │
//! │                                                                 │
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ hit-files  │───►│ HitMerger  │───►│ Aggregator │──► result  │
//! │   │ + map      │    │ (sum)      │    │ thresholds │──► verdict │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use covweave::{
//!     Body, ExclusionConfig, Instrument, Instruction, Member, Module, ModuleInstrumenter,
//!     OpCode, SourceSpan, TypeDef,
//! };
//!
//! let body = Body::new(vec![
//!     Instruction::at(OpCode::op("nop", 0, 0), SourceSpan::line("app.cs", 1)),
//!     Instruction::at(OpCode::Return { pop: 0 }, SourceSpan::line("app.cs", 2)),
//! ]);
//! let module = Module::new("App")
//!     .with_type(TypeDef::new("App.Program").with_member(Member::method("Main", body)));
//!
//! let instrumenter = ModuleInstrumenter::from_module(module, &ExclusionConfig::default())?;
//! instrumenter.can_instrument()?;
//! let done = instrumenter.instrument()?;
//! assert_eq!(done.map.points.len(), 2);
//! assert!(done.module.is_instrumented());
//! # Ok::<(), covweave::CovError>(())
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod aggregate;
pub mod config;
pub mod exec;
mod fsutil;
pub mod log;
pub mod map;
pub mod merge;
pub mod model;
pub mod registry;
mod result;
pub mod rewrite;
pub mod select;
pub mod session;
pub mod tracker;

pub use aggregate::{
    evaluate, Aggregator, BranchSite, CoverageResult, CoverageStats, FileCoverage, Metric,
    MethodCoverage, ModuleCoverage, RuleOutcome, Statistic, ThresholdRule, ThresholdVerdict,
};
pub use config::{CoverageConfig, CoverageConfigBuilder, ExclusionConfig, RunSettings};
pub use exec::{Completion, ExecError, Execution, Interpreter, PathOracle, ScriptedPath};
pub use log::{CoverageLogger, LogEntry, LogLevel, MemoryLogger, NullLogger, TracingLogger};
pub use map::{
    InstrumentationMap, MethodRecord, ModuleMap, PointKind, PointRecord, SkippedMember,
};
pub use merge::{discover, HitMerger, MergedHits};
pub use model::{
    Body, ExceptionRegion, Instruction, Member, MemberKind, MemberRef, MethodId, Module, OpCode,
    PointId, RegionKind, SourceSpan, TypeDef, INSTRUMENTED_MARKER,
};
pub use registry::{tracker_key, TrackerRegistry};
pub use result::{CovError, CovResult};
pub use rewrite::{
    Instrument, InstrumentedModule, LoggingInstrumenter, ModuleInstrumenter, Rewriter,
};
pub use select::{ExclusionFilter, PointSelector, Selection};
pub use session::{CollectReport, CoverageSession, InstrumentReport};
pub use tracker::{FlushOutcome, HitFile, ModuleTracker, TrackerState, UnloadHandle};
