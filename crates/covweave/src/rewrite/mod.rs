//! Rewriter
//!
//! Turns a module and its selected points into an instrumented module plus
//! its instrumentation map. [`Instrument`] is the two-operation seam hosts
//! drive; decorators such as [`LoggingInstrumenter`] wrap any implementer.

mod instrument;
mod rewriter;

pub use instrument::{Instrument, InstrumentedModule, LoggingInstrumenter, ModuleInstrumenter, ModuleSource};
pub use rewriter::{rewrite_body, verify_rewrite, Relocation, RewriteOutcome, Rewriter};
