//! Module Model
//!
//! In-memory representation of a compiled unit: types, executable members
//! and their source-mapped instruction sequences. The rewriter transforms a
//! loaded [`Module`] in place; afterwards only the rewritten module and its
//! instrumentation map are kept.

mod body;
mod ids;
mod module;

pub use body::{Body, ExceptionRegion, Instruction, OpCode, RegionKind, SourceSpan};
pub use ids::{MemberRef, MethodId, PointId};
pub use module::{Member, MemberKind, Module, TypeDef, INSTRUMENTED_MARKER};
