//! Point Selector
//!
//! Decides which instructions of a module become instrumentable points,
//! applying exclusion rules and attributing compiler-generated code to the
//! source member it came from.

mod filter;
mod origin;
mod selector;

pub use filter::ExclusionFilter;
pub use origin::{readable_name, source_type_name, GeneratedName};
pub use selector::{MemberPlan, PointSelector, Selection};

#[cfg(test)]
mod tests;
