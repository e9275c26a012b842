//! Type-Safe Identifiers
//!
//! Point and method identifiers are distinct types so a method index can never
//! be used to address a hit counter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an instrumentable point, unique within one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointId(u32);

impl PointId {
    /// Create a new point ID
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The id following this one
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "point-{}", self.0)
    }
}

/// Index of a method record inside one module's instrumentation map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodId(u32);

impl MethodId {
    /// Create a new method ID
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Index usable with the method table
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position of a member inside a module: `(type index, member index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberRef {
    /// Index into `Module::types`
    pub type_index: usize,
    /// Index into `TypeDef::members`
    pub member_index: usize,
}

impl MemberRef {
    /// Create a member reference
    #[must_use]
    pub const fn new(type_index: usize, member_index: usize) -> Self {
        Self {
            type_index,
            member_index,
        }
    }
}
