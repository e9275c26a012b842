//! Modules, types and members

use super::{Body, MemberRef};
use crate::fsutil::write_atomic;
use crate::result::{CovError, CovResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Marker attribute the rewriter stamps on every module it has processed
pub const INSTRUMENTED_MARKER: &str = "Covweave.InstrumentedAttribute";

/// Kind of executable member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    /// Ordinary method
    #[default]
    Method,
    /// Instance or static constructor
    Constructor,
    /// Property getter
    Getter,
    /// Property setter
    Setter,
}

impl MemberKind {
    /// Whether the member is a property accessor
    #[must_use]
    pub const fn is_accessor(self) -> bool {
        matches!(self, Self::Getter | Self::Setter)
    }
}

/// Executable member of a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member name as compiled (generated names keep their angle brackets)
    pub name: String,
    /// Member kind
    #[serde(default)]
    pub kind: MemberKind,
    /// Attribute names applied to the member
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    /// Emitted by the compiler rather than written by the user
    #[serde(default)]
    pub compiler_generated: bool,
    /// Auto-implemented property accessor
    #[serde(default)]
    pub auto_property: bool,
    /// Full name of the state-machine type generated from this member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_machine: Option<String>,
    /// Executable body; absent for abstract and extern members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
}

impl Member {
    /// User-written method with a body
    #[must_use]
    pub fn method(name: impl Into<String>, body: Body) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Method,
            attributes: Vec::new(),
            compiler_generated: false,
            auto_property: false,
            state_machine: None,
            body: Some(body),
        }
    }

    /// Compiler-generated method with a body
    #[must_use]
    pub fn generated(name: impl Into<String>, body: Body) -> Self {
        Self {
            compiler_generated: true,
            ..Self::method(name, body)
        }
    }

    /// Set the member kind
    #[must_use]
    pub const fn with_kind(mut self, kind: MemberKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    /// Link the state-machine type generated from this member
    #[must_use]
    pub fn with_state_machine(mut self, type_name: impl Into<String>) -> Self {
        self.state_machine = Some(type_name.into());
        self
    }

    /// Mark as an auto-implemented accessor
    #[must_use]
    pub const fn auto_property(mut self) -> Self {
        self.auto_property = true;
        self
    }

    /// Whether the member carries an attribute with this name
    ///
    /// `Foo` matches both `Foo` and `FooAttribute`, with or without namespace.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        has_attribute(&self.attributes, name)
    }
}

/// Type definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Full name; nested types use `Outer/Inner`
    pub name: String,
    /// Full name of the enclosing type for nested types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaring_type: Option<String>,
    /// Attribute names applied to the type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    /// Emitted by the compiler (closures, state machines)
    #[serde(default)]
    pub compiler_generated: bool,
    /// Members in declaration order
    #[serde(default)]
    pub members: Vec<Member>,
}

impl TypeDef {
    /// Top-level type
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_type: None,
            attributes: Vec::new(),
            compiler_generated: false,
            members: Vec::new(),
        }
    }

    /// Type nested inside `outer`; the full name becomes `outer/name`
    #[must_use]
    pub fn nested(outer: &str, name: &str) -> Self {
        Self {
            declaring_type: Some(outer.to_string()),
            ..Self::new(format!("{outer}/{name}"))
        }
    }

    /// Compiler-generated type nested inside `outer`
    #[must_use]
    pub fn generated(outer: &str, name: &str) -> Self {
        Self {
            compiler_generated: true,
            ..Self::nested(outer, name)
        }
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    /// Add a member
    #[must_use]
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    /// Last segment of the name, without namespace or enclosing types
    #[must_use]
    pub fn simple_name(&self) -> &str {
        let tail = self.name.rsplit('/').next().unwrap_or(&self.name);
        if tail.starts_with('<') {
            tail
        } else {
            tail.rsplit('.').next().unwrap_or(tail)
        }
    }

    /// Whether the type carries an attribute with this name
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        has_attribute(&self.attributes, name)
    }
}

/// Compiled unit undergoing instrumentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Module identifier
    pub name: String,
    /// Module-wide attribute markers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    /// Types in declaration order
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

impl Module {
    /// Empty module
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            types: Vec::new(),
        }
    }

    /// Add a module-wide attribute
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    /// Add a type
    #[must_use]
    pub fn with_type(mut self, ty: TypeDef) -> Self {
        self.types.push(ty);
        self
    }

    /// Whether a module-wide attribute with this name is present
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        has_attribute(&self.attributes, name)
    }

    /// Whether the rewriter already processed this module
    #[must_use]
    pub fn is_instrumented(&self) -> bool {
        self.has_attribute(INSTRUMENTED_MARKER)
            || self
                .members()
                .any(|(_, m)| m.body.as_ref().is_some_and(Body::has_probes))
    }

    /// Find a type by full name
    #[must_use]
    pub fn find_type(&self, name: &str) -> Option<(usize, &TypeDef)> {
        self.types.iter().enumerate().find(|(_, t)| t.name == name)
    }

    /// Every member in declaration order
    pub fn members(&self) -> impl Iterator<Item = (MemberRef, &Member)> + '_ {
        self.types.iter().enumerate().flat_map(|(ti, ty)| {
            ty.members
                .iter()
                .enumerate()
                .map(move |(mi, m)| (MemberRef::new(ti, mi), m))
        })
    }

    /// Member at a reference
    #[must_use]
    pub fn member(&self, at: MemberRef) -> Option<&Member> {
        self.types.get(at.type_index)?.members.get(at.member_index)
    }

    /// Mutable member at a reference
    pub fn member_mut(&mut self, at: MemberRef) -> Option<&mut Member> {
        self.types
            .get_mut(at.type_index)?
            .members
            .get_mut(at.member_index)
    }

    /// `Type::member` display name
    #[must_use]
    pub fn member_name(&self, at: MemberRef) -> String {
        match (self.types.get(at.type_index), self.member(at)) {
            (Some(ty), Some(m)) => format!("{}::{}", ty.name, m.name),
            _ => format!("<missing {}:{}>", at.type_index, at.member_index),
        }
    }

    /// Load a module from its serialized form
    pub fn load(path: &Path) -> CovResult<Self> {
        let bytes =
            std::fs::read(path).map_err(|e| CovError::module_load(path, e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| CovError::module_load(path, e.to_string()))
    }

    /// Persist the module atomically
    pub fn save(&self, path: &Path) -> CovResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }
}

fn has_attribute(attributes: &[String], name: &str) -> bool {
    let wanted = normalize_attribute(name);
    attributes.iter().any(|a| normalize_attribute(a) == wanted)
}

fn normalize_attribute(name: &str) -> &str {
    let simple = name.rsplit('.').next().unwrap_or(name);
    simple.strip_suffix("Attribute").unwrap_or(simple)
}
