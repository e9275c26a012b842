//! Compiled exclusion rules

use crate::config::ExclusionConfig;
use crate::model::{Member, Module, TypeDef};
use crate::result::{CovError, CovResult};
use glob::Pattern;

/// [`ExclusionConfig`] with its globs compiled
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    attributes: Vec<String>,
    include_types: Vec<Pattern>,
    exclude_types: Vec<Pattern>,
    exclude_files: Vec<Pattern>,
    skip_auto_properties: bool,
}

impl ExclusionFilter {
    /// Compile the glob patterns of `config`
    pub fn new(config: &ExclusionConfig) -> CovResult<Self> {
        Ok(Self {
            attributes: config.exclude_attributes.clone(),
            include_types: compile(&config.include_types)?,
            exclude_types: compile(&config.exclude_types)?,
            exclude_files: compile(&config.exclude_files)?,
            skip_auto_properties: config.skip_auto_properties,
        })
    }

    /// Reason the whole module is excluded, if any
    #[must_use]
    pub fn module_exclusion(&self, module: &Module) -> Option<String> {
        self.attributes
            .iter()
            .find(|a| module.has_attribute(a))
            .map(|a| format!("module carries [{a}]"))
    }

    /// Reason a type is excluded, looking at the type and every enclosing type
    #[must_use]
    pub fn type_exclusion(&self, module: &Module, ty: &TypeDef) -> Option<String> {
        let chain = type_chain(module, ty);
        for t in &chain {
            if let Some(a) = self.attributes.iter().find(|a| t.has_attribute(a)) {
                return Some(format!("type {} carries [{a}]", t.name));
            }
            if let Some(p) = self.exclude_types.iter().find(|p| p.matches(&t.name)) {
                return Some(format!("type {} matches exclude pattern {p}", t.name));
            }
        }
        let included = self.include_types.is_empty()
            || chain
                .iter()
                .any(|t| self.include_types.iter().any(|p| p.matches(&t.name)));
        (!included).then(|| format!("type {} matches no include pattern", ty.name))
    }

    /// Reason a member is excluded by its own markers, if any
    #[must_use]
    pub fn member_exclusion(&self, member: &Member) -> Option<String> {
        if let Some(a) = self.attributes.iter().find(|a| member.has_attribute(a)) {
            return Some(format!("member carries [{a}]"));
        }
        (self.skip_auto_properties && member.auto_property && member.kind.is_accessor())
            .then(|| "auto-implemented accessor".to_string())
    }

    /// Whether points in `file` are excluded
    #[must_use]
    pub fn file_excluded(&self, file: &str) -> bool {
        self.exclude_files.iter().any(|p| p.matches(file))
    }
}

fn compile(patterns: &[String]) -> CovResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| CovError::config(format!("invalid pattern {p:?}: {e}")))
        })
        .collect()
}

/// `ty` followed by its enclosing types, innermost first
fn type_chain<'m>(module: &'m Module, ty: &'m TypeDef) -> Vec<&'m TypeDef> {
    let mut chain = vec![ty];
    let mut current = ty;
    while let Some(outer) = current
        .declaring_type
        .as_deref()
        .and_then(|name| module.find_type(name))
        .map(|(_, t)| t)
    {
        if chain.len() > module.types.len() {
            break;
        }
        chain.push(outer);
        current = outer;
    }
    chain
}
