//! Generated-name conventions
//!
//! Compilers lower async methods, iterators, local functions and lambdas into
//! members and types whose names embed the originating member between angle
//! brackets:
//!
//! | construct | generated name |
//! |---|---|
//! | state machine type | `<F>d__3`, `<<F>g__Local|0_0>d` |
//! | local function | `<F>g__Local|0_0` |
//! | lambda | `<F>b__0_1` |
//! | closure class | `<>c`, `<>c__DisplayClass0_0` |
//!
//! The inner name may itself be generated, nested arbitrarily deep.

/// Parsed form of a compiler-generated name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedName<'a> {
    /// State-machine type compiled from `origin`
    StateMachine {
        /// Name of the originating member
        origin: &'a str,
    },
    /// Local function `name` declared inside `origin`
    LocalFunction {
        /// Name of the enclosing member
        origin: &'a str,
        /// Source name of the local function
        name: &'a str,
    },
    /// Lambda declared inside `origin`
    Lambda {
        /// Name of the enclosing member
        origin: &'a str,
        /// Compiler ordinal suffix
        suffix: &'a str,
    },
    /// Any other generated name (closure classes, backing fields)
    Other {
        /// Bracketed part, possibly empty
        origin: &'a str,
        /// Text after the closing bracket
        tag: &'a str,
    },
}

impl<'a> GeneratedName<'a> {
    /// Parse `name`; `None` for ordinary user names
    #[must_use]
    pub fn parse(name: &'a str) -> Option<Self> {
        let inner = name.strip_prefix('<')?;
        let close = matching_close(inner)?;
        let origin = &inner[..close];
        let rest = &inner[close + 1..];

        if origin.is_empty() {
            return Some(Self::Other { origin, tag: rest });
        }
        if rest == "d" || rest.starts_with("d__") {
            return Some(Self::StateMachine { origin });
        }
        if let Some(tail) = rest.strip_prefix("g__") {
            let name = tail.split('|').next().unwrap_or(tail);
            return Some(Self::LocalFunction { origin, name });
        }
        if let Some(suffix) = rest.strip_prefix("b__") {
            return Some(Self::Lambda { origin, suffix });
        }
        Some(Self::Other { origin, tag: rest })
    }

    /// Name of the member this construct was compiled from
    #[must_use]
    pub const fn origin(&self) -> &'a str {
        match self {
            Self::StateMachine { origin }
            | Self::LocalFunction { origin, .. }
            | Self::Lambda { origin, .. }
            | Self::Other { origin, .. } => origin,
        }
    }
}

/// Index of the `>` closing the bracket opened just before `inner`
fn matching_close(inner: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' if depth == 0 => return Some(i),
            '>' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Source-level name of a member
///
/// State machines read as their origin, local functions as their own name,
/// lambdas as `lambda_<suffix>`.
#[must_use]
pub fn readable_name(name: &str) -> String {
    match GeneratedName::parse(name) {
        None => name.to_string(),
        Some(GeneratedName::StateMachine { origin }) => readable_name(origin),
        Some(GeneratedName::LocalFunction { name, .. }) => name.to_string(),
        Some(GeneratedName::Lambda { suffix, .. }) => format!("lambda_{suffix}"),
        Some(GeneratedName::Other { origin, .. }) if !origin.is_empty() => readable_name(origin),
        Some(GeneratedName::Other { .. }) => name.to_string(),
    }
}

/// Full type name with compiler-generated nested segments removed
///
/// `App.Program/<>c` and `App.Program/<Run>d__2` both read as `App.Program`.
#[must_use]
pub fn source_type_name(type_name: &str) -> &str {
    let mut end = type_name.len();
    while let Some(slash) = type_name[..end].rfind('/') {
        if type_name[slash + 1..end].starts_with('<') {
            end = slash;
        } else {
            break;
        }
    }
    &type_name[..end]
}
