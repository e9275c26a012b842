//! Result and error types for Covweave.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Covweave operations
pub type CovResult<T> = Result<T, CovError>;

/// Errors that can occur in Covweave
#[derive(Debug, Error)]
pub enum CovError {
    /// Module could not be opened or parsed. Fatal for that module only.
    #[error("Failed to load module {path}: {message}")]
    ModuleLoad {
        /// Module path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A member cannot be rewritten safely. The member is skipped.
    #[error("Unsupported construct in {module}::{member}: {message}")]
    UnsupportedConstruct {
        /// Module identifier
        module: String,
        /// Member full name
        member: String,
        /// Error message
        message: String,
    },

    /// Module is not eligible for instrumentation
    #[error("Module {module} cannot be instrumented: {reason}")]
    NotInstrumentable {
        /// Module identifier
        module: String,
        /// Why the dry-run check refused it
        reason: String,
    },

    /// Tracker could not persist hit data
    #[error("Failed to flush hits for {module}: {message}")]
    Flush {
        /// Module identifier
        module: String,
        /// Error message
        message: String,
    },

    /// A hit-file could not be parsed or does not match the map
    #[error("Corrupt hit-file {path}: {message}")]
    HitFileCorrupt {
        /// Hit-file path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Hit-file references a point the map does not know
    #[error("Hit-file for {module} references unknown point {point}")]
    UnknownPoint {
        /// Module identifier
        module: String,
        /// Point identifier
        point: u32,
    },

    /// Instrumentation map could not be read
    #[error("Failed to read instrumentation map {path}: {message}")]
    MapRead {
        /// Map path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Not a single module of the run could be instrumented
    #[error("No modules could be instrumented ({attempted} attempted)")]
    NoModulesInstrumented {
        /// Number of modules attempted
        attempted: usize,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Binary encoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

impl CovError {
    /// Create a module load error
    #[must_use]
    pub fn module_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ModuleLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported construct error
    #[must_use]
    pub fn unsupported(
        module: impl Into<String>,
        member: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UnsupportedConstruct {
            module: module.into(),
            member: member.into(),
            message: message.into(),
        }
    }

    /// Create a corrupt hit-file error
    #[must_use]
    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::HitFileCorrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the error only affects a single module or member of the run
    #[must_use]
    pub const fn is_isolated(&self) -> bool {
        matches!(
            self,
            Self::ModuleLoad { .. }
                | Self::UnsupportedConstruct { .. }
                | Self::NotInstrumentable { .. }
                | Self::Flush { .. }
        )
    }
}
