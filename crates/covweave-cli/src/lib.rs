//! Covweave CLI Library
//!
//! Command definitions, configuration resolution and handlers behind the
//! `covweave` binary.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;

pub use commands::{
    Cli, ColorArg, Commands, ConfigArgs, ExclusionArgs, InstrumentArgs, MergeArgs, ReportArgs,
    ReportFormat, SettingsArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity, DEFAULT_CONFIG_FILE};
pub use error::{CliError, CliResult};
