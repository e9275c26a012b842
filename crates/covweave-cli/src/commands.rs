//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Covweave: probe-injection code coverage for compiled modules
#[derive(Parser, Debug)]
#[command(name = "covweave")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Coverage config file (defaults to ./covweave.yaml when present)
    #[arg(short, long, global = true, env = "COVWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Instrument module files and write the instrumentation map
    Instrument(InstrumentArgs),

    /// Merge hit-files into summed counts
    Merge(MergeArgs),

    /// Aggregate hit-files into a coverage report and check thresholds
    Report(ReportArgs),

    /// Show or create the coverage configuration
    Config(ConfigArgs),

    /// Print run settings for instrumented processes
    Settings(SettingsArgs),
}

/// Exclusion flags shared by commands that select code
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ExclusionArgs {
    /// Attribute marking code to exclude (repeatable)
    #[arg(long = "exclude-attribute", value_name = "NAME")]
    pub exclude_attributes: Vec<String>,

    /// Only instrument types matching this glob (repeatable)
    #[arg(long = "include-type", value_name = "GLOB")]
    pub include_types: Vec<String>,

    /// Exclude types matching this glob (repeatable)
    #[arg(long = "exclude-type", value_name = "GLOB")]
    pub exclude_types: Vec<String>,

    /// Exclude source files matching this glob (repeatable)
    #[arg(long = "exclude-file", value_name = "GLOB")]
    pub exclude_files: Vec<String>,
}

/// Arguments for the instrument command
#[derive(Parser, Debug)]
pub struct InstrumentArgs {
    /// Module files to instrument
    #[arg(required = true)]
    pub modules: Vec<PathBuf>,

    /// Where to write the instrumentation map
    #[arg(short, long)]
    pub map: Option<PathBuf>,

    /// Directory for rewritten modules (default: rewrite in place)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Skip auto-property accessors
    #[arg(long)]
    pub skip_auto_properties: bool,

    /// Only check whether each module can be instrumented
    #[arg(long)]
    pub dry_run: bool,

    /// Exclusion rules
    #[command(flatten)]
    pub exclusions: ExclusionArgs,
}

/// Arguments for the merge command
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Instrumentation map
    #[arg(short, long)]
    pub map: Option<PathBuf>,

    /// Directory holding hit-files
    #[arg(long)]
    pub hits: Option<PathBuf>,

    /// Only merge hit-files of this run
    #[arg(long)]
    pub run_id: Option<String>,

    /// Explicit hit-files, instead of scanning the hit directory
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Write merged counts here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Instrumentation map
    #[arg(short, long)]
    pub map: Option<PathBuf>,

    /// Directory holding hit-files
    #[arg(long)]
    pub hits: Option<PathBuf>,

    /// Only use hit-files of this run
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: ReportFormat,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Threshold rule `metric:statistic:minimum`, e.g. `line:minimum:80` (repeatable)
    #[arg(short, long = "threshold", value_name = "RULE")]
    pub thresholds: Vec<String>,

    /// Exclude source files matching this glob from the report (repeatable)
    #[arg(long = "exclude-file", value_name = "GLOB")]
    pub exclude_files: Vec<String>,
}

/// Report output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Summary table
    #[default]
    Text,
    /// Full coverage result and verdict as JSON
    Json,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show the effective configuration
    #[arg(long)]
    pub show: bool,

    /// Write a default configuration file
    #[arg(long, value_name = "PATH")]
    pub init: Option<PathBuf>,

    /// Overwrite an existing file with --init
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the settings command
#[derive(Parser, Debug)]
pub struct SettingsArgs {
    /// Hit directory the instrumented processes write to
    #[arg(long)]
    pub hits: Option<PathBuf>,

    /// Run correlation id (default: a fresh one)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Disable collection for the run
    #[arg(long)]
    pub disabled: bool,

    /// Write the settings as YAML here instead of printing environment lines
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Color argument
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
