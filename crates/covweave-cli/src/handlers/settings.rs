//! Settings command handler

use crate::commands::SettingsArgs;
use crate::error::CliResult;
use covweave::{CoverageConfig, RunSettings};

/// Run settings from the flags, falling back to the configured hit directory
#[must_use]
pub fn resolve_settings(config: &CoverageConfig, args: &SettingsArgs) -> RunSettings {
    let mut settings = RunSettings::new(args.hits.as_ref().unwrap_or(&config.hits_dir));
    if let Some(run_id) = &args.run_id {
        settings = settings.with_run_id(run_id.clone());
    }
    settings.enabled = !args.disabled;
    settings
}

/// Execute the settings command
///
/// Prints `NAME=value` lines suitable for an environment file, or writes the
/// settings as YAML with `--output`.
pub fn execute_settings(config: &CoverageConfig, args: &SettingsArgs) -> CliResult<RunSettings> {
    let settings = resolve_settings(config, args);
    match &args.output {
        Some(path) => settings.save(path)?,
        None => {
            for (name, value) in settings.env_vars() {
                println!("{name}={value}");
            }
        }
    }
    Ok(settings)
}
