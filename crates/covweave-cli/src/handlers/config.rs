//! Config command handler

use crate::commands::ConfigArgs;
use crate::error::{CliError, CliResult};
use covweave::CoverageConfig;

/// Execute the config command
pub fn execute_config(config: &CoverageConfig, args: &ConfigArgs) -> CliResult<()> {
    if let Some(path) = &args.init {
        if path.exists() && !args.force {
            return Err(CliError::config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        std::fs::write(path, default_config_yaml()?)?;
        println!("Wrote default configuration to {}", path.display());
    }

    if args.show || args.init.is_none() {
        print!("{}", config.to_yaml()?);
    }
    Ok(())
}

/// Default configuration rendered as YAML
pub fn default_config_yaml() -> CliResult<String> {
    Ok(CoverageConfig::default().to_yaml()?)
}
