//! Instrument command handler

use crate::commands::{ExclusionArgs, InstrumentArgs};
use crate::config::CliConfig;
use crate::error::CliResult;
use console::style;
use covweave::{
    CoverageConfig, CoverageLogger, CoverageSession, ExclusionConfig, Instrument,
    InstrumentReport, LoggingInstrumenter, ModuleInstrumenter,
};
use std::sync::Arc;

/// Layer command-line exclusion flags over the configured ones
#[must_use]
pub fn apply_exclusions(
    mut base: ExclusionConfig,
    args: &ExclusionArgs,
    skip_auto_properties: bool,
) -> ExclusionConfig {
    for attribute in &args.exclude_attributes {
        if !base.exclude_attributes.contains(attribute) {
            base.exclude_attributes.push(attribute.clone());
        }
    }
    base.include_types.extend(args.include_types.iter().cloned());
    base.exclude_types.extend(args.exclude_types.iter().cloned());
    base.exclude_files.extend(args.exclude_files.iter().cloned());
    base.skip_auto_properties |= skip_auto_properties;
    base
}

/// Coverage config with the instrument flags applied
#[must_use]
pub fn resolve_config(mut config: CoverageConfig, args: &InstrumentArgs) -> CoverageConfig {
    config.exclusions = apply_exclusions(config.exclusions, &args.exclusions, args.skip_auto_properties);
    if let Some(map) = &args.map {
        config.map_path.clone_from(map);
    }
    if args.output_dir.is_some() {
        config.output_dir.clone_from(&args.output_dir);
    }
    config
}

/// Execute the instrument command
///
/// Returns the instrumentation report, or `None` for a dry run.
pub fn execute_instrument(
    cli: &CliConfig,
    config: CoverageConfig,
    args: &InstrumentArgs,
    logger: Arc<dyn CoverageLogger>,
) -> CliResult<Option<InstrumentReport>> {
    let config = resolve_config(config, args);

    if args.dry_run {
        for path in &args.modules {
            let check = LoggingInstrumenter::new(
                ModuleInstrumenter::from_path(path, &config.exclusions)?,
                path.display().to_string(),
                Arc::clone(&logger),
            )
            .can_instrument();
            match check {
                Ok(()) => println!("{} {}", style("ok").green(), path.display()),
                Err(e) => println!("{} {}: {e}", style("skip").yellow(), path.display()),
            }
        }
        return Ok(None);
    }

    let report = CoverageSession::new(config)
        .with_logger(logger)
        .instrument_paths(&args.modules)?;
    if !cli.verbosity.is_quiet() {
        println!(
            "{} {} module(s), {} point(s); map written",
            style("Instrumented").green().bold(),
            report.map.modules.len(),
            report.map.point_count()
        );
        for (path, reason) in &report.refused {
            println!("  {} {}: {reason}", style("skipped").yellow(), path.display());
        }
    }
    Ok(Some(report))
}
