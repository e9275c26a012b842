//! Covweave CLI: instrument modules, collect hits, report coverage
//!
//! ## Usage
//!
//! ```bash
//! covweave instrument bin/App.mod -o target/instrumented   # rewrite + map
//! covweave settings --hits target/hits > run.env            # worker env
//! covweave merge --run-id <id>                              # summed counts
//! covweave report -t line:minimum:80                        # table + verdict
//! ```

use clap::Parser;
use covweave::{CoverageLogger, TracingLogger};
use covweave_cli::{handlers, logging, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    let color = config.color.should_color();
    console::set_colors_enabled(color);
    logging::init_logging(config.verbosity, color);

    match run(&config, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(config: &CliConfig, command: Commands) -> CliResult<()> {
    let cwd = std::env::current_dir()?;
    let coverage = config.coverage_config(&cwd)?;
    tracing::debug!(map = %coverage.map_path.display(), hits = %coverage.hits_dir.display(), "configuration resolved");
    let logger: Arc<dyn CoverageLogger> = Arc::new(TracingLogger);

    match command {
        Commands::Instrument(args) => {
            handlers::execute_instrument(config, coverage, &args, logger).map(|_| ())
        }
        Commands::Merge(args) => {
            handlers::execute_merge(&coverage, &args, logger.as_ref()).map(|_| ())
        }
        Commands::Report(args) => handlers::execute_report(coverage, &args, logger).map(|_| ()),
        Commands::Config(args) => handlers::execute_config(&coverage, &args),
        Commands::Settings(args) => handlers::execute_settings(&coverage, &args).map(|_| ()),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.clone().into();

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_config_path(cli.config.clone())
}
