//! Report command handler

use crate::commands::{ReportArgs, ReportFormat};
use crate::error::{CliError, CliResult};
use console::style;
use covweave::{
    CollectReport, CoverageConfig, CoverageLogger, CoverageResult, CoverageSession, CoverageStats,
    Metric, ThresholdRule, ThresholdVerdict,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

/// Parse `metric:statistic:minimum` rules
pub fn parse_thresholds(rules: &[String]) -> CliResult<Vec<ThresholdRule>> {
    rules
        .iter()
        .map(|r| {
            r.parse::<ThresholdRule>()
                .map_err(|e| CliError::invalid_argument(e.to_string()))
        })
        .collect()
}

/// Coverage config with the report flags applied
pub fn resolve_config(mut config: CoverageConfig, args: &ReportArgs) -> CliResult<CoverageConfig> {
    if let Some(map) = &args.map {
        config.map_path.clone_from(map);
    }
    if let Some(hits) = &args.hits {
        config.hits_dir.clone_from(hits);
    }
    config
        .exclusions
        .exclude_files
        .extend(args.exclude_files.iter().cloned());
    if !args.thresholds.is_empty() {
        config.thresholds = parse_thresholds(&args.thresholds)?;
    }
    Ok(config)
}

fn cell(stats: CoverageStats) -> String {
    format!("{:>7.2}% ({}/{})", stats.percent(), stats.covered, stats.total)
}

/// Render a summary table plus the threshold verdict
#[must_use]
pub fn render_text(result: &CoverageResult, verdict: &ThresholdVerdict) -> String {
    let mut out = String::new();
    let width = result
        .modules
        .keys()
        .map(String::len)
        .chain(std::iter::once("Module".len()))
        .max()
        .unwrap_or(6);

    let _ = writeln!(
        out,
        "{:<width$}  {:<22}  {:<22}  {:<22}",
        "Module", "Line", "Branch", "Method"
    );
    for (name, module) in &result.modules {
        let _ = writeln!(
            out,
            "{:<width$}  {:<22}  {:<22}  {:<22}",
            name,
            cell(module.stats(Metric::Line)),
            cell(module.stats(Metric::Branch)),
            cell(module.stats(Metric::Method)),
        );
    }
    let _ = writeln!(
        out,
        "{:<width$}  {:<22}  {:<22}  {:<22}",
        "Total",
        cell(result.stats(Metric::Line)),
        cell(result.stats(Metric::Branch)),
        cell(result.stats(Metric::Method)),
    );

    for outcome in &verdict.outcomes {
        let mark = if outcome.passed() {
            style("PASS").green()
        } else {
            style("FAIL").red().bold()
        };
        let _ = write!(out, "{mark} {} ({:.2}%)", outcome.rule, outcome.actual);
        if !outcome.offending.is_empty() {
            let _ = write!(out, " below: {}", outcome.offending.join(", "));
        }
        out.push('\n');
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    result: &'a CoverageResult,
    verdict: &'a ThresholdVerdict,
    hit_files: usize,
}

/// Execute the report command
///
/// A failed threshold is reported after the report has been written.
pub fn execute_report(
    config: CoverageConfig,
    args: &ReportArgs,
    logger: Arc<dyn CoverageLogger>,
) -> CliResult<CollectReport> {
    let config = resolve_config(config, args)?;
    let collected = CoverageSession::new(config)
        .with_logger(logger)
        .collect(args.run_id.as_deref())?;

    let rendered = match args.format {
        ReportFormat::Text => render_text(&collected.result, &collected.verdict),
        ReportFormat::Json => serde_json::to_string_pretty(&JsonReport {
            result: &collected.result,
            verdict: &collected.verdict,
            hit_files: collected.hit_files,
        })
        .map_err(|e| CliError::report_generation(e.to_string()))?,
    };
    match &args.output {
        Some(path) => std::fs::write(path, rendered)?,
        None => print!("{rendered}"),
    }

    if collected.verdict.passed() {
        Ok(collected)
    } else {
        Err(CliError::ThresholdNotMet {
            failed: collected.verdict.failures().count(),
            modules: collected.verdict.offending_modules().join(", "),
        })
    }
}
