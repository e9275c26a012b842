//! Coverage Aggregation
//!
//! Joins merged hit counts with the instrumentation map into a
//! [`CoverageResult`] and evaluates threshold rules against it. Everything
//! here is a pure function of its inputs.

mod aggregator;
mod result;
mod threshold;

pub use aggregator::Aggregator;
pub use result::{
    BranchSite, CoverageResult, CoverageStats, FileCoverage, MethodCoverage, ModuleCoverage,
};
pub use threshold::{evaluate, Metric, RuleOutcome, Statistic, ThresholdRule, ThresholdVerdict};
