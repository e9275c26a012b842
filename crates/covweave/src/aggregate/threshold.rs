//! Threshold Rules
//!
//! A rule names a metric, a statistic over modules, and a minimum
//! percentage. Evaluation is a read-only query: a failed rule is part of the
//! verdict, not an error.

use super::result::CoverageResult;
use crate::result::CovError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coverage metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Covered lines
    Line,
    /// Covered branch edges
    Branch,
    /// Covered methods
    Method,
}

impl Metric {
    /// All metrics, in report order
    pub const ALL: [Self; 3] = [Self::Line, Self::Branch, Self::Method];
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Line => "line",
            Self::Branch => "branch",
            Self::Method => "method",
        })
    }
}

impl FromStr for Metric {
    type Err = CovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "line" => Ok(Self::Line),
            "branch" => Ok(Self::Branch),
            "method" => Ok(Self::Method),
            other => Err(CovError::config(format!("unknown metric '{other}'"))),
        }
    }
}

/// How module percentages are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    /// Worst module
    Minimum,
    /// Mean of module percentages
    Average,
    /// Covered over total across all modules
    Total,
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minimum => "minimum",
            Self::Average => "average",
            Self::Total => "total",
        })
    }
}

impl FromStr for Statistic {
    type Err = CovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimum" | "min" => Ok(Self::Minimum),
            "average" | "avg" => Ok(Self::Average),
            "total" => Ok(Self::Total),
            other => Err(CovError::config(format!("unknown statistic '{other}'"))),
        }
    }
}

/// `metric statistic >= minimum`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Metric checked
    pub metric: Metric,
    /// Statistic over modules
    pub statistic: Statistic,
    /// Minimum percentage, 0..=100
    pub minimum: f64,
}

impl ThresholdRule {
    /// Create a rule
    #[must_use]
    pub const fn new(metric: Metric, statistic: Statistic, minimum: f64) -> Self {
        Self {
            metric,
            statistic,
            minimum,
        }
    }

    /// Reject a minimum outside 0..=100
    pub fn validate(&self) -> Result<(), CovError> {
        if (0.0..=100.0).contains(&self.minimum) {
            Ok(())
        } else {
            Err(CovError::config(format!(
                "threshold minimum {} is outside 0..=100",
                self.minimum
            )))
        }
    }
}

impl fmt::Display for ThresholdRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.metric, self.statistic, self.minimum)
    }
}

/// Parses `metric:statistic:minimum`, e.g. `line:minimum:80`
impl FromStr for ThresholdRule {
    type Err = CovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let [metric, statistic, minimum] = parts.as_slice() else {
            return Err(CovError::config(format!(
                "threshold '{s}' is not metric:statistic:minimum"
            )));
        };
        let minimum: f64 = minimum
            .trim_end_matches('%')
            .parse()
            .map_err(|_| CovError::config(format!("threshold minimum '{minimum}' is not a number")))?;
        let rule = Self::new(metric.parse()?, statistic.parse()?, minimum);
        rule.validate()?;
        Ok(rule)
    }
}

/// Evaluation of one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    /// The rule
    pub rule: ThresholdRule,
    /// Computed percentage
    pub actual: f64,
    /// Modules below the minimum, when the rule failed
    pub offending: Vec<String>,
}

impl RuleOutcome {
    /// Whether the rule held
    #[must_use]
    pub fn passed(&self) -> bool {
        self.actual >= self.rule.minimum
    }
}

/// Outcome of every rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdVerdict {
    /// One outcome per rule, in rule order
    pub outcomes: Vec<RuleOutcome>,
}

impl ThresholdVerdict {
    /// Whether every rule held
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(RuleOutcome::passed)
    }

    /// Failed rules
    pub fn failures(&self) -> impl Iterator<Item = &RuleOutcome> + '_ {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    /// Modules named by any failed rule, deduplicated
    #[must_use]
    pub fn offending_modules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .failures()
            .flat_map(|o| o.offending.iter().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Evaluate `rules` against `result`
#[must_use]
pub fn evaluate(result: &CoverageResult, rules: &[ThresholdRule]) -> ThresholdVerdict {
    let outcomes = rules
        .iter()
        .map(|rule| {
            let per_module: Vec<(&str, f64)> = result
                .modules
                .values()
                .map(|m| (m.module.as_str(), m.percent(rule.metric)))
                .collect();
            let actual = match rule.statistic {
                Statistic::Minimum => per_module
                    .iter()
                    .map(|(_, p)| *p)
                    .fold(100.0, f64::min),
                Statistic::Average if per_module.is_empty() => 100.0,
                Statistic::Average => {
                    per_module.iter().map(|(_, p)| p).sum::<f64>() / per_module.len() as f64
                }
                Statistic::Total => result.stats(rule.metric).percent(),
            };
            let offending = if actual < rule.minimum {
                per_module
                    .iter()
                    .filter(|(_, p)| *p < rule.minimum)
                    .map(|(name, _)| (*name).to_string())
                    .collect()
            } else {
                Vec::new()
            };
            RuleOutcome {
                rule: *rule,
                actual,
                offending,
            }
        })
        .collect();
    ThresholdVerdict { outcomes }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregate::{FileCoverage, ModuleCoverage};
    use proptest::prelude::*;

    /// A module with `covered` of 100 lines hit
    fn module(name: &str, covered: u32) -> ModuleCoverage {
        let mut file = FileCoverage {
            path: format!("{name}.cs"),
            ..FileCoverage::default()
        };
        for line in 1..=100 {
            let _ = file.lines.insert(line, u64::from(line <= covered));
        }
        let mut module = ModuleCoverage {
            module: name.to_string(),
            ..ModuleCoverage::default()
        };
        let _ = module.files.insert(file.path.clone(), file);
        module
    }

    fn result(percents: &[u32]) -> CoverageResult {
        let mut result = CoverageResult::default();
        for (i, p) in percents.iter().enumerate() {
            let m = module(&format!("M{i}"), *p);
            let _ = result.modules.insert(m.module.clone(), m);
        }
        result
    }

    #[test]
    fn test_minimum_names_worst_module() {
        let rule = ThresholdRule::new(Metric::Line, Statistic::Minimum, 80.0);
        let verdict = evaluate(&result(&[90, 95, 70]), &[rule]);
        assert!(!verdict.passed());
        assert_eq!(verdict.outcomes[0].actual, 70.0);
        assert_eq!(verdict.offending_modules(), vec!["M2"]);
    }

    #[test]
    fn test_average_and_total() {
        let data = result(&[90, 95, 70]);
        let verdict = evaluate(
            &data,
            &[
                ThresholdRule::new(Metric::Line, Statistic::Average, 80.0),
                ThresholdRule::new(Metric::Line, Statistic::Total, 85.0),
            ],
        );
        assert!(verdict.passed());
        assert_eq!(verdict.outcomes[0].actual, 85.0);
        assert_eq!(verdict.outcomes[1].actual, 85.0);
    }

    #[test]
    fn test_exactly_at_minimum_passes() {
        let rule = ThresholdRule::new(Metric::Line, Statistic::Minimum, 70.0);
        assert!(evaluate(&result(&[70]), &[rule]).passed());
    }

    #[test]
    fn test_no_modules_pass() {
        let rules = [
            ThresholdRule::new(Metric::Branch, Statistic::Minimum, 100.0),
            ThresholdRule::new(Metric::Method, Statistic::Average, 100.0),
        ];
        assert!(evaluate(&CoverageResult::default(), &rules).passed());
    }

    #[test]
    fn test_no_rules_pass() {
        assert!(evaluate(&result(&[0]), &[]).passed());
    }

    #[test]
    fn test_parse_rule() {
        let rule: ThresholdRule = "line:minimum:80".parse().unwrap();
        assert_eq!(rule, ThresholdRule::new(Metric::Line, Statistic::Minimum, 80.0));
        let rule: ThresholdRule = "Branch:avg:62.5%".parse().unwrap();
        assert_eq!(rule.statistic, Statistic::Average);
        assert_eq!(rule.minimum, 62.5);
        assert_eq!(rule.to_string(), "branch:average:62.5");
    }

    #[test]
    fn test_parse_rejects_bad_rules() {
        assert!("line:80".parse::<ThresholdRule>().is_err());
        assert!("lines:minimum:80".parse::<ThresholdRule>().is_err());
        assert!("line:median:80".parse::<ThresholdRule>().is_err());
        assert!("line:total:abc".parse::<ThresholdRule>().is_err());
        assert!("line:total:120".parse::<ThresholdRule>().is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(ThresholdRule::new(Metric::Line, Statistic::Total, 0.0).validate().is_ok());
        assert!(ThresholdRule::new(Metric::Line, Statistic::Total, -1.0).validate().is_err());
        assert!(ThresholdRule::new(Metric::Line, Statistic::Total, f64::NAN).validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_lower_minimum_never_fails_more(
            percents in prop::collection::vec(0u32..=100, 1..6),
            low in 0.0f64..100.0,
            delta in 0.0f64..50.0,
        ) {
            let data = result(&percents);
            let high = (low + delta).min(100.0);
            for statistic in [Statistic::Minimum, Statistic::Average, Statistic::Total] {
                let strict = evaluate(&data, &[ThresholdRule::new(Metric::Line, statistic, high)]);
                let lax = evaluate(&data, &[ThresholdRule::new(Metric::Line, statistic, low)]);
                if strict.passed() {
                    prop_assert!(lax.passed());
                }
            }
        }

        #[test]
        fn prop_more_hits_never_fail_more(
            percents in prop::collection::vec(0u32..=90, 1..6),
            bump in 0u32..=10,
            minimum in 0.0f64..=100.0,
        ) {
            let before = result(&percents);
            let raised: Vec<u32> = percents.iter().map(|p| p + bump).collect();
            let after = result(&raised);
            for statistic in [Statistic::Minimum, Statistic::Average, Statistic::Total] {
                let rule = ThresholdRule::new(Metric::Line, statistic, minimum);
                if evaluate(&before, &[rule]).passed() {
                    prop_assert!(evaluate(&after, &[rule]).passed());
                }
            }
        }
    }
}
