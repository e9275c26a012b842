//! Coverage configuration
//!
//! [`CoverageConfig`] is the explicit configuration object handed to whatever
//! builds the instrumentation pipeline. [`RunSettings`] is the narrow contract
//! a controller process and an instrumented worker agree on out of band.

use crate::aggregate::ThresholdRule;
use crate::fsutil::write_atomic;
use crate::result::{CovError, CovResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Attribute names that exclude a construct from coverage by default
pub const DEFAULT_EXCLUDE_ATTRIBUTES: &[&str] = &["ExcludeFromCodeCoverage", "ExcludeFromCoverage"];

/// Environment variable carrying the run correlation id
pub const ENV_RUN_ID: &str = "COVWEAVE_RUN_ID";
/// Environment variable carrying the hit-file directory
pub const ENV_HITS_DIR: &str = "COVWEAVE_HITS_DIR";
/// Environment variable switching collection on or off
pub const ENV_ENABLED: &str = "COVWEAVE_ENABLED";

/// What to leave out of instrumentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    /// Attribute names that exclude the member, type or module carrying them
    pub exclude_attributes: Vec<String>,
    /// Type-name globs to instrument; empty means every type
    pub include_types: Vec<String>,
    /// Type-name globs to skip
    pub exclude_types: Vec<String>,
    /// Source-file globs to skip
    pub exclude_files: Vec<String>,
    /// Skip auto-implemented property accessors
    pub skip_auto_properties: bool,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            exclude_attributes: DEFAULT_EXCLUDE_ATTRIBUTES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            exclude_files: Vec::new(),
            skip_auto_properties: false,
        }
    }
}

impl ExclusionConfig {
    /// Add an exclusion attribute
    #[must_use]
    pub fn exclude_attribute(mut self, name: impl Into<String>) -> Self {
        self.exclude_attributes.push(name.into());
        self
    }

    /// Add an include type glob
    #[must_use]
    pub fn include_type(mut self, pattern: impl Into<String>) -> Self {
        self.include_types.push(pattern.into());
        self
    }

    /// Add an exclude type glob
    #[must_use]
    pub fn exclude_type(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_types.push(pattern.into());
        self
    }

    /// Add an exclude file glob
    #[must_use]
    pub fn exclude_file(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_files.push(pattern.into());
        self
    }

    /// Skip auto-implemented property accessors
    #[must_use]
    pub const fn skip_auto_properties(mut self, skip: bool) -> Self {
        self.skip_auto_properties = skip;
        self
    }
}

/// Coverage pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Exclusion rules
    pub exclusions: ExclusionConfig,
    /// Where the instrumentation map is written and read
    pub map_path: PathBuf,
    /// Directory receiving hit-files
    pub hits_dir: PathBuf,
    /// Directory receiving rewritten modules; `None` rewrites in place
    pub output_dir: Option<PathBuf>,
    /// Threshold rules evaluated after aggregation
    pub thresholds: Vec<ThresholdRule>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            exclusions: ExclusionConfig::default(),
            map_path: PathBuf::from("target/covweave/coverage.map.json"),
            hits_dir: PathBuf::from("target/covweave/hits"),
            output_dir: None,
            thresholds: Vec::new(),
        }
    }
}

impl CoverageConfig {
    /// Create a builder for coverage config
    #[must_use]
    pub fn builder() -> CoverageConfigBuilder {
        CoverageConfigBuilder::default()
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> CovResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CovError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// Threshold minimums are held to the same 0..=100 range as rules given
    /// on the command line.
    pub fn from_yaml(content: &str) -> CovResult<Self> {
        let config: Self = serde_yaml_ng::from_str(content)?;
        for rule in &config.thresholds {
            rule.validate()?;
        }
        Ok(config)
    }

    /// Render configuration as YAML
    pub fn to_yaml(&self) -> CovResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

/// Builder for coverage configuration
#[derive(Debug, Default)]
pub struct CoverageConfigBuilder {
    config: CoverageConfig,
}

impl CoverageConfigBuilder {
    /// Set the exclusion rules
    #[must_use]
    pub fn exclusions(mut self, exclusions: ExclusionConfig) -> Self {
        self.config.exclusions = exclusions;
        self
    }

    /// Set the instrumentation map path
    #[must_use]
    pub fn map_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.map_path = path.into();
        self
    }

    /// Set the hit-file directory
    #[must_use]
    pub fn hits_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.hits_dir = dir.into();
        self
    }

    /// Set the output directory for rewritten modules
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    /// Add a threshold rule
    #[must_use]
    pub fn threshold(mut self, rule: ThresholdRule) -> Self {
        self.config.thresholds.push(rule);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> CoverageConfig {
        self.config
    }
}

/// Settings shared between the controller and instrumented workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Whether collection is enabled at all
    pub enabled: bool,
    /// Correlation id shared by every worker of the run
    pub run_id: String,
    /// Directory receiving hit-files
    pub hits_dir: PathBuf,
}

impl RunSettings {
    /// Enabled settings with a fresh correlation id
    #[must_use]
    pub fn new(hits_dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            hits_dir: hits_dir.into(),
        }
    }

    /// Settings with collection switched off
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            run_id: String::new(),
            hits_dir: PathBuf::new(),
        }
    }

    /// Use a specific correlation id
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Read settings from the environment
    ///
    /// Returns `None` when no run id is set, meaning the worker was not
    /// launched under a coverage run.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let run_id = lookup(ENV_RUN_ID).filter(|v| !v.is_empty())?;
        let hits_dir = lookup(ENV_HITS_DIR).filter(|v| !v.is_empty())?;
        let enabled = lookup(ENV_ENABLED).map_or(true, |v| {
            !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
        });
        Some(Self {
            enabled,
            run_id,
            hits_dir: PathBuf::from(hits_dir),
        })
    }

    /// Environment variables a controller sets on a worker
    #[must_use]
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_RUN_ID, self.run_id.clone()),
            (ENV_HITS_DIR, self.hits_dir.display().to_string()),
            (ENV_ENABLED, self.enabled.to_string()),
        ]
    }

    /// Load settings from a YAML file
    pub fn load(path: &Path) -> CovResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml_ng::from_str(&content)?)
    }

    /// Write settings to a YAML file
    pub fn save(&self, path: &Path) -> CovResult<()> {
        let yaml = serde_yaml_ng::to_string(self)?;
        write_atomic(path, yaml.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Metric, Statistic};
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_exclusions() {
        let ex = ExclusionConfig::default();
        assert!(ex
            .exclude_attributes
            .contains(&"ExcludeFromCodeCoverage".to_string()));
        assert!(ex.include_types.is_empty());
        assert!(!ex.skip_auto_properties);
    }

    #[test]
    fn test_builder() {
        let config = CoverageConfig::builder()
            .map_path("out/map.json")
            .hits_dir("out/hits")
            .output_dir("out/modules")
            .exclusions(ExclusionConfig::default().exclude_type("App.Generated.*"))
            .threshold(ThresholdRule::new(Metric::Line, Statistic::Minimum, 80.0))
            .build();
        assert_eq!(config.map_path, PathBuf::from("out/map.json"));
        assert_eq!(config.output_dir, Some(PathBuf::from("out/modules")));
        assert_eq!(config.exclusions.exclude_types, vec!["App.Generated.*"]);
        assert_eq!(config.thresholds.len(), 1);
    }

    #[test]
    fn test_yaml_partial_config_uses_defaults() {
        let yaml = "hits_dir: /tmp/hits\nexclusions:\n  exclude_files: ['**/Generated/*.cs']\n";
        let config = CoverageConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.hits_dir, PathBuf::from("/tmp/hits"));
        assert_eq!(config.exclusions.exclude_files, vec!["**/Generated/*.cs"]);
        assert!(!config.exclusions.exclude_attributes.is_empty());
        assert_eq!(config.map_path, CoverageConfig::default().map_path);
    }

    #[test]
    fn test_yaml_round_trip_with_thresholds() {
        let config = CoverageConfig::builder()
            .threshold(ThresholdRule::new(Metric::Branch, Statistic::Average, 60.0))
            .build();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(CoverageConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_yaml_threshold_out_of_range_is_rejected() {
        let yaml = "thresholds:\n  - metric: line\n    statistic: minimum\n    minimum: 150\n";
        let err = CoverageConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CovError::Config { ref message } if message.contains("outside 0..=100")));

        let yaml = "thresholds:\n  - metric: line\n    statistic: minimum\n    minimum: 100\n";
        assert_eq!(CoverageConfig::from_yaml(yaml).unwrap().thresholds[0].minimum, 100.0);
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(matches!(
            CoverageConfig::from_yaml("thresholds: 12"),
            Err(CovError::Yaml(_))
        ));
    }

    #[test]
    fn test_run_settings_env_handoff() {
        let settings = RunSettings::new("/tmp/hits").with_run_id("run-42");
        let vars: HashMap<String, String> = settings
            .env_vars()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let back = RunSettings::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_run_settings_absent_without_run_id() {
        assert!(RunSettings::from_lookup(|_| None).is_none());
    }

    #[test]
    fn test_run_settings_disabled_flag() {
        let back = RunSettings::from_lookup(|k| match k {
            ENV_RUN_ID => Some("r".into()),
            ENV_HITS_DIR => Some("/tmp".into()),
            ENV_ENABLED => Some("off".into()),
            _ => None,
        })
        .unwrap();
        assert!(!back.enabled);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunSettings::new("a").run_id, RunSettings::new("a").run_id);
    }

    #[test]
    fn test_run_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.yaml");
        let settings = RunSettings::new(dir.path().join("hits"));
        settings.save(&path).unwrap();
        assert_eq!(RunSettings::load(&path).unwrap(), settings);
    }
}
