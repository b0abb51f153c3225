//! Configuration file handling for relicta.
//!
//! This crate provides configuration loading from `.relicta.toml` files
//! with support for merging with CLI arguments and defaults. Loading the
//! *file itself* is a thin concern kept here deliberately small — the
//! interactive configuration wizard is a separate, external surface (see
//! the crate-level docs in `relicta`); this crate only turns a TOML
//! document (or its absence) into a typed, `Default`-backed [`Config`].
//!
//! # Example
//!
//! ```
//! use relicta_config::{Config, load_config};
//! use std::path::Path;
//!
//! let config = load_config(Path::new(".")).expect("load config");
//! assert_eq!(config.tag_prefix(), "v");
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".relicta.toml";

/// Get the config file path for a directory.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Complete relicta configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub governance: GovernanceConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub tag: TagConfig,
    #[serde(default)]
    pub push_retry: PushRetryConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag_prefix(&self) -> &str {
        &self.tag.prefix
    }

    pub fn plugin_directory(&self) -> Option<&Path> {
        self.plugins.directory.as_deref()
    }

    pub fn plugin_request_timeout(&self) -> Duration {
        self.plugins.request_timeout
    }

    pub fn plugin_idle_timeout(&self) -> Duration {
        self.plugins.idle_timeout
    }

    pub fn plugin_cancel_grace(&self) -> Duration {
        self.plugins.cancel_grace
    }

    pub fn plugin_kill_grace(&self) -> Duration {
        self.plugins.kill_grace
    }

    /// Merge this config with another (`other` takes precedence on any
    /// field that differs from that field's built-in default).
    pub fn merge(&self, other: &Config) -> Config {
        Config {
            governance: self.governance.merge(&other.governance),
            classifier: self.classifier.merge(&other.classifier),
            plugins: PluginsConfig {
                directory: other.plugins.directory.clone().or_else(|| self.plugins.directory.clone()),
                request_timeout: pick(other.plugins.request_timeout, self.plugins.request_timeout, default_request_timeout()),
                idle_timeout: pick(other.plugins.idle_timeout, self.plugins.idle_timeout, default_idle_timeout()),
                cancel_grace: pick(other.plugins.cancel_grace, self.plugins.cancel_grace, default_cancel_grace()),
                kill_grace: pick(other.plugins.kill_grace, self.plugins.kill_grace, default_kill_grace()),
            },
            tag: TagConfig {
                prefix: if other.tag.prefix != default_tag_prefix() {
                    other.tag.prefix.clone()
                } else {
                    self.tag.prefix.clone()
                },
            },
            push_retry: PushRetryConfig {
                max_attempts: pick(other.push_retry.max_attempts, self.push_retry.max_attempts, default_push_attempts()),
                base_delay: pick(other.push_retry.base_delay, self.push_retry.base_delay, default_push_base_delay()),
            },
        }
    }
}

fn pick<T: PartialEq + Clone>(other: T, ours: T, default: T) -> T {
    if other != default { other } else { ours }
}

/// Governance risk weighting. Weights need not sum to 1.0 — the
/// evaluator normalizes the weighted sum into `[0,1]` — but a sensible
/// default ships so `relicta plan` works with zero configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default = "default_weight_size")]
    pub weight_size: f64,
    #[serde(default = "default_weight_breakage")]
    pub weight_breakage: f64,
    #[serde(default = "default_weight_test_coverage_delta")]
    pub weight_test_coverage_delta: f64,
    #[serde(default = "default_weight_critical_files")]
    pub weight_critical_files: f64,
    #[serde(default = "default_weight_historical_incident_correlation")]
    pub weight_historical_incident_correlation: f64,
    #[serde(default = "default_weight_actor_reliability")]
    pub weight_actor_reliability: f64,
    /// Minimum actor reliability that lets a `medium`-severity run
    /// auto-approve.
    #[serde(default = "default_medium_auto_approve_threshold")]
    pub medium_auto_approve_reliability_threshold: f64,
    /// Whether a pre-1.0.0 breaking change yields `minor` instead of
    /// `major` — resolved here as the default).
    #[serde(default = "default_pre_1_0_breaking_is_minor")]
    pub pre_1_0_breaking_is_minor: bool,
}

fn default_weight_size() -> f64 {
    0.2
}
fn default_weight_breakage() -> f64 {
    0.25
}
fn default_weight_test_coverage_delta() -> f64 {
    0.15
}
fn default_weight_critical_files() -> f64 {
    0.2
}
fn default_weight_historical_incident_correlation() -> f64 {
    0.1
}
fn default_weight_actor_reliability() -> f64 {
    0.1
}
fn default_medium_auto_approve_threshold() -> f64 {
    0.7
}
fn default_pre_1_0_breaking_is_minor() -> bool {
    true
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            weight_size: default_weight_size(),
            weight_breakage: default_weight_breakage(),
            weight_test_coverage_delta: default_weight_test_coverage_delta(),
            weight_critical_files: default_weight_critical_files(),
            weight_historical_incident_correlation: default_weight_historical_incident_correlation(),
            weight_actor_reliability: default_weight_actor_reliability(),
            medium_auto_approve_reliability_threshold: default_medium_auto_approve_threshold(),
            pre_1_0_breaking_is_minor: default_pre_1_0_breaking_is_minor(),
        }
    }
}

impl GovernanceConfig {
    fn merge(&self, other: &GovernanceConfig) -> GovernanceConfig {
        GovernanceConfig {
            weight_size: pick(other.weight_size, self.weight_size, default_weight_size()),
            weight_breakage: pick(other.weight_breakage, self.weight_breakage, default_weight_breakage()),
            weight_test_coverage_delta: pick(
                other.weight_test_coverage_delta,
                self.weight_test_coverage_delta,
                default_weight_test_coverage_delta(),
            ),
            weight_critical_files: pick(
                other.weight_critical_files,
                self.weight_critical_files,
                default_weight_critical_files(),
            ),
            weight_historical_incident_correlation: pick(
                other.weight_historical_incident_correlation,
                self.weight_historical_incident_correlation,
                default_weight_historical_incident_correlation(),
            ),
            weight_actor_reliability: pick(
                other.weight_actor_reliability,
                self.weight_actor_reliability,
                default_weight_actor_reliability(),
            ),
            medium_auto_approve_reliability_threshold: pick(
                other.medium_auto_approve_reliability_threshold,
                self.medium_auto_approve_reliability_threshold,
                default_medium_auto_approve_threshold(),
            ),
            pre_1_0_breaking_is_minor: other.pre_1_0_breaking_is_minor,
        }
    }
}

/// Commit classifier tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Minimum confidence a layer must produce to win over later layers.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default)]
    pub ai_enabled: bool,
    #[serde(default = "default_ai_ceiling")]
    pub ai_confidence_ceiling: f64,
    #[serde(default = "default_ai_concurrency")]
    pub ai_concurrency: usize,
    #[serde(default = "default_ai_circuit_breaker_threshold")]
    pub ai_circuit_breaker_threshold: u32,
    /// Whether pure docs/test-only commits may be skipped.
    #[serde(default)]
    pub skip_docs_and_test_only: bool,
}

fn default_confidence_floor() -> f64 {
    0.5
}
fn default_ai_ceiling() -> f64 {
    0.8
}
fn default_ai_concurrency() -> usize {
    4
}
fn default_ai_circuit_breaker_threshold() -> u32 {
    3
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_floor: default_confidence_floor(),
            ai_enabled: false,
            ai_confidence_ceiling: default_ai_ceiling(),
            ai_concurrency: default_ai_concurrency(),
            ai_circuit_breaker_threshold: default_ai_circuit_breaker_threshold(),
            skip_docs_and_test_only: false,
        }
    }
}

impl ClassifierConfig {
    fn merge(&self, other: &ClassifierConfig) -> ClassifierConfig {
        ClassifierConfig {
            confidence_floor: pick(other.confidence_floor, self.confidence_floor, default_confidence_floor()),
            ai_enabled: other.ai_enabled || self.ai_enabled,
            ai_confidence_ceiling: pick(other.ai_confidence_ceiling, self.ai_confidence_ceiling, default_ai_ceiling()),
            ai_concurrency: pick(other.ai_concurrency, self.ai_concurrency, default_ai_concurrency()),
            ai_circuit_breaker_threshold: pick(
                other.ai_circuit_breaker_threshold,
                self.ai_circuit_breaker_threshold,
                default_ai_circuit_breaker_threshold(),
            ),
            skip_docs_and_test_only: other.skip_docs_and_test_only || self.skip_docs_and_test_only,
        }
    }
}

/// Plugin host tuning. Timeouts accept either a human-readable duration
/// string (`"60s"`, `"2m"`) or a raw millisecond count in TOML/JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_request_timeout", with = "relicta_duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_idle_timeout", with = "relicta_duration")]
    pub idle_timeout: Duration,
    #[serde(default = "default_cancel_grace", with = "relicta_duration")]
    pub cancel_grace: Duration,
    #[serde(default = "default_kill_grace", with = "relicta_duration")]
    pub kill_grace: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_idle_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_cancel_grace() -> Duration {
    Duration::from_secs(2)
}
fn default_kill_grace() -> Duration {
    Duration::from_secs(3)
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            request_timeout: default_request_timeout(),
            idle_timeout: default_idle_timeout(),
            cancel_grace: default_cancel_grace(),
            kill_grace: default_kill_grace(),
        }
    }
}

/// Tag naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagConfig {
    #[serde(default = "default_tag_prefix")]
    pub prefix: String,
}

fn default_tag_prefix() -> String {
    "v".to_string()
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            prefix: default_tag_prefix(),
        }
    }
}

/// Tag-push retry overrides. `relicta_retry::RetryPolicy::Push`
/// supplies the built-in default; this struct only needs to carry the two
/// knobs a config file is likely to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRetryConfig {
    #[serde(default = "default_push_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_push_base_delay", with = "relicta_duration")]
    pub base_delay: Duration,
}

fn default_push_attempts() -> u32 {
    3
}
fn default_push_base_delay() -> Duration {
    Duration::from_millis(500)
}

impl Default for PushRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_push_attempts(),
            base_delay: default_push_base_delay(),
        }
    }
}

impl PushRetryConfig {
    pub fn to_retry_config(&self) -> relicta_retry::RetryStrategyConfig {
        let mut config = relicta_retry::RetryPolicy::Push.to_config();
        config.max_attempts = self.max_attempts;
        config.base_delay = self.base_delay;
        config
    }
}

/// Load configuration from a directory (looks for [`CONFIG_FILE`]).
/// Missing file is not an error — it yields [`Config::default`].
pub fn load_config(dir: &Path) -> Result<Config> {
    load_config_from_file(&config_path(dir))
}

/// Load configuration from a specific file path.
pub fn load_config_from_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Save configuration to a directory's [`CONFIG_FILE`].
pub fn save_config(dir: &Path, config: &Config) -> Result<()> {
    let path = config_path(dir);
    let content = toml::to_string_pretty(config).context("failed to serialize config to TOML")?;
    std::fs::write(&path, content)
        .with_context(|| format!("failed to write config file: {}", path.display()))?;
    Ok(())
}

/// Find a config file by walking up the directory tree from `start_dir`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::new();
        assert_eq!(config.tag_prefix(), "v");
        assert_eq!(config.plugin_request_timeout(), Duration::from_secs(60));
        assert!(config.governance.pre_1_0_breaking_is_minor);
    }

    #[test]
    fn load_missing_config_returns_default() {
        let td = tempdir().expect("tempdir");
        let config = load_config(td.path()).expect("load");
        assert_eq!(config.tag_prefix(), "v");
    }

    #[test]
    fn save_and_load_config_roundtrips() {
        let td = tempdir().expect("tempdir");
        let mut config = Config::new();
        config.tag.prefix = "rel-".to_string();
        config.governance.medium_auto_approve_reliability_threshold = 0.9;

        save_config(td.path(), &config).expect("save");

        let loaded = load_config(td.path()).expect("load");
        assert_eq!(loaded.tag_prefix(), "rel-");
        assert_eq!(loaded.governance.medium_auto_approve_reliability_threshold, 0.9);
    }

    #[test]
    fn plugin_timeouts_accept_human_readable_durations() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join(CONFIG_FILE);
        std::fs::write(&path, "[plugins]\nrequest_timeout = \"90s\"\nidle_timeout = \"2s\"\n").expect("write");

        let config = load_config(td.path()).expect("load");
        assert_eq!(config.plugin_request_timeout(), Duration::from_secs(90));
        assert_eq!(config.plugin_idle_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn partial_toml_uses_defaults_for_missing_fields() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join(CONFIG_FILE);
        std::fs::write(&path, "[tag]\nprefix = \"ver\"\n").expect("write");

        let config = load_config(td.path()).expect("load");
        assert_eq!(config.tag_prefix(), "ver");
        assert_eq!(config.plugins.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn merge_prefers_other_when_set() {
        let base = Config::new();
        let mut override_config = Config::new();
        override_config.tag.prefix = "release-".to_string();

        let merged = base.merge(&override_config);
        assert_eq!(merged.tag_prefix(), "release-");
    }

    #[test]
    fn find_config_walks_up_directory_tree() {
        let td = tempdir().expect("tempdir");
        let nested = td.path().join("a").join("b").join("c");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(td.path().join(CONFIG_FILE), "[tag]\nprefix = \"v\"\n").expect("write");

        let found = find_config(&nested);
        assert_eq!(found, Some(td.path().join(CONFIG_FILE)));
    }

    #[test]
    fn push_retry_config_produces_matching_retry_policy() {
        let config = PushRetryConfig::default();
        let retry = config.to_retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(500));
    }
}
