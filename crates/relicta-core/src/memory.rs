//! Memory Store: rolling
//! actor metrics, per-repository risk patterns, and historical release
//! and incident records. Read by the Governance Evaluator's callers to
//! fill in `actor_reliability` and `historical_incident_correlation`
//! before evaluation runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persistence::atomic_write_json;

/// Rolling reliability metrics for a single actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorMetrics {
    pub actor_id: String,
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub rollbacks: u64,
    pub reliability: f64,
    pub average_risk: f64,
    pub last_release_at: Option<DateTime<Utc>>,
}

/// What happened to a release, for the purpose of updating actor metrics
/// and the release history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Success,
    Failure,
    RolledBack,
}

impl ActorMetrics {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            total: 0,
            successes: 0,
            failures: 0,
            rollbacks: 0,
            reliability: 0.5,
            average_risk: 0.0,
            last_release_at: None,
        }
    }

    /// Folds one more release outcome into the rolling metrics. Reliability
    /// is the plain success rate; failures and rollbacks both count against
    /// it (a rollback means the publish succeeded but was later undone).
    pub fn record(&mut self, outcome: ReleaseOutcome, risk_score: f64, now: DateTime<Utc>) {
        self.average_risk = (self.average_risk * self.total as f64 + risk_score) / (self.total + 1) as f64;
        self.total += 1;
        match outcome {
            ReleaseOutcome::Success => self.successes += 1,
            ReleaseOutcome::Failure => self.failures += 1,
            ReleaseOutcome::RolledBack => {
                self.successes += 1;
                self.rollbacks += 1;
            }
        }
        let non_rollback_successes = self.successes.saturating_sub(self.rollbacks);
        self.reliability = non_rollback_successes as f64 / self.total as f64;
        self.last_release_at = Some(now);
    }
}

/// Historical record of one release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub run_id: String,
    pub repository_identity: String,
    pub version: String,
    pub actor: String,
    pub outcome: ReleaseOutcome,
    pub risk_score: f64,
    pub released_at: DateTime<Utc>,
}

/// Historical incident tied back to a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub incident_id: String,
    pub run_id: String,
    pub repository_identity: String,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

/// Whether recent risk for a repository is trending up or down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTrend {
    Increasing,
    Stable,
    Decreasing,
}

/// One recurring risk factor observed across releases for a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonFactor {
    pub category: String,
    pub frequency: u64,
    pub correlated_incidents: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPattern {
    pub repository_identity: String,
    pub trend: RiskTrend,
    pub common_factors: Vec<CommonFactor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ReleaseHistory {
    releases: Vec<ReleaseRecord>,
    incidents: Vec<IncidentRecord>,
}

/// The memory store rooted at `<repo>/.relicta/memory`.
pub struct MemoryStore {
    base_dir: PathBuf,
}

impl MemoryStore {
    pub fn new(repo_root: &Path) -> Self {
        Self { base_dir: repo_root.join(crate::persistence::RELICTA_DIR).join("memory") }
    }

    fn releases_path(&self, repository_identity: &str) -> PathBuf {
        self.base_dir.join(format!("releases-{}.json", sanitize_component(repository_identity)))
    }

    fn actor_path(&self, actor_id: &str) -> PathBuf {
        self.base_dir.join("actors").join(format!("{}.json", sanitize_component(actor_id)))
    }

    fn patterns_path(&self, repository_identity: &str) -> PathBuf {
        self.base_dir.join(format!("patterns-{}.json", sanitize_component(repository_identity)))
    }

    pub fn load_actor_metrics(&self, actor_id: &str) -> Result<ActorMetrics> {
        let path = self.actor_path(actor_id);
        if !path.exists() {
            return Ok(ActorMetrics::new(actor_id));
        }
        let content = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save_actor_metrics(&self, metrics: &ActorMetrics) -> Result<()> {
        atomic_write_json(&self.actor_path(&metrics.actor_id), metrics)
    }

    /// Read-modify-write under the repo lock held by the caller; idempotent under the release record's `run_id`.
    pub fn record_release(
        &self,
        record: ReleaseRecord,
        incidents: &[IncidentRecord],
    ) -> Result<ActorMetrics> {
        let mut history = self.load_history(&record.repository_identity)?;
        if history.releases.iter().any(|r| r.run_id == record.run_id) {
            return self.load_actor_metrics(&record.actor);
        }

        let mut metrics = self.load_actor_metrics(&record.actor)?;
        metrics.record(record.outcome, record.risk_score, record.released_at);

        history.releases.push(record.clone());
        history.incidents.extend_from_slice(incidents);

        self.save_history(&record.repository_identity, &history)?;
        self.save_actor_metrics(&metrics)?;
        Ok(metrics)
    }

    fn load_history(&self, repository_identity: &str) -> Result<ReleaseHistory> {
        let path = self.releases_path(repository_identity);
        if !path.exists() {
            return Ok(ReleaseHistory::default());
        }
        let content = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn save_history(&self, repository_identity: &str, history: &ReleaseHistory) -> Result<()> {
        atomic_write_json(&self.releases_path(repository_identity), history)
    }

    pub fn releases(&self, repository_identity: &str) -> Result<Vec<ReleaseRecord>> {
        Ok(self.load_history(repository_identity)?.releases)
    }

    pub fn incidents(&self, repository_identity: &str) -> Result<Vec<IncidentRecord>> {
        Ok(self.load_history(repository_identity)?.incidents)
    }

    /// Correlation signal fed to the Governance Evaluator: the fraction
    /// of this repository's recent releases that were followed by a
    /// recorded incident. `0.0` with no history (no prior evidence of risk).
    pub fn historical_incident_correlation(&self, repository_identity: &str) -> Result<f64> {
        let history = self.load_history(repository_identity)?;
        if history.releases.is_empty() {
            return Ok(0.0);
        }
        let affected: usize = history
            .releases
            .iter()
            .filter(|r| history.incidents.iter().any(|i| i.run_id == r.run_id))
            .count();
        Ok(affected as f64 / history.releases.len() as f64)
    }

    pub fn load_risk_pattern(&self, repository_identity: &str) -> Result<Option<RiskPattern>> {
        let path = self.patterns_path(repository_identity);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Some(serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?))
    }

    pub fn save_risk_pattern(&self, pattern: &RiskPattern) -> Result<()> {
        atomic_write_json(&self.patterns_path(&pattern.repository_identity), pattern)
    }
}

/// Repository identities are URLs; turn them into a filesystem-safe
/// component for the memory file name.
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn unknown_actor_defaults_to_neutral_reliability() {
        let td = tempdir().unwrap();
        let store = MemoryStore::new(td.path());
        let metrics = store.load_actor_metrics("alice").unwrap();
        assert_eq!(metrics.reliability, 0.5);
        assert_eq!(metrics.total, 0);
    }

    #[test]
    fn recording_successes_raises_reliability() {
        let mut metrics = ActorMetrics::new("alice");
        metrics.record(ReleaseOutcome::Success, 0.1, now());
        metrics.record(ReleaseOutcome::Success, 0.1, now());
        assert_eq!(metrics.reliability, 1.0);
        assert_eq!(metrics.total, 2);
    }

    #[test]
    fn rollback_counts_against_reliability_despite_initial_success() {
        let mut metrics = ActorMetrics::new("alice");
        metrics.record(ReleaseOutcome::Success, 0.1, now());
        metrics.record(ReleaseOutcome::RolledBack, 0.5, now());
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.reliability, 0.5);
    }

    #[test]
    fn record_release_is_idempotent_under_run_id() {
        let td = tempdir().unwrap();
        let store = MemoryStore::new(td.path());
        let record = ReleaseRecord {
            run_id: "run-1".to_string(),
            repository_identity: "github.com/acme/widget".to_string(),
            version: "1.0.1".to_string(),
            actor: "alice".to_string(),
            outcome: ReleaseOutcome::Success,
            risk_score: 0.1,
            released_at: now(),
        };
        store.record_release(record.clone(), &[]).unwrap();
        store.record_release(record, &[]).unwrap();

        let releases = store.releases("github.com/acme/widget").unwrap();
        assert_eq!(releases.len(), 1);
        let metrics = store.load_actor_metrics("alice").unwrap();
        assert_eq!(metrics.total, 1);
    }

    #[test]
    fn historical_incident_correlation_counts_affected_releases() {
        let td = tempdir().unwrap();
        let store = MemoryStore::new(td.path());
        let repo = "github.com/acme/widget";

        store
            .record_release(
                ReleaseRecord {
                    run_id: "run-1".to_string(),
                    repository_identity: repo.to_string(),
                    version: "1.0.0".to_string(),
                    actor: "alice".to_string(),
                    outcome: ReleaseOutcome::Success,
                    risk_score: 0.1,
                    released_at: now(),
                },
                &[IncidentRecord {
                    incident_id: "inc-1".to_string(),
                    run_id: "run-1".to_string(),
                    repository_identity: repo.to_string(),
                    description: "rollback needed".to_string(),
                    detected_at: now(),
                }],
            )
            .unwrap();
        store
            .record_release(
                ReleaseRecord {
                    run_id: "run-2".to_string(),
                    repository_identity: repo.to_string(),
                    version: "1.0.1".to_string(),
                    actor: "alice".to_string(),
                    outcome: ReleaseOutcome::Success,
                    risk_score: 0.1,
                    released_at: now(),
                },
                &[],
            )
            .unwrap();

        let correlation = store.historical_incident_correlation(repo).unwrap();
        assert_eq!(correlation, 0.5);
    }

    #[test]
    fn risk_pattern_roundtrips() {
        let td = tempdir().unwrap();
        let store = MemoryStore::new(td.path());
        let pattern = RiskPattern {
            repository_identity: "github.com/acme/widget".to_string(),
            trend: RiskTrend::Increasing,
            common_factors: vec![CommonFactor {
                category: "breakage".to_string(),
                frequency: 4,
                correlated_incidents: 2,
            }],
        };
        store.save_risk_pattern(&pattern).unwrap();
        let loaded = store.load_risk_pattern("github.com/acme/widget").unwrap().unwrap();
        assert_eq!(loaded.trend, RiskTrend::Increasing);
        assert_eq!(loaded.common_factors[0].frequency, 4);
    }

    #[test]
    fn sanitize_component_replaces_unsafe_characters() {
        assert_eq!(sanitize_component("github.com/acme/widget"), "github_com_acme_widget");
    }
}
