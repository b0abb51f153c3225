//! Governance Evaluator: weighted risk scoring, severity
//! derivation, and the approval decision. Kept free of persistence and
//! I/O — callers feed it the signals it needs and record whatever it
//! returns.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use relicta_config::GovernanceConfig;
use relicta_types::{GovernanceOutcome, Severity};
use serde::{Deserialize, Serialize};

use crate::aggregator::ChangeSet;

/// One scored risk category contributing to the overall risk score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub category: String,
    pub description: String,
    pub score: f64,
    pub weight: f64,
    pub contribution: f64,
    pub degraded: bool,
}

/// Append-only governance decision record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceDecision {
    pub decision_id: String,
    pub run_id: String,
    pub actor: String,
    pub risk_score: f64,
    pub severity: Severity,
    pub outcome: GovernanceOutcome,
    pub risk_factors: Vec<RiskFactor>,
    pub can_auto_approve: bool,
    pub timestamp: DateTime<Utc>,
}

/// Single-use execution authorization minted for an approved/approval-required
/// decision with human acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAuthorization {
    pub authorization_id: String,
    pub decision_id: String,
    pub actor: String,
    pub scope: String,
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl ExecutionAuthorization {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && now < self.expires_at
    }

    /// Consumes the authorization, returning an error-shaped `false` if
    /// it was already consumed or has expired. Single-use: a second
    /// consumption attempt never succeeds.
    pub fn try_consume(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_live(now) {
            return false;
        }
        self.consumed_at = Some(now);
        true
    }
}

/// Signals fed into the evaluator. Optional fields that can't be computed
/// are scored at the neutral 0.5 and marked `degraded`.
pub struct EvaluatorInput<'a> {
    pub change_set: &'a ChangeSet,
    pub critical_files_touched_ratio: Option<f64>,
    pub test_coverage_delta: Option<f64>,
    pub historical_incident_correlation: Option<f64>,
    pub actor_reliability: Option<f64>,
}

const NEUTRAL: f64 = 0.5;

fn factor(category: &str, description: String, score: Option<f64>, weight: f64) -> RiskFactor {
    let (score, degraded) = match score {
        Some(s) => (s.clamp(0.0, 1.0), false),
        None => (NEUTRAL, true),
    };
    RiskFactor {
        category: category.to_string(),
        description,
        score,
        weight,
        contribution: score * weight,
        degraded,
    }
}

/// Size factor: more non-skipped commits in the change set implies more
/// surface area under review. Saturates at 20 commits.
fn size_score(change_set: &ChangeSet) -> f64 {
    (change_set.total_non_skipped() as f64 / 20.0).min(1.0)
}

/// Breakage factor: presence of any breaking change is maximal risk on
/// this axis; absence is zero.
fn breakage_score(change_set: &ChangeSet) -> f64 {
    if change_set.breaking.is_empty() { 0.0 } else { 1.0 }
}

/// Computes the weighted risk score and its contributing factors.
pub fn compute_risk_factors(input: &EvaluatorInput, config: &GovernanceConfig) -> Vec<RiskFactor> {
    vec![
        factor(
            "size",
            format!("{} non-skipped commit(s) under review", input.change_set.total_non_skipped()),
            Some(size_score(input.change_set)),
            config.weight_size,
        ),
        factor(
            "breakage",
            if input.change_set.breaking.is_empty() {
                "no breaking changes".to_string()
            } else {
                format!("{} breaking change(s)", input.change_set.breaking.len())
            },
            Some(breakage_score(input.change_set)),
            config.weight_breakage,
        ),
        factor(
            "test_coverage_delta",
            "estimated change in test coverage".to_string(),
            input.test_coverage_delta,
            config.weight_test_coverage_delta,
        ),
        factor(
            "critical_files",
            "ratio of touched files considered critical".to_string(),
            input.critical_files_touched_ratio,
            config.weight_critical_files,
        ),
        factor(
            "historical_incident_correlation",
            "correlation with past incidents for this repository".to_string(),
            input.historical_incident_correlation,
            config.weight_historical_incident_correlation,
        ),
        factor(
            "actor_reliability",
            "inverse of the acting operator's historical reliability".to_string(),
            input.actor_reliability.map(|r| 1.0 - r.clamp(0.0, 1.0)),
            config.weight_actor_reliability,
        ),
    ]
}

fn risk_score(factors: &[RiskFactor]) -> f64 {
    let total_weight: f64 = factors.iter().map(|f| f.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    (factors.iter().map(|f| f.contribution).sum::<f64>() / total_weight).clamp(0.0, 1.0)
}

/// Derives the decision from severity. `actor_reliability`
/// defaults to the neutral 0.5 when unknown.
fn derive_outcome(severity: Severity, actor_reliability: f64, config: &GovernanceConfig) -> GovernanceOutcome {
    match severity {
        Severity::Critical => GovernanceOutcome::Rejected,
        Severity::High => GovernanceOutcome::ApprovalRequired,
        Severity::Medium => {
            if actor_reliability >= config.medium_auto_approve_reliability_threshold {
                GovernanceOutcome::Approved
            } else {
                GovernanceOutcome::ApprovalRequired
            }
        }
        Severity::Low => GovernanceOutcome::Approved,
    }
}

/// Runs the full evaluation, returning a decision ready
/// to be persisted (step 4/5 append the audit entry and mint an
/// authorization; those are the caller's job since they need the run id
/// and the persistence layer).
pub fn evaluate(
    run_id: impl Into<String>,
    actor: impl Into<String>,
    decision_id: impl Into<String>,
    input: &EvaluatorInput,
    config: &GovernanceConfig,
    now: DateTime<Utc>,
) -> GovernanceDecision {
    let factors = compute_risk_factors(input, config);
    let score = risk_score(&factors);
    let severity = Severity::from_risk_score(score);
    let actor_reliability = input.actor_reliability.unwrap_or(NEUTRAL);
    let outcome = derive_outcome(severity, actor_reliability, config);
    let can_auto_approve = matches!(outcome, GovernanceOutcome::Approved);

    GovernanceDecision {
        decision_id: decision_id.into(),
        run_id: run_id.into(),
        actor: actor.into(),
        risk_score: score,
        severity,
        outcome,
        risk_factors: factors,
        can_auto_approve,
        timestamp: now,
    }
}

/// Mints a single-use authorization for an approved/approval-required
/// decision with human acknowledgement.
pub fn issue_authorization(
    authorization_id: impl Into<String>,
    decision: &GovernanceDecision,
    nonce: impl Into<String>,
    scope: impl Into<String>,
    ttl: ChronoDuration,
    now: DateTime<Utc>,
) -> ExecutionAuthorization {
    ExecutionAuthorization {
        authorization_id: authorization_id.into(),
        decision_id: decision.decision_id.clone(),
        actor: decision.actor.clone(),
        scope: scope.into(),
        nonce: nonce.into(),
        expires_at: now + ttl,
        consumed_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ChangeEntry;
    use crate::classifier::Classification;
    use crate::git::RawCommit;
    use relicta_types::{ClassificationMethod, CommitType};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn entry(hash: &str, commit_type: CommitType, is_breaking: bool) -> ChangeEntry {
        ChangeEntry {
            commit: RawCommit {
                hash: hash.to_string(),
                short_hash: hash.to_string(),
                subject: "x".to_string(),
                body: String::new(),
            },
            classification: Classification {
                commit_hash: hash.to_string(),
                commit_type,
                scope: None,
                is_breaking,
                breaking_reason: None,
                should_skip: false,
                skip_reason: None,
                method: ClassificationMethod::Conventional,
                confidence: 1.0,
                reasoning: String::new(),
            },
        }
    }

    #[test]
    fn low_risk_change_set_is_approved() {
        let mut change_set = ChangeSet::default();
        change_set.fixes.push(entry("a", CommitType::Fix, false));

        let input = EvaluatorInput {
            change_set: &change_set,
            critical_files_touched_ratio: Some(0.0),
            test_coverage_delta: Some(0.0),
            historical_incident_correlation: Some(0.0),
            actor_reliability: Some(0.9),
        };
        let decision = evaluate("run-1", "alice", "d1", &input, &GovernanceConfig::default(), now());
        assert_eq!(decision.severity, Severity::Low);
        assert_eq!(decision.outcome, GovernanceOutcome::Approved);
        assert!(decision.can_auto_approve);
    }

    #[test]
    fn breaking_change_with_other_high_factors_is_never_approved_when_critical() {
        let mut change_set = ChangeSet::default();
        for i in 0..20 {
            change_set.features.push(entry(&format!("c{i}"), CommitType::Feat, false));
        }
        change_set.breaking.push(entry("b", CommitType::Feat, true));

        let input = EvaluatorInput {
            change_set: &change_set,
            critical_files_touched_ratio: Some(1.0),
            test_coverage_delta: Some(1.0),
            historical_incident_correlation: Some(1.0),
            actor_reliability: Some(0.0),
        };
        let decision = evaluate("run-1", "alice", "d1", &input, &GovernanceConfig::default(), now());
        assert_eq!(decision.severity, Severity::Critical);
        assert_eq!(decision.outcome, GovernanceOutcome::Rejected);
        assert!(!decision.can_auto_approve);
    }

    #[test]
    fn degraded_factor_uses_neutral_score_and_is_flagged() {
        let mut change_set = ChangeSet::default();
        change_set.fixes.push(entry("a", CommitType::Fix, false));

        let input = EvaluatorInput {
            change_set: &change_set,
            critical_files_touched_ratio: None,
            test_coverage_delta: None,
            historical_incident_correlation: None,
            actor_reliability: None,
        };
        let decision = evaluate("run-1", "alice", "d1", &input, &GovernanceConfig::default(), now());
        let degraded: Vec<_> = decision.risk_factors.iter().filter(|f| f.degraded).collect();
        assert_eq!(degraded.len(), 4);
        assert!(degraded.iter().all(|f| f.score == NEUTRAL));
    }

    #[test]
    fn medium_severity_auto_approves_only_above_reliability_threshold() {
        let mut change_set = ChangeSet::default();
        for i in 0..7 {
            change_set.features.push(entry(&format!("f{i}"), CommitType::Feat, false));
        }
        let config = GovernanceConfig::default();

        let reliable_input = EvaluatorInput {
            change_set: &change_set,
            critical_files_touched_ratio: Some(0.0),
            test_coverage_delta: Some(0.0),
            historical_incident_correlation: Some(0.0),
            actor_reliability: Some(0.95),
        };
        let reliable_decision = evaluate("run-1", "alice", "d1", &reliable_input, &config, now());
        assert_eq!(reliable_decision.severity, Severity::Medium);
        assert_eq!(reliable_decision.outcome, GovernanceOutcome::Approved);

        let unreliable_input = EvaluatorInput {
            change_set: &change_set,
            critical_files_touched_ratio: Some(0.0),
            test_coverage_delta: Some(0.0),
            historical_incident_correlation: Some(0.0),
            actor_reliability: Some(0.1),
        };
        let unreliable_decision = evaluate("run-1", "alice", "d1", &unreliable_input, &config, now());
        assert_eq!(unreliable_decision.severity, Severity::Medium);
        assert_eq!(unreliable_decision.outcome, GovernanceOutcome::ApprovalRequired);
    }

    #[test]
    fn authorization_is_single_use() {
        let decision = GovernanceDecision {
            decision_id: "d1".to_string(),
            run_id: "run-1".to_string(),
            actor: "alice".to_string(),
            risk_score: 0.1,
            severity: Severity::Low,
            outcome: GovernanceOutcome::Approved,
            risk_factors: Vec::new(),
            can_auto_approve: true,
            timestamp: now(),
        };
        let mut auth = issue_authorization("auth-1", &decision, "nonce-xyz", "publish", ChronoDuration::minutes(15), now());
        assert!(auth.try_consume(now()));
        assert!(!auth.try_consume(now()));
    }

    #[test]
    fn expired_authorization_cannot_be_consumed() {
        let decision = GovernanceDecision {
            decision_id: "d1".to_string(),
            run_id: "run-1".to_string(),
            actor: "alice".to_string(),
            risk_score: 0.1,
            severity: Severity::Low,
            outcome: GovernanceOutcome::Approved,
            risk_factors: Vec::new(),
            can_auto_approve: true,
            timestamp: now(),
        };
        let mut auth = issue_authorization("auth-1", &decision, "nonce-xyz", "publish", ChronoDuration::minutes(15), now());
        let later = now() + ChronoDuration::minutes(16);
        assert!(!auth.try_consume(later));
    }

    proptest::proptest! {
        // Decision monotonicity: across arbitrary input signals, a
        // critical-severity decision is never approved, and the decision
        // never becomes more permissive than the severity it was derived
        // from justifies.
        #[test]
        fn critical_severity_is_never_approved(
            breaking_count in 0usize..30,
            feature_count in 0usize..30,
            test_coverage_delta in 0.0f64..1.0,
            critical_files_ratio in 0.0f64..1.0,
            historical_incident_correlation in 0.0f64..1.0,
            actor_reliability in 0.0f64..1.0,
        ) {
            let mut change_set = ChangeSet::default();
            for i in 0..feature_count {
                change_set.features.push(entry(&format!("f{i}"), CommitType::Feat, false));
            }
            for i in 0..breaking_count {
                change_set.breaking.push(entry(&format!("b{i}"), CommitType::Feat, true));
            }
            let input = EvaluatorInput {
                change_set: &change_set,
                critical_files_touched_ratio: Some(critical_files_ratio),
                test_coverage_delta: Some(test_coverage_delta),
                historical_incident_correlation: Some(historical_incident_correlation),
                actor_reliability: Some(actor_reliability),
            };
            let decision = evaluate("run-1", "alice", "d1", &input, &GovernanceConfig::default(), now());
            if decision.severity == Severity::Critical {
                proptest::prop_assert_eq!(decision.outcome, GovernanceOutcome::Rejected);
                proptest::prop_assert!(!decision.can_auto_approve);
            }
            if decision.outcome == GovernanceOutcome::Rejected {
                proptest::prop_assert!(!decision.can_auto_approve);
            }
        }
    }
}
