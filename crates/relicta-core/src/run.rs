//! The Release Run aggregate and its state machine. This is
//! the single persisted aggregate the other components read and write;
//! `ReleaseRun` itself never touches the filesystem or git — that's
//! `persistence` and `version_calc`/`publish`'s job. The aggregate only
//! enforces the invariants and the transition graph.

use chrono::{DateTime, Utc};
use relicta_types::{BumpKind, RunState, Version};
use serde::{Deserialize, Serialize};

use crate::aggregator::ChangeSet;
use crate::audit::AuditEntry;
use crate::classifier::Classification;
use crate::error::{CoreError, CoreResult};
use crate::git::RawCommit;

/// `{current version, next version, release type, change set reference,
/// dry-run flag}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub current_version: Version,
    pub next_version: Version,
    pub release_type: BumpKind,
    pub dry_run: bool,
}

/// A notes artifact: rendered text plus the metadata used to produce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesArtifact {
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

/// The outcome of a completed (or failed) publish attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResult {
    pub tag_name: String,
    pub tag_created: bool,
    pub tag_pushed: bool,
    pub plugin_results: Vec<PluginInvocationResult>,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
}

/// One plugin hook invocation's recorded outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInvocationResult {
    pub plugin_name: String,
    pub hook: String,
    pub success: bool,
    pub message: String,
    pub critical: bool,
}

/// The durable aggregate root for one release attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRun {
    pub run_id: String,
    pub repository_root: std::path::PathBuf,
    pub repository_identity: Option<String>,
    pub base_ref: Option<String>,
    pub head_commit: Option<String>,
    pub commits: Vec<RawCommit>,
    pub classifications: Vec<Classification>,
    #[serde(skip)]
    pub change_set: ChangeSet,
    pub current_version: Option<Version>,
    pub next_version: Option<Version>,
    pub bump_kind: BumpKind,
    pub state: RunState,
    pub plan: Option<PlanSnapshot>,
    pub notes: Option<NotesArtifact>,
    pub governance_decision_id: Option<String>,
    pub publish_result: Option<PublishResult>,
    pub risk_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub audit: Vec<AuditEntry>,
}

impl ReleaseRun {
    /// Creates a fresh run in `Draft` state`).
    pub fn new(run_id: impl Into<String>, repository_root: std::path::PathBuf, actor: impl Into<String>, now: DateTime<Utc>) -> Self {
        let run_id = run_id.into();
        let actor = actor.into();
        Self {
            run_id,
            repository_root,
            repository_identity: None,
            base_ref: None,
            head_commit: None,
            commits: Vec::new(),
            classifications: Vec::new(),
            change_set: ChangeSet::default(),
            current_version: None,
            next_version: None,
            bump_kind: BumpKind::None,
            state: RunState::Draft,
            plan: None,
            notes: None,
            governance_decision_id: None,
            publish_result: None,
            risk_score: None,
            created_at: now,
            updated_at: now,
            created_by: actor,
            audit: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn record_transition(&mut self, new_state: RunState, actor: &str, reason: &str, now: DateTime<Utc>) {
        let previous = self.state;
        self.audit.push(AuditEntry::new(self.run_id.clone(), actor, now, Some(previous), new_state, reason));
        self.state = new_state;
        self.updated_at = now;
    }

    fn require_state(&self, expected: RunState, action: &str) -> CoreResult<()> {
        if self.state != expected {
            return Err(CoreError::StateViolation {
                from: self.state,
                reason: format!("`{action}` requires state {expected:?}"),
            });
        }
        Ok(())
    }

    /// `Draft -- plan() --> Planned`. Attaches the discovered commits,
    /// classifications, and change set; does not decide the bump kind
    /// (that's `bump()`).
    pub fn plan(
        &mut self,
        commits: Vec<RawCommit>,
        classifications: Vec<Classification>,
        change_set: ChangeSet,
        current_version: Version,
        head_commit: String,
        base_ref: Option<String>,
        repository_identity: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.require_state(RunState::Draft, "plan")?;
        self.commits = commits;
        self.classifications = classifications;
        self.change_set = change_set;
        self.current_version = Some(current_version);
        self.head_commit = Some(head_commit);
        self.base_ref = base_ref;
        self.repository_identity = repository_identity;
        self.record_transition(RunState::Planned, actor, "plan computed from commit history", now);
        Ok(())
    }

    /// `Planned -- bump() --> Versioned`. Guard: requires Planned with a
    /// non-zero bump kind unless `force`.
    pub fn bump(&mut self, next_version: Version, bump_kind: BumpKind, dry_run: bool, force: bool, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        self.require_state(RunState::Planned, "bump")?;
        if bump_kind == BumpKind::None && !force {
            return Err(CoreError::StateViolation {
                from: self.state,
                reason: "bump requires a non-zero bump kind unless forced".to_string(),
            });
        }
        let current = self
            .current_version
            .clone()
            .ok_or_else(|| CoreError::Fatal(anyhow::anyhow!("run has no current_version despite being Planned")))?;
        if bump_kind != BumpKind::None && Version::compare(&next_version, &current) != std::cmp::Ordering::Greater {
            return Err(CoreError::InvalidInput(format!(
                "next version {next_version} must be greater than current version {current}"
            )));
        }
        self.bump_kind = bump_kind;
        self.next_version = Some(next_version.clone());
        self.plan = Some(PlanSnapshot {
            current_version: current,
            next_version,
            release_type: bump_kind,
            dry_run,
        });
        self.record_transition(RunState::Versioned, actor, "version computed", now);
        Ok(())
    }

    /// `Versioned -- generateNotes --> NotesReady`.
    pub fn attach_notes(&mut self, notes: NotesArtifact, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        self.require_state(RunState::Versioned, "generateNotes")?;
        self.notes = Some(notes);
        self.record_transition(RunState::NotesReady, actor, "release notes generated", now);
        Ok(())
    }

    /// `NotesReady -- approve() --> Approved`. Guard: requires a valid
    /// authorization nonce when governance is enabled (enforced by the
    /// caller, which holds the authorization store — this method only
    /// records the decision reference and performs the transition once
    /// the caller has already validated the nonce).
    pub fn approve(&mut self, decision_id: String, risk_score: f64, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        self.require_state(RunState::NotesReady, "approve")?;
        self.governance_decision_id = Some(decision_id);
        self.risk_score = Some(risk_score);
        self.record_transition(RunState::Approved, actor, "approved", now);
        Ok(())
    }

    /// `Approved -- publishStart() --> Publishing`.
    pub fn publish_start(&mut self, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        self.require_state(RunState::Approved, "publishStart")?;
        self.record_transition(RunState::Publishing, actor, "publish started", now);
        Ok(())
    }

    /// `Publishing -- publishDone() --> Published` (terminal).
    pub fn publish_done(&mut self, result: PublishResult, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        self.require_state(RunState::Publishing, "publishDone")?;
        self.publish_result = Some(result);
        self.record_transition(RunState::Published, actor, "publish completed", now);
        Ok(())
    }

    /// `Publishing -- publishFail() --> Failed`, or a cancellation
    /// during Publishing.
    pub fn publish_fail(&mut self, result: Option<PublishResult>, reason: &str, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        self.require_state(RunState::Publishing, "publishFail")?;
        if let Some(result) = result {
            self.publish_result = Some(result);
        }
        self.record_transition(RunState::Failed, actor, reason, now);
        Ok(())
    }

    /// Any non-terminal run can fail on an unexpected error.
    pub fn fail(&mut self, reason: &str, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        if self.is_terminal() {
            return Err(CoreError::StateViolation {
                from: self.state,
                reason: "cannot fail a run already in a terminal state".to_string(),
            });
        }
        self.record_transition(RunState::Failed, actor, reason, now);
        Ok(())
    }

    /// `<non-terminal> -- cancel() --> Canceled` (terminal).
    pub fn cancel(&mut self, reason: &str, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        if self.is_terminal() {
            return Err(CoreError::StateViolation {
                from: self.state,
                reason: "cannot cancel a run already in a terminal state".to_string(),
            });
        }
        if self.state == RunState::Publishing {
            // A cancel mid-publish can't be a clean Canceled because
            // side effects (tag, push, plugins) may already have run.
            return self.fail(reason, actor, now);
        }
        self.record_transition(RunState::Canceled, actor, reason, now);
        Ok(())
    }

    /// `Failed -- retryPublish() --> Approved`.
    pub fn retry_publish(&mut self, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        self.require_state(RunState::Failed, "retryPublish")?;
        self.record_transition(RunState::Approved, actor, "retrying publish", now);
        Ok(())
    }

    /// `Canceled -- reset() --> Draft`. The aggregate is reused in
    /// place (shares its id); a caller wanting a brand-new id creates a
    /// fresh `ReleaseRun` instead.
    pub fn reset(&mut self, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        if !matches!(self.state, RunState::Canceled | RunState::Failed) {
            return Err(CoreError::StateViolation {
                from: self.state,
                reason: "reset requires a Canceled or Failed run".to_string(),
            });
        }
        self.plan = None;
        self.notes = None;
        self.governance_decision_id = None;
        self.publish_result = None;
        self.risk_score = None;
        self.current_version = None;
        self.next_version = None;
        self.bump_kind = BumpKind::None;
        self.commits.clear();
        self.classifications.clear();
        self.change_set = ChangeSet::default();
        self.record_transition(RunState::Draft, actor, "reset from terminal state", now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn fresh_run() -> ReleaseRun {
        ReleaseRun::new("run-1", std::path::PathBuf::from("/repo"), "alice", now())
    }

    fn plan_it(run: &mut ReleaseRun, current: &str) {
        run.plan(
            Vec::new(),
            Vec::new(),
            ChangeSet::default(),
            Version::parse(current).unwrap(),
            "abc123".to_string(),
            Some("main".to_string()),
            None,
            "alice",
            now(),
        )
        .unwrap();
    }

    #[test]
    fn happy_path_walks_every_transition() {
        let mut run = fresh_run();
        assert_eq!(run.state, RunState::Draft);
        plan_it(&mut run, "1.0.0");
        assert_eq!(run.state, RunState::Planned);

        run.bump(Version::parse("1.0.1").unwrap(), BumpKind::Patch, false, false, "alice", now())
            .unwrap();
        assert_eq!(run.state, RunState::Versioned);

        run.attach_notes(
            NotesArtifact { text: "notes".to_string(), generated_at: now() },
            "alice",
            now(),
        )
        .unwrap();
        assert_eq!(run.state, RunState::NotesReady);

        run.approve("decision-1".to_string(), 0.1, "alice", now()).unwrap();
        assert_eq!(run.state, RunState::Approved);

        run.publish_start("alice", now()).unwrap();
        assert_eq!(run.state, RunState::Publishing);

        run.publish_done(
            PublishResult {
                tag_name: "v1.0.1".to_string(),
                tag_created: true,
                tag_pushed: true,
                plugin_results: Vec::new(),
                succeeded: true,
                failure_reason: None,
            },
            "alice",
            now(),
        )
        .unwrap();
        assert_eq!(run.state, RunState::Published);
        assert!(run.is_terminal());
        assert_eq!(run.audit.len(), 6);
    }

    #[test]
    fn illegal_transition_is_rejected_and_state_unchanged() {
        let mut run = fresh_run();
        // bump() before plan() — Draft, not Planned.
        let err = run.bump(Version::parse("1.0.1").unwrap(), BumpKind::Patch, false, false, "alice", now());
        assert!(err.is_err());
        assert_eq!(run.state, RunState::Draft);
    }

    #[test]
    fn bump_rejects_zero_kind_without_force() {
        let mut run = fresh_run();
        plan_it(&mut run, "1.0.0");
        let err = run.bump(Version::parse("1.0.0").unwrap(), BumpKind::None, false, false, "alice", now());
        assert!(err.is_err());
        assert_eq!(run.state, RunState::Planned);
    }

    #[test]
    fn bump_allows_zero_kind_when_forced() {
        let mut run = fresh_run();
        plan_it(&mut run, "1.0.0");
        run.bump(Version::parse("5.0.0-beta.1").unwrap(), BumpKind::None, false, true, "alice", now())
            .unwrap();
        assert_eq!(run.state, RunState::Versioned);
        assert_eq!(run.bump_kind, BumpKind::None);
    }

    #[test]
    fn cancel_during_publishing_yields_failed_not_canceled() {
        let mut run = fresh_run();
        plan_it(&mut run, "1.0.0");
        run.bump(Version::parse("1.0.1").unwrap(), BumpKind::Patch, false, false, "alice", now())
            .unwrap();
        run.attach_notes(NotesArtifact { text: String::new(), generated_at: now() }, "alice", now())
            .unwrap();
        run.approve("d1".to_string(), 0.1, "alice", now()).unwrap();
        run.publish_start("alice", now()).unwrap();

        run.cancel("operator canceled mid-publish", "alice", now()).unwrap();
        assert_eq!(run.state, RunState::Failed);
    }

    #[test]
    fn reset_from_canceled_returns_to_draft_and_clears_fields() {
        let mut run = fresh_run();
        plan_it(&mut run, "1.0.0");
        run.cancel("no longer needed", "alice", now()).unwrap();
        assert_eq!(run.state, RunState::Canceled);

        run.reset("alice", now()).unwrap();
        assert_eq!(run.state, RunState::Draft);
        assert!(run.current_version.is_none());
        assert!(run.plan.is_none());
    }

    #[test]
    fn retry_publish_from_failed_returns_to_approved() {
        let mut run = fresh_run();
        plan_it(&mut run, "1.0.0");
        run.bump(Version::parse("1.0.1").unwrap(), BumpKind::Patch, false, false, "alice", now())
            .unwrap();
        run.attach_notes(NotesArtifact { text: String::new(), generated_at: now() }, "alice", now())
            .unwrap();
        run.approve("d1".to_string(), 0.1, "alice", now()).unwrap();
        run.publish_start("alice", now()).unwrap();
        run.publish_fail(None, "plugin timeout", "alice", now()).unwrap();
        assert_eq!(run.state, RunState::Failed);

        run.retry_publish("alice", now()).unwrap();
        assert_eq!(run.state, RunState::Approved);
    }

    #[test]
    fn cannot_cancel_a_terminal_run() {
        let mut run = fresh_run();
        plan_it(&mut run, "1.0.0");
        run.cancel("done", "alice", now()).unwrap();
        let err = run.cancel("again", "alice", now());
        assert!(err.is_err());
        assert_eq!(run.state, RunState::Canceled);
    }

    #[test]
    fn audit_trail_records_actor_and_reason_in_order() {
        let mut run = fresh_run();
        plan_it(&mut run, "1.0.0");
        run.cancel("no longer needed", "bob", now()).unwrap();
        assert_eq!(run.audit.len(), 2);
        assert_eq!(run.audit[0].new_state, RunState::Planned);
        assert_eq!(run.audit[1].new_state, RunState::Canceled);
        assert_eq!(run.audit[1].actor, "bob");
        assert_eq!(run.audit[1].reason, "no longer needed");
    }
}
