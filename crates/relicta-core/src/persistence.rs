//! Durable storage for release runs and the two append-only governance
//! logs. Writers hold [`RepoLock`] for the duration of a save;
//! readers are lock-free and rely on the atomic rename contract.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use relicta_types::RunState;
use serde::{Deserialize, Serialize};

use crate::governance::{ExecutionAuthorization, GovernanceDecision};
use crate::run::ReleaseRun;

pub const RELICTA_DIR: &str = ".relicta";
pub const RUN_SCHEMA_VERSION: &str = "relicta.run.v1";
const LOCK_FILE: &str = "lock";
const DECISIONS_LOG: &str = "decisions.log";
const AUTHORIZATIONS_LOG: &str = "authorizations.log";

/// The on-disk envelope around a [`ReleaseRun`], carrying the schema tag
///.
#[derive(Debug, Serialize, Deserialize)]
struct RunDocument {
    schema_version: String,
    run: ReleaseRun,
}

pub(crate) fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(value).context("failed to serialize JSON document")?;
    {
        let mut file = File::create(&tmp_path).with_context(|| format!("failed to create {}", tmp_path.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        file.sync_all().context("failed to fsync temporary file")?;
    }
    fs::rename(&tmp_path, path).with_context(|| format!("failed to rename into place: {}", path.display()))?;
    Ok(())
}

fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let line = serde_json::to_string(value).context("failed to serialize log record")?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("failed to append to {}", path.display()))?;
    file.sync_all().context("failed to fsync log file")?;
    Ok(())
}

fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| serde_json::from_str(line).with_context(|| format!("corrupt record in {}", path.display())))
        .collect()
}

/// The run store rooted at `<repo>/.relicta`.
pub struct RunStore {
    base_dir: PathBuf,
}

impl RunStore {
    pub fn new(repo_root: &Path) -> Self {
        Self { base_dir: repo_root.join(RELICTA_DIR) }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn runs_dir(&self) -> PathBuf {
        self.base_dir.join("runs")
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.json"))
    }

    fn decisions_log_path(&self) -> PathBuf {
        self.base_dir.join(DECISIONS_LOG)
    }

    fn authorizations_log_path(&self) -> PathBuf {
        self.base_dir.join(AUTHORIZATIONS_LOG)
    }

    /// Atomically writes `run` to `runs/<runId>.json`.
    pub fn save(&self, run: &ReleaseRun) -> Result<()> {
        let document = RunDocument { schema_version: RUN_SCHEMA_VERSION.to_string(), run: run.clone() };
        atomic_write_json(&self.run_path(&run.run_id), &document)
    }

    /// Loads a run by id. Returns `Ok(None)` if it has never been saved.
    pub fn load(&self, run_id: &str) -> Result<Option<ReleaseRun>> {
        let path = self.run_path(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let document: RunDocument =
            serde_json::from_str(&content).with_context(|| format!("failed to parse run document {}", path.display()))?;
        if document.schema_version != RUN_SCHEMA_VERSION {
            bail!(
                "unsupported run schema version {} in {} (expected {RUN_SCHEMA_VERSION})",
                document.schema_version,
                path.display()
            );
        }
        Ok(Some(document.run))
    }

    /// Lists every persisted run id, unordered.
    pub fn list_run_ids(&self) -> Result<Vec<String>> {
        let dir = self.runs_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))? {
            let entry = entry?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// All runs whose state is not terminal.
    pub fn list_active(&self) -> Result<Vec<ReleaseRun>> {
        let mut active = Vec::new();
        for id in self.list_run_ids()? {
            if let Some(run) = self.load(&id)? {
                if !run.is_terminal() {
                    active.push(run);
                }
            }
        }
        Ok(active)
    }

    /// The single active (non-terminal) run for this repository, if any.
    /// More than one would violate the at-most-one-active invariant;
    /// that invariant is enforced at creation time (see [`RunStore::find_active_run`]
    /// callers), so this simply returns the first one found.
    pub fn find_active_run(&self) -> Result<Option<ReleaseRun>> {
        Ok(self.list_active()?.into_iter().next())
    }

    /// Every run in a given state, most useful for `findByState(Failed)`
    /// style lookups.
    pub fn find_by_state(&self, state: RunState) -> Result<Vec<ReleaseRun>> {
        let mut matches = Vec::new();
        for id in self.list_run_ids()? {
            if let Some(run) = self.load(&id)? {
                if run.state == state {
                    matches.push(run);
                }
            }
        }
        Ok(matches)
    }

    /// The most recently updated run for this repository, regardless of state.
    pub fn load_latest(&self) -> Result<Option<ReleaseRun>> {
        let mut latest: Option<ReleaseRun> = None;
        for id in self.list_run_ids()? {
            if let Some(run) = self.load(&id)? {
                match &latest {
                    Some(current) if current.updated_at >= run.updated_at => {}
                    _ => latest = Some(run),
                }
            }
        }
        Ok(latest)
    }

    pub fn delete(&self, run_id: &str) -> Result<()> {
        let path = self.run_path(run_id);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("failed to delete {}", path.display()))?;
        }
        Ok(())
    }

    pub fn append_decision(&self, decision: &GovernanceDecision) -> Result<()> {
        append_jsonl(&self.decisions_log_path(), decision)
    }

    pub fn append_authorization(&self, authorization: &ExecutionAuthorization) -> Result<()> {
        append_jsonl(&self.authorizations_log_path(), authorization)
    }

    pub fn get_decision(&self, decision_id: &str) -> Result<Option<GovernanceDecision>> {
        let decisions: Vec<GovernanceDecision> = read_jsonl(&self.decisions_log_path())?;
        Ok(decisions.into_iter().find(|d| d.decision_id == decision_id))
    }

    pub fn get_decisions_by_run(&self, run_id: &str) -> Result<Vec<GovernanceDecision>> {
        let decisions: Vec<GovernanceDecision> = read_jsonl(&self.decisions_log_path())?;
        Ok(decisions.into_iter().filter(|d| d.run_id == run_id).collect())
    }

    pub fn get_authorization(&self, authorization_id: &str) -> Result<Option<ExecutionAuthorization>> {
        let authorizations: Vec<ExecutionAuthorization> = read_jsonl(&self.authorizations_log_path())?;
        Ok(authorizations.into_iter().find(|a| a.authorization_id == authorization_id))
    }

    /// Most recent (by position in the append-only log) authorization
    /// tied to `decision_id`.
    pub fn get_authorization_by_decision(&self, decision_id: &str) -> Result<Option<ExecutionAuthorization>> {
        let authorizations: Vec<ExecutionAuthorization> = read_jsonl(&self.authorizations_log_path())?;
        Ok(authorizations.into_iter().rev().find(|a| a.decision_id == decision_id))
    }
}

/// Information recorded in the exclusive advisory lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    hostname: String,
    acquired_at: chrono::DateTime<Utc>,
    run_id: Option<String>,
}

/// Exclusive advisory lock over `<repo>/.relicta`, held for the duration
/// of a save. Released on drop.
pub struct RepoLock {
    path: PathBuf,
}

impl RepoLock {
    /// Acquires the lock, failing immediately if it's already held.
    pub fn acquire(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir).with_context(|| format!("failed to create {}", base_dir.display()))?;
        let lock_path = base_dir.join(LOCK_FILE);
        if lock_path.exists() {
            let info = read_lock_info(&lock_path)?;
            bail!("lock already held by pid {} on {} since {}", info.pid, info.hostname, info.acquired_at);
        }
        write_lock_info(&lock_path, None)?;
        Ok(Self { path: lock_path })
    }

    /// Acquires the lock, treating it as abandoned if held for longer
    /// than `stale_after`.
    pub fn acquire_with_timeout(base_dir: &Path, stale_after: Duration) -> Result<Self> {
        let lock_path = base_dir.join(LOCK_FILE);
        if lock_path.exists() {
            match read_lock_info(&lock_path) {
                Ok(info) => {
                    let age = Utc::now() - info.acquired_at;
                    if age.num_seconds().unsigned_abs() > stale_after.as_secs() {
                        fs::remove_file(&lock_path)
                            .with_context(|| format!("failed to remove stale lock {}", lock_path.display()))?;
                    } else {
                        bail!("lock already held by pid {} on {} (age {:?})", info.pid, info.hostname, age);
                    }
                }
                Err(_) => {
                    fs::remove_file(&lock_path)
                        .with_context(|| format!("failed to remove corrupt lock {}", lock_path.display()))?;
                }
            }
        }
        Self::acquire(base_dir)
    }

    pub fn release(&mut self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).with_context(|| format!("failed to remove lock {}", self.path.display()))?;
        }
        Ok(())
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

fn write_lock_info(path: &Path, run_id: Option<String>) -> Result<()> {
    let info = LockInfo {
        pid: std::process::id(),
        hostname: gethostname::gethostname().to_string_lossy().to_string(),
        acquired_at: Utc::now(),
        run_id,
    };
    atomic_write_json(path, &info)
}

fn read_lock_info(path: &Path) -> Result<LockInfo> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read lock {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse lock JSON {}", path.display()))
}
