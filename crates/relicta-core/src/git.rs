//! Shell-out git operations: reading commit history, tag discovery, and
//! the two tag-writing operations the Publish Pipeline is allowed to
//! perform. The core never links `git2` or rewrites history; it
//! drives the `git` binary directly and parses its plain-text output.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// One raw commit as read from `git log`, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommit {
    pub hash: String,
    pub short_hash: String,
    pub subject: String,
    pub body: String,
}

fn git_program() -> String {
    std::env::var("RELICTA_GIT_BIN").unwrap_or_else(|_| "git".to_string())
}

fn run_git(repo_root: &Path, args: &[&str]) -> Result<std::process::Output> {
    Command::new(git_program())
        .args(args)
        .current_dir(repo_root)
        .output()
        .with_context(|| format!("failed to execute git {}; is git installed?", args.join(" ")))
}

/// Is the working tree clean (`git status --porcelain` empty)?
pub fn is_clean(repo_root: &Path) -> Result<bool> {
    let out = run_git(repo_root, &["status", "--porcelain"])?;
    if !out.status.success() {
        bail!("git status failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().is_empty())
}

/// The commit hash at `HEAD`.
pub fn head_commit(repo_root: &Path) -> Result<String> {
    let out = run_git(repo_root, &["rev-parse", "HEAD"])?;
    if !out.status.success() {
        bail!("git rev-parse HEAD failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// The current branch name, or `None` in a detached HEAD state.
pub fn current_branch(repo_root: &Path) -> Result<Option<String>> {
    let out = run_git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if !out.status.success() {
        bail!("git rev-parse --abbrev-ref failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    }
    let branch = String::from_utf8_lossy(&out.stdout).trim().to_string();
    Ok(if branch == "HEAD" { None } else { Some(branch) })
}

/// The canonical remote URL for `origin`, used as the repository identity.
pub fn remote_url(repo_root: &Path, remote: &str) -> Result<Option<String>> {
    let out = run_git(repo_root, &["remote", "get-url", remote]);
    let out = match out {
        Ok(o) => o,
        Err(_) => return Ok(None),
    };
    if !out.status.success() {
        return Ok(None);
    }
    let url = String::from_utf8_lossy(&out.stdout).trim().to_string();
    Ok(if url.is_empty() { None } else { Some(url) })
}

const RECORD_SEP: &str = "\u{1e}"; // ASCII record separator, never appears in commit text
const FIELD_SEP: &str = "\u{1f}"; // ASCII unit separator

/// List commits in `(since_tag, HEAD]`, oldest first. `since_tag = None`
/// lists the entire history reachable from `HEAD`.
pub fn commits_since(repo_root: &Path, since_tag: Option<&str>) -> Result<Vec<RawCommit>> {
    let range = match since_tag {
        Some(tag) => format!("{tag}..HEAD"),
        None => "HEAD".to_string(),
    };
    let format = format!("%H{FIELD_SEP}%h{FIELD_SEP}%s{FIELD_SEP}%b{RECORD_SEP}");
    let out = run_git(repo_root, &["log", "--reverse", &format!("--pretty=format:{format}"), &range])?;
    if !out.status.success() {
        bail!("git log failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    }
    let text = String::from_utf8_lossy(&out.stdout);
    let mut commits = Vec::new();
    for record in text.split(RECORD_SEP) {
        let record = record.trim_start_matches('\n');
        if record.is_empty() {
            continue;
        }
        let mut fields = record.splitn(4, FIELD_SEP);
        let hash = fields.next().unwrap_or_default().to_string();
        let short_hash = fields.next().unwrap_or_default().to_string();
        let subject = fields.next().unwrap_or_default().to_string();
        let body = fields.next().unwrap_or_default().trim_end().to_string();
        if hash.is_empty() {
            continue;
        }
        commits.push(RawCommit { hash, short_hash, subject, body });
    }
    Ok(commits)
}

/// Which file paths a commit touched, categorized is left to the caller
/// (the AST/diff classifier layer); this returns the raw changed paths.
pub fn changed_paths(repo_root: &Path, commit_hash: &str) -> Result<Vec<String>> {
    let out = run_git(
        repo_root,
        &["diff-tree", "--no-commit-id", "--name-only", "-r", commit_hash],
    )?;
    if !out.status.success() {
        bail!("git diff-tree failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    }
    Ok(String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// The most recent tag (by creation order on the current branch) whose
/// name starts with `prefix`, along with the commit it points at.
pub fn latest_tag(repo_root: &Path, prefix: &str) -> Result<Option<(String, String)>> {
    let out = run_git(repo_root, &["tag", "--list", &format!("{prefix}*"), "--sort=-creatordate"])?;
    if !out.status.success() {
        bail!("git tag --list failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    }
    let name = match String::from_utf8_lossy(&out.stdout).lines().next() {
        Some(n) if !n.trim().is_empty() => n.trim().to_string(),
        _ => return Ok(None),
    };
    let commit_out = run_git(repo_root, &["rev-list", "-n", "1", &name])?;
    if !commit_out.status.success() {
        bail!("git rev-list failed for tag {name}");
    }
    let commit = String::from_utf8_lossy(&commit_out.stdout).trim().to_string();
    Ok(Some((name, commit)))
}

/// What commit (if any) an existing tag points at, and its annotation message.
pub fn tag_info(repo_root: &Path, tag_name: &str) -> Result<Option<(String, String)>> {
    let exists = run_git(repo_root, &["rev-parse", "-q", "--verify", &format!("refs/tags/{tag_name}")])?;
    if !exists.status.success() {
        return Ok(None);
    }
    let commit_out = run_git(repo_root, &["rev-list", "-n", "1", tag_name])?;
    let commit = String::from_utf8_lossy(&commit_out.stdout).trim().to_string();
    let msg_out = run_git(repo_root, &["tag", "-l", "--format=%(contents:subject)", tag_name])?;
    let message = String::from_utf8_lossy(&msg_out.stdout).trim().to_string();
    Ok(Some((commit, message)))
}

/// Creates an annotated tag at `HEAD`. Idempotence is decided by the caller via
/// [`tag_info`]; this always creates (or, with `force`, overwrites).
pub fn create_annotated_tag(repo_root: &Path, name: &str, message: &str, force: bool) -> Result<()> {
    let mut args = vec!["tag", "-a", name, "-m", message];
    if force {
        args.push("--force");
    }
    let out = run_git(repo_root, &args)?;
    if !out.status.success() {
        bail!("git tag failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    }
    Ok(())
}

/// Pushes a single tag to `remote`. Transient network failures are the
/// caller's retry concern; this surfaces raw success/failure.
pub fn push_tag(repo_root: &Path, remote: &str, tag_name: &str) -> Result<()> {
    let out = run_git(repo_root, &["push", remote, tag_name])?;
    if !out.status.success() {
        bail!("git push failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    }
    Ok(())
}
