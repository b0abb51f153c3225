//! BDD-style coverage of the governance gate and the publish pipeline's
//! failure modes: approval-required without `--yes`, re-approving an
//! already-approved run, publishing out of state, and a tag collision
//! that demands `--force`.

use std::fs;
use std::path::Path;
use std::process::Command as StdCommand;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

fn run_git(repo: &Path, args: &[&str]) {
    let status = StdCommand::new("git").args(args).current_dir(repo).status().expect("git invocation");
    assert!(status.success(), "git {args:?} failed in {}", repo.display());
}

fn git_head(repo: &Path) -> String {
    let out = StdCommand::new("git").args(["rev-parse", "HEAD"]).current_dir(repo).output().expect("rev-parse");
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn init_repo_with_origin(root: &Path) -> std::path::PathBuf {
    let bare = root.join("origin.git");
    StdCommand::new("git").args(["init", "--bare", "-q"]).arg(&bare).status().expect("git init --bare");

    let repo = root.join("work");
    fs::create_dir_all(&repo).expect("mkdir work");
    run_git(&repo, &["init", "-q"]);
    run_git(&repo, &["config", "user.email", "releaser@example.com"]);
    run_git(&repo, &["config", "user.name", "Releaser"]);
    run_git(&repo, &["remote", "add", "origin", bare.to_str().unwrap()]);

    fs::write(repo.join("README.md"), "hello\n").expect("write readme");
    run_git(&repo, &["add", "."]);
    run_git(&repo, &["commit", "-q", "-m", "feat: initial release"]);
    run_git(&repo, &["tag", "-a", "v1.2.3", "-m", "Release 1.2.3"]);
    run_git(&repo, &["push", "origin", "HEAD:main"]);

    repo
}

/// Writes and commits `n` distinct breaking-change commits, enough to
/// saturate the size factor and guarantee
/// the breakage factor. Combined with the neutral defaults `approve`
/// uses for the two factors it can't compute (critical-files ratio,
/// test-coverage delta) and a brand-new actor/repository with no
/// recorded history, this reliably lands in the High severity band,
/// which `derive_outcome` maps to `ApprovalRequired`.
fn commit_many_breaking_changes(repo: &Path, n: usize) {
    for i in 0..n {
        let file = format!("change-{i}.txt");
        fs::write(repo.join(&file), format!("{i}\n")).expect("write");
        run_git(repo, &["add", "."]);
        run_git(repo, &["commit", "-q", "-m", &format!("feat!: breaking change {i}")]);
    }
}

fn relicta() -> Command {
    Command::cargo_bin("relicta").expect("relicta binary built")
}

#[test]
fn approval_required_outcome_without_yes_reports_authorization_required() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo_with_origin(td.path());
    commit_many_breaking_changes(&repo, 20);

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("plan")
        .assert()
        .success()
        .stdout(contains("\"severity\": \"high\""));

    relicta().current_dir(&repo).arg("bump").assert().success();
    relicta().current_dir(&repo).arg("notes").assert().success();

    relicta()
        .current_dir(&repo)
        .arg("approve")
        .assert()
        .failure()
        .code(5)
        .stderr(contains("approve --yes"));

    // The governance decision is recorded even though the run wasn't approved.
    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("status")
        .assert()
        .success()
        .stdout(contains("\"state\": \"NotesReady\""));

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("approve")
        .arg("--yes")
        .assert()
        .success()
        .stdout(contains("\"state\": \"Approved\""));
}

#[test]
fn approving_an_already_approved_run_is_rejected_as_a_state_violation() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo_with_origin(td.path());

    fs::write(repo.join("fix.txt"), "guard\n").expect("write");
    run_git(&repo, &["add", "."]);
    run_git(&repo, &["commit", "-q", "-m", "fix: null guard"]);

    relicta().current_dir(&repo).arg("plan").assert().success();
    relicta().current_dir(&repo).arg("bump").assert().success();
    relicta().current_dir(&repo).arg("notes").assert().success();
    relicta().current_dir(&repo).arg("approve").arg("--yes").assert().success();

    relicta()
        .current_dir(&repo)
        .arg("approve")
        .arg("--yes")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("illegal transition"));
}

#[test]
fn publishing_a_run_that_has_not_been_approved_is_rejected_as_a_state_violation() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo_with_origin(td.path());

    fs::write(repo.join("fix.txt"), "guard\n").expect("write");
    run_git(&repo, &["add", "."]);
    run_git(&repo, &["commit", "-q", "-m", "fix: null guard"]);

    relicta().current_dir(&repo).arg("plan").assert().success();
    relicta().current_dir(&repo).arg("bump").assert().success();
    relicta().current_dir(&repo).arg("notes").assert().success();

    relicta()
        .current_dir(&repo)
        .arg("publish")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("illegal transition"));
}

#[test]
fn a_preexisting_tag_pointing_elsewhere_blocks_publish_until_force_is_passed() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo_with_origin(td.path());
    let v1_2_3_commit = git_head(&repo);

    fs::write(repo.join("fix.txt"), "guard\n").expect("write");
    run_git(&repo, &["add", "."]);
    run_git(&repo, &["commit", "-q", "-m", "fix: null guard"]);

    relicta().current_dir(&repo).arg("plan").assert().success();
    relicta().current_dir(&repo).arg("bump").assert().success();
    relicta().current_dir(&repo).arg("notes").assert().success();
    relicta().current_dir(&repo).arg("approve").arg("--yes").assert().success();

    // Someone else already created v1.2.4 pointing at the old commit.
    run_git(&repo, &["tag", "-a", "v1.2.4", "-m", "a different release", &v1_2_3_commit]);

    relicta()
        .current_dir(&repo)
        .arg("publish")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("--force"));

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("publish")
        .arg("--force")
        .assert()
        .success()
        .stdout(contains("\"tag_name\": \"v1.2.4\""));

    let tags = StdCommand::new("git")
        .args(["ls-remote", "--tags", "origin"])
        .current_dir(&repo)
        .output()
        .expect("ls-remote");
    assert!(String::from_utf8_lossy(&tags.stdout).contains("v1.2.4"));
}
