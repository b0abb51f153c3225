//! BDD-style coverage of `init`, `plan`, and `bump` against concrete
//! version-derivation scenarios (patch derivation, breaking-change-via-`!`,
//! forced version), plus CLI argument validation.

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

fn init_repo(root: &Path) -> std::path::PathBuf {
    let repo = root.join("work");
    fs::create_dir_all(&repo).expect("mkdir");
    run_git(&repo, &["init", "-q"]);
    run_git(&repo, &["config", "user.email", "releaser@example.com"]);
    run_git(&repo, &["config", "user.name", "Releaser"]);
    repo
}

fn commit(repo: &Path, file: &str, subject: &str) {
    fs::write(repo.join(file), "x\n").expect("write");
    run_git(repo, &["add", "."]);
    run_git(repo, &["commit", "-q", "-m", subject]);
}

fn tag(repo: &Path, name: &str) {
    run_git(repo, &["tag", name]);
}

fn relicta() -> Command {
    Command::cargo_bin("relicta").expect("relicta binary built")
}

#[test]
fn given_no_tags_when_planning_then_current_version_falls_back_to_zero() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());
    commit(&repo, "a.txt", "feat: first feature");

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("plan")
        .assert()
        .success()
        .stdout(contains("\"current_version\": \"0.0.0\""));
}

#[test]
fn given_a_fix_commit_since_the_last_tag_when_planning_then_patch_is_derived() {
    // repo at v1.2.3, commits ["fix: null guard"] -> next=1.2.4.
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());
    commit(&repo, "a.txt", "feat: init");
    tag(&repo, "v1.2.3");
    commit(&repo, "b.txt", "fix: null guard");

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("plan")
        .assert()
        .success()
        .stdout(contains("\"current_version\": \"1.2.3\""))
        .stdout(contains("\"release_type\": \"patch\""));

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("bump")
        .assert()
        .success()
        .stdout(contains("\"next_version\": \"1.2.4\""))
        .stdout(contains("\"bump_type\": \"patch\""))
        .stdout(contains("\"auto_detected\": true"));
}

#[test]
fn given_a_bang_breaking_commit_when_planning_then_major_is_derived_on_a_stable_version() {
    // stable half: feat!: rename flag from v1.2.3 -> major, next=2.0.0.
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());
    commit(&repo, "a.txt", "feat: init");
    tag(&repo, "v1.2.3");
    commit(&repo, "b.txt", "feat!: rename flag");

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("plan")
        .assert()
        .success()
        .stdout(contains("\"release_type\": \"major\""));

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("bump")
        .assert()
        .success()
        .stdout(contains("\"next_version\": \"2.0.0\""))
        .stdout(contains("\"bump_type\": \"major\""));
}

#[test]
fn given_a_non_breaking_feature_pre_1_0_when_planning_then_minor_is_derived_not_major() {
    // pre-1.0 half: feat commit on v0.9.0 -> next=0.10.0.
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());
    commit(&repo, "a.txt", "feat: init");
    tag(&repo, "v0.9.0");
    commit(&repo, "b.txt", "feat: add widget");

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("bump")
        .assert()
        .success()
        .stdout(contains("\"next_version\": \"0.10.0\""))
        .stdout(contains("\"bump_type\": \"minor\""));
}

#[test]
fn given_an_explicit_version_when_bumping_with_force_then_no_commit_analysis_runs() {
    // bump --force 5.0.0-beta.1 on v1.2.3 -> tag v5.0.0-beta.1, bump_kind none.
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());
    commit(&repo, "a.txt", "feat: init");
    tag(&repo, "v1.2.3");
    commit(&repo, "b.txt", "chore: whatever");

    relicta().current_dir(&repo).arg("plan").assert().success();

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("bump")
        .arg("--version")
        .arg("5.0.0-beta.1")
        .arg("--force")
        .assert()
        .success()
        .stdout(contains("\"next_version\": \"5.0.0-beta.1\""))
        .stdout(contains("\"tag_name\": \"v5.0.0-beta.1\""))
        .stdout(contains("\"bump_type\": \"none\""))
        .stdout(contains("\"auto_detected\": false"));
}

#[test]
fn given_an_invalid_version_string_when_bumping_then_the_command_fails_with_invalid_input_exit_code() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());
    commit(&repo, "a.txt", "feat: init");

    relicta().current_dir(&repo).arg("plan").assert().success();

    relicta()
        .current_dir(&repo)
        .arg("bump")
        .arg("--version")
        .arg("not-a-version")
        .assert()
        .failure()
        .code(3);
}

#[test]
fn given_no_active_run_when_bumping_then_not_found_is_reported() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());
    commit(&repo, "a.txt", "feat: init");

    relicta()
        .current_dir(&repo)
        .arg("bump")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("no active release run"));
}

#[test]
fn given_a_second_plan_while_one_is_already_planned_then_active_run_conflict_is_reported() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());
    commit(&repo, "a.txt", "feat: init");

    relicta().current_dir(&repo).arg("plan").assert().success();

    relicta()
        .current_dir(&repo)
        .arg("plan")
        .assert()
        .failure()
        .code(4)
        .stderr(contains("relicta cancel"));
}

#[test]
fn given_a_run_reset_from_canceled_when_planning_again_then_it_succeeds_instead_of_conflicting() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());
    commit(&repo, "a.txt", "feat: init");

    relicta().current_dir(&repo).arg("plan").assert().success();
    relicta().current_dir(&repo).arg("cancel").assert().success();
    relicta().current_dir(&repo).arg("reset").assert().success();

    relicta()
        .current_dir(&repo)
        .arg("--json")
        .arg("plan")
        .assert()
        .success()
        .stdout(contains("\"release_id\""));
}

#[test]
fn given_no_config_file_when_init_runs_then_it_writes_a_default_one() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());

    relicta()
        .current_dir(&repo)
        .arg("init")
        .assert()
        .success()
        .stdout(contains(".relicta.toml"));

    assert!(repo.join(".relicta.toml").exists());
}

#[test]
fn given_an_existing_config_file_when_init_runs_without_force_then_it_refuses_to_overwrite() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());

    relicta().current_dir(&repo).arg("init").assert().success();

    relicta()
        .current_dir(&repo)
        .arg("init")
        .assert()
        .failure()
        .code(3)
        .stderr(contains("--force"));
}

#[test]
fn given_an_unknown_log_level_when_parsing_args_then_clap_rejects_the_value() {
    let td = tempdir().expect("tempdir");
    let repo = init_repo(td.path());

    relicta()
        .current_dir(&repo)
        .arg("--log-level")
        .arg("verbose")
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("possible values"));
}
