//! Version Calculator use case: given a repository and config,
//! produce current + next version deterministically. No wall-clock
//! influence — the same repository state always yields the same output.

use std::path::Path;

use relicta_config::Config;
use relicta_types::{BumpKind, Version};

use crate::aggregator::{categorize, derive_release_type, ChangeSet};
use crate::classifier::{classify_commits, AiClassifier, ManualOverride};
use crate::error::{CoreError, CoreResult};
use crate::git::{self, RawCommit};

/// Output of the version calculator.
#[derive(Debug, Clone)]
pub struct VersionCalculation {
    pub current: Version,
    pub next: Version,
    pub bump_kind: BumpKind,
    pub auto_detected: bool,
    pub commits: Vec<RawCommit>,
    pub change_set: ChangeSet,
}

/// Input to the calculator. `explicit_bump` takes priority over
/// commit-derived detection; when set, no commit analysis
/// runs at all (matches the `bump --force` CLI scenario).
pub struct VersionCalculatorInput<'a> {
    pub repo_root: &'a Path,
    pub tag_prefix: &'a str,
    pub explicit_version: Option<Version>,
    pub explicit_bump: Option<BumpKind>,
    pub prerelease_id: Option<&'a str>,
    pub ai: Option<&'a dyn AiClassifier>,
    pub overrides: &'a [ManualOverride],
}

/// Runs the calculator end to end.
pub fn calculate(input: &VersionCalculatorInput, config: &Config) -> CoreResult<VersionCalculation> {
    let current = discover_current_version(input.repo_root, input.tag_prefix)?;

    if let Some(explicit) = &input.explicit_version {
        return Ok(VersionCalculation {
            current: current.clone(),
            next: apply_prerelease(explicit.clone(), input.prerelease_id)?,
            bump_kind: BumpKind::None,
            auto_detected: false,
            commits: Vec::new(),
            change_set: ChangeSet::default(),
        });
    }

    let (bump_kind, change_set, commits) = if let Some(explicit_bump) = input.explicit_bump {
        // An explicit bump kind applies directly with no commit analysis
        // at all.
        (explicit_bump, ChangeSet::default(), Vec::new())
    } else {
        let since_tag = latest_tag_name(input.repo_root, input.tag_prefix)?;
        let commits = git::commits_since(input.repo_root, since_tag.as_deref())
            .map_err(|e| CoreError::Fatal(e.context("reading commit history")))?;
        let result = classify_commits(
            &commits,
            &config.classifier,
            |hash| git::changed_paths(input.repo_root, hash).unwrap_or_default(),
            input.ai,
            input.overrides,
        );
        let change_set = categorize(&commits, &result.classifications);
        let bump_kind = derive_release_type(&result.classifications, &current, &config.governance);
        (bump_kind, change_set, commits)
    };

    let bumped = current.bump(bump_kind);
    let next = apply_prerelease(bumped, input.prerelease_id)?;

    Ok(VersionCalculation {
        current,
        next,
        bump_kind,
        auto_detected: input.explicit_bump.is_none(),
        commits,
        change_set,
    })
}

fn apply_prerelease(version: Version, prerelease_id: Option<&str>) -> CoreResult<Version> {
    match prerelease_id {
        Some(id) => version
            .with_prerelease(id)
            .map_err(|e| CoreError::InvalidInput(e.to_string())),
        None => Ok(version),
    }
}

fn latest_tag_name(repo_root: &Path, prefix: &str) -> CoreResult<Option<String>> {
    git::latest_tag(repo_root, prefix)
        .map(|found| found.map(|(name, _commit)| name))
        .map_err(|e| CoreError::Fatal(e.context("discovering latest version tag")))
}

/// Step 1: discover the latest version tag whose name begins with
/// `prefix`, falling back to `0.0.0` if none exists.
pub fn discover_current_version(repo_root: &Path, prefix: &str) -> CoreResult<Version> {
    match latest_tag_name(repo_root, prefix)? {
        Some(name) => {
            let version_text = name.strip_prefix(prefix).unwrap_or(&name);
            Version::parse(version_text).map_err(|e| CoreError::InvalidInput(e.to_string()))
        }
        None => Ok(Version::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::process::Command;

    use serial_test::serial;
    use tempfile::tempdir;

    use super::*;

    fn init_repo() -> tempfile::TempDir {
        let td = tempdir().expect("tempdir");
        let run = |args: &[&str]| {
            assert!(Command::new("git").args(args).current_dir(td.path()).status().unwrap().success());
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "t@example.com"]);
        run(&["config", "user.name", "T"]);
        td
    }

    fn commit(td: &Path, file: &str, subject: &str) {
        fs::write(td.join(file), "x").unwrap();
        Command::new("git").args(["add", "."]).current_dir(td).status().unwrap();
        assert!(Command::new("git").args(["commit", "-q", "-m", subject]).current_dir(td).status().unwrap().success());
    }

    fn tag(td: &Path, name: &str) {
        assert!(Command::new("git").args(["tag", name]).current_dir(td).status().unwrap().success());
    }

    #[test]
    #[serial]
    fn falls_back_to_0_0_0_with_no_tags() {
        let td = init_repo();
        commit(td.path(), "a.txt", "feat: init");
        let version = discover_current_version(td.path(), "v").unwrap();
        assert_eq!(version, Version::ZERO);
    }

    #[test]
    #[serial]
    fn patch_derivation_scenario_from_spec() {
        let td = init_repo();
        commit(td.path(), "a.txt", "feat: init");
        tag(td.path(), "v1.2.3");
        commit(td.path(), "b.txt", "fix: null guard");

        let input = VersionCalculatorInput {
            repo_root: td.path(),
            tag_prefix: "v",
            explicit_version: None,
            explicit_bump: None,
            prerelease_id: None,
            ai: None,
            overrides: &[],
        };
        let calc = calculate(&input, &Config::default()).unwrap();
        assert_eq!(calc.current, Version::parse("1.2.3").unwrap());
        assert_eq!(calc.next, Version::parse("1.2.4").unwrap());
        assert_eq!(calc.bump_kind, BumpKind::Patch);
        assert!(calc.auto_detected);
    }

    #[test]
    #[serial]
    fn breaking_bang_scenario_from_spec() {
        let td = init_repo();
        commit(td.path(), "a.txt", "feat: init");
        tag(td.path(), "v1.2.3");
        commit(td.path(), "b.txt", "feat!: rename flag");

        let input = VersionCalculatorInput {
            repo_root: td.path(),
            tag_prefix: "v",
            explicit_version: None,
            explicit_bump: None,
            prerelease_id: None,
            ai: None,
            overrides: &[],
        };
        let calc = calculate(&input, &Config::default()).unwrap();
        assert_eq!(calc.next, Version::parse("2.0.0").unwrap());
        assert_eq!(calc.bump_kind, BumpKind::Major);
    }

    #[test]
    #[serial]
    fn forced_version_scenario_from_spec() {
        let td = init_repo();
        commit(td.path(), "a.txt", "feat: init");
        tag(td.path(), "v1.2.3");
        commit(td.path(), "b.txt", "chore: whatever");

        let input = VersionCalculatorInput {
            repo_root: td.path(),
            tag_prefix: "v",
            explicit_version: Some(Version::parse("5.0.0-beta.1").unwrap()),
            explicit_bump: None,
            prerelease_id: None,
            ai: None,
            overrides: &[],
        };
        let calc = calculate(&input, &Config::default()).unwrap();
        assert_eq!(calc.next, Version::parse("5.0.0-beta.1").unwrap());
        assert_eq!(calc.bump_kind, BumpKind::None);
        assert!(!calc.auto_detected);
        assert!(calc.commits.is_empty());
    }

    #[test]
    #[serial]
    fn deterministic_given_same_repo_state() {
        let td = init_repo();
        commit(td.path(), "a.txt", "feat: init");
        tag(td.path(), "v1.0.0");
        commit(td.path(), "b.txt", "fix: x");

        let input = VersionCalculatorInput {
            repo_root: td.path(),
            tag_prefix: "v",
            explicit_version: None,
            explicit_bump: None,
            prerelease_id: None,
            ai: None,
            overrides: &[],
        };
        let first = calculate(&input, &Config::default()).unwrap();
        let second = calculate(&input, &Config::default()).unwrap();
        assert_eq!(first.next, second.next);
        assert_eq!(first.bump_kind, second.bump_kind);
    }
}
