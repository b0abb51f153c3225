//! Change Aggregator & release-type rule. Given classifications,
//! determine the implied bump kind by the first-match table, and group
//! commits into categorized buckets for note rendering.

use relicta_config::GovernanceConfig;
use relicta_types::{BumpKind, CommitType, Version};

use crate::classifier::Classification;
use crate::git::RawCommit;

/// One rendered changelog entry: the commit plus its classification,
/// kept paired so note rendering can show hash, scope, and subject.
#[derive(Debug, Clone)]
pub struct ChangeEntry {
    pub commit: RawCommit,
    pub classification: Classification,
}

/// Classified commits grouped into buckets for release-note rendering.
/// Ordering within a bucket preserves commit order.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub features: Vec<ChangeEntry>,
    pub fixes: Vec<ChangeEntry>,
    pub perf: Vec<ChangeEntry>,
    pub docs: Vec<ChangeEntry>,
    pub refactors: Vec<ChangeEntry>,
    pub tests: Vec<ChangeEntry>,
    pub chores: Vec<ChangeEntry>,
    pub build: Vec<ChangeEntry>,
    pub ci: Vec<ChangeEntry>,
    pub other: Vec<ChangeEntry>,
    pub breaking: Vec<ChangeEntry>,
    pub skipped: Vec<ChangeEntry>,
}

impl ChangeSet {
    pub fn total_non_skipped(&self) -> usize {
        self.features.len()
            + self.fixes.len()
            + self.perf.len()
            + self.docs.len()
            + self.refactors.len()
            + self.tests.len()
            + self.chores.len()
            + self.build.len()
            + self.ci.len()
            + self.other.len()
    }
}

/// Categorizes classified commits into the buckets above. A breaking
/// commit is filed under both `breaking` and its type-specific bucket so
/// note rendering can show it in both the "Breaking Changes" section and
/// its natural category.
pub fn categorize(commits: &[RawCommit], classifications: &[Classification]) -> ChangeSet {
    let mut set = ChangeSet::default();
    for (commit, classification) in commits.iter().zip(classifications.iter()) {
        let entry = ChangeEntry {
            commit: commit.clone(),
            classification: classification.clone(),
        };

        if classification.should_skip {
            set.skipped.push(entry);
            continue;
        }

        if classification.is_breaking {
            set.breaking.push(entry.clone());
        }

        match classification.commit_type {
            CommitType::Feat => set.features.push(entry),
            CommitType::Fix => set.fixes.push(entry),
            CommitType::Perf => set.perf.push(entry),
            CommitType::Docs => set.docs.push(entry),
            CommitType::Refactor => set.refactors.push(entry),
            CommitType::Test => set.tests.push(entry),
            CommitType::Chore | CommitType::Style | CommitType::Revert => set.chores.push(entry),
            CommitType::Build => set.build.push(entry),
            CommitType::Ci => set.ci.push(entry),
            CommitType::Unknown => set.other.push(entry),
        }
    }
    set
}

/// The release-type rule: first match wins.
///
/// - any non-skipped breaking change → major (or minor pre-1.0, per policy)
/// - any non-skipped `feat` → minor
/// - any non-skipped `fix`/`perf` → patch
/// - otherwise → none
///
/// `current_version` decides whether the pre-1.0 breaking policy
///) applies; `governance.pre_1_0_breaking_is_minor`
/// is the policy switch, defaulting to `true`.
pub fn derive_release_type(
    classifications: &[Classification],
    current_version: &Version,
    governance: &GovernanceConfig,
) -> BumpKind {
    let has_breaking = classifications.iter().any(|c| c.is_breaking && !c.should_skip);
    let has_feat = classifications
        .iter()
        .any(|c| c.commit_type == CommitType::Feat && !c.should_skip);
    let has_fix_or_perf = classifications
        .iter()
        .any(|c| matches!(c.commit_type, CommitType::Fix | CommitType::Perf) && !c.should_skip);

    if has_breaking {
        if !current_version.is_stable() && governance.pre_1_0_breaking_is_minor {
            return BumpKind::Minor;
        }
        return BumpKind::Major;
    }
    if has_feat {
        return BumpKind::Minor;
    }
    if has_fix_or_perf {
        return BumpKind::Patch;
    }
    BumpKind::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify_commits, ManualOverride};

    fn raw(hash: &str, subject: &str) -> RawCommit {
        RawCommit {
            hash: hash.to_string(),
            short_hash: hash.to_string(),
            subject: subject.to_string(),
            body: String::new(),
        }
    }

    fn classify(subjects: &[(&str, &str)]) -> (Vec<RawCommit>, Vec<Classification>) {
        let commits: Vec<RawCommit> = subjects.iter().map(|(h, s)| raw(h, s)).collect();
        let result = classify_commits(
            &commits,
            &relicta_config::ClassifierConfig::default(),
            |_| Vec::new(),
            None,
            &[] as &[ManualOverride],
        );
        (commits, result.classifications)
    }

    #[test]
    fn breaking_change_yields_major_on_stable_version() {
        let (_commits, classifications) = classify(&[("a", "feat!: rename")]);
        let current = Version::parse("1.2.3").unwrap();
        let bump = derive_release_type(&classifications, &current, &GovernanceConfig::default());
        assert_eq!(bump, BumpKind::Major);
    }

    #[test]
    fn breaking_change_yields_minor_pre_1_0_by_default() {
        let (_commits, classifications) = classify(&[("a", "feat!: rename")]);
        let current = Version::parse("0.9.0").unwrap();
        let bump = derive_release_type(&classifications, &current, &GovernanceConfig::default());
        assert_eq!(bump, BumpKind::Minor);
    }

    #[test]
    fn feat_yields_minor() {
        let (_commits, classifications) = classify(&[("a", "feat: add thing")]);
        let current = Version::parse("1.0.0").unwrap();
        let bump = derive_release_type(&classifications, &current, &GovernanceConfig::default());
        assert_eq!(bump, BumpKind::Minor);
    }

    #[test]
    fn fix_yields_patch() {
        let (_commits, classifications) = classify(&[("a", "fix: null guard")]);
        let current = Version::parse("1.0.0").unwrap();
        let bump = derive_release_type(&classifications, &current, &GovernanceConfig::default());
        assert_eq!(bump, BumpKind::Patch);
    }

    #[test]
    fn docs_only_yields_none() {
        let (_commits, classifications) = classify(&[("a", "docs: update readme")]);
        let current = Version::parse("1.0.0").unwrap();
        let bump = derive_release_type(&classifications, &current, &GovernanceConfig::default());
        assert_eq!(bump, BumpKind::None);
    }

    #[test]
    fn breaking_beats_feat_beats_fix() {
        let (_commits, classifications) =
            classify(&[("a", "fix: x"), ("b", "feat: y"), ("c", "feat!: z")]);
        let current = Version::parse("1.0.0").unwrap();
        let bump = derive_release_type(&classifications, &current, &GovernanceConfig::default());
        assert_eq!(bump, BumpKind::Major);
    }

    #[test]
    fn categorize_puts_breaking_commit_in_both_buckets() {
        let (commits, classifications) = classify(&[("a", "feat!: rename flag")]);
        let set = categorize(&commits, &classifications);
        assert_eq!(set.features.len(), 1);
        assert_eq!(set.breaking.len(), 1);
    }

    #[test]
    fn categorize_preserves_commit_order_within_bucket() {
        let (commits, classifications) = classify(&[("a", "fix: first"), ("b", "fix: second")]);
        let set = categorize(&commits, &classifications);
        assert_eq!(set.fixes[0].commit.hash, "a");
        assert_eq!(set.fixes[1].commit.hash, "b");
    }

    #[test]
    fn skipped_commits_are_excluded_from_release_type() {
        let commits = vec![raw("a", "fix: x")];
        let result = classify_commits(
            &commits,
            &relicta_config::ClassifierConfig::default(),
            |_| Vec::new(),
            None,
            &[ManualOverride {
                commit_hash: "a".to_string(),
                commit_type: CommitType::Fix,
                is_breaking: false,
                should_skip: true,
                reasoning: "noise".to_string(),
            }],
        );
        let current = Version::parse("1.0.0").unwrap();
        let bump = derive_release_type(&result.classifications, &current, &GovernanceConfig::default());
        assert_eq!(bump, BumpKind::None);
    }

    fn synthetic_classification(commit_type: CommitType, is_breaking: bool, should_skip: bool) -> Classification {
        Classification {
            commit_hash: "h".to_string(),
            commit_type,
            scope: None,
            is_breaking,
            breaking_reason: None,
            should_skip,
            skip_reason: None,
            method: relicta_types::ClassificationMethod::Manual,
            confidence: 1.0,
            reasoning: String::new(),
        }
    }

    proptest::proptest! {
        // Release-type rule determinism: the same classification
        // flags always produce the same bump kind, and it always matches
        // the first-match table below — never something more severe or
        // more lenient than the flags justify.
        #[test]
        fn release_type_rule_is_deterministic_and_matches_the_table(
            commit_type in proptest::prop_oneof![
                proptest::strategy::Just(CommitType::Feat),
                proptest::strategy::Just(CommitType::Fix),
                proptest::strategy::Just(CommitType::Perf),
                proptest::strategy::Just(CommitType::Docs),
                proptest::strategy::Just(CommitType::Chore),
            ],
            is_breaking in proptest::bool::ANY,
            should_skip in proptest::bool::ANY,
            major in 1u64..5,
        ) {
            let classifications = vec![synthetic_classification(commit_type, is_breaking, should_skip)];
            let current = Version::parse(&format!("{major}.0.0")).unwrap();
            let config = GovernanceConfig::default();

            let expected = if is_breaking && !should_skip {
                BumpKind::Major
            } else if commit_type == CommitType::Feat && !should_skip {
                BumpKind::Minor
            } else if matches!(commit_type, CommitType::Fix | CommitType::Perf) && !should_skip {
                BumpKind::Patch
            } else {
                BumpKind::None
            };

            let first = derive_release_type(&classifications, &current, &config);
            let second = derive_release_type(&classifications, &current, &config);
            proptest::prop_assert_eq!(first, second);
            proptest::prop_assert_eq!(first, expected);
        }
    }
}
