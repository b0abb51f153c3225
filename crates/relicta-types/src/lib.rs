//! # Types
//!
//! Core domain types shared across relicta: semantic versions, bump kinds,
//! commit classification enums, and the release-run state lattice.
//!
//! These types are deliberately free of any I/O or persistence concerns —
//! they're pure value types so the version calculus and classification rules
//! can be exercised in unit and property tests without a filesystem or git
//! repository in scope.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A parsed semantic version: `major.minor.patch[-prerelease][+build]`.
///
/// Prerelease and build metadata are stored as their dot-separated
/// identifier lists so `bump`/`with_prerelease` can manipulate them without
/// re-parsing a string each time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Vec<String>,
    pub build: Vec<String>,
}

/// A version string failed to parse as `major.minor.patch[-pre][+build]`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid version string: {0}")]
pub struct InvalidVersion(pub String);

/// A prerelease identifier did not match the dotted-identifier grammar
/// (`[0-9A-Za-z-]+` segments separated by `.`, no empty segments).
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid prerelease identifier: {0}")]
pub struct InvalidPrerelease(pub String);

impl Version {
    pub const ZERO: Version = Version {
        major: 0,
        minor: 0,
        patch: 0,
        prerelease: Vec::new(),
        build: Vec::new(),
    };

    /// Parses `major.minor.patch[-prerelease][+build]`.
    pub fn parse(text: &str) -> Result<Version, InvalidVersion> {
        let err = || InvalidVersion(text.to_string());

        let (core_and_pre, build) = match text.split_once('+') {
            Some((a, b)) => (a, Some(b)),
            None => (text, None),
        };
        let (core, prerelease) = match core_and_pre.split_once('-') {
            Some((a, b)) => (a, Some(b)),
            None => (core_and_pre, None),
        };

        let mut parts = core.split('.');
        let major: u64 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let minor: u64 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let patch: u64 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        if parts.next().is_some() {
            return Err(err());
        }

        let prerelease = match prerelease {
            Some(p) => split_identifiers(p).map_err(|_| err())?,
            None => Vec::new(),
        };
        let build = match build {
            Some(b) => split_identifiers(b).map_err(|_| err())?,
            None => Vec::new(),
        };

        Ok(Version {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }

    /// Total order respecting semver precedence: numeric core first, then
    /// prerelease chains (a version with a prerelease is less than the same
    /// core without one), then lexical/numeric identifier comparison.
    /// Build metadata never affects ordering.
    pub fn compare(a: &Version, b: &Version) -> Ordering {
        (a.major, a.minor, a.patch)
            .cmp(&(b.major, b.minor, b.patch))
            .then_with(|| compare_prerelease(&a.prerelease, &b.prerelease))
    }

    /// Applies a bump kind. Clears prerelease and build metadata unless the
    /// kind is `None`, in which case the version is returned unchanged.
    pub fn bump(&self, kind: BumpKind) -> Version {
        match kind {
            BumpKind::None => self.clone(),
            BumpKind::Patch => Version {
                major: self.major,
                minor: self.minor,
                patch: self.patch + 1,
                prerelease: Vec::new(),
                build: Vec::new(),
            },
            BumpKind::Minor => Version {
                major: self.major,
                minor: self.minor + 1,
                patch: 0,
                prerelease: Vec::new(),
                build: Vec::new(),
            },
            BumpKind::Major => Version {
                major: self.major + 1,
                minor: 0,
                patch: 0,
                prerelease: Vec::new(),
                build: Vec::new(),
            },
        }
    }

    /// Returns a copy with the given prerelease identifier attached.
    pub fn with_prerelease(&self, id: &str) -> Result<Version, InvalidPrerelease> {
        let prerelease = split_identifiers(id).map_err(|_| InvalidPrerelease(id.to_string()))?;
        Ok(Version {
            prerelease,
            ..self.clone()
        })
    }

    /// Returns a copy with the given build metadata attached. Build
    /// metadata does not participate in ordering.
    pub fn with_build(&self, meta: &str) -> Result<Version, InvalidPrerelease> {
        let build = split_identifiers(meta).map_err(|_| InvalidPrerelease(meta.to_string()))?;
        Ok(Version {
            build,
            ..self.clone()
        })
    }

    pub fn is_stable(&self) -> bool {
        self.major >= 1
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease.join("."))?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(Version::compare(self, other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        Version::compare(self, other)
    }
}

fn split_identifiers(s: &str) -> Result<Vec<String>, ()> {
    if s.is_empty() {
        return Err(());
    }
    s.split('.')
        .map(|seg| {
            if seg.is_empty() || !seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                Err(())
            } else {
                Ok(seg.to_string())
            }
        })
        .collect()
}

/// Per the semver precedence rules, a numeric identifier always has lower
/// precedence than an alphanumeric one, numeric identifiers compare
/// numerically, alphanumeric identifiers compare lexically, and a shorter
/// identifier list has lower precedence than a longer one that otherwise
/// shares the same prefix. No prerelease sorts above any prerelease.
fn compare_prerelease(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ord = compare_identifier(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
    }
}

fn compare_identifier(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// How the next version differs from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BumpKind {
    #[default]
    None,
    Patch,
    Minor,
    Major,
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BumpKind::None => "none",
            BumpKind::Patch => "patch",
            BumpKind::Minor => "minor",
            BumpKind::Major => "major",
        };
        f.write_str(s)
    }
}

/// Recognized conventional-commit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitType {
    Feat,
    Fix,
    Perf,
    Refactor,
    Docs,
    Test,
    Build,
    Ci,
    Chore,
    Style,
    Revert,
    /// Every strategy fell below the confidence floor.
    Unknown,
}

impl CommitType {
    pub fn from_conventional_tag(tag: &str) -> Option<CommitType> {
        Some(match tag {
            "feat" => CommitType::Feat,
            "fix" => CommitType::Fix,
            "perf" => CommitType::Perf,
            "refactor" => CommitType::Refactor,
            "docs" => CommitType::Docs,
            "test" => CommitType::Test,
            "build" => CommitType::Build,
            "ci" => CommitType::Ci,
            "chore" => CommitType::Chore,
            "style" => CommitType::Style,
            "revert" => CommitType::Revert,
            _ => return None,
        })
    }
}

/// Which classifier layer produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Conventional,
    Heuristic,
    Ast,
    Ai,
    Manual,
}

/// Coarse risk bucket driving the default governance decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_risk_score(score: f64) -> Severity {
        if score >= 0.75 {
            Severity::Critical
        } else if score >= 0.5 {
            Severity::High
        } else if score >= 0.25 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// The Governance Evaluator's binding decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceOutcome {
    Approved,
    ApprovalRequired,
    Rejected,
}

/// Release Run states. Ordering here is declaration order only; the
/// state machine's legal edges live in `relicta::run`, not in this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Draft,
    Planned,
    Versioned,
    NotesReady,
    Approved,
    Publishing,
    Published,
    Failed,
    Canceled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Published | RunState::Canceled)
    }
}
