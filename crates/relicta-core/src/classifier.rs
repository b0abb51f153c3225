//! Commit Classifier. Four layered strategies run in declared
//! order; the first whose confidence meets the configured floor wins.
//! Classification never errors on bad input — worst case a commit comes
//! back `{type: Unknown, confidence: 0}` and is surfaced in the
//! low-confidence statistics — every commit still gets exactly one
//! classification.

use std::collections::HashMap;

use relicta_config::ClassifierConfig;
use relicta_types::{ClassificationMethod, CommitType};
use serde::{Deserialize, Serialize};

use crate::git::RawCommit;

/// One commit's classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub commit_hash: String,
    pub commit_type: CommitType,
    pub scope: Option<String>,
    pub is_breaking: bool,
    pub breaking_reason: Option<String>,
    pub should_skip: bool,
    pub skip_reason: Option<String>,
    pub method: ClassificationMethod,
    pub confidence: f64,
    pub reasoning: String,
}

/// A manual override a caller supplies for a specific commit hash,
/// replacing whatever the layered strategies would have produced.
#[derive(Debug, Clone)]
pub struct ManualOverride {
    pub commit_hash: String,
    pub commit_type: CommitType,
    pub is_breaking: bool,
    pub should_skip: bool,
    pub reasoning: String,
}

/// Aggregate statistics over a batch of classifications, surfaced
/// alongside the per-commit map so callers can flag low-confidence runs.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ClassificationStats {
    pub counts_by_method: HashMap<String, usize>,
    pub average_confidence: f64,
    pub low_confidence_commits: Vec<String>,
}

/// Calls out to an external classification service when prior layers
/// fall below the confidence floor. The core only
/// depends on this trait — the concrete HTTP/provider client is an
/// external collaborator.
pub trait AiClassifier: Send + Sync {
    fn classify(&self, commit: &RawCommit) -> Option<(CommitType, bool, f64, String)>;
}

/// The result of classifying a batch of commits: one classification per
/// commit, in input order, plus statistics.
pub struct ClassificationResult {
    pub classifications: Vec<Classification>,
    pub stats: ClassificationStats,
}

/// Classifies every commit in `commits`, applying `overrides` after the
/// layered strategies (manual always wins, confidence 1.0).
pub fn classify_commits(
    commits: &[RawCommit],
    config: &ClassifierConfig,
    changed_paths: impl Fn(&str) -> Vec<String>,
    ai: Option<&dyn AiClassifier>,
    overrides: &[ManualOverride],
) -> ClassificationResult {
    let override_map: HashMap<&str, &ManualOverride> =
        overrides.iter().map(|o| (o.commit_hash.as_str(), o)).collect();

    let mut classifications = Vec::with_capacity(commits.len());
    let mut ai_failures_in_a_row = 0u32;
    let mut ai_circuit_open = false;

    for commit in commits {
        let classification = if let Some(manual) = override_map.get(commit.hash.as_str()) {
            Classification {
                commit_hash: commit.hash.clone(),
                commit_type: manual.commit_type,
                scope: None,
                is_breaking: manual.is_breaking,
                breaking_reason: if manual.is_breaking {
                    Some("manual override".to_string())
                } else {
                    None
                },
                should_skip: manual.should_skip,
                skip_reason: if manual.should_skip {
                    Some("manual override".to_string())
                } else {
                    None
                },
                method: ClassificationMethod::Manual,
                confidence: 1.0,
                reasoning: manual.reasoning.clone(),
            }
        } else {
            classify_one(
                commit,
                config,
                &changed_paths,
                ai,
                &mut ai_circuit_open,
                &mut ai_failures_in_a_row,
            )
        };
        classifications.push(classification);
    }

    let stats = compute_stats(&classifications, config.confidence_floor);
    ClassificationResult { classifications, stats }
}

fn classify_one(
    commit: &RawCommit,
    config: &ClassifierConfig,
    changed_paths: &impl Fn(&str) -> Vec<String>,
    ai: Option<&dyn AiClassifier>,
    ai_circuit_open: &mut bool,
    ai_failures_in_a_row: &mut u32,
) -> Classification {
    if let Some(c) = conventional_layer(commit) {
        if c.confidence >= config.confidence_floor {
            return c;
        }
    }
    if let Some(c) = heuristic_layer(commit) {
        if c.confidence >= config.confidence_floor {
            return c;
        }
    }
    if let Some(c) = ast_layer(commit, config, changed_paths) {
        if c.confidence >= config.confidence_floor {
            return c;
        }
    }
    if config.ai_enabled && !*ai_circuit_open {
        if let Some(ai) = ai {
            match ai.classify(commit) {
                Some((commit_type, is_breaking, confidence, reasoning)) => {
                    *ai_failures_in_a_row = 0;
                    let clamped = confidence.clamp(0.0, config.ai_confidence_ceiling);
                    if clamped >= config.confidence_floor {
                        return Classification {
                            commit_hash: commit.hash.clone(),
                            commit_type,
                            scope: conventional_scope(commit),
                            is_breaking,
                            breaking_reason: is_breaking.then(|| "ai classification".to_string()),
                            should_skip: false,
                            skip_reason: None,
                            method: ClassificationMethod::Ai,
                            confidence: clamped,
                            reasoning,
                        };
                    }
                }
                None => {
                    *ai_failures_in_a_row += 1;
                    if *ai_failures_in_a_row >= config.ai_circuit_breaker_threshold {
                        *ai_circuit_open = true;
                    }
                }
            }
        }
    }

    // Every strategy fell below the floor (or errored): classifier
    // totality is preserved by falling back to an explicit unknown
    // rather than propagating an error.
    Classification {
        commit_hash: commit.hash.clone(),
        commit_type: CommitType::Unknown,
        scope: None,
        is_breaking: false,
        breaking_reason: None,
        should_skip: false,
        skip_reason: None,
        method: ClassificationMethod::Heuristic,
        confidence: 0.0,
        reasoning: "no strategy reached the confidence floor".to_string(),
    }
}

/// Layer 1: `type(scope)!: subject` conventional-commit header, confidence 1.0.
fn conventional_layer(commit: &RawCommit) -> Option<Classification> {
    let (header, bang, rest) = parse_conventional_header(&commit.subject)?;
    let commit_type = CommitType::from_conventional_tag(&header.kind)?;

    let footer_breaking = commit
        .body
        .lines()
        .any(|line| line.starts_with("BREAKING CHANGE") || line.starts_with("BREAKING-CHANGE"));
    let is_breaking = bang || footer_breaking;
    let breaking_reason = if bang {
        Some("`!` before the colon in the subject header".to_string())
    } else if footer_breaking {
        Some("BREAKING CHANGE footer".to_string())
    } else {
        None
    };

    Some(Classification {
        commit_hash: commit.hash.clone(),
        commit_type,
        scope: header.scope.clone(),
        is_breaking,
        breaking_reason,
        should_skip: false,
        skip_reason: None,
        method: ClassificationMethod::Conventional,
        confidence: 1.0,
        reasoning: format!("conventional commit header: {}", rest),
    })
}

struct ConventionalHeader {
    kind: String,
    scope: Option<String>,
}

/// Parses `type(scope)!: subject` → `(header, is_breaking_bang, subject_text)`.
fn parse_conventional_header(subject: &str) -> Option<(ConventionalHeader, bool, String)> {
    let (prefix, description) = subject.split_once(':')?;
    let description = description.trim().to_string();
    let (prefix, bang) = match prefix.strip_suffix('!') {
        Some(stripped) => (stripped, true),
        None => (prefix, false),
    };
    let (kind, scope) = match prefix.split_once('(') {
        Some((kind, rest)) => {
            let scope = rest.strip_suffix(')').map(|s| s.to_string());
            (kind.to_string(), scope)
        }
        None => (prefix.to_string(), None),
    };
    if kind.is_empty() || kind.contains(char::is_whitespace) {
        return None;
    }
    Some((ConventionalHeader { kind, scope }, bang, description))
}

fn conventional_scope(commit: &RawCommit) -> Option<String> {
    parse_conventional_header(&commit.subject).and_then(|(h, _, _)| h.scope)
}

/// Layer 2: word-boundary keyword heuristics over the subject line.
/// Confidence reflects match specificity: an exact fix/feat keyword at
/// the start of the subject scores higher than an incidental mention.
fn heuristic_layer(commit: &RawCommit) -> Option<Classification> {
    const RULES: &[(&[&str], CommitType, f64)] = &[
        (&["fix", "bug", "issue", "patch"], CommitType::Fix, 0.75),
        (&["feature", "add", "implement", "introduce"], CommitType::Feat, 0.75),
        (&["perf", "performance", "optimi"], CommitType::Perf, 0.7),
        (&["refactor", "restructure", "rework"], CommitType::Refactor, 0.65),
        (&["doc", "readme", "comment"], CommitType::Docs, 0.65),
        (&["test", "spec"], CommitType::Test, 0.65),
        (&["ci", "pipeline", "workflow"], CommitType::Ci, 0.6),
        (&["build", "dependency", "deps", "bump"], CommitType::Build, 0.6),
        (&["chore", "cleanup", "tidy"], CommitType::Chore, 0.55),
        (&["revert"], CommitType::Revert, 0.8),
    ];

    let subject_lower = commit.subject.to_lowercase();
    let words: Vec<&str> = subject_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mut best: Option<(CommitType, f64)> = None;
    for (keywords, commit_type, base_confidence) in RULES {
        let leading_bonus = words
            .first()
            .map(|w| keywords.iter().any(|k| w.starts_with(k)))
            .unwrap_or(false);
        let matched = keywords.iter().any(|k| words.iter().any(|w| w.contains(k)));
        if matched {
            let confidence = if leading_bonus { *base_confidence } else { base_confidence - 0.15 };
            if best.map(|(_, c)| confidence > c).unwrap_or(true) {
                best = Some((*commit_type, confidence));
            }
        }
    }

    best.map(|(commit_type, confidence)| Classification {
        commit_hash: commit.hash.clone(),
        commit_type,
        scope: None,
        is_breaking: false,
        breaking_reason: None,
        should_skip: false,
        skip_reason: None,
        method: ClassificationMethod::Heuristic,
        confidence,
        reasoning: "subject keyword match".to_string(),
    })
}

/// Layer 3: bias classification from touched-file categories. Docs- or
/// test-only commits may be marked skip-worthy when configured.
fn ast_layer(
    commit: &RawCommit,
    config: &ClassifierConfig,
    changed_paths: &impl Fn(&str) -> Vec<String>,
) -> Option<Classification> {
    let paths = changed_paths(&commit.hash);
    if paths.is_empty() {
        return None;
    }

    let categories: Vec<FileCategory> = paths.iter().map(|p| categorize_path(p)).collect();
    let all_docs = categories.iter().all(|c| *c == FileCategory::Docs);
    let all_tests = categories.iter().all(|c| *c == FileCategory::Test);
    let all_build = categories.iter().all(|c| matches!(c, FileCategory::Build | FileCategory::Ci));

    if all_docs {
        return Some(Classification {
            commit_hash: commit.hash.clone(),
            commit_type: CommitType::Docs,
            scope: None,
            is_breaking: false,
            breaking_reason: None,
            should_skip: config.skip_docs_and_test_only,
            skip_reason: config.skip_docs_and_test_only.then(|| "docs-only change".to_string()),
            method: ClassificationMethod::Ast,
            confidence: 0.7,
            reasoning: "all touched files categorized as docs".to_string(),
        });
    }
    if all_tests {
        return Some(Classification {
            commit_hash: commit.hash.clone(),
            commit_type: CommitType::Test,
            scope: None,
            is_breaking: false,
            breaking_reason: None,
            should_skip: config.skip_docs_and_test_only,
            skip_reason: config.skip_docs_and_test_only.then(|| "test-only change".to_string()),
            method: ClassificationMethod::Ast,
            confidence: 0.65,
            reasoning: "all touched files categorized as tests".to_string(),
        });
    }
    if all_build {
        return Some(Classification {
            commit_hash: commit.hash.clone(),
            commit_type: CommitType::Build,
            scope: None,
            is_breaking: false,
            breaking_reason: None,
            should_skip: false,
            skip_reason: None,
            method: ClassificationMethod::Ast,
            confidence: 0.6,
            reasoning: "all touched files categorized as build/ci".to_string(),
        });
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileCategory {
    Source,
    Test,
    Config,
    Docs,
    Build,
    Ci,
    Generated,
}

fn categorize_path(path: &str) -> FileCategory {
    let lower = path.to_lowercase();
    if lower.starts_with(".github/workflows") || lower.contains(".gitlab-ci") || lower.ends_with(".ci.yml") {
        FileCategory::Ci
    } else if lower.ends_with(".md") || lower.starts_with("docs/") || lower == "readme" {
        FileCategory::Docs
    } else if lower.contains("test") || lower.contains("spec") {
        FileCategory::Test
    } else if lower.ends_with(".lock") || lower.contains("generated") || lower.contains(".g.") {
        FileCategory::Generated
    } else if lower.ends_with(".toml") || lower.ends_with(".yaml") || lower.ends_with(".yml") || lower.ends_with(".json")
    {
        FileCategory::Config
    } else if lower.starts_with("build.rs") || lower.contains("makefile") || lower.contains("dockerfile") {
        FileCategory::Build
    } else {
        FileCategory::Source
    }
}

fn compute_stats(classifications: &[Classification], confidence_floor: f64) -> ClassificationStats {
    let mut counts_by_method = HashMap::new();
    let mut total_confidence = 0.0;
    let mut low_confidence_commits = Vec::new();

    for c in classifications {
        *counts_by_method.entry(method_key(c.method).to_string()).or_insert(0) += 1;
        total_confidence += c.confidence;
        if c.confidence < confidence_floor {
            low_confidence_commits.push(c.commit_hash.clone());
        }
    }

    let average_confidence = if classifications.is_empty() {
        0.0
    } else {
        total_confidence / classifications.len() as f64
    };

    ClassificationStats {
        counts_by_method,
        average_confidence,
        low_confidence_commits,
    }
}

fn method_key(method: ClassificationMethod) -> &'static str {
    match method {
        ClassificationMethod::Conventional => "conventional",
        ClassificationMethod::Heuristic => "heuristic",
        ClassificationMethod::Ast => "ast",
        ClassificationMethod::Ai => "ai",
        ClassificationMethod::Manual => "manual",
    }
}
