//! `relicta`: the command-line adapter over `relicta-core`'s release-run
//! pipeline. This binary owns process concerns only — argument parsing,
//! config-file discovery, terminal rendering, exit codes — and defers
//! every piece of domain logic to the core crate.

mod output;
mod progress;
mod render;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use relicta_config::Config;
use relicta_core::aggregator::{self, ChangeSet};
use relicta_core::classifier::{self, ManualOverride};
use relicta_core::context::{CancellationToken, Context};
use relicta_core::error::{CoreError, CoreResult};
use relicta_core::governance::{self, EvaluatorInput};
use relicta_core::memory::{IncidentRecord, MemoryStore, ReleaseOutcome, ReleaseRecord};
use relicta_core::persistence::{RepoLock, RunStore};
use relicta_core::plugin::PluginHost;
use relicta_core::publish::{self, PublishRequest};
use relicta_core::run::{NotesArtifact, ReleaseRun};
use relicta_core::{git, version_calc};
use relicta_types::{BumpKind, RunState, Version};
use serde_json::json;

use output::CliOutput;

#[derive(Parser)]
#[command(
    name = "relicta",
    version,
    about = "Deterministic, auditable release engineering: classify commits, calculate versions, gate on governance, and publish.",
    propagate_version = true
)]
struct Cli {
    /// Path to a `.relicta.toml` file; defaults to the nearest one found walking up from the working directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose diagnostic output on stderr.
    #[arg(long, global = true)]
    verbose: bool,

    /// Run without creating side effects (tags, pushes, plugin execution are skipped or simulated).
    #[arg(long, global = true)]
    dry_run: bool,

    /// Emit a single JSON document on stdout instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Disable ANSI color and progress bars (implied by --ci and non-TTY stdout).
    #[arg(long, global = true)]
    no_color: bool,

    /// Minimum severity of diagnostic written to stderr.
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// AI classification provider/model (`provider/model`), used by the commit classifier's layer 4.
    #[arg(long, global = true)]
    model: Option<String>,

    /// CI mode: disables progress bars and color, same as --no-color plus non-interactive prompts.
    #[arg(long, global = true)]
    ci: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default `.relicta.toml` in the repository root.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Discover commits since the last release tag, classify them, and preview the release.
    Plan {
        /// Remote to read the repository identity from.
        #[arg(long, default_value = "origin")]
        remote: String,
    },
    /// Commit the planned run to a concrete next version.
    Bump {
        /// Use this exact version instead of deriving one from commits.
        #[arg(long)]
        version: Option<String>,
        /// Force a specific bump kind instead of deriving one from commits.
        #[arg(long, value_enum)]
        bump: Option<CliBumpKind>,
        /// Attach a prerelease identifier (e.g. `beta.1`).
        #[arg(long)]
        prerelease: Option<String>,
        /// Allow a `none` bump kind (no next_version change) to proceed.
        #[arg(long)]
        force: bool,
    },
    /// Render release notes from the planned change set.
    Notes,
    /// Evaluate governance and, if permitted, approve the run for publishing.
    Approve {
        /// Acknowledge the governance decision and mint a live execution authorization.
        #[arg(long)]
        yes: bool,
    },
    /// Tag, push, and run plugin hooks for an approved run.
    Publish {
        /// Remote to push the release tag to.
        #[arg(long, default_value = "origin")]
        remote: String,
        /// Overwrite a conflicting tag and bypass the clean-working-tree check.
        #[arg(long)]
        force: bool,
        /// Retry a previously failed publish (Failed -> Approved -> Publishing).
        #[arg(long)]
        retry: bool,
    },
    /// Cancel the active (or named) run.
    Cancel {
        run_id: Option<String>,
        #[arg(long, default_value = "canceled by operator")]
        reason: String,
    },
    /// Return a Failed or Canceled run to Draft.
    Reset { run_id: Option<String> },
    /// Show the active run, or the most recently updated one.
    Status,
    /// Show past releases recorded in the memory store for this repository.
    History,
    /// Show rolling reliability metrics for an actor.
    Metrics {
        /// Actor id; defaults to the resolved current actor.
        actor: Option<String>,
    },
    /// Minimal stub: this build carries no health backend, so the command
    /// always reports unhealthy rather than claiming a clean bill of health.
    Health,
    /// Talk to installed plugin executables.
    Plugin {
        #[command(subcommand)]
        action: PluginAction,
    },
    /// Print a shell completion script.
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand)]
enum PluginAction {
    /// List plugins resolved from the configured installation directory.
    List,
    /// Send `get_info` to a named plugin and print its response.
    Info { name: String },
    /// Send `validate` to a named plugin with its configured settings.
    Validate { name: String },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliBumpKind {
    None,
    Patch,
    Minor,
    Major,
}

impl From<CliBumpKind> for BumpKind {
    fn from(value: CliBumpKind) -> Self {
        match value {
            CliBumpKind::None => BumpKind::None,
            CliBumpKind::Patch => BumpKind::Patch,
            CliBumpKind::Minor => BumpKind::Minor,
            CliBumpKind::Major => BumpKind::Major,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let out = CliOutput::new(cli.json, cli.no_color || cli.ci, cli.ci, cli.log_level);

    match dispatch(&cli, &out) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            out.error(&err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn dispatch(cli: &Cli, out: &CliOutput) -> CoreResult<i32> {
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "relicta", &mut std::io::stdout());
        return Ok(0);
    }

    let repo_root = std::env::current_dir().map_err(|e| CoreError::Fatal(anyhow::anyhow!(e).context("resolving working directory")))?;
    let config = load_config(cli, &repo_root)?;
    let actor = relicta_core::context::resolve_actor();
    let cancel = CancellationToken::new();
    let now = chrono::Utc::now();

    let ctx = Context::new(config)
        .with_actor(actor.clone())
        .with_cancel(cancel.clone())
        .with_output(Arc::new(out.clone()));

    match &cli.command {
        Commands::Init { force } => cmd_init(&repo_root, *force, out),
        Commands::Plan { remote } => cmd_plan(&ctx, &repo_root, remote, now, out),
        Commands::Bump { version, bump, prerelease, force } => {
            cmd_bump(&ctx, &repo_root, version.as_deref(), bump.map(|b| b.into()), prerelease.as_deref(), *force, cli.dry_run, now, out)
        }
        Commands::Notes => cmd_notes(&ctx, &repo_root, now, out),
        Commands::Approve { yes } => cmd_approve(&ctx, &repo_root, *yes, now, out),
        Commands::Publish { remote, force, retry } => cmd_publish(&ctx, &repo_root, remote, *force, *retry, cli.dry_run, now, out),
        Commands::Cancel { run_id, reason } => cmd_cancel(&ctx, &repo_root, run_id.as_deref(), reason, now, out),
        Commands::Reset { run_id } => cmd_reset(&ctx, &repo_root, run_id.as_deref(), now, out),
        Commands::Status => cmd_status(&repo_root, out),
        Commands::History => cmd_history(&repo_root, out),
        Commands::Metrics { actor: requested } => cmd_metrics(&repo_root, requested.as_deref().unwrap_or(&actor), out),
        Commands::Health => cmd_health(out),
        Commands::Plugin { action } => cmd_plugin(&ctx, action, &cancel, out),
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}

fn load_config(cli: &Cli, repo_root: &Path) -> CoreResult<Config> {
    let path = cli.config.clone().or_else(|| relicta_config::find_config(repo_root));
    match path {
        Some(path) => relicta_config::load_config_from_file(&path).map_err(CoreError::Fatal),
        None => Ok(Config::default()),
    }
}

fn store(repo_root: &Path) -> RunStore {
    RunStore::new(repo_root)
}

fn require_active_run(store: &RunStore, run_id: Option<&str>) -> CoreResult<ReleaseRun> {
    let run = match run_id {
        Some(id) => store.load(id).map_err(CoreError::Fatal)?,
        None => store.find_active_run().map_err(CoreError::Fatal)?,
    };
    run.ok_or_else(|| CoreError::NotFound("no active release run for this repository".to_string()))
}

fn save_locked(repo_root: &Path, run: &ReleaseRun) -> CoreResult<()> {
    let store = store(repo_root);
    let mut lock = RepoLock::acquire_with_timeout(store.base_dir(), std::time::Duration::from_secs(30)).map_err(CoreError::Fatal)?;
    let result = store.save(run);
    lock.release().map_err(CoreError::Fatal)?;
    result.map_err(CoreError::Fatal)
}

// ---------------------------------------------------------------------
// init
// ---------------------------------------------------------------------

fn cmd_init(repo_root: &Path, force: bool, out: &CliOutput) -> CoreResult<i32> {
    let path = relicta_config::config_path(repo_root);
    if path.exists() && !force {
        return Err(CoreError::InvalidInput(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    relicta_config::save_config(repo_root, &Config::default()).map_err(CoreError::Fatal)?;
    out.emit(
        json!({ "config_path": path.display().to_string() }),
        || println!("wrote {}", path.display()),
    );
    Ok(0)
}

// ---------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------

fn discover_change_set(ctx: &Context, repo_root: &Path) -> CoreResult<(Version, Vec<git::RawCommit>, Vec<classifier::Classification>, ChangeSet, Option<String>)> {
    let prefix = ctx.config.tag_prefix();
    let current = version_calc::discover_current_version(repo_root, prefix)?;
    let since_tag = git::latest_tag(repo_root, prefix)
        .map_err(CoreError::Fatal)?
        .map(|(name, _commit)| name);
    let commits = git::commits_since(repo_root, since_tag.as_deref()).map_err(CoreError::Fatal)?;
    let overrides: &[ManualOverride] = &[];
    let result = classifier::classify_commits(
        &commits,
        &ctx.config.classifier,
        |hash| git::changed_paths(repo_root, hash).unwrap_or_default(),
        None,
        overrides,
    );
    let change_set = aggregator::categorize(&commits, &result.classifications);
    let head = git::head_commit(repo_root).map_err(CoreError::Fatal)?;
    Ok((current, commits, result.classifications, change_set, Some(head)))
}

fn preview_governance(ctx: &Context, repo_root: &Path, change_set: &ChangeSet, repo_identity: &str) -> CoreResult<governance::GovernanceDecision> {
    let memory = MemoryStore::new(repo_root);
    let historical = memory.historical_incident_correlation(repo_identity).map_err(CoreError::Fatal)?;
    let actor_metrics = memory.load_actor_metrics(&ctx.actor).map_err(CoreError::Fatal)?;
    let input = EvaluatorInput {
        change_set,
        critical_files_touched_ratio: None,
        test_coverage_delta: None,
        historical_incident_correlation: Some(historical),
        actor_reliability: Some(actor_metrics.reliability),
    };
    Ok(governance::evaluate(
        "preview",
        ctx.actor.clone(),
        uuid::Uuid::new_v4().to_string(),
        &input,
        &ctx.config.governance,
        ctx.now(),
    ))
}

fn cmd_plan(ctx: &Context, repo_root: &Path, remote: &str, now: chrono::DateTime<chrono::Utc>, out: &CliOutput) -> CoreResult<i32> {
    let run_store = store(repo_root);
    // A run left in `Draft` (freshly `reset`, or never planned) is exactly
    // what `plan()` is for — re-home it instead of rejecting it. Any other
    // non-terminal state is a genuine in-flight run.
    let mut run = match run_store.find_active_run().map_err(CoreError::Fatal)? {
        Some(existing) if existing.state == RunState::Draft => existing,
        Some(existing) => return Err(CoreError::ActiveRunConflict { run_id: existing.run_id }),
        None => {
            let run_id = uuid::Uuid::new_v4().to_string();
            ReleaseRun::new(&run_id, repo_root.to_path_buf(), ctx.actor.clone(), now)
        }
    };

    let (current, commits, classifications, change_set, head) = discover_change_set(ctx, repo_root)?;
    let branch = git::current_branch(repo_root).map_err(CoreError::Fatal)?;
    let repository_identity = git::remote_url(repo_root, remote).map_err(CoreError::Fatal)?;
    let release_type = aggregator::derive_release_type(&classifications, &current, &ctx.config.governance);

    run.plan(
        commits,
        classifications,
        change_set.clone(),
        current.clone(),
        head.unwrap_or_default(),
        branch.clone(),
        repository_identity.clone(),
        &ctx.actor,
        now,
    )?;

    let governance_preview = preview_governance(ctx, repo_root, &change_set, repository_identity.as_deref().unwrap_or(""))?;
    save_locked(repo_root, &run)?;

    let next_version = current.bump(release_type);
    let summary = json!({
        "total": change_set.total_non_skipped(),
        "features": change_set.features.len(),
        "fixes": change_set.fixes.len(),
        "breaking_changes": change_set.breaking.len(),
    });

    out.emit(
        json!({
            "release_id": run.run_id,
            "current_version": current.to_string(),
            "next_version": next_version.to_string(),
            "release_type": release_type.to_string(),
            "repository_name": repository_identity,
            "branch": branch,
            "summary": summary,
            "governance": {
                "risk_score": governance_preview.risk_score,
                "severity": governance_preview.severity,
                "decision": governance_preview.outcome,
                "can_auto_approve": governance_preview.can_auto_approve,
                "risk_factors": governance_preview.risk_factors,
            },
        }),
        || {
            println!("planned {} -> {} ({release_type})", current, next_version);
            println!("run id: {}", run.run_id);
            println!(
                "{} non-skipped commit(s): {} feature(s), {} fix(es), {} breaking",
                change_set.total_non_skipped(),
                change_set.features.len(),
                change_set.fixes.len(),
                change_set.breaking.len()
            );
        },
    );
    Ok(0)
}

// ---------------------------------------------------------------------
// bump
// ---------------------------------------------------------------------

fn cmd_bump(
    ctx: &Context,
    repo_root: &Path,
    explicit_version: Option<&str>,
    explicit_bump: Option<BumpKind>,
    prerelease: Option<&str>,
    force: bool,
    dry_run: bool,
    now: chrono::DateTime<chrono::Utc>,
    out: &CliOutput,
) -> CoreResult<i32> {
    let run_store = store(repo_root);
    let mut run = require_active_run(&run_store, None)?;

    let explicit_version = explicit_version.map(Version::parse).transpose().map_err(|e| CoreError::InvalidInput(e.to_string()))?;
    let input = version_calc::VersionCalculatorInput {
        repo_root,
        tag_prefix: ctx.config.tag_prefix(),
        explicit_version,
        explicit_bump,
        prerelease_id: prerelease,
        ai: None,
        overrides: &[],
    };
    let calc = version_calc::calculate(&input, &ctx.config)?;

    run.bump(calc.next.clone(), calc.bump_kind, dry_run, force, &ctx.actor, now)?;
    save_locked(repo_root, &run)?;

    let tag_name = format!("{}{}", ctx.config.tag_prefix(), calc.next);
    out.emit(
        json!({
            "current_version": calc.current.to_string(),
            "next_version": calc.next.to_string(),
            "bump_type": calc.bump_kind.to_string(),
            "auto_detected": calc.auto_detected,
            "tag_name": tag_name,
        }),
        || println!("{} -> {} ({}, tag {tag_name})", calc.current, calc.next, calc.bump_kind),
    );
    Ok(0)
}

// ---------------------------------------------------------------------
// notes
// ---------------------------------------------------------------------

fn cmd_notes(ctx: &Context, repo_root: &Path, now: chrono::DateTime<chrono::Utc>, out: &CliOutput) -> CoreResult<i32> {
    let run_store = store(repo_root);
    let mut run = require_active_run(&run_store, None)?;
    let change_set = aggregator::categorize(&run.commits, &run.classifications);
    let version = run.next_version.clone().unwrap_or_else(|| run.current_version.clone().unwrap_or(Version::ZERO));
    let text = render::render_notes(&version, &change_set);

    run.attach_notes(NotesArtifact { text: text.clone(), generated_at: now }, &ctx.actor, now)?;
    save_locked(repo_root, &run)?;

    out.emit(json!({ "release_id": run.run_id, "notes": text }), || println!("{text}"));
    Ok(0)
}

// ---------------------------------------------------------------------
// approve
// ---------------------------------------------------------------------

fn cmd_approve(ctx: &Context, repo_root: &Path, yes: bool, now: chrono::DateTime<chrono::Utc>, out: &CliOutput) -> CoreResult<i32> {
    let run_store = store(repo_root);
    let mut run = require_active_run(&run_store, None)?;

    let change_set = aggregator::categorize(&run.commits, &run.classifications);
    let repository_identity = run.repository_identity.clone().unwrap_or_default();
    let memory = MemoryStore::new(repo_root);
    let historical = memory.historical_incident_correlation(&repository_identity).map_err(CoreError::Fatal)?;
    let actor_metrics = memory.load_actor_metrics(&ctx.actor).map_err(CoreError::Fatal)?;

    let input = EvaluatorInput {
        change_set: &change_set,
        critical_files_touched_ratio: None,
        test_coverage_delta: None,
        historical_incident_correlation: Some(historical),
        actor_reliability: Some(actor_metrics.reliability),
    };
    let decision_id = uuid::Uuid::new_v4().to_string();
    let decision = governance::evaluate(run.run_id.clone(), ctx.actor.clone(), decision_id.clone(), &input, &ctx.config.governance, now);
    run_store.append_decision(&decision).map_err(CoreError::Fatal)?;

    let outcome = decision.outcome;
    let decision_json = json!({
        "decision_id": decision.decision_id,
        "risk_score": decision.risk_score,
        "severity": decision.severity,
        "outcome": decision.outcome,
        "can_auto_approve": decision.can_auto_approve,
    });

    match outcome {
        relicta_types::GovernanceOutcome::Rejected => {
            return Err(CoreError::AuthorizationRequired(format!(
                "governance rejected this run (decision {decision_id}); see `relicta status` for risk factors"
            )));
        }
        relicta_types::GovernanceOutcome::ApprovalRequired if !yes => {
            return Err(CoreError::AuthorizationRequired(
                "this run requires human acknowledgement; re-run `relicta approve --yes`".to_string(),
            ));
        }
        _ => {}
    }

    let auth_id = uuid::Uuid::new_v4().to_string();
    let nonce = relicta_core::context::generate_nonce();
    let mut authorization = governance::issue_authorization(auth_id, &decision, nonce, "publish", chrono::Duration::minutes(15), now);
    if !authorization.try_consume(now) {
        return Err(CoreError::Fatal(anyhow::anyhow!("freshly minted authorization could not be consumed")));
    }
    run_store.append_authorization(&authorization).map_err(CoreError::Fatal)?;

    run.approve(decision.decision_id.clone(), decision.risk_score, &ctx.actor, now)?;
    save_locked(repo_root, &run)?;

    out.emit(
        json!({ "release_id": run.run_id, "decision": decision_json, "authorization_id": authorization.authorization_id, "state": run.state }),
        || println!("approved {} (decision {})", run.run_id, decision.decision_id),
    );
    Ok(0)
}

// ---------------------------------------------------------------------
// publish
// ---------------------------------------------------------------------

fn cmd_publish(
    ctx: &Context,
    repo_root: &Path,
    remote: &str,
    force: bool,
    retry: bool,
    dry_run: bool,
    now: chrono::DateTime<chrono::Utc>,
    out: &CliOutput,
) -> CoreResult<i32> {
    let run_store = store(repo_root);
    let mut run = require_active_run(&run_store, None)?;

    if retry && run.state == RunState::Failed {
        run.retry_publish(&ctx.actor, now)?;
        save_locked(repo_root, &run)?;
    }

    let plugin_names = match ctx.config.plugin_directory() {
        Some(dir) => PluginHost::new(
            dir,
            ctx.config.plugin_request_timeout(),
            ctx.config.plugin_idle_timeout(),
            ctx.config.plugin_cancel_grace(),
            ctx.config.plugin_kill_grace(),
        )
        .discover()
        .map_err(CoreError::Fatal)?,
        None => Vec::new(),
    };

    let notes_text = run.notes.as_ref().map(|n| n.text.clone()).unwrap_or_default();
    let version = run.next_version.clone().unwrap_or(Version::ZERO);
    let hook_context = json!({
        "run_id": run.run_id,
        "version": version.to_string(),
        "notes": notes_text,
        "dry_run": dry_run,
    });

    let request = PublishRequest {
        repo_root,
        remote,
        config: &ctx.config,
        plugin_names,
        plugin_configs: std::collections::HashMap::new(),
        hook_context,
        dry_run,
        force,
    };

    // Watch for an operator's ctrl-c independently of the publish call's
    // own runtime, cooperatively flipping the shared cancellation token
    // the pipeline already checks between steps.
    {
        let cancel_for_signal = ctx.cancel.clone();
        std::thread::spawn(move || {
            if let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_all().build() {
                rt.block_on(async {
                    let _ = tokio::signal::ctrl_c().await;
                    cancel_for_signal.cancel();
                });
            }
        });
    }

    if !request.plugin_names.is_empty() {
        out.begin_publish_progress(4);
    }
    let publish_result = publish::publish_blocking(&mut run, &request, out, &ctx.cancel, now);
    out.finish_publish_progress();
    save_locked(repo_root, &run)?;

    if publish_result.is_ok() {
        if let Some(identity) = run.repository_identity.clone() {
            let memory = MemoryStore::new(repo_root);
            let record = ReleaseRecord {
                run_id: run.run_id.clone(),
                repository_identity: identity,
                version: version.to_string(),
                actor: ctx.actor.clone(),
                outcome: ReleaseOutcome::Success,
                risk_score: run.risk_score.unwrap_or(0.0),
                released_at: now,
            };
            let incidents: Vec<IncidentRecord> = Vec::new();
            let _ = memory.record_release(record, &incidents);
        }
    }
    publish_result?;

    let plugin_results: Vec<serde_json::Value> = run
        .publish_result
        .as_ref()
        .map(|r| {
            r.plugin_results
                .iter()
                .map(|p| json!({ "plugin_name": p.plugin_name, "success": p.success, "message": p.message }))
                .collect()
        })
        .unwrap_or_default();
    let tag_name = run.publish_result.as_ref().map(|r| r.tag_name.clone()).unwrap_or_default();
    let release_url = run.repository_identity.as_ref().and_then(|url| github_release_url(url, &tag_name));

    out.emit(
        json!({
            "release_id": run.run_id,
            "tag_name": tag_name,
            "release_url": release_url,
            "plugin_results": plugin_results,
        }),
        || println!("published {} as {tag_name}", run.run_id),
    );
    Ok(0)
}

fn github_release_url(remote_url: &str, tag_name: &str) -> Option<String> {
    let trimmed = remote_url.trim_end_matches(".git");
    if trimmed.contains("github.com") {
        Some(format!("{trimmed}/releases/tag/{tag_name}"))
    } else {
        None
    }
}

// ---------------------------------------------------------------------
// cancel / reset
// ---------------------------------------------------------------------

fn cmd_cancel(ctx: &Context, repo_root: &Path, run_id: Option<&str>, reason: &str, now: chrono::DateTime<chrono::Utc>, out: &CliOutput) -> CoreResult<i32> {
    let run_store = store(repo_root);
    let mut run = require_active_run(&run_store, run_id)?;
    run.cancel(reason, &ctx.actor, now)?;
    save_locked(repo_root, &run)?;
    out.emit(json!({ "release_id": run.run_id, "state": run.state }), || println!("{} -> {:?}", run.run_id, run.state));
    Ok(0)
}

fn cmd_reset(ctx: &Context, repo_root: &Path, run_id: Option<&str>, now: chrono::DateTime<chrono::Utc>, out: &CliOutput) -> CoreResult<i32> {
    let run_store = store(repo_root);
    let run_id = match run_id {
        Some(id) => id.to_string(),
        None => run_store
            .load_latest()
            .map_err(CoreError::Fatal)?
            .ok_or_else(|| CoreError::NotFound("no release run found for this repository".to_string()))?
            .run_id,
    };
    let mut run = run_store
        .load(&run_id)
        .map_err(CoreError::Fatal)?
        .ok_or_else(|| CoreError::NotFound(format!("no run with id {run_id}")))?;
    run.reset(&ctx.actor, now)?;
    save_locked(repo_root, &run)?;
    out.emit(json!({ "release_id": run.run_id, "state": run.state }), || println!("{} -> {:?}", run.run_id, run.state));
    Ok(0)
}

// ---------------------------------------------------------------------
// status / history / metrics / health
// ---------------------------------------------------------------------

fn cmd_status(repo_root: &Path, out: &CliOutput) -> CoreResult<i32> {
    let run_store = store(repo_root);
    let run = match run_store.find_active_run().map_err(CoreError::Fatal)? {
        Some(run) => Some(run),
        None => run_store.load_latest().map_err(CoreError::Fatal)?,
    };

    let Some(run) = run else {
        out.emit(
            json!({ "has_active_release": false, "message": "no release run found", "next_steps": ["relicta plan"] }),
            || println!("no release run found; run `relicta plan` to start one"),
        );
        return Ok(0);
    };

    let next_steps = next_steps_for(run.state);
    let message = format!("run {} is in state {:?}", run.run_id, run.state);

    out.emit(
        json!({
            "has_active_release": !run.is_terminal(),
            "release_id": run.run_id,
            "state": run.state,
            "current_version": run.current_version.as_ref().map(|v| v.to_string()),
            "next_version": run.next_version.as_ref().map(|v| v.to_string()),
            "bump_kind": run.bump_kind,
            "risk_score": run.risk_score,
            "commit_count": run.commits.len(),
            "created_at": run.created_at,
            "updated_at": run.updated_at,
            "message": message,
            "next_steps": next_steps,
        }),
        || {
            println!("{message}");
            if let (Some(current), Some(next)) = (&run.current_version, &run.next_version) {
                println!("{current} -> {next}");
            }
            if !next_steps.is_empty() {
                println!("next: {}", next_steps.join(", "));
            }
        },
    );
    Ok(0)
}

fn next_steps_for(state: RunState) -> Vec<&'static str> {
    match state {
        RunState::Draft => vec!["relicta plan"],
        RunState::Planned => vec!["relicta bump"],
        RunState::Versioned => vec!["relicta notes"],
        RunState::NotesReady => vec!["relicta approve"],
        RunState::Approved => vec!["relicta publish"],
        RunState::Publishing => vec![],
        RunState::Published => vec![],
        RunState::Failed => vec!["relicta publish --retry", "relicta reset"],
        RunState::Canceled => vec!["relicta reset"],
    }
}

fn cmd_history(repo_root: &Path, out: &CliOutput) -> CoreResult<i32> {
    let identity = git::remote_url(repo_root, "origin").map_err(CoreError::Fatal)?.unwrap_or_else(|| repo_root.display().to_string());
    let memory = MemoryStore::new(repo_root);
    let releases = memory.releases(&identity).map_err(CoreError::Fatal)?;

    out.emit(
        json!({ "repository_identity": identity, "releases": releases }),
        || {
            if releases.is_empty() {
                println!("no recorded releases for {identity}");
            }
            for record in &releases {
                println!("{} {} {:?} risk={:.2} actor={}", record.released_at, record.version, record.outcome, record.risk_score, record.actor);
            }
        },
    );
    Ok(0)
}

fn cmd_metrics(repo_root: &Path, actor: &str, out: &CliOutput) -> CoreResult<i32> {
    let memory = MemoryStore::new(repo_root);
    let metrics = memory.load_actor_metrics(actor).map_err(CoreError::Fatal)?;
    out.emit(
        serde_json::to_value(&metrics).unwrap(),
        || {
            println!(
                "{}: {}/{} succeeded, reliability={:.2}, avg risk={:.2}",
                metrics.actor_id, metrics.successes, metrics.total, metrics.reliability, metrics.average_risk
            );
        },
    );
    Ok(0)
}

fn cmd_health(out: &CliOutput) -> CoreResult<i32> {
    out.emit(
        json!({ "status": "unknown", "message": "no health backend wired into this build" }),
        || println!("health: unknown (no health backend wired into this build)"),
    );
    Ok(2)
}

// ---------------------------------------------------------------------
// plugin
// ---------------------------------------------------------------------

fn plugin_host(ctx: &Context) -> CoreResult<PluginHost> {
    let dir = ctx
        .config
        .plugin_directory()
        .ok_or_else(|| CoreError::InvalidInput("no plugin directory configured (`[plugins] directory = \"...\"`)".to_string()))?;
    Ok(PluginHost::new(
        dir,
        ctx.config.plugin_request_timeout(),
        ctx.config.plugin_idle_timeout(),
        ctx.config.plugin_cancel_grace(),
        ctx.config.plugin_kill_grace(),
    ))
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to start plugin-host runtime")
        .block_on(fut)
}

fn cmd_plugin(ctx: &Context, action: &PluginAction, cancel: &CancellationToken, out: &CliOutput) -> CoreResult<i32> {
    let host = plugin_host(ctx)?;
    match action {
        PluginAction::List => {
            let names = host.discover().map_err(CoreError::Fatal)?;
            let mut infos = Vec::new();
            for name in &names {
                match block_on(host.get_info(name, cancel)) {
                    Ok(info) => infos.push(json!({
                        "name": info.name,
                        "version": info.version,
                        "hooks": info.hooks,
                        "critical": info.critical,
                    })),
                    Err(e) => infos.push(json!({ "name": name, "error": e.to_string() })),
                }
            }
            out.emit(json!({ "plugins": infos }), || {
                for name in &names {
                    println!("{name}");
                }
            });
            Ok(0)
        }
        PluginAction::Info { name } => {
            let info = block_on(host.get_info(name, cancel))?;
            out.emit(
                json!({ "name": info.name, "version": info.version, "hooks": info.hooks, "critical": info.critical }),
                || println!("{} v{} hooks={:?} critical={}", info.name, info.version, info.hooks, info.critical),
            );
            Ok(0)
        }
        PluginAction::Validate { name } => {
            let outcome = block_on(host.validate(name, &serde_json::Value::Null, cancel))?;
            out.emit(
                json!({ "plugin": outcome.plugin, "valid": outcome.valid, "message": outcome.message }),
                || println!("{}: valid={} {}", outcome.plugin, outcome.valid, outcome.message.clone().unwrap_or_default()),
            );
            Ok(if outcome.valid { 0 } else { 1 })
        }
    }
}
