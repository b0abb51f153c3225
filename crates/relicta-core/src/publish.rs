//! The Publish Pipeline: the one use case allowed to produce
//! side effects outside `.relicta/` — a git tag, a push, and whatever a
//! plugin's `execute` hook does on the other end of its pipe.
//!
//! Acquires the repository lock, collects context, drives the steps in
//! order, and persists the run as it goes: tag, push, then five plugin
//! hooks in declared order.

use std::path::Path;

use chrono::{DateTime, Utc};
use relicta_config::Config;
use relicta_retry::{RetryExecutor, RetryStrategyConfig, RetryStrategyType};
use relicta_types::RunState;
use serde_json::Value;
use tokio::runtime::Handle;

use crate::context::{CancellationToken, OutputSink};
use crate::error::{CoreError, CoreResult};
use crate::git;
use crate::plugin::{ExecuteOutcome, Hook, PluginHost};
use crate::run::{PluginInvocationResult, PublishResult, ReleaseRun};

fn push_retry_executor(config: &Config) -> RetryExecutor {
    RetryExecutor::new(RetryStrategyConfig {
        strategy: RetryStrategyType::Exponential,
        max_attempts: config.push_retry.max_attempts,
        base_delay: config.push_retry.base_delay,
        max_delay: std::time::Duration::from_secs(30),
        jitter: 0.0,
    })
}

/// Resolves the tag name this run will create (`<prefix><next_version>`).
fn tag_name(run: &ReleaseRun, config: &Config) -> CoreResult<String> {
    let version = run
        .next_version
        .as_ref()
        .ok_or_else(|| CoreError::Fatal(anyhow::anyhow!("run has no next_version despite being Approved")))?;
    Ok(format!("{}{}", config.tag_prefix(), version))
}

/// Creates the release tag, or confirms an existing one is idempotent
///.
fn ensure_tag(repo_root: &Path, name: &str, message: &str, head: &str, force: bool) -> CoreResult<bool> {
    match git::tag_info(repo_root, name).map_err(CoreError::Fatal)? {
        Some((commit, existing_message)) => {
            if commit == head && existing_message == message {
                Ok(false)
            } else if force {
                git::create_annotated_tag(repo_root, name, message, true).map_err(CoreError::Fatal)?;
                Ok(true)
            } else {
                Err(CoreError::TagConflict(format!(
                    "tag {name} already points at {commit} with a different message; use --force to overwrite"
                )))
            }
        }
        None => {
            git::create_annotated_tag(repo_root, name, message, false).map_err(CoreError::Fatal)?;
            Ok(true)
        }
    }
}

fn push_tag(repo_root: &Path, remote: &str, name: &str, executor: &RetryExecutor, cancel: &CancellationToken) -> CoreResult<()> {
    executor
        .run_cancelable(
            || cancel.is_canceled(),
            |_attempt| git::push_tag(repo_root, remote, name),
        )
        .map_err(CoreError::Transient)
}

fn outcome_to_invocation_result(outcome: ExecuteOutcome) -> PluginInvocationResult {
    PluginInvocationResult {
        plugin_name: outcome.plugin,
        hook: outcome.hook.as_str().to_string(),
        success: outcome.success,
        message: outcome.message.unwrap_or_default(),
        critical: outcome.critical,
    }
}

/// Runs every plugin that declared itself for `hook`, sequentially in
/// declared plugin order, via the tokio runtime already driving the
/// caller.
async fn run_hook(
    host: &PluginHost,
    plugin_names: &[String],
    hook: Hook,
    context: &Value,
    plugin_configs: &std::collections::HashMap<String, Value>,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Vec<PluginInvocationResult> {
    let mut handlers = Vec::new();
    for name in plugin_names {
        let info = match host.get_info(name, cancel).await {
            Ok(info) => info,
            Err(e) => {
                handlers.push(PluginInvocationResult {
                    plugin_name: name.clone(),
                    hook: hook.as_str().to_string(),
                    success: false,
                    message: e.to_string(),
                    critical: true,
                });
                continue;
            }
        };
        if !info.handles(hook) {
            continue;
        }
        let empty = Value::Null;
        let config = plugin_configs.get(name).unwrap_or(&empty);
        match host.execute(name, hook, context, config, dry_run, cancel).await {
            Ok(outcome) => handlers.push(outcome_to_invocation_result(outcome)),
            Err(e) => handlers.push(PluginInvocationResult {
                plugin_name: name.clone(),
                hook: hook.as_str().to_string(),
                success: false,
                message: e.to_string(),
                critical: info.critical,
            }),
        }
    }
    handlers
}

/// Everything the Publish Pipeline needs beyond the run itself: where
/// the repo lives, what config governs tag naming/retries/plugins, the
/// plugin invocation context payload, and the per-plugin config blobs.
pub struct PublishRequest<'a> {
    pub repo_root: &'a Path,
    pub remote: &'a str,
    pub config: &'a Config,
    pub plugin_names: Vec<String>,
    pub plugin_configs: std::collections::HashMap<String, Value>,
    pub hook_context: Value,
    pub dry_run: bool,
    pub force: bool,
}

/// Drives `run` from `Approved` through `Publishing` to `Published` or
/// `Failed`. Requires a `tokio` runtime to already be running
/// (the plugin host's I/O is async); callers not already inside one
/// should drive this via [`Handle::block_on`] or an equivalent entry
/// point.
pub async fn publish(run: &mut ReleaseRun, request: &PublishRequest<'_>, output: &dyn OutputSink, cancel: &CancellationToken, now: DateTime<Utc>) -> CoreResult<()> {
    if run.state != RunState::Approved {
        return Err(CoreError::StateViolation {
            from: run.state,
            reason: "publish requires an Approved run".to_string(),
        });
    }

    if !request.force {
        let clean = git::is_clean(request.repo_root).map_err(CoreError::Fatal)?;
        if !clean {
            return Err(CoreError::InvalidInput(
                "working tree is dirty; commit, stash, or pass --force".to_string(),
            ));
        }
    }

    let actor = run.created_by.clone();
    run.publish_start(&actor, now)?;
    output.info("publish started");

    let name = tag_name(run, request.config)?;
    let head = git::head_commit(request.repo_root).map_err(CoreError::Fatal)?;
    let plan = run
        .plan
        .as_ref()
        .ok_or_else(|| CoreError::Fatal(anyhow::anyhow!("run has no plan snapshot despite being Publishing")))?;
    let message = format!("Release {}", plan.next_version);

    let host = request
        .config
        .plugin_directory()
        .map(|dir| {
            PluginHost::new(
                dir,
                request.config.plugin_request_timeout(),
                request.config.plugin_idle_timeout(),
                request.config.plugin_cancel_grace(),
                request.config.plugin_kill_grace(),
            )
        });

    let mut plugin_results: Vec<PluginInvocationResult> = Vec::new();

    let tag_outcome = (|| -> CoreResult<(bool, bool)> {
        let tag_created = ensure_tag(request.repo_root, &name, &message, &head, request.force)?;
        let executor = push_retry_executor(request.config);
        push_tag(request.repo_root, request.remote, &name, &executor, cancel)?;
        Ok((tag_created, true))
    })();

    let (tag_created, tag_pushed) = match tag_outcome {
        Ok(v) => v,
        Err(e) => {
            let result = PublishResult {
                tag_name: name,
                tag_created: false,
                tag_pushed: false,
                plugin_results: plugin_results.clone(),
                succeeded: false,
                failure_reason: Some(e.to_string()),
            };
            run.publish_fail(Some(result), &e.to_string(), &actor, now)?;
            if let Some(host) = &host {
                run_terminal_hook(host, request, cancel).await;
            }
            return Err(e);
        }
    };

    for hook in [Hook::PrePublish, Hook::OnPublish, Hook::PostPublish] {
        if let Some(host) = &host {
            output.info(&format!("running hook: {}", hook.as_str()));
            let outcomes = run_hook(
                host,
                &request.plugin_names,
                hook,
                &request.hook_context,
                &request.plugin_configs,
                request.dry_run,
                cancel,
            )
            .await;
            let critical_failure = outcomes.iter().any(|o| o.critical && !o.success);
            plugin_results.extend(outcomes);
            if critical_failure {
                let result = PublishResult {
                    tag_name: name,
                    tag_created,
                    tag_pushed,
                    plugin_results: plugin_results.clone(),
                    succeeded: false,
                    failure_reason: Some(format!("a critical plugin failed at hook {}", hook.as_str())),
                };
                let reason = result.failure_reason.clone().unwrap_or_default();
                run.publish_fail(Some(result), &reason, &actor, now)?;
                run_terminal_hook(host, request, cancel).await;
                return Err(CoreError::PluginExecution {
                    plugin: "<multiple>".to_string(),
                    message: "a critical plugin failed during publish".to_string(),
                });
            }
        }
    }

    if let Some(host) = &host {
        output.info(&format!("running hook: {}", Hook::OnSuccess.as_str()));
        let outcomes = run_hook(
            host,
            &request.plugin_names,
            Hook::OnSuccess,
            &request.hook_context,
            &request.plugin_configs,
            request.dry_run,
            cancel,
        )
        .await;
        plugin_results.extend(outcomes);
    }

    let result = PublishResult {
        tag_name: name,
        tag_created,
        tag_pushed,
        plugin_results,
        succeeded: true,
        failure_reason: None,
    };
    run.publish_done(result, &actor, now)?;
    output.info("publish completed");
    Ok(())
}

/// After any pipeline failure, run the `on-failure` hook so notifier
/// plugins still hear about it even though the happy-path hooks never
/// ran.
async fn run_terminal_hook(host: &PluginHost, request: &PublishRequest<'_>, cancel: &CancellationToken) {
    let _ = run_hook(
        host,
        &request.plugin_names,
        Hook::OnFailure,
        &request.hook_context,
        &request.plugin_configs,
        request.dry_run,
        cancel,
    )
    .await;
}

/// Synchronous entry point for callers (the CLI) that are not already
/// inside a tokio runtime.
pub fn publish_blocking(run: &mut ReleaseRun, request: &PublishRequest<'_>, output: &dyn OutputSink, cancel: &CancellationToken, now: DateTime<Utc>) -> CoreResult<()> {
    match Handle::try_current() {
        Ok(handle) => handle.block_on(publish(run, request, output, cancel, now)),
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| CoreError::Fatal(anyhow::anyhow!("failed to start async runtime: {e}")))?;
            runtime.block_on(publish(run, request, output, cancel, now))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_name_uses_configured_prefix() {
        let mut run = ReleaseRun::new("run-1", std::path::PathBuf::from("/repo"), "alice", now());
        plan_and_bump(&mut run);
        let config = Config::default();
        assert_eq!(tag_name(&run, &config).unwrap(), "v1.1.0");
    }

    #[test]
    fn publish_rejects_non_approved_run() {
        let mut run = ReleaseRun::new("run-1", std::path::PathBuf::from("/repo"), "alice", now());
        let request = PublishRequest {
            repo_root: Path::new("/repo"),
            remote: "origin",
            config: &Config::default(),
            plugin_names: Vec::new(),
            plugin_configs: std::collections::HashMap::new(),
            hook_context: Value::Null,
            dry_run: true,
            force: true,
        };
        let cancel = CancellationToken::new();
        let result = publish_blocking(&mut run, &request, &crate::context::NullSink, &cancel, now());
        assert!(result.is_err());
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn plan_and_bump(run: &mut ReleaseRun) {
        run.plan(
            Vec::new(),
            Vec::new(),
            crate::aggregator::ChangeSet::default(),
            relicta_types::Version::parse("1.0.0").unwrap(),
            "abc123".to_string(),
            Some("main".to_string()),
            None,
            "alice",
            now(),
        )
        .unwrap();
        run.bump(relicta_types::Version::parse("1.1.0").unwrap(), relicta_types::BumpKind::Minor, false, false, "alice", now())
            .unwrap();
    }
}
