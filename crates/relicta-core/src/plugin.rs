//! Plugin Host: runs a plugin executable as a child process and
//! speaks a framed stdio JSON protocol with it — one frame is a 4-byte
//! big-endian length prefix followed by that many bytes of UTF-8 JSON.
//!
//! The core never links a plugin as a library: a plugin is an arbitrary
//! executable found in the configured plugin directory, spawned fresh
//! for every request, the same way `git.rs` shells out to `git` rather
//! than linking `git2`. Cancellation never sends a raw signal through
//! `unsafe` FFI — `kill -TERM` is shelled out to exactly like any other
//! external program this crate drives, and the final `SIGKILL` goes
//! through `tokio::process::Child::start_kill`, which needs no `unsafe`
//! on the caller's side.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::context::CancellationToken;
use crate::error::{CoreError, CoreResult};

/// Frames larger than this are rejected outright rather than buffered;
/// a plugin that needs more than this to describe itself or a hook
/// result is misbehaving, not under-provisioned.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// A hook point in the Publish Pipeline, in invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hook {
    PrePublish,
    OnPublish,
    PostPublish,
    OnSuccess,
    OnFailure,
}

impl Hook {
    pub const ALL_IN_ORDER: [Hook; 5] = [
        Hook::PrePublish,
        Hook::OnPublish,
        Hook::PostPublish,
        Hook::OnSuccess,
        Hook::OnFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::PrePublish => "pre-publish",
            Hook::OnPublish => "on-publish",
            Hook::PostPublish => "post-publish",
            Hook::OnSuccess => "on-success",
            Hook::OnFailure => "on-failure",
        }
    }
}

/// A plugin's self-description, returned from a `get_info` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub critical: bool,
}

impl PluginInfo {
    /// Whether this plugin declared itself for `hook` and should be
    /// invoked when the pipeline reaches it.
    pub fn handles(&self, hook: Hook) -> bool {
        self.hooks.iter().any(|h| h == hook.as_str())
    }
}

/// The outcome of one `execute` request against one plugin at one hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteOutcome {
    pub plugin: String,
    pub hook: Hook,
    pub success: bool,
    pub critical: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub outputs: Value,
}

/// The outcome of a `validate` request, used to sanity-check a plugin's
/// configuration before it is ever invoked for a real hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateOutcome {
    pub plugin: String,
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Request<'a> {
    GetInfo,
    Execute {
        hook: Hook,
        context: &'a Value,
        config: &'a Value,
        dry_run: bool,
    },
    Validate {
        config: &'a Value,
    },
    Cancel,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Response {
    Info {
        name: String,
        version: String,
        #[serde(default)]
        hooks: Vec<String>,
        #[serde(default)]
        critical: bool,
    },
    Execute {
        success: bool,
        #[serde(default)]
        critical: bool,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        outputs: Value,
    },
    Validate {
        valid: bool,
        #[serde(default)]
        message: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Writes one length-prefixed JSON frame to `sink`.
async fn write_frame<W: AsyncWriteExt + Unpin>(sink: &mut W, value: &Value) -> CoreResult<()> {
    let body = serde_json::to_vec(value).map_err(|e| CoreError::PluginProtocol {
        plugin: "<unknown>".to_string(),
        message: format!("failed to encode frame: {e}"),
    })?;
    let len = u32::try_from(body.len()).map_err(|_| CoreError::PluginProtocol {
        plugin: "<unknown>".to_string(),
        message: "outgoing frame exceeds 4 GiB".to_string(),
    })?;
    sink.write_all(&len.to_be_bytes())
        .await
        .map_err(|e| CoreError::PluginProtocol {
            plugin: "<unknown>".to_string(),
            message: format!("write failed: {e}"),
        })?;
    sink.write_all(&body).await.map_err(|e| CoreError::PluginProtocol {
        plugin: "<unknown>".to_string(),
        message: format!("write failed: {e}"),
    })?;
    sink.flush().await.map_err(|e| CoreError::PluginProtocol {
        plugin: "<unknown>".to_string(),
        message: format!("flush failed: {e}"),
    })?;
    Ok(())
}

/// Reads one length-prefixed JSON frame from `source`, rejecting frames
/// over [`MAX_FRAME_BYTES`] without attempting to buffer them.
async fn read_frame<R: AsyncReadExt + Unpin>(source: &mut R, plugin: &str) -> CoreResult<Value> {
    let mut len_buf = [0u8; 4];
    source.read_exact(&mut len_buf).await.map_err(|e| CoreError::PluginProtocol {
        plugin: plugin.to_string(),
        message: format!("failed to read frame length: {e}"),
    })?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(CoreError::PluginProtocol {
            plugin: plugin.to_string(),
            message: format!("frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"),
        });
    }
    let mut body = vec![0u8; len as usize];
    source.read_exact(&mut body).await.map_err(|e| CoreError::PluginProtocol {
        plugin: plugin.to_string(),
        message: format!("failed to read frame body: {e}"),
    })?;
    serde_json::from_slice(&body).map_err(|e| CoreError::PluginProtocol {
        plugin: plugin.to_string(),
        message: format!("malformed frame: {e}"),
    })
}

/// Sends `SIGTERM` to `pid` by shelling out to the `kill` binary. Best
/// effort: a process that has already exited makes `kill` fail, which
/// is not itself an error worth surfacing.
fn send_sigterm(pid: u32) {
    let _ = std::process::Command::new("kill").args(["-TERM", &pid.to_string()]).output();
}

/// Runs a plugin executable and executes `request` against it end to
/// end: spawn, write the request frame, race the response against the
/// request timeout and idle timeout, and tear the child down no matter
/// which way the race resolves.
async fn run_request(
    executable: &Path,
    plugin_name: &str,
    request: &Value,
    request_timeout: Duration,
    idle_timeout: Duration,
    cancel: &CancellationToken,
    cancel_grace: Duration,
    kill_grace: Duration,
) -> CoreResult<Response> {
    let mut child = Command::new(executable)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CoreError::PluginExecution {
            plugin: plugin_name.to_string(),
            message: format!("failed to spawn {}: {e}", executable.display()),
        })?;

    let mut stdin = child.stdin.take().ok_or_else(|| CoreError::PluginExecution {
        plugin: plugin_name.to_string(),
        message: "plugin process has no stdin".to_string(),
    })?;
    let mut stdout = child.stdout.take().ok_or_else(|| CoreError::PluginExecution {
        plugin: plugin_name.to_string(),
        message: "plugin process has no stdout".to_string(),
    })?;

    write_frame(&mut stdin, request).await?;

    let idle = idle_timeout.min(request_timeout);
    let deadline = tokio::time::sleep(request_timeout);
    tokio::pin!(deadline);

    let outcome = tokio::select! {
        biased;
        _ = wait_for_cancel(cancel) => Err(CoreError::Canceled),
        _ = &mut deadline => Err(CoreError::PluginTimeout {
            plugin: plugin_name.to_string(),
            elapsed: humantime::format_duration(request_timeout).to_string(),
        }),
        result = tokio::time::timeout(idle, read_frame(&mut stdout, plugin_name)) => {
            match result {
                Ok(inner) => inner,
                Err(_) => Err(CoreError::PluginTimeout {
                    plugin: plugin_name.to_string(),
                    elapsed: humantime::format_duration(idle).to_string(),
                }),
            }
        }
    };

    match outcome {
        Ok(value) => {
            let _ = child.wait().await;
            serde_json::from_value(value).map_err(|e| CoreError::PluginProtocol {
                plugin: plugin_name.to_string(),
                message: format!("unrecognized response shape: {e}"),
            })
        }
        Err(err) => {
            teardown(&mut child, &mut stdin, cancel_grace, kill_grace).await;
            Err(err)
        }
    }
}

async fn wait_for_cancel(cancel: &CancellationToken) {
    loop {
        if cancel.is_canceled() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// The cancellation sequence: ask nicely with a `cancel`
/// frame, then `SIGTERM`, then `SIGKILL`, each separated by a grace
/// period so a cooperative plugin gets a chance to flush and exit.
async fn teardown(
    child: &mut Child,
    stdin: &mut tokio::process::ChildStdin,
    cancel_grace: Duration,
    kill_grace: Duration,
) {
    let cancel_frame = serde_json::json!({"type": "cancel"});
    let _ = write_frame(stdin, &cancel_frame).await;

    if tokio::time::timeout(cancel_grace, child.wait()).await.is_ok() {
        return;
    }

    if let Some(pid) = child.id() {
        send_sigterm(pid);
    }

    if tokio::time::timeout(kill_grace, child.wait()).await.is_ok() {
        return;
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Resolves plugin names against files in a configured plugin
/// directory and drives `get_info`/`execute`/`validate` requests
/// against each one.
pub struct PluginHost {
    directory: PathBuf,
    request_timeout: Duration,
    idle_timeout: Duration,
    cancel_grace: Duration,
    kill_grace: Duration,
}

impl PluginHost {
    pub fn new(
        directory: impl Into<PathBuf>,
        request_timeout: Duration,
        idle_timeout: Duration,
        cancel_grace: Duration,
        kill_grace: Duration,
    ) -> Self {
        Self {
            directory: directory.into(),
            request_timeout,
            idle_timeout,
            cancel_grace,
            kill_grace,
        }
    }

    /// The plugin directory's entries, sorted, skipping anything that
    /// isn't executable-looking (no extension filter: plugins are
    /// arbitrary executables, scripts included).
    pub fn discover(&self) -> CoreResult<Vec<String>> {
        if !self.directory.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = std::fs::read_dir(&self.directory)
            .map_err(|e| CoreError::Fatal(anyhow::anyhow!("failed to read plugin directory: {e}")))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }

    fn executable_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    pub async fn get_info(&self, name: &str, cancel: &CancellationToken) -> CoreResult<PluginInfo> {
        let request = serde_json::to_value(Request::GetInfo).unwrap();
        let response = run_request(
            &self.executable_path(name),
            name,
            &request,
            self.request_timeout,
            self.idle_timeout,
            cancel,
            self.cancel_grace,
            self.kill_grace,
        )
        .await?;
        match response {
            Response::Info {
                name,
                version,
                hooks,
                critical,
            } => Ok(PluginInfo {
                name,
                version,
                hooks,
                critical,
            }),
            Response::Error { message } => Err(CoreError::PluginExecution {
                plugin: name.to_string(),
                message,
            }),
            other => Err(unexpected_response(name, &other)),
        }
    }

    pub async fn validate(&self, name: &str, config: &Value, cancel: &CancellationToken) -> CoreResult<ValidateOutcome> {
        let request = serde_json::to_value(Request::Validate { config }).unwrap();
        let response = run_request(
            &self.executable_path(name),
            name,
            &request,
            self.request_timeout,
            self.idle_timeout,
            cancel,
            self.cancel_grace,
            self.kill_grace,
        )
        .await?;
        match response {
            Response::Validate { valid, message } => Ok(ValidateOutcome {
                plugin: name.to_string(),
                valid,
                message,
            }),
            Response::Error { message } => Err(CoreError::PluginExecution {
                plugin: name.to_string(),
                message,
            }),
            other => Err(unexpected_response(name, &other)),
        }
    }

    pub async fn execute(
        &self,
        name: &str,
        hook: Hook,
        context: &Value,
        config: &Value,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> CoreResult<ExecuteOutcome> {
        let request = serde_json::to_value(Request::Execute {
            hook,
            context,
            config,
            dry_run,
        })
        .unwrap();
        let sanitized_plugin = name.to_string();
        let response = run_request(
            &self.executable_path(name),
            name,
            &request,
            self.request_timeout,
            self.idle_timeout,
            cancel,
            self.cancel_grace,
            self.kill_grace,
        )
        .await?;
        match response {
            Response::Execute {
                success,
                critical,
                message,
                outputs,
            } => Ok(ExecuteOutcome {
                plugin: sanitized_plugin,
                hook,
                success,
                critical,
                message: message.map(|m| relicta_output_sanitizer::sanitize(&m)),
                outputs,
            }),
            Response::Error { message } => Err(CoreError::PluginExecution {
                plugin: sanitized_plugin,
                message: relicta_output_sanitizer::sanitize(&message),
            }),
            other => Err(unexpected_response(name, &other)),
        }
    }
}

fn unexpected_response(plugin: &str, response: &Response) -> CoreError {
    let kind = match response {
        Response::Info { .. } => "info",
        Response::Execute { .. } => "execute",
        Response::Validate { .. } => "validate",
        Response::Error { .. } => "error",
    };
    CoreError::PluginProtocol {
        plugin: plugin.to_string(),
        message: format!("unexpected response variant for this request: {kind}"),
    }
}
