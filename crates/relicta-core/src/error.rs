//! Error taxonomy. These are *kinds*, not concrete per-call error
//! types: every fallible surface in this crate returns one of these
//! variants (wrapped with `#[source]` context from `anyhow`/`thiserror`
//! where useful), and the CLI layer maps each to an exit code.

use relicta_types::RunState;

/// The taxonomy of errors a use case can return. Variant names are stable
/// so the CLI's exit-code mapping can match on them without re-deriving
/// the classification.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal transition from {from:?}: {reason}")]
    StateViolation { from: RunState, reason: String },

    #[error("a non-terminal release run already exists for this repository: {run_id}")]
    ActiveRunConflict { run_id: String },

    #[error("execution authorization required: {0}")]
    AuthorizationRequired(String),

    #[error("execution authorization expired or already consumed: {0}")]
    AuthorizationExpired(String),

    #[error("tag conflict: {0}")]
    TagConflict(String),

    #[error("plugin protocol error ({plugin}): {message}")]
    PluginProtocol { plugin: String, message: String },

    #[error("plugin timed out ({plugin}) after {elapsed}")]
    PluginTimeout { plugin: String, elapsed: String },

    #[error("plugin execution failed ({plugin}): {message}")]
    PluginExecution { plugin: String, message: String },

    #[error("transient error: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("fatal error: {0}")]
    Fatal(#[source] anyhow::Error),

    #[error("operation canceled")]
    Canceled,
}

impl CoreError {
    /// A short machine-readable tag for JSON error output (`{error: {kind, ...}}`).
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::NotFound(_) => "not_found",
            CoreError::StateViolation { .. } => "state_violation",
            CoreError::ActiveRunConflict { .. } => "active_run_conflict",
            CoreError::AuthorizationRequired(_) => "authorization_required",
            CoreError::AuthorizationExpired(_) => "authorization_expired",
            CoreError::TagConflict(_) => "tag_conflict",
            CoreError::PluginProtocol { .. } => "plugin_protocol",
            CoreError::PluginTimeout { .. } => "plugin_timeout",
            CoreError::PluginExecution { .. } => "plugin_execution",
            CoreError::Transient(_) => "transient",
            CoreError::Fatal(_) => "fatal",
            CoreError::Canceled => "canceled",
        }
    }

    /// Process exit code. `health` has its own `2` mapping the CLI layer
    /// applies separately; every other command uses this.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::InvalidInput(_) => 3,
            CoreError::ActiveRunConflict { .. } => 4,
            CoreError::AuthorizationRequired(_) | CoreError::AuthorizationExpired(_) => 5,
            _ => 1,
        }
    }

    /// One-line operator guidance shown after the text-mode headline.
    pub fn hint(&self) -> Option<String> {
        match self {
            CoreError::ActiveRunConflict { run_id } => Some(format!(
                "Use `relicta cancel {run_id}` or `relicta reset {run_id}` before planning a new run."
            )),
            CoreError::AuthorizationRequired(_) => {
                Some("Use `relicta approve --yes` to obtain a fresh authorization.".to_string())
            }
            CoreError::AuthorizationExpired(_) => {
                Some("Re-run `relicta approve` to mint a new authorization.".to_string())
            }
            CoreError::StateViolation { .. } => {
                Some("Use `relicta status` to inspect the run's current state.".to_string())
            }
            CoreError::TagConflict(_) => Some("Re-run with `--force` to overwrite the existing tag.".to_string()),
            _ => None,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
