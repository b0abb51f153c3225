//! Audit trail. Every
//! state transition on a run appends one entry; entries are never
//! edited or removed, only appended, and their persisted order is the
//! order transitions were committed.

use chrono::{DateTime, Utc};
use relicta_types::RunState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub run_id: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub previous_state: Option<RunState>,
    pub new_state: RunState,
    pub reason: String,
}

impl AuditEntry {
    pub fn new(
        run_id: impl Into<String>,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
        previous_state: Option<RunState>,
        new_state: RunState,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            actor: actor.into(),
            timestamp,
            previous_state,
            new_state,
            reason: reason.into(),
        }
    }
}
