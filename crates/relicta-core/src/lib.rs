//! # relicta-core
//!
//! The hard engineering behind `relicta`: commit classification, version
//! calculus, the release-run state machine, governance evaluation, and the
//! publish pipeline. Everything here is a use case over a single persisted
//! aggregate — it has no terminal rendering, no wizard, no config-file
//! loading of its own. Those are `relicta-cli`'s job; this crate only
//! consumes an already-parsed [`relicta_config::Config`].
//!
//! ## Pipeline
//!
//! Data flows linearly through *plan → bump → notes → approve → publish*:
//! each stage reads the [`run::ReleaseRun`] aggregate, produces a new plan,
//! decision, notes artifact, or result, then writes the aggregate back
//! atomically through [`persistence::RunStore`].
//!
//! ## Modules
//!
//! - [`version_calc`] — Version Calculator use case
//! - [`classifier`] — Commit Classifier: four layered strategies
//! - [`aggregator`] — Change Aggregator & release-type rule
//! - [`run`] — Release Run aggregate & state machine
//! - [`audit`] — Append-only audit trail entries
//! - [`persistence`] — Atomic durable store for runs, decisions, authorizations
//! - [`governance`] — Governance Evaluator: risk scoring and approval gating
//! - [`memory`] — Actor metrics and risk-pattern memory store
//! - [`publish`] — Publish Pipeline: tag, push, plugin orchestration
//! - [`plugin`] — Plugin Host: framed stdio protocol with child processes
//! - [`git`] — Shell-out git read/write operations
//! - [`context`] — Explicit execution context: clock, cancellation, output sink
//! - [`error`] — Error taxonomy

pub mod aggregator;
pub mod audit;
pub mod classifier;
pub mod context;
pub mod error;
pub mod git;
pub mod governance;
pub mod memory;
pub mod persistence;
pub mod plugin;
pub mod publish;
pub mod run;
pub mod version_calc;

pub use error::{CoreError, CoreResult};
