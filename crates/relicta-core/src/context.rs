//! Explicit execution context: every use case takes a `&Context` so
//! subsystems obtain their logger, clock, and cancellation signal from
//! an argument, not a global, so tests can substitute a fixed clock or
//! a capturing sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use relicta_config::Config;

/// A source of "now". Production uses [`SystemClock`]; tests use a fixed
/// instant so persisted timestamps are deterministic to assert on.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A fixed clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Cooperative cancellation token propagated from the command entry
/// point. Checked before each I/O call and between plugin hook
/// invocations; never interrupts a thread preemptively.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where use cases write human-facing progress lines. The CLI layer
/// implements this over stderr (leaving stdout free for `--json`
/// documents); tests implement it over a `Vec<String>` to assert on.
pub trait OutputSink: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// A sink that discards everything — the default for library embedders
/// who don't want us writing to their terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// A sink that collects lines in memory, for test assertions.
#[derive(Debug, Default)]
pub struct CapturingSink {
    pub lines: std::sync::Mutex<Vec<String>>,
}

impl OutputSink for CapturingSink {
    fn info(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("info: {message}"));
    }
    fn warn(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("warn: {message}"));
    }
    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("error: {message}"));
    }
}

/// The execution context threaded through every use case: config,
/// output sink, cancellation token, clock, and a source of randomness
/// (nonces). Subsystems take `&Context` rather than reading globals.
pub struct Context {
    pub config: Config,
    pub output: Arc<dyn OutputSink>,
    pub cancel: CancellationToken,
    pub clock: Arc<dyn Clock>,
    pub actor: String,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            output: Arc::new(NullSink),
            cancel: CancellationToken::new(),
            clock: Arc::new(SystemClock),
            actor: resolve_actor(),
        }
    }

    pub fn with_output(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.output = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }
}

/// Actor identification: `USER`, `USERNAME`, `GITHUB_ACTOR`, first
/// non-empty wins; fallback `"unknown"`.
pub fn resolve_actor() -> String {
    for var in ["USER", "USERNAME", "GITHUB_ACTOR"] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return value;
            }
        }
    }
    "unknown".to_string()
}

/// A nonce generator for execution authorizations. Wrapping `rand`
/// behind a trait keeps the nonce format swappable and test-seedable
/// without changing the authorization's shape.
pub fn generate_nonce() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.r#gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Monotonic-ish wall clock reading used only for log file names in the
/// CLI layer, kept here so `relicta-core` stays the single place that
/// touches `SystemTime` outside of `Clock`.
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
