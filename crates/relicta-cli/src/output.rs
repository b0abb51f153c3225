//! The CLI's [`relicta_core::context::OutputSink`] implementation.
//!
//! Human-facing progress always goes to stderr so stdout stays a single
//! JSON document under `--json`. `emit` is the command-level counterpart:
//! it either prints one `serde_json::Value` to stdout or runs a closure
//! that prints human-readable text.

use std::sync::{Arc, Mutex};

use relicta_core::context::OutputSink;
use relicta_core::error::CoreError;

use crate::progress::ProgressReporter;
use crate::LogLevel;

#[derive(Clone)]
pub struct CliOutput {
    json: bool,
    no_color: bool,
    ci: bool,
    log_level: LogLevel,
    progress: Arc<Mutex<Option<ProgressReporter>>>,
}

impl CliOutput {
    pub fn new(json: bool, no_color: bool, ci: bool, log_level: LogLevel) -> Self {
        Self { json, no_color, ci, log_level, progress: Arc::new(Mutex::new(None)) }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn no_color(&self) -> bool {
        self.no_color
    }

    pub fn ci(&self) -> bool {
        self.ci
    }

    /// Starts a hook-stage progress bar (or plain status lines outside a
    /// TTY) for the duration of a publish call. `info()` messages of the
    /// form `"running hook: <name>"` advance it; `finish_publish_progress`
    /// closes it out.
    pub fn begin_publish_progress(&self, total_hooks: usize) {
        if self.json {
            return;
        }
        let reporter = if self.ci { ProgressReporter::silent(total_hooks) } else { ProgressReporter::new(total_hooks) };
        *self.progress.lock().unwrap() = Some(reporter);
    }

    pub fn finish_publish_progress(&self) {
        if let Some(reporter) = self.progress.lock().unwrap().take() {
            reporter.finish();
        }
    }

    /// Prints `value` as the command's single JSON document under
    /// `--json`, otherwise runs `text` for human-readable output.
    pub fn emit(&self, value: serde_json::Value, text: impl FnOnce()) {
        if self.json {
            println!("{}", serde_json::to_string_pretty(&value).expect("JSON output values are always serializable"));
        } else {
            text();
        }
    }

    fn should_log(&self, level: LogLevel) -> bool {
        level as u8 >= self.log_level as u8
    }

    pub fn error(&self, err: &CoreError) {
        if self.json {
            let value = serde_json::json!({
                "error": err.to_string(),
                "kind": err.kind(),
                "hint": err.hint(),
            });
            eprintln!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| err.to_string()));
        } else {
            eprintln!("error: {err}");
            if let Some(hint) = err.hint() {
                eprintln!("hint: {hint}");
            }
        }
    }
}

impl OutputSink for CliOutput {
    fn info(&self, message: &str) {
        if let Some(hook_name) = message.strip_prefix("running hook: ") {
            let mut guard = self.progress.lock().unwrap();
            if let Some(reporter) = guard.as_mut() {
                reporter.advance(hook_name);
                return;
            }
        }
        if self.should_log(LogLevel::Info) {
            eprintln!("{message}");
        }
    }

    fn warn(&self, message: &str) {
        if self.should_log(LogLevel::Warn) {
            eprintln!("warn: {message}");
        }
    }

    fn error(&self, message: &str) {
        if self.should_log(LogLevel::Error) {
            eprintln!("error: {message}");
        }
    }
}
