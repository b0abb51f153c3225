//! Progress reporting for `relicta publish`, with TTY detection.
//!
//! The publish pipeline runs five plugin hooks in order; this
//! renders which hook is in flight and how many plugins answered it so
//! far, falling back to plain status lines when stdout isn't a TTY
//! (CI logs, `--json` mode, pipes).

use std::time::Instant;

use atty::Stream;
use indicatif::{ProgressBar, ProgressStyle};

/// Detects whether stdout is connected to a TTY.
pub fn is_tty() -> bool {
    atty::is(Stream::Stdout)
}

/// Progress reporter over the publish pipeline's hook stages. Shows a
/// progress bar in TTY mode, plain `eprintln!` status lines otherwise.
pub struct ProgressReporter {
    is_tty: bool,
    total_hooks: usize,
    current_hook: usize,
    current_label: String,
    progress_bar: Option<ProgressBar>,
    start_time: Instant,
}

impl ProgressReporter {
    /// `total_hooks` is normally [`relicta_core::plugin::Hook::ALL_IN_ORDER`].len().
    pub fn new(total_hooks: usize) -> Self {
        let is_tty = is_tty();
        let progress_bar = if is_tty {
            let pb = ProgressBar::new(total_hooks as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        Self {
            is_tty,
            total_hooks,
            current_hook: 0,
            current_label: String::new(),
            progress_bar,
            start_time: Instant::now(),
        }
    }

    /// A reporter that never renders a bar, regardless of TTY — used by
    /// `--json`/`--ci` runs where stdout must stay a single document.
    pub fn silent(total_hooks: usize) -> Self {
        Self {
            is_tty: false,
            total_hooks,
            current_hook: 0,
            current_label: String::new(),
            progress_bar: None,
            start_time: Instant::now(),
        }
    }

    /// Finishes the previous hook (if any) and starts the next one,
    /// for callers that only learn a hook's name when it starts.
    pub fn advance(&mut self, hook_name: &str) {
        if self.current_hook > 0 {
            self.finish_hook();
        }
        self.set_hook(self.current_hook + 1, hook_name);
    }

    pub fn set_hook(&mut self, index: usize, hook_name: &str) {
        self.current_hook = index;
        self.current_label = hook_name.to_string();

        if self.is_tty {
            if let Some(ref pb) = self.progress_bar {
                let elapsed = self.start_time.elapsed();
                let msg = format!("[{}/{}] running {}... ({elapsed:?})", self.current_hook, self.total_hooks, self.current_label);
                pb.set_message(msg);
                pb.set_position((self.current_hook - 1) as u64);
            }
        } else {
            eprintln!("[{}/{}] running {}...", self.current_hook, self.total_hooks, self.current_label);
        }
    }

    pub fn finish_hook(&mut self) {
        if self.is_tty {
            if let Some(ref pb) = self.progress_bar {
                pb.inc(1);
            }
        }
    }

    pub fn set_status(&self, status: &str) {
        if self.is_tty {
            if let Some(ref pb) = self.progress_bar {
                let current = pb.position();
                pb.set_message(format!("[{}/{}] {status}", current + 1, self.total_hooks));
            }
        } else {
            eprintln!("[status] {status}");
        }
    }

    pub fn finish(self) {
        let elapsed = self.start_time.elapsed();
        if self.is_tty {
            if let Some(pb) = self.progress_bar {
                pb.set_message(format!("completed {} hook(s) in {elapsed:?}", self.total_hooks));
                pb.finish();
            }
        } else {
            eprintln!("completed {} hook(s) in {elapsed:?}", self.total_hooks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_tty_returns_bool() {
        let _ = is_tty();
    }

    #[test]
    fn silent_reporter_disables_tty() {
        let reporter = ProgressReporter::silent(3);
        assert!(!reporter.is_tty);
        assert!(reporter.progress_bar.is_none());
    }

    #[test]
    fn set_hook_updates_state() {
        let mut reporter = ProgressReporter::silent(5);
        reporter.set_hook(1, "pre-publish");
        assert_eq!(reporter.current_hook, 1);
        assert_eq!(reporter.current_label, "pre-publish");
    }

    #[test]
    fn finish_completes_without_panic() {
        let reporter = ProgressReporter::silent(3);
        reporter.finish();
    }

    #[test]
    fn advance_moves_through_hooks_in_order() {
        let mut reporter = ProgressReporter::silent(3);
        reporter.advance("pre-publish");
        assert_eq!(reporter.current_hook, 1);
        reporter.advance("on-publish");
        assert_eq!(reporter.current_hook, 2);
        reporter.advance("post-publish");
        assert_eq!(reporter.current_hook, 3);
    }
}
