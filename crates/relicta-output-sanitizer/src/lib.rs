//! Redacts recognized secret shapes from text before it reaches the
//! audit log or the terminal.
//!
//! Plugin config carries provider secrets (`GITHUB_TOKEN`,
//! `SLACK_WEBHOOK_URL`, …) by design, and plugin stdout/stderr can
//! echo them back — deliberately or by accident — in an `execute`
//! response's `message`/`outputs`. Anything derived from plugin text is
//! passed through [`sanitize`] before it is written to `decisions.log`,
//! `authorizations.log`, a run document, or the terminal.
//!
//! This is a best-effort textual scan, not a guarantee: it cannot redact a
//! secret it doesn't recognize the shape of.

/// Replaces recognized secret substrings in `text` with `[redacted]`.
pub fn sanitize(text: &str) -> String {
    let mut out = text.to_string();
    for pattern in PATTERNS {
        out = pattern.redact(&out);
    }
    out
}

struct Pattern {
    /// Literal prefix that introduces the secret, e.g. `"Bearer "`.
    prefix: &'static str,
}

impl Pattern {
    fn redact(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(idx) = rest.find(self.prefix) {
            out.push_str(&rest[..idx]);
            out.push_str(self.prefix);
            out.push_str("[redacted]");
            let after_prefix = &rest[idx + self.prefix.len()..];
            let token_len = after_prefix
                .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
                .unwrap_or(after_prefix.len());
            rest = &after_prefix[token_len..];
        }
        out.push_str(rest);
        out
    }
}

const PATTERNS: &[Pattern] = &[
    Pattern { prefix: "Bearer " },
    Pattern { prefix: "token=" },
    Pattern { prefix: "ghp_" },
    Pattern { prefix: "gho_" },
    Pattern {
        prefix: "https://hooks.slack.com/services/",
    },
];

/// Masks a secret value directly, for callers that already know which
/// string is sensitive (e.g. a resolved env var) rather than needing to
/// find it inside free text.
pub fn mask(secret: &str) -> String {
    if secret.len() <= 4 {
        "[redacted]".to_string()
    } else {
        format!("{}...[redacted]", &secret[..2])
    }
}
