//! Restricted executor for oracle-authored search snippets.
//!
//! A snippet runs against the read-only document with a fixed capability set
//! and must bind its answer to the `result` variable; the executor reads that
//! binding afterwards and never infers output from anything else. The
//! environment is rebuilt per invocation, so identical snippet + document
//! always produce the identical classification and payload.

use std::sync::LazyLock;

use tracing::{debug, instrument};

use crate::core::truncate::prefix_chars;

mod interp;
mod json_mod;
mod lexer;
mod parser;
mod regex_mod;
mod str_methods;

pub use interp::Value;
pub use parser::ALLOWED_MODULES;

/// Name the snippet must bind its answer to.
pub const OUTPUT_VAR: &str = "result";

/// Default cap on `Success` payload characters.
pub const DEFAULT_OUTPUT_CAP: usize = 2000;

/// Marker appended to a capped payload.
pub const TRUNCATION_MARKER: &str = "[truncated]";

/// Exhaustive classification of one snippet execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnippetOutcome {
    /// `result` was bound to something non-empty. The payload is already
    /// truncated to the configured cap.
    Success(String),
    /// `result` was bound but empty or falsy.
    Empty,
    /// `result` was never bound — a usage error, not a crash.
    Unassigned,
    /// Compile-time violation or runtime failure, with a diagnostic safe to
    /// return to the oracle.
    Error(String),
}

impl SnippetOutcome {
    /// Character length of the payload (0 for everything but `Success`).
    pub fn output_len(&self) -> usize {
        match self {
            SnippetOutcome::Success(text) => text.chars().count(),
            _ => 0,
        }
    }

    /// Text handed back to the oracle as the tool turn.
    pub fn feedback(&self) -> String {
        match self {
            SnippetOutcome::Success(text) => text.clone(),
            SnippetOutcome::Empty => {
                "The search ran but produced an empty result. Try a broader pattern or a \
                 different part of the document."
                    .to_string()
            }
            SnippetOutcome::Unassigned => format!(
                "The snippet executed, but the variable '{OUTPUT_VAR}' was never assigned. \
                 Assign your answer to '{OUTPUT_VAR}'."
            ),
            SnippetOutcome::Error(message) => format!("Sandbox execution error: {message}"),
        }
    }
}

/// Execute one snippet against the document with the default output cap.
pub fn execute(document: &str, snippet: &str) -> SnippetOutcome {
    execute_with_cap(document, snippet, DEFAULT_OUTPUT_CAP)
}

/// Execute one snippet, truncating `Success` payloads at `output_cap` chars.
#[instrument(skip_all, fields(snippet_len = snippet.len()))]
pub fn execute_with_cap(document: &str, snippet: &str, output_cap: usize) -> SnippetOutcome {
    let cleaned = strip_markdown_fences(snippet);
    let program = match parser::parse(&cleaned) {
        Ok(program) => program,
        Err(message) => {
            debug!(%message, "snippet rejected at compile time");
            return SnippetOutcome::Error(message);
        }
    };
    let env = match interp::run(document, &program) {
        Ok(env) => env,
        Err(message) => {
            debug!(%message, "snippet failed at runtime");
            return SnippetOutcome::Error(message);
        }
    };
    let outcome = match env.get(OUTPUT_VAR) {
        None => SnippetOutcome::Unassigned,
        Some(value) if !value.is_truthy() => SnippetOutcome::Empty,
        Some(value) => SnippetOutcome::Success(truncate_output(&value.display(), output_cap)),
    };
    debug!(output_len = outcome.output_len(), "snippet executed");
    outcome
}

/// Exact prefix of `output_cap` characters plus the marker; shorter output is
/// returned unchanged.
fn truncate_output(text: &str, output_cap: usize) -> String {
    let prefix = prefix_chars(text, output_cap);
    if prefix.len() == text.len() {
        return text.to_string();
    }
    format!("{prefix}{TRUNCATION_MARKER}")
}

/// Oracles wrap snippets in markdown fences despite instructions not to;
/// strip the wrapper before compiling, as the original tool did.
fn strip_markdown_fences(snippet: &str) -> String {
    static FENCE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?m)^```[a-zA-Z]*\s*$\n?|```\s*$").unwrap()
    });
    FENCE_RE.replace_all(snippet, "").trim().to_string()
}
