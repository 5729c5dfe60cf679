//! Orchestration of one question-answering session.
//!
//! The loop drives `INIT -> GENERATE -> EVALUATE -> {CONTINUE | EXIT}`: build
//! a bounded prompt, call the oracle once, run at most one sandbox execution,
//! parse confidence, append an attempt entry, advance depth, and route. Every
//! per-iteration failure is absorbed into a feedback turn for the next prompt
//! rather than aborting the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::confidence::{parse_confidence, strip_code_fence};
use crate::core::invariants::validate_session;
use crate::core::router::{Route, RoutePolicy, route};
use crate::core::sandbox::{self, SnippetOutcome};
use crate::core::truncate::excerpt;
use crate::core::types::{
    AttemptOutcome, SearchAttempt, SessionOutcome, SessionState, SessionStop, Turn, TurnSignal,
};
use crate::io::config::Config;
use crate::io::document::DocumentStore;
use crate::io::oracle::{Oracle, OracleRequest};
use crate::io::prompt::PromptBuilder;

const ANSWER_SCHEMA: &str = include_str!("../schemas/answer.schema.json");

/// Bounded excerpt length for attempt log entries.
const EXCERPT_CHARS: usize = 120;

/// Immutable process-wide context, constructed once at startup and passed by
/// reference into every session. No component reaches for ambient globals.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub document: DocumentStore,
    pub config: Config,
}

impl AppContext {
    pub fn new(document: DocumentStore, config: Config) -> Self {
        Self { document, config }
    }
}

/// Cancellation flag observed at iteration boundaries only: an in-flight
/// oracle or sandbox call always runs to completion (or times out) first.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything recorded about one completed iteration before routing.
struct IterationRecord {
    signal: TurnSignal,
    outcome: AttemptOutcome,
    output_len: usize,
    excerpt: String,
}

/// Run a full session for one query and return its terminal state.
#[instrument(skip_all, fields(query_chars = query.chars().count()))]
pub fn run_session<O: Oracle>(
    ctx: &AppContext,
    oracle: &O,
    query: &str,
    cancel: &CancelToken,
) -> Result<SessionOutcome> {
    let policy = RoutePolicy {
        max_depth: ctx.config.session.max_depth,
        confidence_threshold: ctx.config.session.confidence_threshold,
    };
    let builder = PromptBuilder::new(&ctx.config.prompt);
    let system = builder.system_instructions(ctx.document.char_len())?;

    let mut state = SessionState::new(query);

    let stop = loop {
        if cancel.is_cancelled() {
            info!(depth = state.depth, "session cancelled");
            break SessionStop::Cancelled;
        }

        let request = OracleRequest {
            system: system.clone(),
            turns: builder.window(&state.turns),
            temperature: ctx.config.oracle.temperature,
        };

        let record = match oracle.complete(&request) {
            Ok(reply) => {
                let confidence = parse_confidence(&reply.content).value_or_zero();
                state.confidence = confidence;
                let snippet = reply.requested_snippet();
                state.turns.push(Turn::assistant(reply.content));
                match snippet {
                    Some(code) => run_snippet(ctx, &mut state, &code),
                    None => answer_only_record(&state, query),
                }
            }
            Err(err) => {
                // Oracle failures are feedback, not faults: record the error,
                // spend the depth unit, and let the router decide.
                warn!(err = %err, depth = state.depth, "oracle call failed");
                state.confidence = 0.0;
                state
                    .turns
                    .push(Turn::assistant(format!("oracle error: {err:#}")));
                IterationRecord {
                    signal: TurnSignal::EmptyResult,
                    outcome: AttemptOutcome::Error,
                    output_len: 0,
                    excerpt: excerpt(query, EXCERPT_CHARS),
                }
            }
        };

        state.attempts.push(SearchAttempt {
            depth: state.depth + 1,
            snippet_excerpt: record.excerpt,
            outcome: record.outcome,
            output_len: record.output_len,
            confidence: state.confidence,
        });
        state.depth += 1;

        debug!(
            depth = state.depth,
            confidence = state.confidence,
            signal = ?record.signal,
            outcome = ?record.outcome,
            "iteration complete"
        );

        match route(state.depth, state.confidence, record.signal, &policy) {
            Route::Continue => {}
            Route::Exit(stop) => break stop,
        }
    };

    let violations = validate_session(&state, policy.max_depth);
    if !violations.is_empty() {
        bail!("session invariants failed: {}", violations.join("; "));
    }

    let answer = extract_answer(&state);
    info!(
        stop = ?stop,
        depth = state.depth,
        confidence = state.confidence,
        answered = answer.is_some(),
        "session finished"
    );
    Ok(SessionOutcome { state, stop, answer })
}

/// Execute the requested snippet (exactly once per iteration) and append the
/// classified result as a tool turn.
fn run_snippet(ctx: &AppContext, state: &mut SessionState, code: &str) -> IterationRecord {
    let outcome = sandbox::execute_with_cap(
        ctx.document.text(),
        code,
        ctx.config.sandbox.output_cap_chars,
    );
    let record = IterationRecord {
        signal: match outcome {
            SnippetOutcome::Empty => TurnSignal::EmptyResult,
            // Success, Unassigned, and Error all leave tool output the
            // oracle has not read yet.
            _ => TurnSignal::RequestsTool,
        },
        outcome: match outcome {
            SnippetOutcome::Success(_) => AttemptOutcome::Success,
            SnippetOutcome::Empty => AttemptOutcome::Empty,
            SnippetOutcome::Unassigned => AttemptOutcome::Unassigned,
            SnippetOutcome::Error(_) => AttemptOutcome::Error,
        },
        output_len: outcome.output_len(),
        excerpt: excerpt(code, EXCERPT_CHARS),
    };
    state.turns.push(Turn::tool(outcome.feedback()));
    record
}

/// An iteration that ran no snippet: the oracle answered (or said nothing).
fn answer_only_record(state: &SessionState, query: &str) -> IterationRecord {
    let content = state
        .last_assistant()
        .map(|turn| turn.content.as_str())
        .unwrap_or_default();
    let empty = content.trim().is_empty();
    IterationRecord {
        signal: TurnSignal::None,
        outcome: if empty {
            AttemptOutcome::Empty
        } else {
            AttemptOutcome::Success
        },
        output_len: content.chars().count(),
        excerpt: excerpt(query, EXCERPT_CHARS),
    }
}

/// Best-effort final answer from the last assistant turn.
///
/// A schema-valid JSON answer object yields its `answer` field; anything else
/// falls back to the raw turn text.
fn extract_answer(state: &SessionState) -> Option<String> {
    let content = state.last_assistant()?.content.trim();
    if content.is_empty() {
        return None;
    }
    if let Some(answer) = structured_answer(content) {
        return Some(answer);
    }
    Some(content.to_string())
}

fn structured_answer(content: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(strip_code_fence(content)).ok()?;
    validate_answer_schema(&parsed).ok()?;
    parsed
        .get("answer")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Validate an answer object against the embedded schema (Draft 2020-12).
fn validate_answer_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(ANSWER_SCHEMA).context("parse answer schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile answer schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("answer schema validation failed: {}", messages.join("; "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_answer_accepts_valid_object() {
        let content = r#"{"answer": "The penalty is 5%.", "confidence": 0.9}"#;
        assert_eq!(structured_answer(content).as_deref(), Some("The penalty is 5%."));
    }

    #[test]
    fn structured_answer_accepts_fenced_object() {
        let content = "```json\n{\"answer\": \"x\", \"confidence\": 0.5}\n```";
        assert_eq!(structured_answer(content).as_deref(), Some("x"));
    }

    #[test]
    fn structured_answer_rejects_schema_violations() {
        // confidence above 1 fails the schema, so the raw text is kept.
        assert_eq!(structured_answer(r#"{"answer": "x", "confidence": 3}"#), None);
        assert_eq!(structured_answer(r#"{"answer": ""}"#), None);
        assert_eq!(structured_answer("plain prose"), None);
    }

    #[test]
    fn extract_answer_falls_back_to_raw_text() {
        let mut state = SessionState::new("q");
        state.turns.push(Turn::assistant("The fee is 12 francs."));
        assert_eq!(
            extract_answer(&state).as_deref(),
            Some("The fee is 12 francs.")
        );
    }

    #[test]
    fn extract_answer_without_assistant_turn_is_none() {
        let state = SessionState::new("q");
        assert_eq!(extract_answer(&state), None);
    }

    #[test]
    fn cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.clone().is_cancelled());
    }
}
