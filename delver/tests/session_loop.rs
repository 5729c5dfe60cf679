//! Loop-level tests driving full sessions against a scripted oracle.
//!
//! These verify end-to-end behavior: depth accounting, routing priorities,
//! failure absorption, tool feedback, and loop termination.

use delver::core::types::{AttemptOutcome, Role, SessionStop};
use delver::io::config::Config;
use delver::io::document::DocumentStore;
use delver::session::{AppContext, CancelToken, run_session};
use delver::test_support::{FIXTURE_DOCUMENT, ScriptedOracle, ScriptedReply, answer_reply};

fn context(max_depth: u32) -> AppContext {
    let mut config = Config::default();
    config.session.max_depth = max_depth;
    config.session.confidence_threshold = 0.8;
    AppContext::new(DocumentStore::from_text(FIXTURE_DOCUMENT), config)
}

/// Empty search then a confident answer.
///
/// Iteration 1: tool call finds nothing -> `Empty` -> router continues even
/// though nothing else suggests retrying. Iteration 2: structured answer at
/// confidence 0.9 -> router exits on that same iteration. The attempt log has
/// exactly 2 entries with consecutive depths.
#[test]
fn empty_result_retries_then_confident_answer_exits() {
    let ctx = context(3);
    let oracle = ScriptedOracle::new(vec![
        ScriptedReply::Tool("result = re.findall('no such heading', doc)".to_string()),
        answer_reply("Late payment penalty is 2.5% per month.", 0.9),
    ]);

    let outcome = run_session(&ctx, &oracle, "What is the late payment penalty?", &CancelToken::new())
        .expect("session");

    assert_eq!(outcome.stop, SessionStop::ConfidenceReached);
    assert_eq!(outcome.state.depth, 2);
    assert_eq!(outcome.state.attempts.len(), 2);
    assert_eq!(outcome.state.attempts[0].depth, 1);
    assert_eq!(outcome.state.attempts[0].outcome, AttemptOutcome::Empty);
    assert_eq!(outcome.state.attempts[1].depth, 2);
    assert_eq!(outcome.state.attempts[1].outcome, AttemptOutcome::Success);
    assert_eq!(outcome.state.confidence, 0.9);
    assert_eq!(
        outcome.answer.as_deref(),
        Some("Late payment penalty is 2.5% per month.")
    );
    assert_eq!(oracle.calls(), 2);
}

/// A failing oracle call is one consumed iteration, not a fault.
///
/// Iteration 1: simulated server error -> `Error` attempt entry, depth 1,
/// confidence 0.0, and the router continues (depth < cap, confidence below
/// threshold). Iteration 2 answers confidently.
#[test]
fn oracle_failure_consumes_depth_and_continues() {
    let ctx = context(3);
    let oracle = ScriptedOracle::new(vec![
        ScriptedReply::Failure("status 500: upstream unavailable".to_string()),
        answer_reply("Transfers cost 12 francs plus 0.1%.", 0.95),
    ]);

    let outcome = run_session(&ctx, &oracle, "International transfer fees?", &CancelToken::new())
        .expect("session");

    assert_eq!(outcome.state.attempts[0].outcome, AttemptOutcome::Error);
    assert_eq!(outcome.state.attempts[0].confidence, 0.0);
    assert_eq!(outcome.state.attempts[0].depth, 1);
    assert_eq!(outcome.stop, SessionStop::ConfidenceReached);
    assert_eq!(outcome.state.depth, 2);
    assert_eq!(oracle.calls(), 2);

    // The failure became a feedback turn for the next prompt.
    let requests = oracle.recorded_requests();
    let fed_back = requests[1]
        .turns
        .iter()
        .any(|turn| turn.role == Role::Assistant && turn.content.contains("oracle error"));
    assert!(fed_back);
}

/// The depth cap is a hard stop regardless of pending tool requests.
#[test]
fn depth_cap_terminates_even_with_tool_requests_pending() {
    let ctx = context(2);
    let oracle = ScriptedOracle::new(vec![
        ScriptedReply::Tool("result = doc[:40]".to_string()),
        ScriptedReply::Tool("result = doc[40:80]".to_string()),
    ]);

    let outcome =
        run_session(&ctx, &oracle, "Summarize the document.", &CancelToken::new()).expect("session");

    assert_eq!(outcome.stop, SessionStop::DepthExhausted);
    assert_eq!(outcome.state.depth, 2);
    assert_eq!(outcome.state.attempts.len(), 2);
    assert_eq!(oracle.calls(), 2);
}

/// Once confidence crosses the threshold the router exits immediately, never
/// deferring to a later iteration.
#[test]
fn threshold_confidence_exits_on_first_iteration() {
    let ctx = context(5);
    let oracle = ScriptedOracle::new(vec![answer_reply("2.5% per month", 0.8)]);

    let outcome =
        run_session(&ctx, &oracle, "Penalty?", &CancelToken::new()).expect("session");

    assert_eq!(outcome.stop, SessionStop::ConfidenceReached);
    assert_eq!(outcome.state.depth, 1);
    assert_eq!(oracle.calls(), 1);
}

/// A plain answer below the threshold settles the session: no tool request,
/// no empty result, nothing left to do.
#[test]
fn plain_answer_below_threshold_settles() {
    let ctx = context(5);
    let oracle = ScriptedOracle::new(vec![ScriptedReply::Text(
        "It is probably 2.5%, confidence: 0.5".to_string(),
    )]);

    let outcome =
        run_session(&ctx, &oracle, "Penalty?", &CancelToken::new()).expect("session");

    assert_eq!(outcome.stop, SessionStop::Settled);
    assert_eq!(outcome.state.confidence, 0.5);
    assert_eq!(
        outcome.answer.as_deref(),
        Some("It is probably 2.5%, confidence: 0.5")
    );
}

/// Successful tool output is appended as a tool turn and replayed in the
/// next prompt window.
#[test]
fn tool_output_feeds_the_next_prompt() {
    let ctx = context(3);
    let oracle = ScriptedOracle::new(vec![
        ScriptedReply::Tool("result = doc[:22]".to_string()),
        answer_reply("It is a banking terms document.", 0.9),
    ]);

    let outcome = run_session(&ctx, &oracle, "What kind of document is this?", &CancelToken::new())
        .expect("session");
    assert_eq!(outcome.state.attempts[0].outcome, AttemptOutcome::Success);

    let requests = oracle.recorded_requests();
    assert_eq!(requests.len(), 2);
    let tool_turn = requests[1]
        .turns
        .iter()
        .find(|turn| turn.role == Role::Tool)
        .expect("tool turn in second prompt");
    assert!(tool_turn.content.contains("# Retail Banking Terms"));
}

/// Sandbox violations surface as corrective diagnostics, and the loop keeps
/// going.
#[test]
fn sandbox_violation_is_fed_back_as_diagnostic() {
    let ctx = context(3);
    let oracle = ScriptedOracle::new(vec![
        ScriptedReply::Tool("import os\nresult = os.getcwd()".to_string()),
        answer_reply("recovered", 0.9),
    ]);

    let outcome =
        run_session(&ctx, &oracle, "anything", &CancelToken::new()).expect("session");

    assert_eq!(outcome.state.attempts[0].outcome, AttemptOutcome::Error);
    assert_eq!(outcome.stop, SessionStop::ConfidenceReached);

    let requests = oracle.recorded_requests();
    let diagnostic = requests[1]
        .turns
        .iter()
        .find(|turn| turn.role == Role::Tool)
        .expect("diagnostic turn");
    assert!(diagnostic.content.contains("Sandbox execution error"));
    assert!(diagnostic.content.contains("import of 'os' is not allowed"));
}

/// An unassigned output variable comes back as a usage correction.
#[test]
fn unassigned_output_variable_is_corrected() {
    let ctx = context(3);
    let oracle = ScriptedOracle::new(vec![
        ScriptedReply::Tool("chunk = doc[:40]".to_string()),
        answer_reply("done", 0.9),
    ]);

    let outcome =
        run_session(&ctx, &oracle, "anything", &CancelToken::new()).expect("session");

    assert_eq!(outcome.state.attempts[0].outcome, AttemptOutcome::Unassigned);
    let requests = oracle.recorded_requests();
    let correction = requests[1]
        .turns
        .iter()
        .find(|turn| turn.role == Role::Tool)
        .expect("correction turn");
    assert!(correction.content.contains("'result' was never assigned"));
}

/// Cancellation observed before the first iteration terminates immediately
/// without consuming oracle calls or depth.
#[test]
fn cancellation_at_iteration_boundary() {
    let ctx = context(5);
    let oracle = ScriptedOracle::new(vec![answer_reply("never used", 0.9)]);
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = run_session(&ctx, &oracle, "anything", &cancel).expect("session");

    assert_eq!(outcome.stop, SessionStop::Cancelled);
    assert_eq!(outcome.state.depth, 0);
    assert!(outcome.state.attempts.is_empty());
    assert_eq!(outcome.answer, None);
    assert_eq!(oracle.calls(), 0);
}
