//! Shared deterministic types for the session core.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use serde::{Deserialize, Serialize};

/// Speaker of a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One conversational unit.
///
/// Every inbound shape (wire message, tool result, the initial query) is
/// normalized into this record at the io boundary; nothing downstream
/// inspects provider-specific shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// Signal derived from the most recent turn, consumed by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSignal {
    /// The last search (or the oracle call itself) produced nothing usable.
    EmptyResult,
    /// The last turn carries tool output the oracle has not yet read, or an
    /// explicit request for another search.
    RequestsTool,
    /// Plain answer turn.
    None,
}

/// Classification of one sandbox execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Empty,
    Unassigned,
    Error,
}

/// Append-only log entry, one per completed iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchAttempt {
    /// Iteration this attempt completed (1-indexed).
    pub depth: u32,
    /// Bounded excerpt of the executed snippet, or of the query when the
    /// iteration ran no snippet.
    pub snippet_excerpt: String,
    pub outcome: AttemptOutcome,
    /// Character length of the (pre-truncation) output.
    pub output_len: usize,
    /// Confidence parsed from the oracle response for this iteration.
    pub confidence: f64,
}

/// Mutable state of one session, exclusively owned by its orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub turns: Vec<Turn>,
    /// Count of completed iterations. Increments by exactly 1 per iteration.
    pub depth: u32,
    /// Most recently parsed confidence, always within `[0, 1]`.
    pub confidence: f64,
    pub attempts: Vec<SearchAttempt>,
}

impl SessionState {
    /// Fresh state seeded with the query as the first turn.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user(query)],
            depth: 0,
            confidence: 0.0,
            attempts: Vec::new(),
        }
    }

    pub fn last_assistant(&self) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant)
    }
}

/// Reason a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStop {
    /// The iteration budget ran out.
    DepthExhausted,
    /// Reported confidence reached the configured threshold.
    ConfidenceReached,
    /// The oracle answered without requesting another search.
    Settled,
    /// Cancellation observed at an iteration boundary.
    Cancelled,
}

/// Terminal result of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub stop: SessionStop,
    /// Best-effort final answer extracted from the last assistant turn.
    pub answer: Option<String>,
}
