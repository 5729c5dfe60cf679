//! Deterministic routing decision for the agent loop.

use crate::core::types::{SessionStop, TurnSignal};

/// Limits the router holds a session to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutePolicy {
    /// Hard cap on completed iterations.
    pub max_depth: u32,
    /// Confidence at or above this value ends the session.
    pub confidence_threshold: f64,
}

/// Routing decision for the next iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Continue,
    Exit(SessionStop),
}

/// Decide whether the loop runs another iteration.
///
/// Rules are evaluated in a fixed priority order; later rules never override
/// earlier ones:
///
/// 1. depth at the cap -> exit (hard safety valve)
/// 2. confidence at the threshold -> exit
/// 3. empty result -> continue. Confidence below the threshold is ignored
///    here: self-reported confidence straight after an empty search is
///    treated as unreliable, so the empty result forces another attempt.
/// 4. pending tool output or tool request -> continue
/// 5. otherwise -> exit (the oracle answered and asked for nothing more)
pub fn route(depth: u32, confidence: f64, signal: TurnSignal, policy: &RoutePolicy) -> Route {
    if depth >= policy.max_depth {
        return Route::Exit(SessionStop::DepthExhausted);
    }
    if confidence >= policy.confidence_threshold {
        return Route::Exit(SessionStop::ConfidenceReached);
    }
    match signal {
        TurnSignal::EmptyResult | TurnSignal::RequestsTool => Route::Continue,
        TurnSignal::None => Route::Exit(SessionStop::Settled),
    }
}
