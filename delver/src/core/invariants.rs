//! Semantic invariants on session state.

use crate::core::types::SessionState;

/// Check session invariants that hold at every iteration boundary:
/// - `attempts.len()` equals `depth`
/// - attempt depths run `1..=depth` in order
/// - `confidence` within `[0, 1]`, both on the state and on every attempt
/// - `depth` never past `max_depth`
pub fn validate_session(state: &SessionState, max_depth: u32) -> Vec<String> {
    let mut errors = Vec::new();

    if state.attempts.len() != state.depth as usize {
        errors.push(format!(
            "attempt log has {} entries but depth is {}",
            state.attempts.len(),
            state.depth
        ));
    }

    for (index, attempt) in state.attempts.iter().enumerate() {
        let expected = index as u32 + 1;
        if attempt.depth != expected {
            errors.push(format!(
                "attempt {} records depth {} (expected {})",
                index, attempt.depth, expected
            ));
        }
        if !(0.0..=1.0).contains(&attempt.confidence) {
            errors.push(format!(
                "attempt {} confidence {} outside [0, 1]",
                index, attempt.confidence
            ));
        }
    }

    if !(0.0..=1.0).contains(&state.confidence) {
        errors.push(format!("confidence {} outside [0, 1]", state.confidence));
    }

    if state.depth > max_depth {
        errors.push(format!(
            "depth {} exceeds max_depth {}",
            state.depth, max_depth
        ));
    }

    errors
}
