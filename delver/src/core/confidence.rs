//! Confidence extraction from oracle responses.
//!
//! Two ordered strategies, neither of which can fail the loop: a structured
//! JSON parse first, then a tolerant scan for a labeled numeric literal. Call
//! sites consume a tagged outcome instead of catching errors.

use std::sync::LazyLock;

use serde_json::Value;

/// Outcome of a confidence parse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfidenceParse {
    /// A value in `[0, 1]` was found.
    Parsed(f64),
    /// Neither strategy matched; callers fall back to `0.0`.
    Unparsed,
}

impl ConfidenceParse {
    pub fn value_or_zero(self) -> f64 {
        match self {
            ConfidenceParse::Parsed(value) => value,
            ConfidenceParse::Unparsed => 0.0,
        }
    }
}

/// Parse a confidence score from oracle response content.
pub fn parse_confidence(content: &str) -> ConfidenceParse {
    if let Some(value) = structured_confidence(content) {
        return ConfidenceParse::Parsed(value);
    }
    if let Some(value) = labeled_confidence(content) {
        return ConfidenceParse::Parsed(value);
    }
    ConfidenceParse::Unparsed
}

/// Strategy A: the content is one JSON object with a numeric `confidence`
/// field. Tolerates a surrounding markdown code fence.
fn structured_confidence(content: &str) -> Option<f64> {
    let body = strip_code_fence(content);
    let value: Value = serde_json::from_str(body).ok()?;
    let confidence = value.as_object()?.get("confidence")?.as_f64()?;
    in_unit_range(confidence)
}

/// Strategy B: scan the raw text for a confidence-labeled numeric literal.
///
/// Matches shapes like `confidence: 0.85`, `Confidence = .9`, or
/// `"confidence" of 1.0`. The first literal inside `[0, 1]` wins.
fn labeled_confidence(content: &str) -> Option<f64> {
    static LABELED_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r#"(?i)confidence["']?[^0-9.+-]{0,16}([0-9]*\.?[0-9]+)"#).unwrap()
    });
    LABELED_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .find_map(in_unit_range)
}

fn in_unit_range(value: f64) -> Option<f64> {
    (0.0..=1.0).contains(&value).then_some(value)
}

/// Strip one surrounding markdown code fence, with or without an info string.
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.split_once('\n').map(|(_, body)| body) else {
        return trimmed;
    };
    match body.strip_suffix("```") {
        Some(inner) => inner.trim(),
        None => trimmed,
    }
}
