//! Deterministic character-based truncation helpers.

/// Longest prefix of `text` holding at most `max_chars` characters.
///
/// Operates on characters, not bytes, so the cut never splits a code point.
pub fn prefix_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Bounded single-line excerpt for log entries.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    prefix_chars(&flattened, max_chars).to_string()
}
