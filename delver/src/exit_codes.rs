//! Stable exit codes for CLI commands.

/// Command succeeded; for `ask`, the session reached the confidence threshold.
pub const OK: i32 = 0;
/// Command failed due to invalid config/document/arguments or other errors.
pub const INVALID: i32 = 1;
/// `ask` terminated without reaching the confidence threshold (depth
/// exhausted, settled below threshold, or cancelled).
pub const UNRESOLVED: i32 = 2;
