//! Recursive document-search agent.
//!
//! This crate answers natural-language questions about one immutable text
//! corpus by looping a language-model oracle against a restricted snippet
//! sandbox until confidence is high enough or the iteration budget runs out.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (routing, confidence parsing,
//!   the sandbox interpreter, invariants). No I/O, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting collaborators (config, document loading, the
//!   HTTP oracle, prompt assembly, session artifacts). Isolated to enable
//!   mocking in tests.
//!
//! [`session`] coordinates core logic with I/O to run one session end to end.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
