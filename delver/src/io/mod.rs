//! I/O collaborators for session commands.

pub mod config;
pub mod document;
pub mod oracle;
pub mod prompt;
pub mod session_log;
