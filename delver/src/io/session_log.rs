//! Session artifact writer.
//!
//! Persists the terminal state of a session as pretty JSON for audit:
//! attempt log, transcript, and a small summary. Files are written in a
//! deterministic order to keep artifacts stable.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::SessionOutcome;

#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub summary_path: PathBuf,
    pub attempts_path: PathBuf,
    pub transcript_path: PathBuf,
}

impl SessionPaths {
    pub fn new(base: &Path, label: &str) -> Self {
        let dir = base.join(label);
        Self {
            dir: dir.clone(),
            summary_path: dir.join("summary.json"),
            attempts_path: dir.join("attempts.json"),
            transcript_path: dir.join("transcript.json"),
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionSummary<'a> {
    stop: &'a crate::core::types::SessionStop,
    depth: u32,
    confidence: f64,
    attempts: usize,
    answer: Option<&'a str>,
}

/// Write all artifacts for a finished session under `base/label/`.
pub fn write_session(base: &Path, label: &str, outcome: &SessionOutcome) -> Result<SessionPaths> {
    let paths = SessionPaths::new(base, label);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create session dir {}", paths.dir.display()))?;

    let summary = SessionSummary {
        stop: &outcome.stop,
        depth: outcome.state.depth,
        confidence: outcome.state.confidence,
        attempts: outcome.state.attempts.len(),
        answer: outcome.answer.as_deref(),
    };
    write_json(&paths.summary_path, &summary)?;
    write_json(&paths.attempts_path, &outcome.state.attempts)?;
    write_json(&paths.transcript_path, &outcome.state.turns)?;

    Ok(paths)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, &buf).with_context(|| format!("write {}", path.display()))
}
