//! The immutable document store.
//!
//! One corpus, loaded once at startup, shared read-only for the process
//! lifetime. A load failure is a startup failure; the session core never
//! runs against a degraded placeholder document.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::info;

/// Immutable text corpus shared by all sessions.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    text: Arc<str>,
}

impl DocumentStore {
    /// Load the corpus from a text file. Fails hard on unreadable or empty
    /// input.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read document {}", path.display()))?;
        if text.trim().is_empty() {
            return Err(anyhow!("document {} is empty", path.display()));
        }
        info!(path = %path.display(), chars = text.chars().count(), "document loaded");
        Ok(Self { text: Arc::from(text) })
    }

    /// Wrap an in-memory corpus (fixtures, tests).
    pub fn from_text(text: impl Into<Arc<str>>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reads_file_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("corpus.md");
        std::fs::write(&path, "# Annual Report\n\nRevenue grew 4%.").expect("write");
        let store = DocumentStore::load(&path).expect("load");
        assert!(store.text().contains("Revenue grew 4%."));
    }

    #[test]
    fn missing_file_is_a_hard_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = DocumentStore::load(&temp.path().join("absent.md")).expect_err("fail");
        assert!(err.to_string().contains("read document"));
    }

    #[test]
    fn empty_file_is_a_hard_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("empty.md");
        std::fs::write(&path, "  \n").expect("write");
        assert!(DocumentStore::load(&path).is_err());
    }

    #[test]
    fn clones_share_the_same_text() {
        let store = DocumentStore::from_text("shared corpus");
        let clone = store.clone();
        assert_eq!(store.text().as_ptr(), clone.text().as_ptr());
    }
}
