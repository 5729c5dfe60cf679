//! Session configuration loaded from a TOML file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Top-level configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub oracle: OracleConfig,
    pub session: SessionConfig,
    pub sandbox: SandboxConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL of the chat-completions endpoint.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Per-call timeout in seconds; a timeout consumes one depth unit.
    pub timeout_secs: u64,
    /// Sampling temperature forwarded to the oracle.
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard cap on iterations per session.
    pub max_depth: u32,
    /// Confidence at or above this ends the session.
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Truncate sandbox output beyond this many characters.
    pub output_cap_chars: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// Most recent turns included in a prompt (the query is always kept).
    pub max_turns: usize,
    /// Per-turn character cap inside the prompt window.
    pub max_turn_chars: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/gpt-oss-120b".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            timeout_secs: 120,
            temperature: 1.0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            confidence_threshold: 0.8,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            output_cap_chars: 2000,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_turns: 12,
            max_turn_chars: 4000,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.oracle.base_url.trim().is_empty() {
            return Err(anyhow!("oracle.base_url must not be empty"));
        }
        if self.oracle.model.trim().is_empty() {
            return Err(anyhow!("oracle.model must not be empty"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.session.max_depth == 0 {
            return Err(anyhow!("session.max_depth must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.session.confidence_threshold) {
            return Err(anyhow!("session.confidence_threshold must be within [0, 1]"));
        }
        if self.sandbox.output_cap_chars == 0 {
            return Err(anyhow!("sandbox.output_cap_chars must be > 0"));
        }
        if self.prompt.max_turns == 0 {
            return Err(anyhow!("prompt.max_turns must be > 0"));
        }
        if self.prompt.max_turn_chars == 0 {
            return Err(anyhow!("prompt.max_turn_chars must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `Config::default()`.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[session]\nmax_depth = 2\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.session.max_depth, 2);
        assert_eq!(cfg.session.confidence_threshold, 0.8);
        assert_eq!(cfg.oracle, OracleConfig::default());
    }

    #[test]
    fn zero_depth_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[session]\nmax_depth = 0\n").expect("write");
        let err = load_config(&path).expect_err("reject");
        assert!(err.to_string().contains("max_depth"));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[session]\nconfidence_threshold = 1.5\n").expect("write");
        assert!(load_config(&path).is_err());
    }
}
