//! Oracle abstraction for language-model invocation.
//!
//! The [`Oracle`] trait decouples session orchestration from the actual model
//! backend (currently an OpenAI-compatible chat-completions service). Tests
//! use scripted oracles that return predetermined replies without network
//! access.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::truncate::prefix_chars;
use crate::core::types::{Role, Turn};
use crate::io::config::OracleConfig;

/// Name of the tool the oracle may invoke.
pub const SEARCH_TOOL: &str = "search";

/// Parameters for one oracle invocation.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// Fixed system instructions for the session.
    pub system: String,
    /// Bounded, already-truncated window of recent turns.
    pub turns: Vec<Turn>,
    /// Sampling temperature.
    pub temperature: f64,
}

/// A structured request to run a search snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub code: String,
}

/// Normalized oracle reply: free text plus an optional tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleReply {
    pub content: String,
    pub tool_call: Option<ToolCall>,
}

impl OracleReply {
    /// The snippet this reply asks to execute, if any.
    ///
    /// A structured `search` tool call wins; otherwise a code block embedded
    /// in the free text is accepted when it is tagged as python or binds the
    /// output variable. Fenced JSON answers are not snippets.
    pub fn requested_snippet(&self) -> Option<String> {
        if let Some(call) = &self.tool_call {
            if call.name == SEARCH_TOOL {
                return Some(call.code.clone());
            }
        }
        static BLOCK_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
            regex::Regex::new(r"(?s)```([a-zA-Z]*)[ \t]*\n(.*?)```").unwrap()
        });
        for caps in BLOCK_RE.captures_iter(&self.content) {
            let tag = caps.get(1).map_or("", |m| m.as_str());
            let body = caps.get(2).map_or("", |m| m.as_str());
            let is_snippet = match tag {
                "python" | "py" => true,
                "" => body.contains("result") && body.contains('='),
                _ => false,
            };
            if is_snippet {
                return Some(body.trim().to_string());
            }
        }
        None
    }
}

/// Abstraction over oracle backends.
pub trait Oracle {
    /// Run one completion. Transport failures and non-success statuses are
    /// explicit `Err` values; the session loop absorbs them.
    fn complete(&self, request: &OracleRequest) -> Result<OracleReply>;
}

/// Oracle speaking the OpenAI-compatible chat-completions protocol.
pub struct HttpOracle {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl HttpOracle {
    /// Build a client from config. The API key is read from the configured
    /// environment variable; a missing key is a startup failure.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("read API key from ${}", config.api_key_env))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

impl Oracle for HttpOracle {
    #[instrument(skip_all, fields(model = %self.model, turns = request.turns.len()))]
    fn complete(&self, request: &OracleRequest) -> Result<OracleReply> {
        let body = ChatRequest::build(&self.model, request);
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, "calling oracle");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("oracle transport failure")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = %status, "oracle returned non-success status");
            return Err(anyhow!(
                "oracle returned status {status}: {}",
                prefix_chars(&body, 300)
            ));
        }

        let parsed: ChatResponse = response.json().context("parse oracle response")?;
        let reply = parsed.into_reply()?;
        info!(
            content_chars = reply.content.chars().count(),
            has_tool_call = reply.tool_call.is_some(),
            "oracle replied"
        );
        Ok(reply)
    }
}

// -- Chat-completions wire types --

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f64,
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: serde_json::Value,
}

impl ChatRequest {
    fn build(model: &str, request: &OracleRequest) -> Self {
        let mut messages = vec![WireMessage {
            role: "system",
            content: request.system.clone(),
        }];
        messages.extend(request.turns.iter().map(normalize_turn));
        Self {
            model: model.to_string(),
            messages,
            temperature: request.temperature,
            tools: vec![search_tool()],
        }
    }
}

/// Single point where canonical turns become wire messages.
///
/// Tool results are replayed as user messages: chat-completions requires a
/// `tool` message to reference a prior tool-call id, and the transcript
/// stores plain turns only.
fn normalize_turn(turn: &Turn) -> WireMessage {
    match turn.role {
        Role::System => WireMessage {
            role: "system",
            content: turn.content.clone(),
        },
        Role::User => WireMessage {
            role: "user",
            content: turn.content.clone(),
        },
        Role::Assistant => WireMessage {
            role: "assistant",
            content: turn.content.clone(),
        },
        Role::Tool => WireMessage {
            role: "user",
            content: format!("Search tool output:\n{}", turn.content),
        },
    }
}

fn search_tool() -> WireTool {
    WireTool {
        kind: "function",
        function: serde_json::json!({
            "name": SEARCH_TOOL,
            "description": "Execute a small Python-style snippet against the document bound to \
                            'doc'. Assign the answer to 'result'.",
            "parameters": {
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Snippet to execute. 're' and 'json' are pre-imported."
                    }
                },
                "required": ["code"]
            }
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments object, per the chat-completions contract.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct SearchArguments {
    code: String,
}

impl ChatResponse {
    fn into_reply(mut self) -> Result<OracleReply> {
        if self.choices.is_empty() {
            return Err(anyhow!("oracle returned no choices"));
        }
        let message = self.choices.remove(0).message;
        let tool_call = match message.tool_calls.into_iter().next() {
            Some(call) => {
                let arguments: SearchArguments = serde_json::from_str(&call.function.arguments)
                    .with_context(|| {
                        format!("parse arguments of tool call '{}'", call.function.name)
                    })?;
                Some(ToolCall {
                    name: call.function.name,
                    code: arguments.code,
                })
            }
            None => None,
        };
        Ok(OracleReply {
            content: message.content.unwrap_or_default(),
            tool_call,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_system_then_window() {
        let request = OracleRequest {
            system: "instructions".to_string(),
            turns: vec![Turn::user("q"), Turn::assistant("a"), Turn::tool("out")],
            temperature: 1.0,
        };
        let body = ChatRequest::build("test-model", &request);
        let roles: Vec<&str> = body.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert!(body.messages[3].content.starts_with("Search tool output:"));
        assert_eq!(body.tools.len(), 1);
    }

    #[test]
    fn response_with_tool_call_parses_code() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "function": {
                            "name": "search",
                            "arguments": "{\"code\": \"result = doc[:10]\"}"
                        }
                    }]
                }
            }]
        });
        let response: ChatResponse = serde_json::from_value(raw).expect("deserialize");
        let reply = response.into_reply().expect("reply");
        assert_eq!(reply.content, "");
        assert_eq!(
            reply.requested_snippet().as_deref(),
            Some("result = doc[:10]")
        );
    }

    #[test]
    fn malformed_tool_arguments_are_an_explicit_failure() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "content": "x",
                    "tool_calls": [{
                        "function": {"name": "search", "arguments": "not json"}
                    }]
                }
            }]
        });
        let response: ChatResponse = serde_json::from_value(raw).expect("deserialize");
        assert!(response.into_reply().is_err());
    }

    #[test]
    fn empty_choices_are_an_explicit_failure() {
        let response: ChatResponse =
            serde_json::from_value(serde_json::json!({"choices": []})).expect("deserialize");
        assert!(response.into_reply().is_err());
    }

    #[test]
    fn embedded_python_fence_is_a_snippet() {
        let reply = OracleReply {
            content: "Let me check.\n```python\nresult = len(doc)\n```".to_string(),
            tool_call: None,
        };
        assert_eq!(reply.requested_snippet().as_deref(), Some("result = len(doc)"));
    }

    #[test]
    fn untagged_fence_needs_a_result_binding() {
        let with_binding = OracleReply {
            content: "```\nresult = doc[:5]\n```".to_string(),
            tool_call: None,
        };
        assert!(with_binding.requested_snippet().is_some());

        let prose = OracleReply {
            content: "```\njust some text\n```".to_string(),
            tool_call: None,
        };
        assert_eq!(prose.requested_snippet(), None);
    }

    #[test]
    fn json_answer_fence_is_not_a_snippet() {
        let reply = OracleReply {
            content: "```json\n{\"answer\": \"x\", \"confidence\": 0.9}\n```".to_string(),
            tool_call: None,
        };
        assert_eq!(reply.requested_snippet(), None);
    }

    #[test]
    fn plain_answer_requests_nothing() {
        let reply = OracleReply {
            content: "The penalty is 5%.".to_string(),
            tool_call: None,
        };
        assert_eq!(reply.requested_snippet(), None);
    }
}
