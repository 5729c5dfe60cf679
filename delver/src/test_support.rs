//! Test-only helpers: scripted oracle replies and corpus fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::io::oracle::{Oracle, OracleReply, OracleRequest, SEARCH_TOOL, ToolCall};

/// One scripted oracle response.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Free-text reply, no tool call.
    Text(String),
    /// Structured `search` tool call.
    Tool(String),
    /// Simulated transport/server failure.
    Failure(String),
}

/// Oracle double replaying queued replies in order. Fails the test if the
/// queue runs dry, which catches loops that iterate more than scripted.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<ScriptedReply>>,
    requests: RefCell<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Number of completed oracle calls.
    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    /// Requests seen so far, for asserting on prompt windows.
    pub fn recorded_requests(&self) -> Vec<OracleRequest> {
        self.requests.borrow().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, request: &OracleRequest) -> Result<OracleReply> {
        self.requests.borrow_mut().push(request.clone());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted oracle exhausted"))?;
        match reply {
            ScriptedReply::Text(content) => Ok(OracleReply {
                content,
                tool_call: None,
            }),
            ScriptedReply::Tool(code) => Ok(OracleReply {
                content: String::new(),
                tool_call: Some(ToolCall {
                    name: SEARCH_TOOL.to_string(),
                    code,
                }),
            }),
            ScriptedReply::Failure(message) => Err(anyhow!(message)),
        }
    }
}

/// Scripted reply carrying a structured answer object.
pub fn answer_reply(answer: &str, confidence: f64) -> ScriptedReply {
    ScriptedReply::Text(format!(
        "{{\"answer\": \"{answer}\", \"confidence\": {confidence}}}"
    ))
}

/// Small deterministic corpus used across tests.
pub const FIXTURE_DOCUMENT: &str = "\
# Retail Banking Terms

## Home Loans

Interest accrues monthly. Late Payment Penalty: 2.5% of the overdue
installment, charged per month of delay.

## International Transfers

Transfers outside the SEPA area carry a fee of 12 francs plus 0.1% of the
amount.
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_oracle_replays_in_order() {
        let oracle = ScriptedOracle::new(vec![
            ScriptedReply::Tool("result = 1".to_string()),
            answer_reply("done", 0.9),
        ]);
        let request = OracleRequest {
            system: String::new(),
            turns: Vec::new(),
            temperature: 1.0,
        };
        let first = oracle.complete(&request).expect("first");
        assert!(first.tool_call.is_some());
        let second = oracle.complete(&request).expect("second");
        assert!(second.content.contains("\"confidence\": 0.9"));
        assert!(oracle.complete(&request).is_err());
        assert_eq!(oracle.calls(), 3);
    }
}
