//! Prompt assembly for oracle requests.
//!
//! Prompt size is bounded two ways: a cap on the number of turns in the
//! window (the original query is always kept) and a per-turn character cap.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::sandbox::OUTPUT_VAR;
use crate::core::truncate::prefix_chars;
use crate::core::types::Turn;
use crate::io::config::PromptConfig;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

/// Marker appended when a turn is clipped inside the prompt window.
const CLIP_MARKER: &str = "\n[turn truncated]";

/// Template engine wrapper building the fixed system instructions and the
/// bounded turn window.
pub struct PromptBuilder {
    env: Environment<'static>,
    max_turns: usize,
    max_turn_chars: usize,
}

impl PromptBuilder {
    pub fn new(config: &PromptConfig) -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        Self {
            env,
            max_turns: config.max_turns,
            max_turn_chars: config.max_turn_chars,
        }
    }

    /// Render the fixed system instructions.
    pub fn system_instructions(&self, document_chars: usize) -> Result<String> {
        let template = self.env.get_template("system")?;
        let rendered = template.render(context! {
            document_chars => document_chars,
            output_var => OUTPUT_VAR,
        })?;
        Ok(rendered)
    }

    /// Bounded window of turns: the first turn (the query) plus the most
    /// recent ones, each clipped to the per-turn cap.
    pub fn window(&self, turns: &[Turn]) -> Vec<Turn> {
        let clipped: Box<dyn Iterator<Item = &Turn>> = if turns.len() <= self.max_turns {
            Box::new(turns.iter())
        } else {
            let tail_len = self.max_turns.saturating_sub(1).max(1);
            Box::new(
                turns[..1]
                    .iter()
                    .chain(turns[turns.len() - tail_len..].iter()),
            )
        };
        clipped.map(|turn| self.clip_turn(turn)).collect()
    }

    fn clip_turn(&self, turn: &Turn) -> Turn {
        let prefix = prefix_chars(&turn.content, self.max_turn_chars);
        if prefix.len() == turn.content.len() {
            return turn.clone();
        }
        Turn {
            role: turn.role,
            content: format!("{prefix}{CLIP_MARKER}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;

    fn builder(max_turns: usize, max_turn_chars: usize) -> PromptBuilder {
        PromptBuilder::new(&PromptConfig {
            max_turns,
            max_turn_chars,
        })
    }

    #[test]
    fn system_instructions_state_the_contract() {
        let rendered = builder(12, 4000).system_instructions(5000).expect("render");
        assert!(rendered.contains("5000 characters"));
        assert!(rendered.contains("`result`"));
        assert!(rendered.contains("\"confidence\""));
        assert!(rendered.contains("`re` and `json`"));
    }

    #[test]
    fn small_histories_pass_through_whole() {
        let turns = vec![Turn::user("q"), Turn::assistant("a")];
        let window = builder(12, 4000).window(&turns);
        assert_eq!(window, turns);
    }

    #[test]
    fn long_histories_keep_query_plus_recent_tail() {
        let mut turns = vec![Turn::user("the original query")];
        for index in 0..10 {
            turns.push(Turn::assistant(format!("turn {index}")));
        }
        let window = builder(4, 4000).window(&turns);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].content, "the original query");
        assert_eq!(window[1].content, "turn 7");
        assert_eq!(window[3].content, "turn 9");
    }

    #[test]
    fn oversize_turns_are_clipped_with_marker() {
        let turns = vec![Turn::tool("x".repeat(100))];
        let window = builder(12, 10).window(&turns);
        assert_eq!(window[0].role, Role::Tool);
        assert!(window[0].content.starts_with("xxxxxxxxxx"));
        assert!(window[0].content.ends_with("[turn truncated]"));
        assert_eq!(window[0].content.chars().filter(|c| *c == 'x').count(), 10);
    }
}
