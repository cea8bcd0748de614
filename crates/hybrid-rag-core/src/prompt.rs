//! Per-session conversation state and prompt rendering.
//!
//! A [`PromptBuilder`] accumulates conversation turns and retrieved
//! context strings, then renders them into a single prompt for the answer
//! generator. Rendering is pure: [`PromptBuilder::build_prompt`] never
//! mutates the session, and contexts are capped at render time by taking
//! the first `max_contexts` in insertion order.
//!
//! ```
//! use hybrid_rag_core::prompt::PromptBuilder;
//!
//! let mut builder = PromptBuilder::new(Some("You are a store assistant.".into()));
//! builder.add_conversation("user", "I want a down jacket");
//! builder.add_retrieved_context(["Item A: long, white duck down, 90% fill"]);
//! let prompt = builder.build_prompt("What is the fill?", 5, "Answer briefly.");
//! assert!(prompt.contains("- Item A"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ConversationTurn, Role};

/// System prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful shopping assistant. \
Answer product questions using the retrieved information first.";

/// Format requirement used when none is configured.
pub const DEFAULT_FORMAT_REQUIREMENT: &str = "Answer concisely in plain text.";

const ANSWER_INSTRUCTION: &str = "Answer only from the retrieved information. \
If it is insufficient, say what additional information is needed.";

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No turns and no context.
    Fresh,
    /// Turns and/or context accumulated.
    Active,
}

/// Conversation and retrieved-context state for one session.
///
/// Owned by a single session; no internal locking.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    history: Vec<ConversationTurn>,
    contexts: Vec<String>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PromptBuilder {
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            system_prompt: system_prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            history: Vec::new(),
            contexts: Vec::new(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn contexts(&self) -> &[String] {
        &self.contexts
    }

    pub fn state(&self) -> SessionState {
        if self.history.is_empty() && self.contexts.is_empty() {
            SessionState::Fresh
        } else {
            SessionState::Active
        }
    }

    /// Clear history and contexts. The system prompt is kept.
    pub fn reset(&mut self) {
        self.history.clear();
        self.contexts.clear();
    }

    /// Append a turn. Any role string is accepted.
    pub fn add_conversation(&mut self, role: impl Into<Role>, content: impl Into<String>) {
        self.history.push(ConversationTurn {
            role: role.into(),
            content: content.into(),
        });
    }

    /// Append contexts in order. No deduplication and no cap.
    pub fn add_retrieved_context<I, S>(&mut self, contexts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contexts.extend(contexts.into_iter().map(Into::into));
    }

    /// Render the full prompt.
    ///
    /// Sections, separated by blank lines: system prompt, conversation
    /// history (omitted when empty), the current question, the first
    /// `max_contexts` contexts, the format requirement, and the answer
    /// instruction.
    pub fn build_prompt(
        &self,
        user_query: &str,
        max_contexts: usize,
        format_requirement: &str,
    ) -> String {
        let contexts = &self.contexts[..max_contexts.min(self.contexts.len())];

        let mut parts = Vec::with_capacity(6);
        parts.push(format!("System prompt: {}", self.system_prompt));
        if !self.history.is_empty() {
            let lines: Vec<String> = self
                .history
                .iter()
                .map(|t| format!("{}: {}", t.role, t.content))
                .collect();
            parts.push(format!("Conversation history:\n{}", lines.join("\n")));
        }
        parts.push(format!("Current question: {}", user_query));

        let mut block = format!("Retrieved information ({} items):", contexts.len());
        for ctx in contexts {
            block.push_str("\n- ");
            block.push_str(ctx);
        }
        parts.push(block);

        parts.push(format!("Format requirement: {}", format_requirement));
        parts.push(ANSWER_INSTRUCTION.to_string());

        parts.join("\n\n")
    }

    /// Render a tool-call request with a `{name, parameters}` JSON body.
    pub fn build_function_call_prompt(&self, function_name: &str, parameters: &Value) -> String {
        let call = serde_json::json!({
            "name": function_name,
            "parameters": parameters,
        });
        let body = serde_json::to_string_pretty(&call).unwrap_or_else(|_| call.to_string());
        format!("Call the tool function to fetch the information:\n{}", body)
    }

    /// Append a "Sources:" line when references are given.
    pub fn format_answer(&self, answer: &str, source_references: &[String]) -> String {
        if source_references.is_empty() {
            return answer.to_string();
        }
        format!("{}\n\nSources: {}", answer, source_references.join(", "))
    }
}

/// A parsed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub parameters: Value,
}

impl FunctionCall {
    /// Typed view of an extracted object, if it has a string `name`.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Find the first brace-delimited JSON object in `response`.
///
/// Returns `None` when there is no `{`, the braces never balance, or the
/// balanced span does not parse as a JSON object. A missing call is a
/// normal outcome, not an error.
pub fn extract_function_call(response: &str) -> Option<Value> {
    let start = response.find('{')?;
    let end = match balanced_end(&response[start..]) {
        Some(len) => start + len,
        None => {
            tracing::debug!("unbalanced braces in response");
            return None;
        }
    };
    match serde_json::from_str::<Value>(&response[start..end]) {
        Ok(v) if v.is_object() => Some(v),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "function call JSON did not parse");
            None
        }
    }
}

/// Byte length of the balanced `{...}` span at the start of `s`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
