//! Message and message-log domain types.
//!
//! A run's conversation is an append-only [`MessageLog`]: the instruction
//! goes in as a user message, the model answers with assistant messages that
//! may carry tool-use blocks, and tool results flow back as user messages
//! made of tool-result blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LogError;
use crate::tool::ToolCall;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and tool results
    User,
    /// The model
    Assistant,
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },

    /// A tool invocation requested by the model.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The result of executing one invocation, paired by id.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// Ordered content blocks
    pub content: Vec<ContentBlock>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_blocks(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message holding a single text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_blocks(Role::User, vec![ContentBlock::text(text)])
    }

    /// Create a new assistant message holding a single text block.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_blocks(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// Create an assistant message from raw blocks (text and tool-use).
    pub fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self::with_blocks(Role::Assistant, content)
    }

    /// Create a user message carrying tool-result blocks.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self::with_blocks(Role::User, results)
    }

    /// Concatenated text of all text blocks, newline separated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool invocations requested in this message, in block order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    fn tool_use_ids(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }
}

/// The append-only message log of one run.
///
/// Messages can only be pushed, never edited or removed. Tool results are
/// checked against the invocation ids of the immediately preceding
/// assistant message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user instruction.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Append an assistant message as returned by the model.
    pub fn push_assistant(&mut self, message: Message) -> Result<(), LogError> {
        if message.content.is_empty() {
            return Err(LogError::EmptyMessage);
        }
        self.messages.push(Message {
            role: Role::Assistant,
            ..message
        });
        Ok(())
    }

    /// Append tool results as one user message.
    ///
    /// Every result must answer an invocation of the preceding assistant
    /// message; otherwise nothing is appended.
    pub fn push_tool_results(&mut self, results: Vec<ContentBlock>) -> Result<(), LogError> {
        if results.is_empty() {
            return Err(LogError::EmptyMessage);
        }
        let last = self
            .messages
            .last()
            .filter(|m| m.role == Role::Assistant && m.has_tool_calls())
            .ok_or(LogError::NoPendingInvocations)?;

        for block in &results {
            match block {
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    if !last.tool_use_ids().any(|id| id == tool_use_id) {
                        return Err(LogError::OrphanedToolResult(tool_use_id.clone()));
                    }
                }
                _ => return Err(LogError::NoPendingInvocations),
            }
        }

        self.messages.push(Message::tool_results(results));
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .map(|b| match b {
                ContentBlock::Text { text } => text.len() / 4,
                ContentBlock::ToolUse { input, .. } => input.to_string().len() / 4,
                ContentBlock::ToolResult { content, .. } => content.len() / 4,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant_with_calls(ids: &[&str]) -> Message {
        let mut blocks = vec![ContentBlock::text("Working on it")];
        for id in ids {
            blocks.push(ContentBlock::ToolUse {
                id: id.to_string(),
                name: "echo".into(),
                input: serde_json::json!({}),
            });
        }
        Message::assistant_blocks(blocks)
    }

    #[test]
    fn create_user_message() {
        let msg = Message::user("Build the report");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Build the report");
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn tool_calls_are_extracted_in_order() {
        let msg = assistant_with_calls(&["a", "b"]);
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[1].id, "b");
        assert_eq!(msg.text(), "Working on it");
    }

    #[test]
    fn results_must_match_preceding_invocations() {
        let mut log = MessageLog::new();
        log.push_user("go");
        log.push_assistant(assistant_with_calls(&["a", "b"])).unwrap();

        let err = log
            .push_tool_results(vec![ContentBlock::tool_result("zzz", "nope", false)])
            .unwrap_err();
        assert!(matches!(err, LogError::OrphanedToolResult(id) if id == "zzz"));
        assert_eq!(log.len(), 2);

        log.push_tool_results(vec![
            ContentBlock::tool_result("a", "ok", false),
            ContentBlock::tool_result("b", "failed", true),
        ])
        .unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.messages()[2].role, Role::User);
    }

    #[test]
    fn results_without_pending_invocations_are_rejected() {
        let mut log = MessageLog::new();
        log.push_user("go");
        log.push_assistant(Message::assistant("plain answer")).unwrap();
        let err = log
            .push_tool_results(vec![ContentBlock::tool_result("a", "ok", false)])
            .unwrap_err();
        assert!(matches!(err, LogError::NoPendingInvocations));
    }

    #[test]
    fn content_block_wire_shape() {
        let block = ContentBlock::tool_result("toolu_1", "done", true);
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "toolu_1");
        assert_eq!(json["is_error"], true);
    }

    #[test]
    fn token_estimate_counts_all_blocks() {
        let mut log = MessageLog::new();
        // 20 chars ≈ 5 tokens
        log.push_user("12345678901234567890");
        assert_eq!(log.estimated_tokens(), 5);
    }
}
