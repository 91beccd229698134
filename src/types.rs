//! Shared types used across the agent runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

// ---------------------------------------------------------------------------
// Goals
// ---------------------------------------------------------------------------

/// A goal handed to the agent; goals are rendered into the system message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub priority: u32,
    pub name: String,
    pub description: String,
}

impl Goal {
    pub fn new(priority: u32, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            priority,
            name: name.into(),
            description: description.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inference types
// ---------------------------------------------------------------------------

/// A chat message in the multi-turn conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool calls issued by the assistant in this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For `Tool` messages, the id of the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    /// Assistant message carrying the tool calls it requested.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.unwrap_or_default(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool message answering a single tool call.
    pub fn tool_result(result: &ToolResult) -> Self {
        Self {
            role: ChatRole::Tool,
            content: result.to_content(),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.tool_call_id.clone()),
        }
    }

    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call request from the model.
///
/// `arguments` is whatever the model emitted. When the provider sends an
/// argument string that is not valid JSON, the raw string is kept so the
/// dispatcher can report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

// ---------------------------------------------------------------------------
// Tool results
// ---------------------------------------------------------------------------

/// Categories of turn-time tool failures. None of these abort the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// No tool is registered under the requested name.
    UnknownTool,
    /// Arguments did not match the tool's schema.
    ValidationError,
    /// The handler failed or panicked.
    ExecutionError,
    /// The handler did not finish within the configured timeout.
    Timeout,
    /// The call exceeded the per-turn tool call limit and was not run.
    Skipped,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTool => write!(f, "unknown_tool"),
            Self::ValidationError => write!(f, "validation_error"),
            Self::ExecutionError => write!(f, "execution_error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Success payload or tagged error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { result: Value },
    Error { kind: ToolErrorKind, message: String },
}

/// Result of dispatching one tool call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
    /// Set when a terminal tool completed successfully.
    #[serde(default)]
    pub terminal: bool,
    pub timestamp: DateTime<Utc>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, result: Value, terminal: bool) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: ToolOutcome::Success { result },
            terminal,
            timestamp: Utc::now(),
        }
    }

    pub fn error(call: &ToolCall, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: ToolOutcome::Error {
                kind,
                message: message.into(),
            },
            terminal: false,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    /// Error kind, if this result is an error.
    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match &self.outcome {
            ToolOutcome::Error { kind, .. } => Some(*kind),
            ToolOutcome::Success { .. } => None,
        }
    }

    /// Success payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            ToolOutcome::Success { result } => Some(result),
            ToolOutcome::Error { .. } => None,
        }
    }

    /// Render the result as the content of a tool message.
    pub fn to_content(&self) -> String {
        let body = match &self.outcome {
            ToolOutcome::Success { result } => json!({
                "tool_executed": true,
                "result": result,
                "timestamp": self.timestamp.to_rfc3339(),
            }),
            ToolOutcome::Error { kind, message } => json!({
                "tool_executed": false,
                "error": kind.to_string(),
                "message": message,
            }),
        };
        body.to_string()
    }
}

// ---------------------------------------------------------------------------
// Model responses
// ---------------------------------------------------------------------------

/// Response from inference including potential tool calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

impl InferenceResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls,
            usage: TokenUsage::default(),
        }
    }
}

/// Token usage from an inference call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

// ---------------------------------------------------------------------------
// Run outcome
// ---------------------------------------------------------------------------

/// How a conversation run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// The model answered without requesting tools.
    Completed { answer: String },
    /// A terminal tool ran successfully.
    Terminated { tool: String, result: Value },
    /// The tool-call turn bound was reached.
    TurnLimitExceeded { turns: u32 },
    /// The run was cancelled from outside.
    Cancelled,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { .. } => write!(f, "completed"),
            Self::Terminated { tool, .. } => write!(f, "terminated by {}", tool),
            Self::TurnLimitExceeded { turns } => write!(f, "turn limit exceeded ({} turns)", turns),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_content_reports_tool_executed() {
        let call = ToolCall::new("call_1", "add", json!({"a": 2, "b": 3}));
        let result = ToolResult::success(&call, json!(5), false);

        let content: Value = serde_json::from_str(&result.to_content()).unwrap();
        assert_eq!(content["tool_executed"], json!(true));
        assert_eq!(content["result"], json!(5));
        assert!(content["timestamp"].is_string());
    }

    #[test]
    fn error_content_carries_kind_and_message() {
        let call = ToolCall::new("call_2", "subtract", json!({}));
        let result = ToolResult::error(&call, ToolErrorKind::UnknownTool, "no such tool");

        let content: Value = serde_json::from_str(&result.to_content()).unwrap();
        assert_eq!(content["tool_executed"], json!(false));
        assert_eq!(content["error"], json!("unknown_tool"));
        assert_eq!(content["message"], json!("no such tool"));
        assert_eq!(result.error_kind(), Some(ToolErrorKind::UnknownTool));
        assert!(!result.terminal);
    }

    #[test]
    fn usage_totals_saturate() {
        let mut usage = TokenUsage {
            prompt_tokens: u32::MAX - 1,
            completion_tokens: 10,
            total_tokens: u32::MAX,
        };
        usage.add(&TokenUsage {
            prompt_tokens: 5,
            completion_tokens: 5,
            total_tokens: 10,
        });
        assert_eq!(usage.prompt_tokens, u32::MAX);
        assert_eq!(usage.completion_tokens, 15);
        assert_eq!(usage.total_tokens, u32::MAX);
    }

    #[test]
    fn tool_message_links_call_id() {
        let call = ToolCall::new("call_9", "add", json!({}));
        let msg = ChatMessage::tool_result(&ToolResult::success(&call, json!(1), false));
        assert_eq!(msg.role, ChatRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_9"));
    }
}
