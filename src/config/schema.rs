//! Configuration schema for agent.toml.

use crate::tools::ToolFilter;
use crate::types::Goal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Human-readable agent name.
    pub name: String,

    /// Base URL of the OpenAI-compatible chat completions API.
    pub api_base_url: String,

    /// API credential. Usually supplied via `ANTHROPIC_API_KEY`.
    pub api_key: String,

    /// Model used for every turn.
    pub model: String,

    /// Maximum tokens per model response.
    pub max_tokens: u32,

    /// Sampling temperature; provider default when unset.
    pub temperature: Option<f64>,

    /// Maximum tool-call turns before the run stops.
    pub max_turns: u32,

    /// Maximum tool calls executed per turn; extra calls are skipped.
    pub max_tool_calls_per_turn: u32,

    /// Consecutive model failures tolerated before the run fails.
    pub max_consecutive_errors: u32,

    /// Delay before retrying a failed model call.
    pub retry_delay_ms: u64,

    /// HTTP timeout for a single model request.
    pub request_timeout_secs: u64,

    /// Wall-clock limit per tool invocation (0 disables).
    pub tool_timeout_secs: u64,

    /// Run independent tool calls of one turn concurrently.
    pub parallel_tool_calls: bool,

    /// Number of history messages sent with each request.
    pub history_window: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Goals rendered into the system message.
    pub goals: Vec<Goal>,

    /// Which registered tools the agent may use.
    pub tools: ToolFilter,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "assistant".into(),
            api_base_url: "https://api.anthropic.com".into(),
            api_key: String::new(),
            model: "claude-3-5-sonnet-20241022".into(),
            max_tokens: 1024,
            temperature: None,
            max_turns: 50,
            max_tool_calls_per_turn: 10,
            max_consecutive_errors: 3,
            retry_delay_ms: 2000,
            request_timeout_secs: 120,
            tool_timeout_secs: 30,
            parallel_tool_calls: false,
            history_window: 40,
            log_level: "info".into(),
            goals: vec![Goal::new(
                1,
                "Helpful Assistant",
                "You are a helpful AI assistant. Use the available tools to help users with their tasks.",
            )],
            tools: ToolFilter::default(),
        }
    }
}

impl AgentConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Per-tool timeout, `None` when disabled.
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }
}
