//! The seam between the agent loop and a model provider.

use crate::tools::ToolDefinition;
use crate::types::{ChatMessage, InferenceResponse};
use anyhow::Result;
use async_trait::async_trait;

/// Everything a provider needs for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

/// A chat model that may answer with text or tool calls.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one completion.
    async fn chat(&self, request: &InferenceRequest) -> Result<InferenceResponse>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}
