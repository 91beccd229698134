//! Scripted model client for tests and offline runs.

use crate::llm::client::{InferenceRequest, ModelClient};
use crate::types::{InferenceResponse, ToolCall};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Text(String),
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
    Error(String),
}

impl MockResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self::ToolCalls {
            content: None,
            calls: vec![call],
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::ToolCalls {
            content: None,
            calls,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}

#[derive(Debug, Default)]
struct MockState {
    responses: VecDeque<MockResponse>,
    fallback: Option<MockResponse>,
    requests: Vec<InferenceRequest>,
}

/// Replays queued responses in order and records every request.
///
/// Once the queue is empty the fallback response (if any) is repeated;
/// without one, further calls fail.
#[derive(Debug, Default)]
pub struct MockModel {
    state: Mutex<MockState>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model that answers every request with `response`.
    pub fn repeating(response: MockResponse) -> Self {
        let model = Self::new();
        model.lock().fallback = Some(response);
        model
    }

    pub fn add_response(&self, response: MockResponse) {
        self.lock().responses.push_back(response);
    }

    pub fn add_responses(&self, responses: impl IntoIterator<Item = MockResponse>) {
        self.lock().responses.extend(responses);
    }

    pub fn remaining_responses(&self) -> usize {
        self.lock().responses.len()
    }

    /// Number of requests served so far.
    pub fn calls(&self) -> usize {
        self.lock().requests.len()
    }

    /// Copies of all requests received.
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ModelClient for MockModel {
    async fn chat(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let mut state = self.lock();
        state.requests.push(request.clone());

        let response = match state.responses.pop_front() {
            Some(response) => response,
            None => state
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("MockModel: no more responses in queue"))?,
        };

        match response {
            MockResponse::Text(content) => Ok(InferenceResponse::text(content)),
            MockResponse::ToolCalls { content, calls } => {
                Ok(InferenceResponse::with_tool_calls(content, calls))
            }
            MockResponse::Error(message) => Err(anyhow!(message)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
