//! Core agent loop: Think → Act → Observe.
//!
//! Each iteration:
//! 1. Builds the message window from history
//! 2. Calls the model with the registered tool definitions
//! 3. Stops on a plain answer, or dispatches the requested tool calls
//! 4. Appends every tool result to history and repeats
//!
//! The run also stops on a successful terminal tool, after `max_turns`
//! tool-call turns, or when cancelled.

use crate::agent::context;
use crate::agent::history::History;
use crate::agent::system_prompt;
use crate::config::AgentConfig;
use crate::llm::{InferenceRequest, ModelClient};
use crate::tools::{Dispatcher, ToolRegistry};
use crate::types::*;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest model text echoed into the log.
const LOG_PREVIEW_CHARS: usize = 200;

/// Knobs for a single run, usually taken from `AgentConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub max_turns: u32,
    pub max_tool_calls_per_turn: u32,
    pub max_consecutive_errors: u32,
    pub retry_delay: Duration,
    pub history_window: usize,
    pub parallel_tool_calls: bool,
}

impl LoopSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_turns: config.max_turns,
            max_tool_calls_per_turn: config.max_tool_calls_per_turn,
            max_consecutive_errors: config.max_consecutive_errors,
            retry_delay: config.retry_delay(),
            history_window: config.history_window,
            parallel_tool_calls: config.parallel_tool_calls,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub state: RunState,
    pub history: History,
    /// Model calls that produced tool calls.
    pub turns: u32,
    pub usage: TokenUsage,
}

impl AgentRun {
    /// Final assistant text, if the run completed with one.
    pub fn answer(&self) -> Option<&str> {
        match &self.state {
            RunState::Completed { answer } => Some(answer),
            _ => None,
        }
    }
}

/// Drives conversations between a model and a tool dispatcher.
pub struct Agent {
    goals: Vec<Goal>,
    model: Arc<dyn ModelClient>,
    dispatcher: Dispatcher,
    settings: LoopSettings,
}

impl Agent {
    pub fn new(model: Arc<dyn ModelClient>, dispatcher: Dispatcher, settings: LoopSettings) -> Self {
        Self {
            goals: Vec::new(),
            model,
            dispatcher,
            settings,
        }
    }

    pub fn with_goals(mut self, goals: Vec<Goal>) -> Self {
        self.goals = goals;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run a fresh conversation for `task`.
    pub async fn run(&self, task: &str, cancel: CancellationToken) -> Result<AgentRun> {
        let mut history = History::new();
        history.push(ChatMessage::system(system_prompt::build_system_prompt(
            &self.goals,
        )));
        history.push(ChatMessage::user(task));
        self.run_with_history(history, cancel).await
    }

    /// Continue from an existing history.
    ///
    /// Fails only when the model keeps failing; tool failures are fed back
    /// to the model as results.
    pub async fn run_with_history(
        &self,
        mut history: History,
        cancel: CancellationToken,
    ) -> Result<AgentRun> {
        let settings = &self.settings;
        let tools = self.dispatcher.registry().definitions();
        let mut turns: u32 = 0;
        let mut usage = TokenUsage::default();
        let mut consecutive_errors: u32 = 0;

        info!(
            "Starting agent loop with model {} via {} ({} tools)",
            settings.model,
            self.model.name(),
            tools.len()
        );

        let state = loop {
            if cancel.is_cancelled() {
                break RunState::Cancelled;
            }
            if turns >= settings.max_turns {
                warn!("Turn limit reached after {} turns", turns);
                break RunState::TurnLimitExceeded { turns };
            }

            let request = InferenceRequest {
                model: settings.model.clone(),
                messages: context::build_messages(&history, settings.history_window),
                tools: tools.clone(),
                max_tokens: settings.max_tokens,
                temperature: settings.temperature,
            };

            let response = tokio::select! {
                result = self.model.chat(&request) => Some(result),
                _ = cancel.cancelled() => None,
            };
            let Some(response) = response else {
                break RunState::Cancelled;
            };

            let response = match response {
                Ok(resp) => {
                    consecutive_errors = 0;
                    resp
                }
                Err(e) => {
                    consecutive_errors += 1;
                    error!(
                        "Inference error ({}/{}): {:#}",
                        consecutive_errors, settings.max_consecutive_errors, e
                    );
                    if consecutive_errors >= settings.max_consecutive_errors {
                        return Err(e.context(format!(
                            "Inference failed {} consecutive times",
                            consecutive_errors
                        )));
                    }
                    let cancelled = tokio::select! {
                        _ = tokio::time::sleep(settings.retry_delay) => false,
                        _ = cancel.cancelled() => true,
                    };
                    if cancelled {
                        break RunState::Cancelled;
                    }
                    continue;
                }
            };

            usage.add(&response.usage);

            if response.tool_calls.is_empty() {
                let answer = response.content.unwrap_or_default();
                info!("Agent: {}", preview(&answer));
                history.push(ChatMessage::assistant(answer.clone()));
                break RunState::Completed { answer };
            }

            turns += 1;
            if let Some(content) = &response.content {
                info!("[Turn {}] Agent: {}", turns, preview(content));
            }

            let calls: Vec<ToolCall> = response
                .tool_calls
                .into_iter()
                .map(|mut call| {
                    if call.id.is_empty() {
                        call.id = ulid::Ulid::new().to_string();
                    }
                    call
                })
                .collect();
            history.push(ChatMessage::assistant_tool_calls(
                response.content,
                calls.clone(),
            ));

            let limit = (settings.max_tool_calls_per_turn as usize).min(calls.len());
            let (to_run, over_limit) = calls.split_at(limit);
            for call in to_run {
                info!("[Turn {}] Tool: {}({})", turns, call.name, call.arguments);
            }

            let mut results = self
                .dispatcher
                .dispatch_all(to_run, settings.parallel_tool_calls)
                .await;
            for call in over_limit {
                warn!("[Turn {}] Skipping tool call '{}' over the per-turn limit", turns, call.name);
                results.push(ToolResult::error(
                    call,
                    ToolErrorKind::Skipped,
                    format!(
                        "Not executed: at most {} tool calls run per turn",
                        settings.max_tool_calls_per_turn
                    ),
                ));
            }

            let mut terminal: Option<ToolResult> = None;
            for result in results {
                if result.is_success() {
                    debug!("[Turn {}] Tool '{}' succeeded", turns, result.tool_name);
                } else {
                    warn!("[Turn {}] Tool error: {}", turns, result.to_content());
                }
                history.push(ChatMessage::tool_result(&result));
                if result.terminal && terminal.is_none() {
                    terminal = Some(result);
                }
            }

            if let Some(result) = terminal {
                info!("Terminal tool '{}' ended the run", result.tool_name);
                break RunState::Terminated {
                    result: result.payload().cloned().unwrap_or_default(),
                    tool: result.tool_name,
                };
            }
        };

        info!(
            "Agent loop exited: {} ({} turns, {} tokens)",
            state, turns, usage.total_tokens
        );
        Ok(AgentRun {
            state,
            history,
            turns,
            usage,
        })
    }
}

/// Build an agent from config and run `task` to completion.
pub async fn run_agent_loop(
    config: &AgentConfig,
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ModelClient>,
    task: &str,
    cancel: CancellationToken,
) -> Result<AgentRun> {
    let dispatcher = Dispatcher::new(registry).with_timeout(config.tool_timeout());
    Agent::new(model, dispatcher, LoopSettings::from_config(config))
        .with_goals(config.goals.clone())
        .run(task, cancel)
        .await
}

fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModel, MockResponse};
    use crate::tools::builtin::TERMINATE;
    use crate::tools::ToolBuilder;
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn settings() -> LoopSettings {
        LoopSettings {
            model: "mock-model".into(),
            retry_delay: Duration::ZERO,
            ..LoopSettings::default()
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::with_builtin_tools().unwrap();
        registry
            .register(
                ToolBuilder::new("flaky")
                    .description("Always fails")
                    .sync_handler(|_| Err(anyhow!("database password is hunter2")))
                    .unwrap(),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn agent(model: Arc<MockModel>, settings: LoopSettings) -> Agent {
        Agent::new(model, Dispatcher::new(registry()), settings)
            .with_goals(vec![Goal::new(1, "Helper", "Help.")])
    }

    fn tool_contents(run: &AgentRun) -> Vec<Value> {
        run.history
            .iter()
            .filter(|m| m.role == ChatRole::Tool)
            .map(|m| serde_json::from_str(&m.content).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn plain_answer_completes() {
        let model = Arc::new(MockModel::new());
        model.add_response(MockResponse::text("hello"));

        let run = agent(model.clone(), settings())
            .run("say hi", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.state, RunState::Completed { answer: "hello".into() });
        assert_eq!(run.answer(), Some("hello"));
        assert_eq!(run.turns, 0);
        assert_eq!(run.history.len(), 3);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn tool_result_precedes_next_model_call() {
        let model = Arc::new(MockModel::new());
        model.add_responses([
            MockResponse::tool_call(ToolCall::new("call_1", "add", json!({"a": 5, "b": 3}))),
            MockResponse::text("5 + 3 = 8"),
        ]);

        let run = agent(model.clone(), settings())
            .run("add 5 and 3", CancellationToken::new())
            .await
            .unwrap();

        let roles: Vec<ChatRole> = run.history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::Tool,
                ChatRole::Assistant,
            ]
        );
        assert_eq!(run.turns, 1);

        let contents = tool_contents(&run);
        assert_eq!(contents[0]["tool_executed"], json!(true));
        assert_eq!(contents[0]["result"], json!(8));

        let second = &model.requests()[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, ChatRole::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(second.tools.len(), 4);
    }

    #[tokio::test]
    async fn failing_tool_does_not_stop_the_loop() {
        let model = Arc::new(MockModel::new());
        model.add_responses([
            MockResponse::tool_call(ToolCall::new("call_1", "flaky", json!({}))),
            MockResponse::tool_call(ToolCall::new("call_2", "subtract", json!({"a": 1}))),
            MockResponse::text("gave up"),
        ]);

        let run = agent(model, settings())
            .run("try things", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.state, RunState::Completed { answer: "gave up".into() });
        let contents = tool_contents(&run);
        assert_eq!(contents[0]["tool_executed"], json!(false));
        assert_eq!(contents[0]["error"], json!("execution_error"));
        assert!(!contents[0]["message"].as_str().unwrap().contains("hunter2"));
        assert_eq!(contents[1]["error"], json!("unknown_tool"));
    }

    #[tokio::test]
    async fn stops_after_exactly_max_turns() {
        let model = Arc::new(MockModel::repeating(MockResponse::tool_call(
            ToolCall::new("call_1", "add", json!({"a": 1, "b": 1})),
        )));
        let settings = LoopSettings {
            max_turns: 3,
            ..settings()
        };

        let run = agent(model.clone(), settings)
            .run("loop forever", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.state, RunState::TurnLimitExceeded { turns: 3 });
        assert_eq!(model.calls(), 3);
        assert_eq!(tool_contents(&run).len(), 3);
    }

    #[tokio::test]
    async fn terminal_tool_ends_the_run() {
        let model = Arc::new(MockModel::new());
        model.add_responses([
            MockResponse::tool_call(ToolCall::new("call_1", TERMINATE, json!({"message": "bye"}))),
            MockResponse::text("never sent"),
        ]);

        let run = agent(model.clone(), settings())
            .run("finish", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            run.state,
            RunState::Terminated {
                tool: TERMINATE.into(),
                result: json!("Agent terminated: bye"),
            }
        );
        assert_eq!(model.remaining_responses(), 1);
    }

    #[tokio::test]
    async fn inference_errors_are_retried() {
        let model = Arc::new(MockModel::new());
        model.add_responses([MockResponse::error("503"), MockResponse::text("ok")]);

        let run = agent(model.clone(), settings())
            .run("hi", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.answer(), Some("ok"));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn persistent_inference_failure_fails_the_run() {
        let model = Arc::new(MockModel::repeating(MockResponse::error("unauthorized")));
        let settings = LoopSettings {
            max_consecutive_errors: 2,
            ..settings()
        };

        let err = agent(model.clone(), settings)
            .run("hi", CancellationToken::new())
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("unauthorized"));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let model = Arc::new(MockModel::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = agent(model.clone(), settings()).run("hi", cancel).await.unwrap();

        assert_eq!(run.state, RunState::Cancelled);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn calls_over_the_turn_limit_are_skipped() {
        let model = Arc::new(MockModel::new());
        model.add_responses([
            MockResponse::tool_calls(vec![
                ToolCall::new("call_1", "add", json!({"a": 1, "b": 2})),
                ToolCall::new("call_2", "add", json!({"a": 3, "b": 4})),
            ]),
            MockResponse::text("done"),
        ]);
        let settings = LoopSettings {
            max_tool_calls_per_turn: 1,
            ..settings()
        };

        let run = agent(model, settings)
            .run("add twice", CancellationToken::new())
            .await
            .unwrap();

        let contents = tool_contents(&run);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["result"], json!(3));
        assert_eq!(contents[1]["error"], json!("skipped"));
    }

    #[tokio::test]
    async fn small_window_still_sends_latest_tool_results() {
        let model = Arc::new(MockModel::new());
        model.add_responses([
            MockResponse::tool_calls(vec![
                ToolCall::new("call_1", "add", json!({"a": 1, "b": 1})),
                ToolCall::new("call_2", "add", json!({"a": 2, "b": 2})),
                ToolCall::new("call_3", "add", json!({"a": 3, "b": 3})),
            ]),
            MockResponse::text("2, 4 and 6"),
        ]);
        let settings = LoopSettings {
            history_window: 3,
            ..settings()
        };

        agent(model.clone(), settings)
            .run("add three pairs", CancellationToken::new())
            .await
            .unwrap();

        let second = &model.requests()[1];
        let roles: Vec<ChatRole> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::Tool,
                ChatRole::Tool,
                ChatRole::Tool,
            ]
        );
    }

    #[tokio::test]
    async fn missing_call_ids_are_generated() {
        let model = Arc::new(MockModel::new());
        model.add_responses([
            MockResponse::tool_call(ToolCall::new("", "get_info", json!({"topic": "Rust"}))),
            MockResponse::text("done"),
        ]);

        let run = agent(model, settings())
            .run("tell me", CancellationToken::new())
            .await
            .unwrap();

        let assistant = &run.history.messages()[2];
        let tool = &run.history.messages()[3];
        assert!(!assistant.tool_calls[0].id.is_empty());
        assert_eq!(tool.tool_call_id.as_deref(), Some(assistant.tool_calls[0].id.as_str()));
    }

    #[tokio::test]
    async fn free_function_uses_config() {
        let config = AgentConfig {
            model: "mock-model".into(),
            max_turns: 1,
            ..AgentConfig::default()
        };
        let model = Arc::new(MockModel::repeating(MockResponse::tool_call(
            ToolCall::new("call_1", "get_info", json!({"topic": "Python"})),
        )));

        let run = run_agent_loop(&config, registry(), model.clone(), "info", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.state, RunState::TurnLimitExceeded { turns: 1 });
        assert_eq!(model.requests()[0].model, "mock-model");
        assert!(model.requests()[0].messages[0]
            .content
            .contains("Helpful Assistant"));
    }
}
