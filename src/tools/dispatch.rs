//! Tool dispatch: resolve, validate, execute, package.
//!
//! `Dispatcher::dispatch` always returns a `ToolResult`. Unknown tools,
//! bad arguments, handler errors, panics and timeouts all become
//! error-tagged results that the loop feeds back to the model.

use crate::tools::args::ToolArgs;
use crate::tools::error::ReportableError;
use crate::tools::registry::ToolRegistry;
use crate::types::{ToolCall, ToolErrorKind, ToolResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Executes tool calls against a registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: None,
        }
    }

    /// Wall-clock limit for a single handler invocation.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Dispatch one tool call.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let tool = match self.registry.resolve(&call.name) {
            Ok(tool) => tool.clone(),
            Err(e) => {
                warn!("Model requested unknown tool '{}'", call.name);
                return ToolResult::error(
                    call,
                    ToolErrorKind::UnknownTool,
                    format!(
                        "{}. Available tools: {}",
                        e,
                        self.registry.names().join(", ")
                    ),
                );
            }
        };

        let args = match tool.schema().validate(&call.arguments) {
            Ok(values) => ToolArgs::new(values),
            Err(e) => {
                warn!("Rejected arguments for '{}': {}", call.name, e);
                return ToolResult::error(
                    call,
                    ToolErrorKind::ValidationError,
                    format!("Invalid arguments for '{}': {}", call.name, e),
                );
            }
        };

        let terminal = tool.is_terminal();
        let handle = tokio::spawn(async move { tool.execute(args).await });
        let abort = handle.abort_handle();

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    warn!("Tool '{}' timed out after {:?}", call.name, limit);
                    return ToolResult::error(
                        call,
                        ToolErrorKind::Timeout,
                        format!(
                            "Tool '{}' did not finish within {} ms",
                            call.name,
                            limit.as_millis()
                        ),
                    );
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(output)) => {
                debug!("Tool '{}' succeeded", call.name);
                ToolResult::success(call, output, terminal)
            }
            Ok(Err(e)) => {
                if let Some(reportable) = e.downcast_ref::<ReportableError>() {
                    warn!("Tool '{}' reported: {}", call.name, reportable);
                    return ToolResult::error(
                        call,
                        ToolErrorKind::ExecutionError,
                        reportable.to_string(),
                    );
                }
                warn!("Tool '{}' failed: {:#}", call.name, e);
                ToolResult::error(
                    call,
                    ToolErrorKind::ExecutionError,
                    format!("Tool '{}' failed during execution", call.name),
                )
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    error!("Tool '{}' panicked", call.name);
                } else {
                    warn!("Tool '{}' task was cancelled", call.name);
                }
                ToolResult::error(
                    call,
                    ToolErrorKind::ExecutionError,
                    format!("Tool '{}' failed during execution", call.name),
                )
            }
        }
    }

    /// Dispatch several calls; results come back in request order.
    ///
    /// With `parallel`, calls run concurrently and are re-joined in order.
    pub async fn dispatch_all(&self, calls: &[ToolCall], parallel: bool) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());

        if !parallel {
            for call in calls {
                results.push(self.dispatch(call).await);
            }
            return results;
        }

        let handles: Vec<_> = calls
            .iter()
            .cloned()
            .map(|call| {
                let dispatcher = self.clone();
                tokio::spawn(async move { dispatcher.dispatch(&call).await })
            })
            .collect();

        for (handle, call) in handles.into_iter().zip(calls) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("Dispatch task for '{}' failed: {}", call.name, e);
                    results.push(ToolResult::error(
                        call,
                        ToolErrorKind::ExecutionError,
                        format!("Tool '{}' failed during execution", call.name),
                    ));
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::ParamType;
    use crate::tools::traits::ToolBuilder;
    use anyhow::{anyhow, bail};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn add_tool(calls: Arc<AtomicUsize>) -> crate::tools::FnTool {
        ToolBuilder::new("add")
            .description("Add two integers")
            .param("a", ParamType::Integer, "First")
            .param("b", ParamType::Integer, "Second")
            .sync_handler(move |args| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!(args.i64("a")? + args.i64("b")?))
            })
            .unwrap()
    }

    fn dispatcher_with(tools: Vec<crate::tools::FnTool>) -> Dispatcher {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        Dispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn add_scenario() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(vec![add_tool(counter.clone())]);

        let ok = dispatcher
            .dispatch(&ToolCall::new("c1", "add", json!({"a": 2, "b": 3})))
            .await;
        assert_eq!(ok.payload(), Some(&json!(5)));
        assert_eq!(ok.tool_call_id, "c1");

        let missing = dispatcher
            .dispatch(&ToolCall::new("c2", "add", json!({"a": 2})))
            .await;
        assert_eq!(missing.error_kind(), Some(ToolErrorKind::ValidationError));

        let unknown = dispatcher
            .dispatch(&ToolCall::new("c3", "subtract", json!({})))
            .await;
        assert_eq!(unknown.error_kind(), Some(ToolErrorKind::UnknownTool));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_invokes_nothing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(vec![add_tool(counter.clone())]);

        for name in ["subtract", "ADD", "add ", ""] {
            let result = dispatcher
                .dispatch(&ToolCall::new("c", name, json!({"a": 1, "b": 1})))
                .await;
            assert_eq!(result.error_kind(), Some(ToolErrorKind::UnknownTool));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_handler() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(vec![add_tool(counter.clone())]);

        let bad_args = [
            json!({}),
            json!({"b": 1}),
            json!({"a": "two", "b": 1}),
            json!({"a": 1, "b": 2, "c": 3}),
            json!([1, 2]),
            json!("{\"a\": 1"),
        ];
        for args in bad_args {
            let result = dispatcher.dispatch(&ToolCall::new("c", "add", args)).await;
            assert_eq!(result.error_kind(), Some(ToolErrorKind::ValidationError));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_failure_is_wrapped_without_internal_text() {
        let tool = ToolBuilder::new("flaky")
            .sync_handler(|_| Err(anyhow!("connection refused at 10.0.0.7:5432")))
            .unwrap();
        let dispatcher = dispatcher_with(vec![tool]);

        let result = dispatcher
            .dispatch(&ToolCall::new("call_42", "flaky", json!({})))
            .await;

        assert_eq!(result.tool_call_id, "call_42");
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ExecutionError));
        assert!(!result.to_content().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn reportable_errors_keep_their_message() {
        let tool = ToolBuilder::new("lookup")
            .param("key", ParamType::String, "Key")
            .sync_handler(|args| {
                let key = args.str("key")?;
                bail!(ReportableError::new(format!("no entry for '{}'", key)))
            })
            .unwrap();
        let dispatcher = dispatcher_with(vec![tool]);

        let result = dispatcher
            .dispatch(&ToolCall::new("c", "lookup", json!({"key": "zz"})))
            .await;
        match result.outcome {
            crate::types::ToolOutcome::Error { kind, message } => {
                assert_eq!(kind, ToolErrorKind::ExecutionError);
                assert_eq!(message, "no entry for 'zz'");
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let tool = ToolBuilder::new("boom")
            .sync_handler(|_| panic!("handler bug"))
            .unwrap();
        let dispatcher = dispatcher_with(vec![tool]);

        let result = dispatcher
            .dispatch(&ToolCall::new("c", "boom", json!({})))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ExecutionError));
        assert!(!result.to_content().contains("handler bug"));
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let tool = ToolBuilder::new("slow")
            .handler(|_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!("done"))
            })
            .unwrap();
        let dispatcher =
            dispatcher_with(vec![tool]).with_timeout(Some(Duration::from_millis(20)));

        let result = dispatcher
            .dispatch(&ToolCall::new("c", "slow", json!({})))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Timeout));
    }

    #[tokio::test]
    async fn blocking_sync_handler_still_times_out() {
        let tool = ToolBuilder::new("grind")
            .sync_handler(|_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(json!("done"))
            })
            .unwrap();
        let dispatcher =
            dispatcher_with(vec![tool]).with_timeout(Some(Duration::from_millis(20)));

        let started = std::time::Instant::now();
        let result = dispatcher
            .dispatch(&ToolCall::new("c", "grind", json!({})))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn repeated_dispatch_of_pure_tool_is_stable() {
        let dispatcher = dispatcher_with(vec![add_tool(Arc::new(AtomicUsize::new(0)))]);
        let call = ToolCall::new("c", "add", json!({"a": 20, "b": 22}));

        let first = dispatcher.dispatch(&call).await;
        let second = dispatcher.dispatch(&call).await;
        assert_eq!(first.outcome, second.outcome);
        assert_eq!(first.payload(), Some(&json!(42)));
    }

    #[tokio::test]
    async fn parallel_dispatch_preserves_request_order() {
        let tool = ToolBuilder::new("wait")
            .param("ms", ParamType::Integer, "Delay")
            .handler(|args| async move {
                let ms = args.i64("ms")?;
                tokio::time::sleep(Duration::from_millis(ms as u64)).await;
                Ok::<_, anyhow::Error>(json!(ms))
            })
            .unwrap();
        let dispatcher = dispatcher_with(vec![tool]);

        let calls = vec![
            ToolCall::new("first", "wait", json!({"ms": 40})),
            ToolCall::new("second", "wait", json!({"ms": 1})),
            ToolCall::new("third", "missing", json!({})),
        ];

        for parallel in [false, true] {
            let results = dispatcher.dispatch_all(&calls, parallel).await;
            let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
            assert_eq!(ids, vec!["first", "second", "third"]);
            assert_eq!(results[0].payload(), Some(&json!(40)));
            assert_eq!(results[2].error_kind(), Some(ToolErrorKind::UnknownTool));
        }
    }

    #[tokio::test]
    async fn terminal_flag_only_on_success() {
        let done = ToolBuilder::new("finish")
            .param("message", ParamType::String, "Final message")
            .terminal()
            .sync_handler(|args| Ok(json!(args.str("message")?)))
            .unwrap();
        let dispatcher = dispatcher_with(vec![done]);

        let ok = dispatcher
            .dispatch(&ToolCall::new("c", "finish", json!({"message": "bye"})))
            .await;
        assert!(ok.terminal);

        let bad = dispatcher
            .dispatch(&ToolCall::new("c", "finish", json!({})))
            .await;
        assert!(!bad.terminal);
    }
}
