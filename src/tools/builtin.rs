//! Tools every agent gets out of the box.

use crate::tools::error::RegistryError;
use crate::tools::registry::ToolRegistry;
use crate::tools::schema::ParamType;
use crate::tools::traits::ToolBuilder;
use anyhow::anyhow;
use serde_json::json;

/// Name of the terminal tool that ends a run with a final message.
pub const TERMINATE: &str = "terminate";

/// Register `terminate`, `add` and `get_info`.
pub fn register_all(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        ToolBuilder::new(TERMINATE)
            .description("Terminate the agent with a message")
            .param("message", ParamType::String, "Final message for the user")
            .terminal()
            .tag("system")
            .sync_handler(|args| Ok(json!(format!("Agent terminated: {}", args.str("message")?))))?,
    )?;

    registry.register(
        ToolBuilder::new("add")
            .description("Calculate the sum of two numbers")
            .param("a", ParamType::Number, "First addend")
            .param("b", ParamType::Number, "Second addend")
            .tag("math")
            .sync_handler(|args| {
                // Integer inputs keep an integer result.
                if let (Some(a), Some(b)) = (
                    args.get("a").and_then(|v| v.as_i64()),
                    args.get("b").and_then(|v| v.as_i64()),
                ) {
                    let sum = a
                        .checked_add(b)
                        .ok_or_else(|| anyhow!("integer overflow adding {} and {}", a, b))?;
                    return Ok(json!(sum));
                }
                Ok(json!(args.f64("a")? + args.f64("b")?))
            })?,
    )?;

    registry.register(
        ToolBuilder::new("get_info")
            .description("Get information about a topic")
            .param("topic", ParamType::String, "Topic to look up")
            .tag("info")
            .sync_handler(|args| {
                Ok(json!(format!(
                    "Information about {}: This is a sample information response.",
                    args.str("topic")?
                )))
            })?,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Dispatcher;
    use crate::types::{ToolCall, ToolErrorKind};
    use std::sync::Arc;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(ToolRegistry::with_builtin_tools().unwrap()))
    }

    #[test]
    fn builtins_registered_in_order() {
        let registry = ToolRegistry::with_builtin_tools().unwrap();
        assert_eq!(registry.names(), vec![TERMINATE, "add", "get_info"]);
        assert!(registry.resolve(TERMINATE).unwrap().is_terminal());
        assert!(!registry.resolve("add").unwrap().is_terminal());
    }

    #[tokio::test]
    async fn add_keeps_integers_and_handles_floats() {
        let d = dispatcher();
        let ints = d.dispatch(&ToolCall::new("1", "add", json!({"a": 5, "b": 3}))).await;
        assert_eq!(ints.payload(), Some(&json!(8)));

        let floats = d
            .dispatch(&ToolCall::new("2", "add", json!({"a": 1.5, "b": 2})))
            .await;
        assert_eq!(floats.payload(), Some(&json!(3.5)));

        let overflow = d
            .dispatch(&ToolCall::new("3", "add", json!({"a": i64::MAX, "b": 1})))
            .await;
        assert_eq!(overflow.error_kind(), Some(ToolErrorKind::ExecutionError));
    }

    #[tokio::test]
    async fn terminate_is_terminal() {
        let result = dispatcher()
            .dispatch(&ToolCall::new("t", TERMINATE, json!({"message": "done"})))
            .await;
        assert!(result.terminal);
        assert_eq!(result.payload(), Some(&json!("Agent terminated: done")));
    }

    #[tokio::test]
    async fn get_info_mentions_topic() {
        let result = dispatcher()
            .dispatch(&ToolCall::new("g", "get_info", json!({"topic": "Rust"})))
            .await;
        let text = result.payload().and_then(|v| v.as_str()).unwrap();
        assert!(text.starts_with("Information about Rust"));
    }
}
