//! Tool trait definition and the closure-backed builder.

use crate::tools::args::ToolArgs;
use crate::tools::error::{RegistryError, SchemaError};
use crate::tools::schema::{ParamSpec, ParamType, ToolSchema};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Descriptions longer than this are cut when exposed to the model.
const MAX_DESCRIPTION_CHARS: usize = 1024;

/// Definition of a tool exposed to the inference model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool the model may call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in function calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Argument schema, checked before `execute` is called.
    fn schema(&self) -> &ToolSchema;

    /// Whether a successful call ends the conversation.
    fn is_terminal(&self) -> bool {
        false
    }

    fn tags(&self) -> &[String] {
        &[]
    }

    /// Execute the tool with validated arguments.
    async fn execute(&self, args: ToolArgs) -> Result<serde_json::Value>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().chars().take(MAX_DESCRIPTION_CHARS).collect(),
            parameters: self.schema().to_json(),
        }
    }
}

/// Future returned by a boxed handler.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>;

/// Boxed async handler used by [`FnTool`].
pub type ToolHandler = Arc<dyn Fn(ToolArgs) -> ToolFuture + Send + Sync>;

/// A tool backed by a closure. Built with [`ToolBuilder`].
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    schema: ToolSchema,
    terminal: bool,
    tags: Vec<String>,
    handler: ToolHandler,
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("terminal", &self.terminal)
            .field("tags", &self.tags)
            .finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn is_terminal(&self) -> bool {
        self.terminal
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    async fn execute(&self, args: ToolArgs) -> Result<serde_json::Value> {
        (self.handler)(args).await
    }
}

/// Explicit tool declaration: name, schema, flags, then the handler.
///
/// ```
/// use tool_agent::tools::{ParamType, ToolBuilder};
/// use serde_json::json;
///
/// let add = ToolBuilder::new("add")
///     .description("Calculate the sum of two numbers")
///     .param("a", ParamType::Number, "First addend")
///     .param("b", ParamType::Number, "Second addend")
///     .sync_handler(|args| Ok(json!(args.f64("a")? + args.f64("b")?)))
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Result<ToolSchema, SchemaError>,
    terminal: bool,
    tags: Vec<String>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "No description provided.".into(),
            schema: Ok(ToolSchema::new()),
            terminal: false,
            tags: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a required parameter.
    pub fn param(self, name: &str, ty: ParamType, description: &str) -> Self {
        self.param_spec(name, ParamSpec::new(ty).description(description), true)
    }

    /// Declare an optional parameter.
    pub fn optional_param(self, name: &str, ty: ParamType, description: &str) -> Self {
        self.param_spec(name, ParamSpec::new(ty).description(description), false)
    }

    pub fn param_spec(mut self, name: &str, spec: ParamSpec, required: bool) -> Self {
        self.schema = self.schema.map(|s| s.param(name, spec, required));
        self
    }

    /// Replace the schema with a raw JSON Schema object.
    pub fn parameters_json(mut self, schema: &serde_json::Value) -> Self {
        self.schema = ToolSchema::from_json(schema);
        self
    }

    pub fn schema(mut self, schema: ToolSchema) -> Self {
        self.schema = Ok(schema);
        self
    }

    /// Mark the tool as ending the conversation when it succeeds.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Finish with an async handler.
    pub fn handler<F, Fut>(self, f: F) -> Result<FnTool, RegistryError>
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |args| -> ToolFuture { Box::pin(f(args)) });
        self.finish(handler)
    }

    /// Finish with a synchronous handler.
    ///
    /// The handler runs on the blocking pool, so a slow handler never holds
    /// an async worker and the dispatch timeout still returns on time.
    pub fn sync_handler<F>(self, f: F) -> Result<FnTool, RegistryError>
    where
        F: Fn(ToolArgs) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let handler: ToolHandler = Arc::new(move |args| -> ToolFuture {
            let f = f.clone();
            Box::pin(async move {
                match tokio::task::spawn_blocking(move || f(args)).await {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(e) => Err(anyhow::anyhow!("blocking handler task failed: {}", e)),
                }
            })
        });
        self.finish(handler)
    }

    fn finish(self, handler: ToolHandler) -> Result<FnTool, RegistryError> {
        let schema = self.schema.map_err(|source| RegistryError::Schema {
            tool: self.name.clone(),
            source,
        })?;

        Ok(FnTool {
            name: self.name,
            description: self.description,
            schema,
            terminal: self.terminal,
            tags: self.tags,
            handler,
        })
    }
}
