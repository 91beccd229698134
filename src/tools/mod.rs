//! Tool declaration, registration and dispatch.

pub mod args;
pub mod builtin;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod schema;
pub mod traits;

pub use args::ToolArgs;
pub use dispatch::Dispatcher;
pub use error::{RegistryError, ReportableError, SchemaError, ValidationError};
pub use registry::{ToolFilter, ToolRegistry};
pub use schema::{ParamSpec, ParamType, ToolSchema};
pub use traits::{FnTool, Tool, ToolBuilder, ToolDefinition};
