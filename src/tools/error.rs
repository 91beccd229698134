//! Error taxonomy for tool declaration and dispatch.
//!
//! Registration errors (`RegistryError`, `SchemaError`) are programming
//! errors and abort startup. Argument problems (`ValidationError`) and
//! handler failures are turned into tool results by the dispatcher.

use thiserror::Error;

/// Structural problems in a declared parameter schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema root must be an object schema, found {0}")]
    NotAnObject(String),

    #[error("parameter '{param}' has unsupported type '{found}'")]
    UnsupportedType { param: String, found: String },

    #[error("parameter '{0}' is missing a type")]
    MissingType(String),

    #[error("required field '{0}' is not a declared property")]
    UnknownRequired(String),

    #[error("required field '{0}' is listed more than once")]
    DuplicateRequired(String),

    #[error("parameter '{param}' is malformed: {reason}")]
    Malformed { param: String, reason: String },
}

/// Failures when registering or resolving tools.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("invalid tool name '{0}': use 1-64 characters from [A-Za-z0-9_-]")]
    InvalidName(String),

    #[error("invalid schema for tool '{tool}': {source}")]
    Schema {
        tool: String,
        #[source]
        source: SchemaError,
    },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),
}

/// A tool call's arguments did not satisfy the tool's schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("arguments must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error("missing required argument '{0}'")]
    MissingRequired(String),

    #[error("argument '{param}' must be {expected}, got {found}")]
    TypeMismatch {
        param: String,
        expected: String,
        found: String,
    },

    #[error("argument '{param}' must be one of {allowed}")]
    NotAllowed { param: String, allowed: String },

    #[error("unexpected argument '{0}'")]
    Unexpected(String),
}

/// Handler error whose message is safe to show the model.
///
/// Any other error returned by a handler is reported with a generic
/// message; its text only reaches the logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ReportableError(pub String);

impl ReportableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
