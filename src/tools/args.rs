//! Validated arguments handed to tool handlers.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Arguments that already passed schema validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Missing '{}' argument", name))
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        self.values
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("Missing '{}' argument", name))
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        self.values
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow!("Missing '{}' argument", name))
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| anyhow!("Missing '{}' argument", name))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Deserialize all arguments into a typed struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.values.clone()))
            .context("Failed to deserialize tool arguments")
    }
}
