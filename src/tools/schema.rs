//! Parameter schemas for tools.
//!
//! A `ToolSchema` is the explicit description of a tool's arguments
//! (name -> type/shape, plus the required list). It is rendered as JSON
//! Schema for the model and checked against every incoming call, coercing
//! loosely-typed values where the intent is unambiguous.

use crate::tools::error::{SchemaError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;

/// JSON types a parameter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether `value` already has this type, without coercion.
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub ty: ParamType,
    pub description: Option<String>,
    /// Allowed values (`enum` in JSON Schema).
    pub allowed: Option<Vec<Value>>,
    /// Filled in when an optional parameter is absent.
    pub default: Option<Value>,
    /// Element type for arrays.
    pub items: Option<ParamType>,
}

impl ParamSpec {
    pub fn new(ty: ParamType) -> Self {
        Self {
            ty,
            description: None,
            allowed: None,
            default: None,
            items: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn one_of(mut self, allowed: Vec<Value>) -> Self {
        self.allowed = Some(allowed);
        self
    }

    pub fn default_value(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn items(mut self, items: ParamType) -> Self {
        self.items = Some(items);
        self
    }

    fn from_json(name: &str, value: &Value) -> Result<Self, SchemaError> {
        let obj = value.as_object().ok_or_else(|| SchemaError::Malformed {
            param: name.to_string(),
            reason: format!("expected an object, found {}", json_type_name(value)),
        })?;

        let ty = match obj.get("type") {
            None => return Err(SchemaError::MissingType(name.to_string())),
            Some(Value::String(s)) => {
                ParamType::parse(s).ok_or_else(|| SchemaError::UnsupportedType {
                    param: name.to_string(),
                    found: s.clone(),
                })?
            }
            Some(other) => {
                return Err(SchemaError::UnsupportedType {
                    param: name.to_string(),
                    found: other.to_string(),
                })
            }
        };

        let description = match obj.get("description") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(SchemaError::Malformed {
                    param: name.to_string(),
                    reason: "description must be a string".into(),
                })
            }
        };

        let allowed = match obj.get("enum") {
            None => None,
            Some(Value::Array(values)) if !values.is_empty() => Some(values.clone()),
            Some(_) => {
                return Err(SchemaError::Malformed {
                    param: name.to_string(),
                    reason: "enum must be a non-empty array".into(),
                })
            }
        };

        let items = match obj.get("items") {
            None => None,
            Some(items) => {
                let item_name = format!("{}[]", name);
                Some(ParamSpec::from_json(&item_name, items)?.ty)
            }
        };

        Ok(Self {
            ty,
            description,
            allowed,
            default: obj.get("default").cloned(),
            items,
        })
    }

    fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), json!(self.ty.as_str()));
        if let Some(ref description) = self.description {
            obj.insert("description".into(), json!(description));
        }
        if let Some(ref allowed) = self.allowed {
            obj.insert("enum".into(), Value::Array(allowed.clone()));
        }
        if let Some(ref default) = self.default {
            obj.insert("default".into(), default.clone());
        }
        if let Some(items) = self.items {
            obj.insert("items".into(), json!({ "type": items.as_str() }));
        }
        Value::Object(obj)
    }

    fn check(&self, name: &str) -> Result<(), SchemaError> {
        if self.items.is_some() && self.ty != ParamType::Array {
            return Err(SchemaError::Malformed {
                param: name.to_string(),
                reason: format!("items declared on a {} parameter", self.ty),
            });
        }
        if let Some(ref allowed) = self.allowed {
            if allowed.is_empty() {
                return Err(SchemaError::Malformed {
                    param: name.to_string(),
                    reason: "enum must be a non-empty array".into(),
                });
            }
            if let Some(bad) = allowed.iter().find(|v| !self.ty.matches(v)) {
                return Err(SchemaError::Malformed {
                    param: name.to_string(),
                    reason: format!("enum value {} is not a {}", bad, self.ty),
                });
            }
        }
        if let Some(ref default) = self.default {
            if !self.ty.matches(default) {
                return Err(SchemaError::Malformed {
                    param: name.to_string(),
                    reason: format!("default {} is not a {}", default, self.ty),
                });
            }
        }
        Ok(())
    }
}

/// Argument schema for a tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolSchema {
    properties: Vec<(String, ParamSpec)>,
    required: Vec<String>,
    allow_additional: bool,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter. Declaration order is kept in the rendered schema.
    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.push((name, spec));
        self
    }

    /// Accept arguments that are not declared (passed through unchecked).
    pub fn allow_additional(mut self, allow: bool) -> Self {
        self.allow_additional = allow;
        self
    }

    /// Parse a JSON Schema object (`{"type": "object", "properties": ..., "required": [...]}`).
    ///
    /// An empty object is an empty schema.
    pub fn from_json(value: &Value) -> Result<Self, SchemaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaError::NotAnObject(json_type_name(value).to_string()))?;

        match obj.get("type") {
            None => {}
            Some(Value::String(s)) if s == "object" => {}
            Some(other) => return Err(SchemaError::NotAnObject(other.to_string())),
        }

        let mut schema = ToolSchema::new();

        match obj.get("properties") {
            None => {}
            Some(Value::Object(props)) => {
                for (name, spec) in props {
                    schema
                        .properties
                        .push((name.clone(), ParamSpec::from_json(name, spec)?));
                }
            }
            Some(other) => {
                return Err(SchemaError::Malformed {
                    param: "properties".into(),
                    reason: format!("expected an object, found {}", json_type_name(other)),
                })
            }
        }

        match obj.get("required") {
            None => {}
            Some(Value::Array(names)) => {
                for name in names {
                    let name = name.as_str().ok_or_else(|| SchemaError::Malformed {
                        param: "required".into(),
                        reason: format!("entries must be strings, found {}", name),
                    })?;
                    schema.required.push(name.to_string());
                }
            }
            Some(other) => {
                return Err(SchemaError::Malformed {
                    param: "required".into(),
                    reason: format!("expected an array, found {}", json_type_name(other)),
                })
            }
        }

        if let Some(Value::Bool(allow)) = obj.get("additionalProperties") {
            schema.allow_additional = *allow;
        }

        schema.check()?;
        Ok(schema)
    }

    /// Structural check, run on every registration.
    pub fn check(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for (name, spec) in &self.properties {
            if name.is_empty() {
                return Err(SchemaError::Malformed {
                    param: name.clone(),
                    reason: "parameter name is empty".into(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::Malformed {
                    param: name.clone(),
                    reason: "declared more than once".into(),
                });
            }
            spec.check(name)?;
        }

        let mut required = HashSet::new();
        for name in &self.required {
            if !seen.contains(name.as_str()) {
                return Err(SchemaError::UnknownRequired(name.clone()));
            }
            if !required.insert(name.as_str()) {
                return Err(SchemaError::DuplicateRequired(name.clone()));
            }
        }
        Ok(())
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(n, _)| n.as_str())
    }

    /// Render as JSON Schema.
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, spec)| (name.clone(), spec.to_json()))
            .collect();

        let mut obj = Map::new();
        obj.insert("type".into(), json!("object"));
        obj.insert("properties".into(), Value::Object(properties));
        obj.insert("required".into(), json!(self.required));
        if self.allow_additional {
            obj.insert("additionalProperties".into(), json!(true));
        }
        Value::Object(obj)
    }

    /// Validate raw model arguments, returning the coerced argument map.
    ///
    /// `null` counts as `{}`. Declared defaults are filled in for absent
    /// optional parameters.
    pub fn validate(&self, args: &Value) -> Result<Map<String, Value>, ValidationError> {
        let empty = Map::new();
        let raw = match args {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => return Err(ValidationError::NotAnObject(json_type_name(other).to_string())),
        };

        let mut out = Map::new();

        for (name, spec) in &self.properties {
            match raw.get(name) {
                Some(value) if !value.is_null() => {
                    out.insert(name.clone(), coerce(name, spec, value)?);
                }
                _ => {
                    if self.is_required(name) {
                        return Err(ValidationError::MissingRequired(name.clone()));
                    }
                    if let Some(ref default) = spec.default {
                        out.insert(name.clone(), default.clone());
                    }
                }
            }
        }

        for (name, value) in raw {
            if self.get(name).is_some() {
                continue;
            }
            if !self.allow_additional {
                return Err(ValidationError::Unexpected(name.clone()));
            }
            out.insert(name.clone(), value.clone());
        }

        Ok(out)
    }
}

/// Check one value against its spec, coercing where unambiguous.
fn coerce(name: &str, spec: &ParamSpec, value: &Value) -> Result<Value, ValidationError> {
    let value = coerce_type(name, spec.ty, value)?;

    let value = match (spec.items, value) {
        (Some(item_ty), Value::Array(elements)) => {
            let mut coerced = Vec::with_capacity(elements.len());
            for (i, element) in elements.iter().enumerate() {
                coerced.push(coerce_type(&format!("{}[{}]", name, i), item_ty, element)?);
            }
            Value::Array(coerced)
        }
        (_, value) => value,
    };

    if let Some(ref allowed) = spec.allowed {
        if !allowed.iter().any(|a| same_value(a, &value)) {
            let allowed = allowed
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ValidationError::NotAllowed {
                param: name.to_string(),
                allowed: format!("[{}]", allowed),
            });
        }
    }

    Ok(value)
}

/// `enum` equality: numbers compare by value, so `1` matches `1.0`.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        _ => a == b,
    }
}

fn coerce_type(name: &str, ty: ParamType, value: &Value) -> Result<Value, ValidationError> {
    if ty.matches(value) {
        return Ok(value.clone());
    }

    let coerced = match (ty, value) {
        (ParamType::Integer, Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| json!(f as i64)),
        (ParamType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(|i| json!(i)),
        (ParamType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| json!(f)),
        (ParamType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    };

    coerced.ok_or_else(|| ValidationError::TypeMismatch {
        param: name.to_string(),
        expected: ty.as_str().to_string(),
        found: json_type_name(value).to_string(),
    })
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
