#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Boolean,
    Number,
    Integer,
    Array,
    Object,
}

impl SchemaType {
    fn label(self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Boolean => "boolean",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// The subset of JSON schema understood for transformation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsSchema {
    #[serde(default)]
    pub properties: IndexMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default = "default_additional_properties")]
    pub additional_properties: bool,
}

fn default_additional_properties() -> bool {
    true
}

impl Default for OptionsSchema {
    fn default() -> Self {
        Self {
            properties: IndexMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }
}

impl OptionsSchema {
    /// Validate and coerce `raw` against this schema, filling defaults for
    /// absent properties. Every problem is collected before failing.
    pub fn validate(&self, raw: Value) -> Result<ValidatedOptions, AppError> {
        let input = match raw {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(invalid_options(vec![format!(
                    "options must be an object, got {}",
                    json_type_name(&other)
                )]));
            }
        };

        let mut problems = Vec::new();
        let mut output = Map::new();
        for (key, value) in input {
            match self.properties.get(&key) {
                Some(property) => match coerce(&key, value, property) {
                    Ok(coerced) => {
                        output.insert(key, coerced);
                    }
                    Err(problem) => problems.push(problem),
                },
                None if self.additional_properties => {
                    output.insert(key, value);
                }
                None => problems.push(format!("unknown option '{}'", key)),
            }
        }

        for (key, property) in &self.properties {
            if output.contains_key(key) {
                continue;
            }
            if let Some(default) = &property.default {
                output.insert(key.clone(), default.clone());
            }
        }

        for key in &self.required {
            if !output.contains_key(key) {
                problems.push(format!("missing required option '{}'", key));
            }
        }

        if !problems.is_empty() {
            return Err(invalid_options(problems));
        }
        Ok(ValidatedOptions(Arc::new(Value::Object(output))))
    }
}

fn invalid_options(problems: Vec<String>) -> AppError {
    let mut err = AppError::new(
        ErrorCategory::ValidationError,
        format!("invalid options: {}", problems.join("; ")),
    )
    .with_code("OPTS-INVALID-001");
    err.add_context("problems", &problems.join("\n"));
    err
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce(key: &str, value: Value, property: &PropertySchema) -> Result<Value, String> {
    let coerced = match property.kind {
        None => value,
        Some(kind) => coerce_to(kind, value).map_err(|value| {
            format!(
                "option '{}' must be of type {}, got {}",
                key,
                kind.label(),
                json_type_name(&value)
            )
        })?,
    };
    if let Some(allowed) = &property.allowed {
        if !allowed.contains(&coerced) {
            let choices: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Err(format!(
                "option '{}' must be one of {}, got {}",
                key,
                choices.join(", "),
                coerced
            ));
        }
    }
    Ok(coerced)
}

/// Returns the offending value on failure.
fn coerce_to(kind: SchemaType, value: Value) -> Result<Value, Value> {
    match (kind, value) {
        (SchemaType::String, Value::String(s)) => Ok(Value::String(s)),
        (SchemaType::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (SchemaType::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        (SchemaType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (SchemaType::Boolean, Value::String(s)) => match s.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(Value::String(s)),
        },
        (SchemaType::Number, Value::Number(n)) => Ok(Value::Number(n)),
        (SchemaType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or(Value::String(s)),
        (SchemaType::Integer, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Ok(Value::Number(n))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(Value::Number(Number::from(f as i64)))
                    }
                    _ => Err(Value::Number(n)),
                }
            }
        }
        (SchemaType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(|i| Value::Number(Number::from(i)))
            .map_err(|_| Value::String(s)),
        (SchemaType::Array, Value::Array(items)) => Ok(Value::Array(items)),
        (SchemaType::Object, Value::Object(map)) => Ok(Value::Object(map)),
        (_, other) => Err(other),
    }
}

/// Options that passed schema validation. Shared read-only from here on.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOptions(Arc<Value>);

impl Default for ValidatedOptions {
    fn default() -> Self {
        ValidatedOptions(Arc::new(Value::Object(Map::new())))
    }
}

impl ValidatedOptions {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.0.as_ref().clone()).map_err(|err| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("options do not match the expected shape: {}", err),
            )
            .with_code("OPTS-SHAPE-001")
        })
    }
}
