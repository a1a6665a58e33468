//! Tool input schemas and validated argument maps
//!
//! A schema is a flat object description: named properties with a
//! primitive type, a description, and a required flag. It is rendered as
//! JSON Schema for `tools/list` and checked once per call before the
//! handler runs, so handlers can read typed fields without re-checking.

use serde_json::{json, Map, Value};

use crate::error::{ProtocolError, ProtocolResult};
use crate::mcp::content::ToolFailure;

/// Primitive argument types a tool can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ArgType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgType::String => "string",
            ArgType::Integer => "integer",
            ArgType::Number => "number",
            ArgType::Boolean => "boolean",
            ArgType::Object => "object",
            ArgType::Array => "array",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ArgType::String => value.is_string(),
            ArgType::Integer => value.is_i64() || value.is_u64(),
            ArgType::Number => value.is_number(),
            ArgType::Boolean => value.is_boolean(),
            ArgType::Object => value.is_object(),
            ArgType::Array => value.is_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Property {
    name: String,
    kind: ArgType,
    description: String,
    required: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    properties: Vec<Property>,
}

impl InputSchema {
    /// Schema with no properties
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, kind: ArgType, description: &str) -> Self {
        self.property(name, kind, description, true)
    }

    pub fn optional(self, name: &str, kind: ArgType, description: &str) -> Self {
        self.property(name, kind, description, false)
    }

    fn property(mut self, name: &str, kind: ArgType, description: &str, required: bool) -> Self {
        self.properties.retain(|p| p.name != name);
        self.properties.push(Property {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required,
        });
        self
    }

    /// Names of required properties, in declaration order
    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
    }

    /// JSON Schema rendering used in `tools/list`
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.properties {
            properties.insert(
                p.name.clone(),
                json!({ "type": p.kind.as_str(), "description": p.description }),
            );
        }

        let mut schema = json!({ "type": "object", "properties": properties });
        let required: Vec<&str> = self.required_keys().collect();
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    /// Check a raw argument payload against this schema.
    ///
    /// `null` is treated as an empty map. Required keys must be present and
    /// non-null; any declared key that is present and non-null must match
    /// its type. Undeclared keys pass through untouched.
    pub fn validate(&self, raw: Value) -> ProtocolResult<Arguments> {
        let map = match raw {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(ProtocolError::InvalidArguments(format!(
                    "expected an object, got {}",
                    type_name(&other)
                )))
            }
        };

        for p in &self.properties {
            match map.get(&p.name) {
                None | Some(Value::Null) if p.required => {
                    return Err(ProtocolError::MissingRequiredArgument(p.name.clone()))
                }
                Some(value) if !value.is_null() && !p.kind.accepts(value) => {
                    return Err(ProtocolError::InvalidArgumentType {
                        key: p.name.clone(),
                        expected: p.kind.as_str(),
                    })
                }
                _ => {}
            }
        }

        Ok(Arguments { map })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Argument map that has passed schema validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    map: Map<String, Value>,
}

impl Arguments {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    /// Required string field
    pub fn str(&self, key: &str) -> Result<&str, ToolFailure> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ToolFailure::new(format!("{key} must be a string")))
    }

    /// Required integer field
    pub fn i64(&self, key: &str) -> Result<i64, ToolFailure> {
        self.get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| ToolFailure::new(format!("{key} must be an integer")))
    }
}
