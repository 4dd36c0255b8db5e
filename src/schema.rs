//! Response shape validation.
//!
//! A [`SchemaDict`] holds named schemas describing the fields a response
//! object must carry. Schemas may extend other schemas and reference them as
//! field types:
//!
//! ```json
//! {
//!   "dbentity": { "fields": { "id": { "type": "uint", "required": true } } },
//!   "project": {
//!     "extends": "dbentity",
//!     "fields": {
//!       "title": { "type": "string", "required": true },
//!       "regions": { "type": "array.uint" }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Schema '{0}' is not registered")]
    UnknownSchema(String),

    #[error("Schema '{schema}' mismatch at '{path}': {message}")]
    Mismatch {
        schema: String,
        path: String,
        message: String,
    },
}

/// Validates a response payload against a named schema.
pub trait Validator: Send + Sync {
    fn validate(&self, payload: &Value, schema: &str) -> Result<(), SchemaError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
}

impl FieldSchema {
    pub fn required(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            required: true,
        }
    }

    pub fn optional(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDict {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn put(&mut self, name: impl Into<String>, schema: Schema) {
        self.schemas.insert(name.into(), schema);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    fn check_schema(&self, value: &Value, schema_name: &str, root: &str, path: &str) -> Result<(), SchemaError> {
        let Some(object) = value.as_object() else {
            return Err(mismatch(root, path, format!("expected object '{}'", schema_name)));
        };

        // Walk the extends chain, guarding against cycles.
        let mut seen = Vec::new();
        let mut current = Some(schema_name);
        while let Some(name) = current {
            if seen.contains(&name) {
                break;
            }
            seen.push(name);
            let schema = self
                .schemas
                .get(name)
                .ok_or_else(|| SchemaError::UnknownSchema(name.to_string()))?;

            for (field, spec) in &schema.fields {
                let field_path = join(path, field);
                match object.get(field) {
                    None | Some(Value::Null) => {
                        if spec.required {
                            return Err(mismatch(root, &field_path, "required field is missing".to_string()));
                        }
                    }
                    Some(v) => self.check_type(v, &spec.kind, root, &field_path)?,
                }
            }
            current = schema.extends.as_deref();
        }
        Ok(())
    }

    fn check_type(&self, value: &Value, kind: &str, root: &str, path: &str) -> Result<(), SchemaError> {
        if let Some(inner) = kind.strip_prefix("array.") {
            let Some(items) = value.as_array() else {
                return Err(mismatch(root, path, format!("expected {}", kind)));
            };
            for (i, item) in items.iter().enumerate() {
                self.check_type(item, inner, root, &join(path, &i.to_string()))?;
            }
            return Ok(());
        }

        let ok = match kind {
            "uint" => value.as_u64().is_some(),
            "int" => value.as_i64().is_some() || value.as_u64().is_some(),
            "number" => value.is_number(),
            "string" => value.is_string(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            other => return self.check_schema(value, other, root, path),
        };
        if ok {
            Ok(())
        } else {
            Err(mismatch(root, path, format!("expected {}, found {}", kind, value)))
        }
    }
}

impl Validator for SchemaDict {
    fn validate(&self, payload: &Value, schema: &str) -> Result<(), SchemaError> {
        if !self.contains(schema) {
            return Err(SchemaError::UnknownSchema(schema.to_string()));
        }
        self.check_schema(payload, schema, schema, "")
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

fn mismatch(schema: &str, path: &str, message: String) -> SchemaError {
    SchemaError::Mismatch {
        schema: schema.to_string(),
        path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
        message,
    }
}
