//! Mapping of server validation errors onto form fields.
//!
//! The server reports errors as `{"errors": {"<field>": ["msg", ...],
//! "nonFieldErrors": ["msg", ...]}}`. Forms show field messages next to each
//! input and the non-field ones in a banner (the `$internal` slot).

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

pub const DEFAULT_FAILURE_MESSAGE: &str =
    "There was some error while performing this action. Please try again.";

const NON_FIELD_KEYS: [&str; 2] = ["nonFieldErrors", "non_field_errors"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaramErrors {
    pub fields: BTreeMap<String, Vec<String>>,
    pub internal: Vec<String>,
}

impl FaramErrors {
    /// Reads the `errors` member of a response body.
    pub fn from_response(body: &Value) -> Self {
        body.get("errors").map(Self::from_errors).unwrap_or_default()
    }

    pub fn from_errors(errors: &Value) -> Self {
        let mut faram = FaramErrors::default();
        match errors {
            Value::Object(map) => faram.collect(map, None),
            other => faram.internal.extend(messages(other)),
        }
        faram
    }

    fn collect(&mut self, map: &Map<String, Value>, prefix: Option<&str>) {
        for (key, value) in map {
            if prefix.is_none() && NON_FIELD_KEYS.contains(&key.as_str()) {
                self.internal.extend(messages(value));
                continue;
            }
            let name = match prefix {
                Some(prefix) => format!("{}.{}", prefix, key),
                None => key.clone(),
            };
            match value {
                Value::Object(nested) => self.collect(nested, Some(&name)),
                other => {
                    self.fields.entry(name).or_default().extend(messages(other));
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.internal.is_empty()
    }

    /// Non-field errors joined for a toast, or a generic message.
    pub fn message_for_notification(&self) -> String {
        if self.internal.is_empty() {
            DEFAULT_FAILURE_MESSAGE.to_string()
        } else {
            self.internal.join(" ")
        }
    }

    /// Form-state shape: field messages plus `$internal`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (field, msgs) in &self.fields {
            map.insert(field.clone(), json!(msgs));
        }
        if !self.internal.is_empty() {
            map.insert("$internal".to_string(), json!(self.internal));
        }
        Value::Object(map)
    }
}

fn messages(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(messages).collect(),
        other => vec![other.to_string()],
    }
}
