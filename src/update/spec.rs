//! Patch specifications.
//!
//! A [`Spec`] mirrors the shape of the value it is applied to. Leaves are
//! directives; inner nodes descend into object keys or array indices.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::error::UpdateError;
use super::value::{Map, Value};

#[derive(Clone)]
pub enum Spec {
    /// Replace the value.
    Set(Value),
    /// Shallow-merge keys into an existing object.
    Merge(Map),
    /// Append to an existing array.
    Push(Vec<Value>),
    /// Prepend to an existing array.
    Unshift(Vec<Value>),
    /// Append, starting from `[]` when the value is absent.
    AutoPush(Vec<Value>),
    /// Prepend, starting from `[]` when the value is absent.
    AutoUnshift(Vec<Value>),
    /// Array splices, applied one after another.
    Splice(Vec<Splice>),
    /// Keep the array elements matching the predicate.
    Filter(Predicate),
    /// Apply the inner spec, starting from `{}` when the value is absent.
    Auto(Box<Spec>),
    /// Descend into object keys or array indices.
    Nested(BTreeMap<String, Spec>),
}

/// One `(index, delete_count, ...items)` splice.
#[derive(Debug, Clone, PartialEq)]
pub struct Splice {
    /// Negative indices count from the end of the array.
    pub index: i64,
    /// `None` removes everything from `index` to the end.
    pub delete_count: Option<usize>,
    pub items: Vec<Value>,
}

impl Splice {
    pub fn new(index: i64, delete_count: usize, items: Vec<Value>) -> Self {
        Self {
            index,
            delete_count: Some(delete_count),
            items,
        }
    }

    pub fn remove(index: i64, delete_count: usize) -> Self {
        Self::new(index, delete_count, Vec::new())
    }

    pub fn truncate(index: i64) -> Self {
        Self {
            index,
            delete_count: None,
            items: Vec::new(),
        }
    }
}

/// Element test for [`Spec::Filter`].
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>);

impl Predicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn eq(expected: Value) -> Self {
        Self::new(move |v| *v == expected)
    }

    pub fn ne(excluded: Value) -> Self {
        Self::new(move |v| *v != excluded)
    }

    /// Keeps everything except strings equal to `word` ignoring case.
    pub fn ne_ignore_case(word: &str) -> Self {
        let word = word.to_lowercase();
        Self::new(move |v| match v.as_str() {
            Some(s) => s.to_lowercase() != word,
            None => true,
        })
    }

    pub fn test(&self, value: &Value) -> bool {
        (self.0)(value)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Spec::Set(v) => f.debug_tuple("Set").field(v).finish(),
            Spec::Merge(m) => f.debug_tuple("Merge").field(m).finish(),
            Spec::Push(v) => f.debug_tuple("Push").field(v).finish(),
            Spec::Unshift(v) => f.debug_tuple("Unshift").field(v).finish(),
            Spec::AutoPush(v) => f.debug_tuple("AutoPush").field(v).finish(),
            Spec::AutoUnshift(v) => f.debug_tuple("AutoUnshift").field(v).finish(),
            Spec::Splice(s) => f.debug_tuple("Splice").field(s).finish(),
            Spec::Filter(p) => f.debug_tuple("Filter").field(p).finish(),
            Spec::Auto(inner) => f.debug_tuple("Auto").field(inner).finish(),
            Spec::Nested(children) => f.debug_tuple("Nested").field(children).finish(),
        }
    }
}

impl Spec {
    pub fn set(value: impl Into<Value>) -> Self {
        Spec::Set(value.into())
    }

    pub fn auto(inner: Spec) -> Self {
        Spec::Auto(Box::new(inner))
    }

    pub fn nested<K, I>(children: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Spec)>,
    {
        Spec::Nested(children.into_iter().map(|(k, s)| (k.into(), s)).collect())
    }

    /// Wraps `leaf` in one nested level per path segment.
    ///
    /// `Spec::at(["a", "0"], leaf)` is `{a: {0: leaf}}`.
    pub fn at<K, I>(path: I, leaf: Spec) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = K>,
        I::IntoIter: DoubleEndedIterator,
    {
        path.into_iter()
            .rev()
            .fold(leaf, |acc, key| Spec::nested([(key, acc)]))
    }

    /// Whether this directive accepts a missing target.
    pub(crate) fn creates_missing(&self) -> bool {
        matches!(
            self,
            Spec::Set(_) | Spec::Auto(_) | Spec::AutoPush(_) | Spec::AutoUnshift(_)
        )
    }

    /// Parses the `$`-keyed JSON notation.
    ///
    /// An object with a single `$directive` key is a directive; any other
    /// object is a nested spec. Unknown `$` keys are rejected.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, UpdateError> {
        parse(json, &mut Vec::new())
    }
}

fn parse(json: &serde_json::Value, path: &mut Vec<String>) -> Result<Spec, UpdateError> {
    let Some(object) = json.as_object() else {
        return Err(UpdateError::configuration(
            path,
            format!("expected an object, found {}", json),
        ));
    };

    let directives: Vec<&String> = object.keys().filter(|k| k.starts_with('$')).collect();
    if directives.is_empty() {
        let mut children = BTreeMap::new();
        for (key, child) in object {
            path.push(key.clone());
            let spec = parse(child, path)?;
            path.pop();
            children.insert(key.clone(), spec);
        }
        return Ok(Spec::Nested(children));
    }

    if object.len() != 1 {
        return Err(UpdateError::configuration(
            path,
            "a directive cannot be combined with other keys",
        ));
    }

    let key = directives[0].as_str();
    let arg = &object[key];
    path.push(key.to_string());
    let spec = parse_directive(key, arg, path)?;
    path.pop();
    Ok(spec)
}

fn parse_directive(
    key: &str,
    arg: &serde_json::Value,
    path: &mut Vec<String>,
) -> Result<Spec, UpdateError> {
    let spec = match key {
        "$set" => Spec::Set(Value::from(arg.clone())),
        "$merge" => match Value::from(arg.clone()) {
            Value::Object(map) => Spec::Merge((*map).clone()),
            other => {
                return Err(UpdateError::configuration(
                    path,
                    format!("$merge expects an object, found {}", other.kind()),
                ))
            }
        },
        "$push" => Spec::Push(items(arg, path)?),
        "$unshift" => Spec::Unshift(items(arg, path)?),
        "$autoPush" => Spec::AutoPush(items(arg, path)?),
        "$autoUnshift" => Spec::AutoUnshift(items(arg, path)?),
        "$splice" => Spec::Splice(splices(arg, path)?),
        "$filter" => Spec::Filter(predicate(arg, path)?),
        "$auto" => Spec::Auto(Box::new(parse(arg, path)?)),
        other => {
            return Err(UpdateError::configuration(
                path,
                format!("unknown directive '{}'", other),
            ))
        }
    };
    Ok(spec)
}

fn items(arg: &serde_json::Value, path: &[String]) -> Result<Vec<Value>, UpdateError> {
    match arg {
        serde_json::Value::Array(items) => Ok(items.iter().cloned().map(Value::from).collect()),
        other => Err(UpdateError::configuration(
            path,
            format!("expected an array of items, found {}", other),
        )),
    }
}

fn splices(arg: &serde_json::Value, path: &[String]) -> Result<Vec<Splice>, UpdateError> {
    let Some(list) = arg.as_array() else {
        return Err(UpdateError::configuration(path, "$splice expects an array of arrays"));
    };
    list.iter()
        .map(|entry| {
            let args = entry.as_array().ok_or_else(|| {
                UpdateError::configuration(path, "each splice must be an array")
            })?;
            let index = args
                .first()
                .and_then(|i| i.as_i64())
                .ok_or_else(|| UpdateError::configuration(path, "splice index must be an integer"))?;
            let delete_count = match args.get(1) {
                None => None,
                Some(count) => Some(count.as_u64().ok_or_else(|| {
                    UpdateError::configuration(path, "splice delete count must be a non-negative integer")
                })? as usize),
            };
            let items = args.iter().skip(2).cloned().map(Value::from).collect();
            Ok(Splice {
                index,
                delete_count,
                items,
            })
        })
        .collect()
}

fn predicate(arg: &serde_json::Value, path: &[String]) -> Result<Predicate, UpdateError> {
    let object = arg.as_object().filter(|o| o.len() == 1).ok_or_else(|| {
        UpdateError::configuration(path, "$filter expects one of $eq, $ne, $neIgnoreCase")
    })?;
    let (op, operand) = object
        .iter()
        .next()
        .ok_or_else(|| UpdateError::configuration(path, "$filter is empty"))?;
    match op.as_str() {
        "$eq" => Ok(Predicate::eq(Value::from(operand.clone()))),
        "$ne" => Ok(Predicate::ne(Value::from(operand.clone()))),
        "$neIgnoreCase" => operand
            .as_str()
            .map(Predicate::ne_ignore_case)
            .ok_or_else(|| UpdateError::configuration(path, "$neIgnoreCase expects a string")),
        other => Err(UpdateError::configuration(
            path,
            format!("unknown filter operator '{}'", other),
        )),
    }
}
