//! Nested immutable updates.
//!
//! [`update`] applies a [`Spec`] to a [`Value`] and returns a new value. The
//! input is never modified and every branch the spec does not touch is shared
//! with the result.

mod error;
mod spec;
mod value;

use std::sync::Arc;

pub use error::UpdateError;
pub use spec::{Predicate, Spec, Splice};
pub use value::{Map, Value};

/// Applies `spec` to `value`.
pub fn update(value: &Value, spec: &Spec) -> Result<Value, UpdateError> {
    apply(Some(value), spec, &mut Vec::new())
}

/// Applies a `$`-keyed JSON spec to a `serde_json::Value`.
pub fn update_json(
    value: &serde_json::Value,
    spec: &serde_json::Value,
) -> Result<serde_json::Value, UpdateError> {
    let spec = Spec::from_json(spec)?;
    let updated = update(&Value::from(value.clone()), &spec)?;
    Ok(serde_json::Value::from(updated))
}

fn apply(target: Option<&Value>, spec: &Spec, path: &mut Vec<String>) -> Result<Value, UpdateError> {
    match spec {
        Spec::Set(value) => Ok(value.clone()),
        Spec::Auto(inner) => {
            let start = match target {
                Some(Value::Null) | None => Value::empty_object(),
                Some(existing) => existing.clone(),
            };
            apply(Some(&start), inner, path)
        }
        Spec::AutoPush(items) | Spec::AutoUnshift(items) => {
            let start = match target {
                Some(Value::Null) | None => Value::empty_array(),
                Some(existing) => existing.clone(),
            };
            let items_at_front = matches!(spec, Spec::AutoUnshift(_));
            insert_items(&start, items, items_at_front, path)
        }
        Spec::Push(items) => insert_items(require(target, path)?, items, false, path),
        Spec::Unshift(items) => insert_items(require(target, path)?, items, true, path),
        Spec::Merge(entries) => {
            let current = require(target, path)?;
            let Value::Object(map) = current else {
                return Err(UpdateError::configuration(
                    path,
                    format!("$merge target must be an object, found {}", current.kind()),
                ));
            };
            let mut merged = (**map).clone();
            for (key, value) in entries {
                merged.insert(key.clone(), value.clone());
            }
            Ok(Value::Object(Arc::new(merged)))
        }
        Spec::Splice(splices) => {
            let current = require(target, path)?;
            let mut items = array_items(current, "$splice", path)?;
            for splice in splices {
                apply_splice(&mut items, splice);
            }
            Ok(Value::Array(Arc::new(items)))
        }
        Spec::Filter(predicate) => {
            let current = require(target, path)?;
            let items = array_items(current, "$filter", path)?;
            Ok(Value::Array(Arc::new(
                items.into_iter().filter(|v| predicate.test(v)).collect(),
            )))
        }
        Spec::Nested(children) => {
            let current = require(target, path)?;
            apply_nested(current, children, path)
        }
    }
}

fn apply_nested(
    current: &Value,
    children: &std::collections::BTreeMap<String, Spec>,
    path: &mut Vec<String>,
) -> Result<Value, UpdateError> {
    if children.is_empty() {
        return Ok(current.clone());
    }
    match current {
        Value::Object(map) => {
            let mut next = (**map).clone();
            for (key, child) in children {
                let existing = map.get(key);
                if existing.is_none() && !child.creates_missing() {
                    return Err(UpdateError::path_not_found(path, key));
                }
                path.push(key.clone());
                let updated = apply(existing, child, path)?;
                path.pop();
                next.insert(key.clone(), updated);
            }
            Ok(Value::Object(Arc::new(next)))
        }
        Value::Array(items) => {
            let mut indexed = children
                .iter()
                .map(|(key, child)| {
                    key.parse::<usize>()
                        .map(|index| (index, key, child))
                        .map_err(|_| {
                            UpdateError::configuration(path, format!("'{}' is not an array index", key))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            // numeric order, so "10" comes after "9"
            indexed.sort_by_key(|(index, _, _)| *index);

            let mut next = (**items).clone();
            for (index, key, child) in indexed {
                let existing = items.get(index);
                let appends = index == next.len() && child.creates_missing();
                if existing.is_none() && !appends {
                    return Err(UpdateError::path_not_found(path, key));
                }
                path.push(key.clone());
                let updated = apply(existing, child, path)?;
                path.pop();
                if appends {
                    next.push(updated);
                } else {
                    next[index] = updated;
                }
            }
            Ok(Value::Array(Arc::new(next)))
        }
        other => Err(UpdateError::configuration(
            path,
            format!("cannot descend into {}", other.kind()),
        )),
    }
}

fn require<'a>(target: Option<&'a Value>, path: &[String]) -> Result<&'a Value, UpdateError> {
    target.ok_or_else(|| {
        let (parent, segment) = path.split_at(path.len().saturating_sub(1));
        UpdateError::path_not_found(parent, segment.first().map(String::as_str).unwrap_or(""))
    })
}

fn array_items(current: &Value, directive: &str, path: &[String]) -> Result<Vec<Value>, UpdateError> {
    match current {
        Value::Array(items) => Ok((**items).clone()),
        other => Err(UpdateError::configuration(
            path,
            format!("{} target must be an array, found {}", directive, other.kind()),
        )),
    }
}

fn insert_items(
    current: &Value,
    items: &[Value],
    at_front: bool,
    path: &[String],
) -> Result<Value, UpdateError> {
    let directive = if at_front { "$unshift" } else { "$push" };
    let existing = array_items(current, directive, path)?;
    let combined = if at_front {
        items.iter().cloned().chain(existing).collect()
    } else {
        existing.into_iter().chain(items.iter().cloned()).collect()
    };
    Ok(Value::Array(Arc::new(combined)))
}

fn apply_splice(items: &mut Vec<Value>, splice: &Splice) {
    let len = items.len() as i64;
    let start = if splice.index < 0 {
        (len + splice.index).max(0)
    } else {
        splice.index.min(len)
    };
    let start = start as usize;
    let available = items.len() - start;
    let delete = splice.delete_count.unwrap_or(available).min(available);
    items.splice(start..start + delete, splice.items.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn untouched_branches_are_shared() {
        let original = v(json!({
            "a": {"x": [1, 2]},
            "b": {"y": {"z": 1}},
            "c": [1, 2, 3]
        }));
        let spec = Spec::at(["b", "y", "z"], Spec::set(2i64));

        let updated = update(&original, &spec).unwrap();

        assert!(updated.get("a").unwrap().ptr_eq(original.get("a").unwrap()));
        assert!(updated.get("c").unwrap().ptr_eq(original.get("c").unwrap()));
        assert!(!updated.get("b").unwrap().ptr_eq(original.get("b").unwrap()));
        assert_eq!(original.pointer("/b/y/z"), Some(&Value::from(1i64)));
        assert_eq!(updated.pointer("/b/y/z"), Some(&Value::from(2i64)));
    }

    #[test]
    fn set_is_idempotent() {
        let original = v(json!({"a": 1, "b": {"c": [1]}}));
        let spec = Spec::nested([
            ("a", Spec::set(5i64)),
            ("b", Spec::at(["c"], Spec::set(v(json!(["x"]))))),
        ]);

        let once = update(&original, &spec).unwrap();
        let twice = update(&once, &spec).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn splice_replaces_range() {
        let original = v(json!(["a", "b", "c", "d"]));
        let spec = Spec::Splice(vec![Splice::new(1, 2, vec![Value::from("x")])]);

        let updated = update(&original, &spec).unwrap();
        assert_eq!(updated, v(json!(["a", "x", "d"])));
        assert_eq!(original, v(json!(["a", "b", "c", "d"])));
    }

    #[test]
    fn splice_handles_negative_index_and_truncate() {
        let original = v(json!([1, 2, 3, 4]));
        let spec = Spec::Splice(vec![Splice::remove(-1, 1), Splice::truncate(1)]);
        assert_eq!(update(&original, &spec).unwrap(), v(json!([1])));

        let past_end = Spec::Splice(vec![Splice::new(10, 3, vec![Value::from(5i64)])]);
        assert_eq!(update(&original, &past_end).unwrap(), v(json!([1, 2, 3, 4, 5])));
    }

    #[test]
    fn filter_removes_word_in_any_case() {
        let original = v(json!({"ngrams": {"1": ["Flood", "rain", "FLOOD", "storm"]}}));
        let spec = Spec::at(["ngrams", "1"], Spec::Filter(Predicate::ne_ignore_case("flood")));

        let updated = update(&original, &spec).unwrap();
        assert_eq!(updated.pointer("/ngrams/1"), Some(&v(json!(["rain", "storm"]))));
    }

    #[test]
    fn merge_overrides_and_keeps_keys() {
        let original = v(json!({"title": "old", "description": "keep"}));
        let mut entries = Map::new();
        entries.insert("title".to_string(), Value::from("new"));
        entries.insert("ngrams".to_string(), v(json!({})));

        let updated = update(&original, &Spec::Merge(entries)).unwrap();
        assert_eq!(
            updated,
            v(json!({"title": "new", "description": "keep", "ngrams": {}}))
        );
    }

    #[test]
    fn auto_creates_missing_objects() {
        let params = v(json!({"method": "GET"}));
        let spec = Spec::nested([(
            "headers",
            Spec::auto(Spec::nested([("Authorization", Spec::set("Bearer t"))])),
        )]);

        let updated = update(&params, &spec).unwrap();
        assert_eq!(
            updated,
            v(json!({"method": "GET", "headers": {"Authorization": "Bearer t"}}))
        );
    }

    #[test]
    fn auto_keeps_existing_objects() {
        let params = v(json!({"headers": {"Accept": "application/json"}}));
        let spec = Spec::nested([(
            "headers",
            Spec::auto(Spec::nested([("Authorization", Spec::set("Bearer t"))])),
        )]);

        let updated = update(&params, &spec).unwrap();
        assert_eq!(
            updated.pointer("/headers"),
            Some(&v(json!({"Accept": "application/json", "Authorization": "Bearer t"})))
        );
    }

    #[test]
    fn auto_unshift_creates_missing_array() {
        let state = v(json!({"view": {}}));
        let spec = Spec::at(
            ["view", "categories"],
            Spec::AutoUnshift(vec![v(json!({"id": 1}))]),
        );
        let updated = update(&state, &spec).unwrap();
        assert_eq!(updated.pointer("/view/categories"), Some(&v(json!([{"id": 1}]))));

        let again = update(&updated, &Spec::at(
            ["view", "categories"],
            Spec::AutoUnshift(vec![v(json!({"id": 2}))]),
        ))
        .unwrap();
        assert_eq!(
            again.pointer("/view/categories"),
            Some(&v(json!([{"id": 2}, {"id": 1}])))
        );
    }

    #[test]
    fn push_and_unshift_need_existing_array() {
        let state = v(json!({"list": [2]}));
        let spec = Spec::at(["list"], Spec::Push(vec![Value::from(3i64)]));
        let updated = update(&state, &spec).unwrap();
        let spec = Spec::at(["list"], Spec::Unshift(vec![Value::from(1i64)]));
        let updated = update(&updated, &spec).unwrap();
        assert_eq!(updated.pointer("/list"), Some(&v(json!([1, 2, 3]))));

        let missing = Spec::at(["other"], Spec::Push(vec![Value::from(1i64)]));
        assert_eq!(
            update(&state, &missing).unwrap_err(),
            UpdateError::PathNotFound {
                path: "<root>".to_string(),
                segment: "other".to_string()
            }
        );
    }

    #[test]
    fn missing_path_names_segment() {
        let state = v(json!({"a": {"b": {}}}));
        let spec = Spec::at(["a", "b", "c", "d"], Spec::set(1i64));

        assert_eq!(
            update(&state, &spec).unwrap_err(),
            UpdateError::PathNotFound {
                path: "a.b".to_string(),
                segment: "c".to_string()
            }
        );
    }

    #[test]
    fn array_indices_descend() {
        let state = v(json!({"categories": [{"title": "a"}, {"title": "b"}]}));
        let spec = Spec::at(["categories", "1", "title"], Spec::set("c"));

        let updated = update(&state, &spec).unwrap();
        assert_eq!(updated.pointer("/categories/1/title"), Some(&Value::from("c")));
        assert!(updated
            .pointer("/categories/0")
            .unwrap()
            .ptr_eq(state.pointer("/categories/0").unwrap()));

        let out_of_range = Spec::at(["categories", "5", "title"], Spec::set("c"));
        assert!(matches!(
            update(&state, &out_of_range),
            Err(UpdateError::PathNotFound { .. })
        ));
    }

    #[test]
    fn array_indices_apply_in_numeric_order() {
        let state = v(json!((0..9).collect::<Vec<u32>>()));
        let spec = Spec::nested([("9", Spec::set("nine")), ("10", Spec::set("ten"))]);

        let updated = update(&state, &spec).unwrap();
        let items = updated.as_array().unwrap();
        assert_eq!(items.len(), 11);
        assert_eq!(items[9], Value::from("nine"));
        assert_eq!(items[10], Value::from("ten"));
    }

    #[test]
    fn wrong_kind_is_configuration_error() {
        let state = v(json!({"a": "text"}));
        let spec = Spec::at(["a"], Spec::Push(vec![Value::Null]));
        assert!(matches!(
            update(&state, &spec),
            Err(UpdateError::Configuration { ref path, .. }) if path == "a"
        ));
    }

    #[test]
    fn update_json_applies_dollar_notation() {
        let value = json!({"selected": [1, 2, 3]});
        let spec = json!({"selected": {"$splice": [[1, 2, 9]]}});
        assert_eq!(update_json(&value, &spec).unwrap(), json!({"selected": [1, 9]}));
    }
}
