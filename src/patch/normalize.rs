//! List-of-one normalization.
//!
//! Several nested objects are declared by callers as a one-element list
//! wrapping the object. The catalog expects the bare object, so values are
//! unwrapped before they go into a patch and wrapped again when a stored
//! document is turned back into caller shape.

use serde_json::{Map, Value};

/// `[obj, ..]` becomes `obj`; `[]` and `[null, ..]` become `null`.
/// Anything that is not a list is returned unchanged.
pub fn unwrap_list_of_one(value: Value) -> Value {
    match value {
        Value::Array(items) => match items.into_iter().next() {
            Some(first @ Value::Object(_)) => first,
            _ => Value::Null,
        },
        other => other,
    }
}

/// `obj` becomes `[obj]` and `null` becomes `[]`. Lists are left as they are.
pub fn wrap_list_of_one(value: Value) -> Value {
    match value {
        Value::Null => Value::Array(Vec::new()),
        Value::Array(items) => Value::Array(items),
        other => Value::Array(vec![other]),
    }
}

/// Unwrap `map[field]` in place if present.
pub fn unwrap_field(map: &mut Map<String, Value>, field: &str) {
    if let Some(slot) = map.get_mut(field) {
        *slot = unwrap_list_of_one(slot.take());
    }
}

/// Wrap `map[field]` in place if present.
pub fn wrap_field(map: &mut Map<String, Value>, field: &str) {
    if let Some(slot) = map.get_mut(field) {
        *slot = wrap_list_of_one(slot.take());
    }
}

/// Unwrap `map[outer]`, then `map[outer][inner]` one level further down.
fn unwrap_nested(map: &mut Map<String, Value>, outer: &str, inner: &str) {
    unwrap_field(map, outer);
    if let Some(Value::Object(nested)) = map.get_mut(outer) {
        unwrap_field(nested, inner);
    }
}

/// Inverse of [`unwrap_nested`].
fn wrap_nested(map: &mut Map<String, Value>, outer: &str, inner: &str) {
    if let Some(Value::Object(nested)) = map.get_mut(outer) {
        wrap_field(nested, inner);
    }
    wrap_field(map, outer);
}

fn for_each_object(value: &mut Value, mut f: impl FnMut(&mut Map<String, Value>)) {
    if let Value::Array(items) = value {
        for item in items.iter_mut() {
            if let Value::Object(map) = item {
                f(map);
            }
        }
    }
}

/// `configuration[*].custom_config` and its `associations` are list-of-one.
pub fn configuration_for_patch(mut value: Value) -> Value {
    for_each_object(&mut value, |item| {
        unwrap_nested(item, "custom_config", "associations")
    });
    value
}

pub fn configuration_for_display(mut value: Value) -> Value {
    for_each_object(&mut value, |item| {
        wrap_nested(item, "custom_config", "associations")
    });
    value
}

/// `solution_info` is itself list-of-one; inside it `cost_estimate`
/// (with `summary`) and each `architecture_diagrams[*].diagram` (with
/// `url_proxy`) are too.
pub fn solution_info_for_patch(value: Value) -> Value {
    let mut value = unwrap_list_of_one(value);
    if let Value::Object(info) = &mut value {
        unwrap_nested(info, "cost_estimate", "summary");
        if let Some(diagrams) = info.get_mut("architecture_diagrams") {
            for_each_object(diagrams, |d| unwrap_nested(d, "diagram", "url_proxy"));
        }
    }
    value
}

pub fn solution_info_for_display(mut value: Value) -> Value {
    if let Value::Object(info) = &mut value {
        if let Some(diagrams) = info.get_mut("architecture_diagrams") {
            for_each_object(diagrams, |d| wrap_nested(d, "diagram", "url_proxy"));
        }
        wrap_nested(info, "cost_estimate", "summary");
    }
    wrap_list_of_one(value)
}
