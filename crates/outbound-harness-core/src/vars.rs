// crates/outbound-harness-core/src/vars.rs
// ============================================================================
// Module: Variable Bags
// Description: Dot-path access, merging, and form-field flattening.
// Purpose: Shape input bags for invocation and for form round-trips.
// Dependencies: serde_json, tracing
// ============================================================================

//! ## Overview
//! Variable bags are JSON objects addressed by dot-paths such as
//! `lead.phone_1`. Form fields use the same paths, optionally with bracket
//! segments (`header[Content-Type]`); [`flatten`] and [`unflatten`] convert
//! between the two representations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use crate::catalog::TypeCatalog;
use crate::model::VariableDescriptor;
use crate::model::WILDCARD_TYPE;

// ============================================================================
// SECTION: Path Access
// ============================================================================

/// Splits a field name into path segments, accepting `a.b` and `a[b]` forms.
#[must_use]
pub fn path_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_bracket = false;
    for ch in path.chars() {
        match ch {
            '.' if !in_bracket => push_segment(&mut segments, &mut current),
            '[' if !in_bracket => {
                push_segment(&mut segments, &mut current);
                in_bracket = true;
            }
            ']' if in_bracket => {
                push_segment(&mut segments, &mut current);
                in_bracket = false;
            }
            other => current.push(other),
        }
    }
    push_segment(&mut segments, &mut current);
    segments
}

/// Moves a non-empty segment buffer into the segment list.
fn push_segment(segments: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        segments.push(std::mem::take(current));
    }
}

/// Sets `value` at `path`, creating intermediate objects as needed.
///
/// Non-object intermediates (including the root) are replaced by objects.
pub fn set_path(target: &mut Value, path: &str, value: Value) {
    let segments = path_segments(path);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut cursor = target;
    for segment in parents {
        cursor = object_entry(cursor, segment);
    }
    ensure_object(cursor).insert(last.clone(), value);
}

/// Returns the child object slot for `segment`, creating it when absent.
fn object_entry<'a>(target: &'a mut Value, segment: &str) -> &'a mut Value {
    let map = ensure_object(target);
    let slot = map.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot
}

/// Coerces `target` into an object and returns its map.
fn ensure_object(target: &mut Value) -> &mut Map<String, Value> {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    match target {
        Value::Object(map) => map,
        _ => unreachable!("value was coerced to an object above"),
    }
}

/// Returns the value at `path`, descending through objects and arrays.
#[must_use]
pub fn get_path<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    path_segments(path).iter().try_fold(source, |cursor, segment| match cursor {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

/// Deep-merges `source` into `target`.
///
/// Objects merge key by key; every other value overwrites.
pub fn merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

// ============================================================================
// SECTION: Form Flattening
// ============================================================================

/// Flattens a bag into dotted field names with text values.
///
/// Arrays flatten by index; nulls flatten to empty text.
#[must_use]
pub fn flatten(source: &Value) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    flatten_into(source, String::new(), &mut fields);
    fields
}

/// Recursive worker for [`flatten`].
fn flatten_into(value: &Value, prefix: String, fields: &mut BTreeMap<String, String>) {
    let join = |key: &str| if prefix.is_empty() { key.to_string() } else { format!("{prefix}.{key}") };
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, join(key), fields);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, join(&index.to_string()), fields);
            }
        }
        Value::String(text) => {
            fields.insert(prefix, text.clone());
        }
        Value::Null => {
            fields.insert(prefix, String::new());
        }
        Value::Number(_) | Value::Bool(_) => {
            fields.insert(prefix, value.to_string());
        }
    }
}

/// Rebuilds a bag from form fields.
///
/// Blank values are dropped first. Objects whose keys are exactly `0..n`
/// become arrays.
#[must_use]
pub fn unflatten<I, K, V>(fields: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut root = Value::Object(Map::new());
    for (name, value) in fields {
        let value = value.into();
        if value.trim().is_empty() {
            continue;
        }
        set_path(&mut root, name.as_ref(), Value::String(value));
    }
    arrays_from_indices(root)
}

/// Converts index-keyed objects into arrays, bottom-up.
fn arrays_from_indices(value: Value) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    let converted: Map<String, Value> =
        map.into_iter().map(|(key, child)| (key, arrays_from_indices(child))).collect();
    let is_sequence = !converted.is_empty()
        && (0 .. converted.len()).all(|index| converted.contains_key(&index.to_string()));
    if !is_sequence {
        return Value::Object(converted);
    }
    let mut indexed: Vec<(usize, Value)> = converted
        .into_iter()
        .filter_map(|(key, child)| key.parse::<usize>().ok().map(|index| (index, child)))
        .collect();
    indexed.sort_by_key(|(index, _)| *index);
    Value::Array(indexed.into_iter().map(|(_, child)| child).collect())
}

// ============================================================================
// SECTION: Typed Parsing
// ============================================================================

/// Applies the catalog parser to every declared variable present in `vars`.
///
/// Values that fail to parse stay raw. The returned bag always has a `lead` object.
#[must_use]
pub fn parse_vars(
    catalog: &dyn TypeCatalog,
    descriptors: &[VariableDescriptor],
    mut vars: Value,
) -> Value {
    if !vars.is_object() {
        vars = Value::Object(Map::new());
    }
    for descriptor in descriptors {
        if descriptor.var_type == WILDCARD_TYPE || !catalog.contains(&descriptor.var_type) {
            continue;
        }
        let Some(raw) = get_path(&vars, &descriptor.name).cloned() else {
            continue;
        };
        match catalog.parse(&descriptor.var_type, &raw) {
            Ok(parsed) => set_path(&mut vars, &descriptor.name, parsed),
            Err(err) => debug!(variable = %descriptor.name, error = %err, "leaving variable unparsed"),
        }
    }
    ensure_object(&mut vars).entry("lead").or_insert_with(|| Value::Object(Map::new()));
    vars
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use serde_json::json;

    use super::flatten;
    use super::get_path;
    use super::merge;
    use super::parse_vars;
    use super::path_segments;
    use super::set_path;
    use super::unflatten;
    use crate::catalog::StandardTypeCatalog;
    use crate::model::VariableDescriptor;

    #[test]
    fn segments_accept_dots_and_brackets() {
        assert_eq!(path_segments("header[Content-Type]"), vec!["header", "Content-Type"]);
        assert_eq!(path_segments("lead.phone_1"), vec!["lead", "phone_1"]);
        assert_eq!(path_segments("a[0].b"), vec!["a", "0", "b"]);
        assert_eq!(path_segments("env[a.b]"), vec!["env", "a.b"]);
    }

    #[test]
    fn set_path_creates_nested_objects() {
        let mut bag = json!({"lead": "oops"});
        set_path(&mut bag, "lead.phone_1", json!("5135552379"));
        assert_eq!(bag, json!({"lead": {"phone_1": "5135552379"}}));
        assert_eq!(get_path(&bag, "lead.phone_1"), Some(&json!("5135552379")));
        assert_eq!(get_path(&bag, "lead.missing"), None);
    }

    #[test]
    fn merge_is_deep() {
        let mut bag = json!({"lead": {"a": 1}, "x": 1});
        merge(&mut bag, &json!({"lead": {"b": 2}, "x": [1]}));
        assert_eq!(bag, json!({"lead": {"a": 1, "b": 2}, "x": [1]}));
    }

    #[test]
    fn unflatten_strips_blanks_and_builds_arrays() {
        let bag = unflatten([
            ("lead.phone_1", "5135552379"),
            ("lead.email", "  "),
            ("list.0", "a"),
            ("list.1", "b"),
            ("header[Accept]", "application/json"),
        ]);
        assert_eq!(
            bag,
            json!({
                "lead": {"phone_1": "5135552379"},
                "list": ["a", "b"],
                "header": {"Accept": "application/json"}
            })
        );
    }

    #[test]
    fn flatten_renders_scalar_leaves_as_text() {
        let fields = flatten(&json!({"lead": {"age": 3, "ok": true, "tags": ["x"]}}));
        assert_eq!(fields.get("lead.age").map(String::as_str), Some("3"));
        assert_eq!(fields.get("lead.ok").map(String::as_str), Some("true"));
        assert_eq!(fields.get("lead.tags.0").map(String::as_str), Some("x"));
    }

    #[test]
    fn parse_vars_types_declared_fields_and_ensures_lead() {
        let descriptors = vec![VariableDescriptor::required("lead.phone_1", "phone", "Phone")];
        let parsed = parse_vars(&StandardTypeCatalog, &descriptors, json!({"lead": {"phone_1": "513-555-2379"}}));
        assert_eq!(parsed["lead"]["phone_1"]["valid"], json!(true));
        let empty = parse_vars(&StandardTypeCatalog, &descriptors, json!({}));
        assert_eq!(empty, json!({"lead": {}}));
    }
}
