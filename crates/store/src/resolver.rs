//! Template resolution: turn a value that may contain `${...}` expressions
//! into a fully substituted value, given a read-only view of the store.
//!
//! Whole-value substitution preserves native types (arrays, mappings,
//! numbers); substitution embedded in a larger string always stringifies.

use crate::template::{self, PathSegment, ScanItem, TemplateRef};
use serde_json::Value;
use thiserror::Error;

/// Strict fails on unresolved references; lenient substitutes `""`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    #[default]
    Strict,
    Lenient,
}

/// A read-only view the resolver can fetch head identifiers from.
///
/// Implemented by [`crate::SharedStore`]; kept as a trait so the `ir`
/// crate's static validator can supply a placeholder-backed stand-in
/// without depending on the runtime store's full API.
pub trait Lookup {
    /// The value bound to a node id or input name, if any.
    fn get_head(&self, head: &str) -> Option<Value>;
    /// All head identifiers currently available (for error messages).
    fn known_heads(&self) -> Vec<String>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Syntax(#[from] template::TemplateSyntaxError),

    #[error(
        "unresolved reference '${{{reference}}}': available identifiers at '{head}': {available:?}"
    )]
    Unresolved {
        reference: String,
        head: String,
        available: Vec<String>,
    },
}

/// Safety cap for the JSON-array coercion applied to `batch.items` targets.
pub const BATCH_ITEMS_SAFETY_CAP_BYTES: usize = 10 * 1024 * 1024;

/// Recursively resolve every template found in `value`. Mappings and arrays
/// are walked; binary/base64 strings without templates pass through
/// untouched because [`template::scan`] returns them as a single literal.
pub fn resolve_value(
    value: &Value,
    lookup: &dyn Lookup,
    mode: ResolutionMode,
) -> Result<Value, ResolveError> {
    match value {
        Value::String(s) => resolve_string(s, lookup, mode),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(item, lookup, mode)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, lookup, mode)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(s: &str, lookup: &dyn Lookup, mode: ResolutionMode) -> Result<Value, ResolveError> {
    let items = template::scan(s)?;

    if let [ScanItem::Ref(r)] = items.as_slice() {
        return resolve_ref(r, lookup, mode);
    }

    let mut out = String::new();
    for item in items {
        match item {
            ScanItem::Literal(l) => out.push_str(&l),
            ScanItem::Ref(r) => out.push_str(&stringify(&resolve_ref(&r, lookup, mode)?)),
        }
    }
    Ok(Value::String(out))
}

fn resolve_ref(tref: &TemplateRef, lookup: &dyn Lookup, mode: ResolutionMode) -> Result<Value, ResolveError> {
    let Some(head_val) = lookup.get_head(&tref.head) else {
        return match mode {
            ResolutionMode::Lenient => {
                tracing::debug!(reference = %tref.display_path(), "lenient mode: unknown head resolved to empty string");
                Ok(Value::String(String::new()))
            }
            ResolutionMode::Strict => Err(ResolveError::Unresolved {
                reference: tref.display_path(),
                head: tref.head.clone(),
                available: lookup.known_heads(),
            }),
        };
    };

    let mut current = head_val;
    for seg in &tref.path {
        match step(&current, seg) {
            Some(next) => current = next,
            None => {
                return match mode {
                    ResolutionMode::Lenient => {
                        tracing::debug!(reference = %tref.display_path(), "lenient mode: unresolved path segment resolved to empty string");
                        Ok(Value::String(String::new()))
                    }
                    ResolutionMode::Strict => Err(ResolveError::Unresolved {
                        reference: tref.display_path(),
                        head: tref.head.clone(),
                        available: available_keys(&current),
                    }),
                };
            }
        }
    }
    Ok(current)
}

fn step(value: &Value, seg: &PathSegment) -> Option<Value> {
    match (seg, value) {
        (PathSegment::Field(name), Value::Object(map)) => map.get(name).cloned(),
        (PathSegment::Index(i), Value::Array(arr)) => arr.get(*i).cloned(),
        _ => None,
    }
}

fn available_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(arr) => (0..arr.len()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// If `value` is a string that looks like a JSON array (starts with `[`
/// after trimming, under the safety cap), parse and return the list.
/// On parse failure or size overrun, the original value is returned
/// untouched so the caller can report a `batch_items` error.
pub fn coerce_batch_items(value: Value) -> Value {
    if let Value::String(s) = &value {
        let trimmed = s.trim_start();
        if trimmed.starts_with('[') {
            if s.len() >= BATCH_ITEMS_SAFETY_CAP_BYTES {
                tracing::warn!(bytes = s.len(), cap = BATCH_ITEMS_SAFETY_CAP_BYTES, "batch.items string exceeds JSON-coercion safety cap, left unparsed");
                return value;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(parsed) if parsed.is_array() => return parsed,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "batch.items string looked like JSON but failed to parse, left unparsed");
                }
            }
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct MapLookup(HashMap<String, Value>);
    impl Lookup for MapLookup {
        fn get_head(&self, head: &str) -> Option<Value> {
            self.0.get(head).cloned()
        }
        fn known_heads(&self) -> Vec<String> {
            self.0.keys().cloned().collect()
        }
    }

    fn lookup(pairs: &[(&str, Value)]) -> MapLookup {
        MapLookup(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn whole_value_preserves_native_type() {
        let l = lookup(&[("A", json!({"value": 42}))]);
        let out = resolve_value(&json!("${A.value}"), &l, ResolutionMode::Strict).unwrap();
        assert_eq!(out, json!(42));
    }

    #[test]
    fn embedded_value_is_stringified() {
        let l = lookup(&[("A", json!({"value": 42}))]);
        let out = resolve_value(&json!("x=${A.value}!"), &l, ResolutionMode::Strict).unwrap();
        assert_eq!(out, json!("x=42!"));
    }

    #[test]
    fn null_bool_array_stringify_canonically() {
        let l = lookup(&[
            ("n", Value::Null),
            ("b", json!(true)),
            ("arr", json!([1, 2])),
        ]);
        assert_eq!(
            resolve_value(&json!("<${n}>"), &l, ResolutionMode::Strict).unwrap(),
            json!("<>")
        );
        assert_eq!(
            resolve_value(&json!("<${b}>"), &l, ResolutionMode::Strict).unwrap(),
            json!("<true>")
        );
        assert_eq!(
            resolve_value(&json!("<${arr}>"), &l, ResolutionMode::Strict).unwrap(),
            json!("<[1,2]>")
        );
    }

    #[test]
    fn strict_mode_errors_on_unresolved() {
        let l = lookup(&[]);
        let err = resolve_value(&json!("${missing.field}"), &l, ResolutionMode::Strict).unwrap_err();
        assert!(matches!(err, ResolveError::Unresolved { .. }));
    }

    #[test]
    fn lenient_mode_substitutes_empty_string() {
        let l = lookup(&[]);
        let out = resolve_value(&json!("${missing}"), &l, ResolutionMode::Lenient).unwrap();
        assert_eq!(out, json!(""));
    }

    #[test]
    fn recurses_into_nested_mappings_and_arrays() {
        let l = lookup(&[("A", json!({"x": 1}))]);
        let input = json!({"outer": ["${A.x}", {"inner": "${A.x}"}]});
        let out = resolve_value(&input, &l, ResolutionMode::Strict).unwrap();
        assert_eq!(out, json!({"outer": [1, {"inner": 1}]}));
    }

    #[test]
    fn binary_strings_pass_through_untouched() {
        let l = lookup(&[]);
        let b64 = "aGVsbG8gd29ybGQ=";
        let out = resolve_value(&json!(b64), &l, ResolutionMode::Strict).unwrap();
        assert_eq!(out, json!(b64));
    }

    #[test]
    fn coerces_json_array_string() {
        let coerced = coerce_batch_items(json!("[\"a\",\"b\",\"c\"]"));
        assert_eq!(coerced, json!(["a", "b", "c"]));
    }

    #[test]
    fn coercion_tolerates_trailing_newline() {
        let coerced = coerce_batch_items(json!("[\"a\",\"b\"]\n"));
        assert_eq!(coerced, json!(["a", "b"]));
    }

    #[test]
    fn coercion_falls_back_to_original_on_parse_failure() {
        let original = json!("[not valid json");
        assert_eq!(coerce_batch_items(original.clone()), original);
    }
}
