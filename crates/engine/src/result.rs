//! `result_error` detection (`spec.md` §7): a node's result mapping is a
//! failure if its `error` key is present and truthy, even though `exec`
//! itself raised no exception. Shared by the ordinary (non-batch) wrapper
//! chain and the batch engine's per-item check.

use serde_json::Value;

/// `None` when `namespace` isn't a mapping, or its `error` key is absent,
/// `null`, or `false`. Otherwise `Some` of a human-readable message.
pub(crate) fn result_error_message(namespace: &Value) -> Option<String> {
    let Value::Object(map) = namespace else { return None };
    match map.get("error") {
        Some(Value::Bool(false)) | Some(Value::Null) | None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_or_falsy_error_key_is_not_an_error() {
        assert_eq!(result_error_message(&json!({"value": 1})), None);
        assert_eq!(result_error_message(&json!({"error": false})), None);
        assert_eq!(result_error_message(&json!({"error": null})), None);
    }

    #[test]
    fn truthy_error_key_is_an_error() {
        assert_eq!(result_error_message(&json!({"error": "boom"})), Some("boom".to_string()));
        assert_eq!(result_error_message(&json!({"error": true})), Some("true".to_string()));
    }

    #[test]
    fn non_mapping_namespace_is_not_an_error() {
        assert_eq!(result_error_message(&json!([1, 2])), None);
        assert_eq!(result_error_message(&Value::Null), None);
    }
}
