//! Idempotent normalisation of a raw IR mapping to canonical form.
//!
//! Runs before validation and before typed deserialisation into
//! [`crate::model::Workflow`]. Purely syntactic — it never consults a
//! registry and never fails; malformed shapes are caught by the validator.

use crate::model::CURRENT_IR_VERSION;
use serde_json::{Map, Value};

/// Mutate `ir` in place into canonical form. Calling this twice on the same
/// value is a no-op the second time (see `idempotent` test below).
pub fn normalize(ir: &mut Value) {
    let Some(root) = ir.as_object_mut() else {
        return;
    };

    inject_ir_version(root);
    inject_edges(root);
    rename_legacy_node_fields(root);
}

fn inject_ir_version(root: &mut Map<String, Value>) {
    root.entry("ir_version")
        .or_insert_with(|| Value::String(CURRENT_IR_VERSION.to_string()));
}

fn inject_edges(root: &mut Map<String, Value>) {
    root.entry("edges").or_insert_with(|| Value::Array(vec![]));
}

/// Rename the legacy per-node field `parameters` to `params`.
fn rename_legacy_node_fields(root: &mut Map<String, Value>) {
    let Some(Value::Array(nodes)) = root.get_mut("nodes") else {
        return;
    };

    for node in nodes.iter_mut() {
        let Some(node_obj) = node.as_object_mut() else {
            continue;
        };
        if !node_obj.contains_key("params") {
            if let Some(legacy) = node_obj.remove("parameters") {
                if let Some(id) = node_obj.get("id").and_then(Value::as_str) {
                    tracing::debug!(node_id = %id, "renamed legacy 'parameters' field to 'params'");
                }
                node_obj.insert("params".to_string(), legacy);
            }
        } else {
            // `params` already present; drop any stray legacy alias so it
            // doesn't surface as an "unknown field" downstream.
            node_obj.remove("parameters");
        }
    }
}
