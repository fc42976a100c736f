//! The six-layer static validator (`spec.md` §4.1).
//!
//! Runs after [`crate::normalize::normalize`] and before compilation.
//! Template structure is checked against **dummy placeholders** — each
//! declared input gets a scalar-typed stand-in value, and each node gets a
//! stand-in output object built from the registry's declared output fields
//! (or an empty object when the registry doesn't publish structure) — so
//! the check never needs real execution-time values.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;
use store::{PathSegment, ScanItem, TemplateSyntaxError};

use crate::error::{IrError, UnknownParamWarning};
use crate::model::{BatchConfig, ScalarType, Workflow};
use crate::registry::RegistryView;

/// Successful validation output: any non-fatal layer-6 warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub warnings: Vec<UnknownParamWarning>,
}

pub fn validate(workflow: &Workflow, registry: &dyn RegistryView) -> Result<ValidationOutcome, IrError> {
    tracing::debug!(node_count = workflow.nodes.len(), "running static validation");

    schema_checks(workflow)?;
    identifier_checks(workflow)?;
    node_type_checks(workflow, registry)?;
    graph_shape_checks(workflow)?;

    if let Some(start) = &workflow.start_node {
        if workflow.node_by_id(start).is_none() {
            return Err(IrError::UnknownStartNode(start.clone()));
        }
    }

    let all_node_ids: HashSet<String> = workflow.nodes.iter().map(|n| n.id.clone()).collect();
    let mut known_heads: HashMap<String, Value> = HashMap::new();
    for (name, decl) in &workflow.inputs {
        known_heads.insert(name.clone(), dummy_for_scalar(decl.scalar_type));
    }

    let mut node_types: HashMap<String, String> = HashMap::new();
    let mut warnings = Vec::new();

    for node in &workflow.nodes {
        for (param, value) in &node.params {
            check_value_templates(
                value,
                &node.id,
                param,
                &known_heads,
                &all_node_ids,
                registry,
                &node_types,
            )?;
        }

        if let Some(batch) = &node.batch {
            check_value_templates(
                &Value::String(batch.items.clone()),
                &node.id,
                "batch.items",
                &known_heads,
                &all_node_ids,
                registry,
                &node_types,
            )?;
        }

        if let Some(names) = registry.param_names(&node.node_type) {
            for key in node.params.keys() {
                if !names.contains(key) {
                    warnings.push(UnknownParamWarning {
                        node_id: node.id.clone(),
                        param: key.clone(),
                        suggestion: closest_match(key, &names),
                    });
                }
            }
        }

        let dummy_output = registry
            .output_fields(&node.node_type)
            .map(|fields| {
                let mut m = serde_json::Map::new();
                for f in fields {
                    m.insert(f, Value::Null);
                }
                Value::Object(m)
            })
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        known_heads.insert(node.id.clone(), dummy_output);
        node_types.insert(node.id.clone(), node.node_type.clone());
    }

    for (name, decl) in &workflow.outputs {
        check_value_templates(
            &Value::String(decl.source.clone()),
            "<workflow-outputs>",
            name,
            &known_heads,
            &all_node_ids,
            registry,
            &node_types,
        )
        .map_err(|e| IrError::InvalidOutputSource {
            name: name.clone(),
            source: Box::new(e),
        })?;
    }

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "validation passed with unknown-param warnings");
    }
    Ok(ValidationOutcome { warnings })
}

fn dummy_for_scalar(t: Option<ScalarType>) -> Value {
    match t {
        Some(ScalarType::String) => Value::String(String::new()),
        Some(ScalarType::Number) => Value::from(0),
        Some(ScalarType::Boolean) => Value::Bool(false),
        Some(ScalarType::Object) => Value::Object(serde_json::Map::new()),
        Some(ScalarType::Array) => Value::Array(Vec::new()),
        Some(ScalarType::Any) | None => Value::Null,
    }
}

// ---------------------------------------------------------------------
// Layer 1: schema
// ---------------------------------------------------------------------

fn schema_checks(workflow: &Workflow) -> Result<(), IrError> {
    for node in &workflow.nodes {
        let Some(batch) = &node.batch else { continue };

        if !is_whole_template_string(&batch.items) {
            return Err(IrError::Schema {
                message: format!(
                    "node '{}' batch.items '{}' must match ^\\$\\{{.+\\}}$",
                    node.id, batch.items
                ),
            });
        }
        if !(BatchConfig::MIN_MAX_CONCURRENT..=BatchConfig::MAX_MAX_CONCURRENT)
            .contains(&batch.max_concurrent)
        {
            return Err(IrError::Schema {
                message: format!(
                    "node '{}' batch.max_concurrent {} out of range 1..=100",
                    node.id, batch.max_concurrent
                ),
            });
        }
        if !(BatchConfig::MIN_MAX_RETRIES..=BatchConfig::MAX_MAX_RETRIES).contains(&batch.max_retries) {
            return Err(IrError::Schema {
                message: format!(
                    "node '{}' batch.max_retries {} out of range 1..=10",
                    node.id, batch.max_retries
                ),
            });
        }
        if batch.retry_wait < 0.0 {
            return Err(IrError::Schema {
                message: format!("node '{}' batch.retry_wait must be >= 0", node.id),
            });
        }
        if batch.as_name.is_empty() {
            return Err(IrError::Schema {
                message: format!("node '{}' batch.as must be a non-empty identifier", node.id),
            });
        }
    }
    Ok(())
}

fn is_whole_template_string(s: &str) -> bool {
    s.len() > 3 && s.starts_with("${") && s.ends_with('}')
}

// ---------------------------------------------------------------------
// Layer 2: identifier
// ---------------------------------------------------------------------

fn identifier_checks(workflow: &Workflow) -> Result<(), IrError> {
    let mut seen = HashSet::new();
    for node in &workflow.nodes {
        if !is_valid_identifier(&node.id) {
            return Err(IrError::InvalidIdentifier(node.id.clone()));
        }
        if !seen.insert(node.id.as_str()) {
            return Err(IrError::DuplicateNodeId(node.id.clone()));
        }
    }
    Ok(())
}

/// `^[a-z0-9_]+(-[a-z0-9_]+)*$`
fn is_valid_identifier(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    s.split('-')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'))
}

// ---------------------------------------------------------------------
// Layer 3: node types
// ---------------------------------------------------------------------

fn node_type_checks(workflow: &Workflow, registry: &dyn RegistryView) -> Result<(), IrError> {
    for node in &workflow.nodes {
        if !registry.has_type(&node.node_type) {
            return Err(IrError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Layer 4: graph shape
// ---------------------------------------------------------------------

fn graph_shape_checks(workflow: &Workflow) -> Result<(), IrError> {
    let ids: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in &workflow.edges {
        if !ids.contains(edge.from.as_str()) {
            return Err(IrError::UnknownNodeReference {
                node_id: edge.from.clone(),
                side: "from",
            });
        }
        if !ids.contains(edge.to.as_str()) {
            return Err(IrError::UnknownNodeReference {
                node_id: edge.to.clone(),
                side: "to",
            });
        }
    }

    // Declaration order is always execution order in MVP (no cycles, no
    // conditionals); edges exist for validation only. We still run a
    // topological check so an IR with inconsistent explicit edges is
    // rejected rather than silently ignored.
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for &id in &ids {
        adjacency.entry(id).or_default();
        in_degree.entry(id).or_insert(0);
    }
    for edge in &workflow.edges {
        adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut visited = 0usize;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        if let Some(neighbours) = adjacency.get(id) {
            for &n in neighbours {
                let d = in_degree.entry(n).or_insert(0);
                *d -= 1;
                if *d == 0 {
                    queue.push_back(n);
                }
            }
        }
    }
    if visited != ids.len() {
        return Err(IrError::CycleDetected);
    }

    Ok(())
}

// ---------------------------------------------------------------------
// Layer 5: templates
// ---------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn check_value_templates(
    value: &Value,
    node_id: &str,
    param: &str,
    known_heads: &HashMap<String, Value>,
    all_node_ids: &HashSet<String>,
    registry: &dyn RegistryView,
    node_types: &HashMap<String, String>,
) -> Result<(), IrError> {
    match value {
        Value::String(s) => {
            check_template_string(s, node_id, param, known_heads, all_node_ids, registry, node_types)
        }
        Value::Array(items) => {
            for item in items {
                check_value_templates(item, node_id, param, known_heads, all_node_ids, registry, node_types)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for v in map.values() {
                check_value_templates(v, node_id, param, known_heads, all_node_ids, registry, node_types)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[allow(clippy::too_many_arguments)]
fn check_template_string(
    s: &str,
    node_id: &str,
    param: &str,
    known_heads: &HashMap<String, Value>,
    all_node_ids: &HashSet<String>,
    registry: &dyn RegistryView,
    node_types: &HashMap<String, String>,
) -> Result<(), IrError> {
    let items = store::scan(s).map_err(|source| match source {
        TemplateSyntaxError::Empty | TemplateSyntaxError::Malformed(_) | TemplateSyntaxError::Unclosed(_) => {
            IrError::MalformedTemplate {
                node_id: node_id.to_string(),
                param: param.to_string(),
                source,
            }
        }
    })?;

    for item in items {
        let ScanItem::Ref(r) = item else { continue };

        if !known_heads.contains_key(&r.head) {
            if all_node_ids.contains(&r.head) {
                return Err(IrError::ForwardReference {
                    node_id: node_id.to_string(),
                    param: param.to_string(),
                    referenced: r.head.clone(),
                });
            }
            let mut available: Vec<String> = known_heads.keys().cloned().collect();
            available.sort();
            return Err(IrError::UnknownTemplateHead {
                node_id: node_id.to_string(),
                param: param.to_string(),
                reference: r.display_path(),
                available,
            });
        }

        if let Some(node_type) = node_types.get(&r.head) {
            if let Some(fields) = registry.output_fields(node_type) {
                if let Some(PathSegment::Field(f)) = r.path.first() {
                    if !fields.contains(f) {
                        return Err(IrError::UnknownTemplateField {
                            node_id: node_id.to_string(),
                            param: param.to_string(),
                            reference: r.display_path(),
                            head: r.head.clone(),
                            field: f.clone(),
                            available: fields,
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------
// Layer 6: unknown params (warnings only)
// ---------------------------------------------------------------------

fn closest_match(key: &str, candidates: &[String]) -> Option<String> {
    let threshold = (key.len() / 2).max(2);
    candidates
        .iter()
        .map(|c| (c, levenshtein(key, c)))
        .filter(|(_, d)| *d <= threshold)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c.clone())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        dp[0][j] = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1).min(dp[i][j - 1] + 1).min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[a.len()][b.len()]
}
