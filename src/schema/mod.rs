//! JSON-Schema states and field-source-aware merging.
//!
//! Node schemas live in one of three explicit states: `Empty` (the node
//! takes or produces nothing), `Resolved` (a concrete JSON-Schema), or
//! `Unresolved` (not known yet, which is a legitimate, displayable state
//! distinct from "no output"). Dynamic schemas may mark individual fields with
//! `x-field-source: dynamic`; the merger fills those slots once the
//! propagator has resolved the schema they depend on.

mod propagator;

pub use propagator::{FlowSchemaSource, FlowSchemas, NoExternalFlows, NodeSchemas, SchemaPropagator};

use serde::Serialize;
use serde_json::{Map, Value, json};

/// Marker key distinguishing type-stable fields from fields whose shape
/// depends on runtime data or another flow's schema.
pub const FIELD_SOURCE_KEY: &str = "x-field-source";

/// Resolution state of a node's input or output schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "schema", rename_all = "snake_case")]
pub enum SchemaState {
    /// Not known (yet). Never conflated with "no output".
    Unresolved,
    /// The node takes no input / produces no output.
    Empty,
    /// A concrete JSON-Schema.
    Resolved(Value),
}

impl SchemaState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, SchemaState::Resolved(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            SchemaState::Resolved(v) => Some(v),
            _ => None,
        }
    }
}

/// Whether any property of `schema` is marked `x-field-source: dynamic`.
pub fn has_dynamic_fields(schema: &Value) -> bool {
    match schema {
        Value::Object(obj) => {
            if obj.get(FIELD_SOURCE_KEY).and_then(Value::as_str) == Some("dynamic") {
                return true;
            }
            obj.values().any(has_dynamic_fields)
        }
        Value::Array(arr) => arr.iter().any(has_dynamic_fields),
        _ => false,
    }
}

/// Fill every `x-field-source: dynamic` slot in `partial` with `resolved`,
/// dropping the marker. Static-marked and unmarked fields are kept as-is.
pub fn merge_dynamic_fields(
    partial: &Value,
    resolved: &Value,
) -> Value {
    match partial {
        Value::Object(obj) => {
            if obj.get(FIELD_SOURCE_KEY).and_then(Value::as_str) == Some("dynamic") {
                return resolved.clone();
            }
            Value::Object(obj.iter().map(|(k, v)| (k.clone(), merge_dynamic_fields(v, resolved))).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(|v| merge_dynamic_fields(v, resolved)).collect()),
        _ => partial.clone(),
    }
}

/// Infer a shallow JSON-Schema from a literal value tree.
///
/// Template-bearing strings type as strings, which is what they resolve to.
pub fn infer_value_schema(value: &Value) -> Value {
    match value {
        Value::Null => json!({}),
        Value::Bool(_) => json!({"type": "boolean"}),
        Value::Number(_) => json!({"type": "number"}),
        Value::String(_) => json!({"type": "string"}),
        Value::Array(_) => json!({"type": "array"}),
        Value::Object(obj) => {
            let properties: Map<String, Value> = obj.iter().map(|(k, v)| (k.clone(), infer_value_schema(v))).collect();
            json!({"type": "object", "properties": properties})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_state_distinguishes_empty_and_unresolved() {
        assert_ne!(SchemaState::Unresolved, SchemaState::Empty);
        assert!(!SchemaState::Unresolved.is_resolved());
        assert!(SchemaState::Resolved(json!({"type": "object"})).is_resolved());
    }

    #[test]
    fn test_has_dynamic_fields() {
        let partial = json!({
            "type": "object",
            "properties": {
                "result": {"x-field-source": "dynamic"},
                "target": {"type": "string", "x-field-source": "static"}
            }
        });
        assert!(has_dynamic_fields(&partial));
        assert!(!has_dynamic_fields(&json!({"type": "object"})));
    }

    #[test]
    fn test_merge_dynamic_fields_fills_slot() {
        let partial = json!({
            "type": "object",
            "properties": {
                "result": {"x-field-source": "dynamic"},
                "target": {"type": "string"}
            }
        });
        let resolved = json!({"type": "object", "properties": {"href": {"type": "string"}}});

        let merged = merge_dynamic_fields(&partial, &resolved);
        assert_eq!(merged["properties"]["result"], resolved);
        assert_eq!(merged["properties"]["target"], json!({"type": "string"}));
        assert!(!has_dynamic_fields(&merged));
    }

    #[test]
    fn test_infer_value_schema() {
        let schema = infer_value_schema(&json!({"name": "x", "count": 2, "flags": [true]}));
        assert_eq!(schema["properties"]["name"], json!({"type": "string"}));
        assert_eq!(schema["properties"]["count"], json!({"type": "number"}));
        assert_eq!(schema["properties"]["flags"], json!({"type": "array"}));
    }
}
