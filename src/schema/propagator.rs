//! Design-time schema propagation across a flow graph.
//!
//! Runs once per flow edit, not per execution: the editor and the runtime
//! must agree on what each node produces before it ever executes. The
//! propagator walks nodes in topological order, resolves each node's
//! effective input/output schema (dynamic getter first, static second,
//! `Unresolved` otherwise) and types every connection from its source
//! node's output or action schema.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    flow::{
        FlowGraph,
        connection::{ConnectionId, OutputHandle},
        node::NodeId,
        nodes::SchemaDependency,
    },
    schema::{SchemaState, has_dynamic_fields, merge_dynamic_fields},
};

/// Source of other flows' output schemas for cross-flow resolution.
///
/// A `call_flow` node's output mirrors the called flow's output; that
/// lookup crosses the graph boundary and is injected here. Returning `None`
/// leaves the dependent schema `Unresolved` (a displayable state, not an
/// error) until a later propagation pass can see the target flow.
pub trait FlowSchemaSource {
    fn flow_output_schema(
        &self,
        flow_id: &str,
    ) -> Option<Value>;
}

/// A source that knows no other flows; every cross-flow slot stays
/// unresolved.
pub struct NoExternalFlows;

impl FlowSchemaSource for NoExternalFlows {
    fn flow_output_schema(
        &self,
        _flow_id: &str,
    ) -> Option<Value> {
        None
    }
}

/// Resolved schemas of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSchemas {
    pub input: SchemaState,
    pub output: SchemaState,
    /// Payload schema per declared action edge.
    pub actions: HashMap<String, SchemaState>,
}

/// Schema annotations of a whole flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSchemas {
    pub nodes: HashMap<NodeId, NodeSchemas>,
    /// Schema of the value travelling along each connection.
    pub connections: HashMap<ConnectionId, SchemaState>,
    /// The flow's own output schema, derived from its return nodes; this is
    /// what `call_flow` nodes in other flows resolve against.
    pub output: SchemaState,
}

impl FlowSchemas {
    /// Whether any node output is still waiting on a cross-flow lookup.
    pub fn has_unresolved_outputs(&self) -> bool {
        self.nodes.values().any(|n| n.output == SchemaState::Unresolved)
    }
}

/// The propagation pass.
pub struct SchemaPropagator<'a> {
    source: &'a dyn FlowSchemaSource,
}

impl<'a> SchemaPropagator<'a> {
    pub fn new(source: &'a dyn FlowSchemaSource) -> Self {
        Self {
            source,
        }
    }

    pub fn propagate(
        &self,
        graph: &FlowGraph,
    ) -> FlowSchemas {
        let mut nodes: HashMap<NodeId, NodeSchemas> = HashMap::new();

        for node in graph.topo_order() {
            let node_type = &node.node_type;
            let parameters = &node.parameters;

            // dynamic getters win over static schemas
            let input = match node_type.dynamic_input_schema(parameters) {
                Some(schema) => SchemaState::Resolved(schema),
                None => node_type.input_schema(),
            };

            let output = match node_type.dynamic_output_schema(parameters) {
                Some(partial) if has_dynamic_fields(&partial) => match node_type.schema_dependency(parameters) {
                    Some(SchemaDependency::FlowOutput(flow_id)) => match self.source.flow_output_schema(&flow_id) {
                        Some(resolved) => SchemaState::Resolved(merge_dynamic_fields(&partial, &resolved)),
                        None => SchemaState::Unresolved,
                    },
                    // dynamic slots with no resolvable dependency stay
                    // visible in the partial schema
                    None => SchemaState::Resolved(partial),
                },
                Some(schema) => SchemaState::Resolved(schema),
                None => node_type.output_schema(),
            };

            let actions: HashMap<String, SchemaState> = node_type
                .outputs()
                .iter()
                .filter_map(|handle| handle.action_name())
                .map(|name| {
                    let state = node_type.action_schema(name).map(SchemaState::Resolved).unwrap_or(SchemaState::Unresolved);
                    (name.to_string(), state)
                })
                .collect();

            nodes.insert(
                node.id.clone(),
                NodeSchemas {
                    input,
                    output,
                    actions,
                },
            );
        }

        // a main connection carries the source's output; an action
        // connection carries the action payload
        let connections: HashMap<ConnectionId, SchemaState> = graph
            .connections()
            .iter()
            .map(|conn| {
                let state = match &conn.output {
                    OutputHandle::Main => nodes.get(&conn.source).map(|n| n.output.clone()).unwrap_or(SchemaState::Unresolved),
                    OutputHandle::Action(name) => nodes.get(&conn.source).and_then(|n| n.actions.get(name)).cloned().unwrap_or(SchemaState::Unresolved),
                };
                (conn.id.clone(), state)
            })
            .collect();

        let output = Self::flow_output(graph, &nodes);

        FlowSchemas {
            nodes,
            connections,
            output,
        }
    }

    fn flow_output(
        graph: &FlowGraph,
        nodes: &HashMap<NodeId, NodeSchemas>,
    ) -> SchemaState {
        let returns = graph.return_nodes();
        match returns.as_slice() {
            [] => SchemaState::Unresolved,
            [only] => nodes.get(&only.id).map(|n| n.output.clone()).unwrap_or(SchemaState::Unresolved),
            many => {
                let mut schemas = Vec::with_capacity(many.len());
                for node in many {
                    match nodes.get(&node.id).and_then(|n| n.output.as_value()) {
                        Some(schema) => schemas.push(schema.clone()),
                        None => return SchemaState::Unresolved,
                    }
                }
                SchemaState::Resolved(json!({"anyOf": schemas}))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        Result,
        common::Vars,
        flow::nodes::{ExecutionResult, NodeCategory, NodeType, NodeTypeRegistry},
        model::{ConnectionModel, FlowModel, NodeModel},
        runtime::ExecutionContext,
    };

    /// Test type carrying both a static and a dynamic output schema.
    struct BothSchemasNode;

    #[async_trait]
    impl NodeType for BothSchemasNode {
        fn name(&self) -> &'static str {
            "both_schemas"
        }

        fn display_name(&self) -> &'static str {
            "Both Schemas"
        }

        fn category(&self) -> NodeCategory {
            NodeCategory::Action
        }

        fn output_schema(&self) -> SchemaState {
            SchemaState::Resolved(json!({"type": "object", "title": "static"}))
        }

        fn dynamic_output_schema(
            &self,
            _parameters: &Vars,
        ) -> Option<serde_json::Value> {
            Some(json!({"type": "object", "title": "dynamic"}))
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
        ) -> Result<ExecutionResult> {
            Ok(ExecutionResult::success(Vars::new()))
        }
    }

    struct MapSource(HashMap<String, serde_json::Value>);

    impl FlowSchemaSource for MapSource {
        fn flow_output_schema(
            &self,
            flow_id: &str,
        ) -> Option<serde_json::Value> {
            self.0.get(flow_id).cloned()
        }
    }

    fn node(
        id: &str,
        slug: &str,
        uses: &str,
        parameters: serde_json::Value,
    ) -> NodeModel {
        NodeModel {
            id: id.to_string(),
            slug: slug.to_string(),
            uses: uses.to_string(),
            parameters,
            ..Default::default()
        }
    }

    fn conn(
        source: &str,
        output: &str,
        target: &str,
    ) -> ConnectionModel {
        ConnectionModel {
            id: format!("{}-{}", source, target),
            source: source.to_string(),
            target: target.to_string(),
            source_output: output.to_string(),
        }
    }

    #[test]
    fn test_dynamic_wins_over_static() {
        let mut registry = NodeTypeRegistry::builtin();
        registry.register(Arc::new(BothSchemasNode)).unwrap();

        let model = FlowModel {
            id: "f1".to_string(),
            name: "flow".to_string(),
            nodes: vec![node("n1", "start", "trigger", json!({})), node("n2", "work", "both_schemas", json!({}))],
            connections: vec![conn("n1", "main", "n2")],
            ..Default::default()
        };
        let graph = FlowGraph::build(&model, &registry).unwrap();
        let schemas = SchemaPropagator::new(&NoExternalFlows).propagate(&graph);

        assert_eq!(schemas.nodes["n2"].output.as_value().unwrap()["title"], "dynamic");
    }

    #[test]
    fn test_trigger_schema_from_parameters() {
        let registry = NodeTypeRegistry::builtin();
        let tool_schema = json!({"type": "object", "properties": {"query": {"type": "string"}}});
        let model = FlowModel {
            id: "f1".to_string(),
            name: "flow".to_string(),
            nodes: vec![
                node("n1", "start", "trigger", json!({"schema": tool_schema})),
                node("n2", "done", "return_value", json!({"value": {"answer": "{{start.query}}"}})),
            ],
            connections: vec![conn("n1", "main", "n2")],
            ..Default::default()
        };
        let graph = FlowGraph::build(&model, &registry).unwrap();
        let schemas = SchemaPropagator::new(&NoExternalFlows).propagate(&graph);

        assert_eq!(schemas.nodes["n1"].output.as_value(), Some(&tool_schema));
        assert_eq!(schemas.nodes["n1"].input, SchemaState::Empty);
        // the main connection carries the trigger's output schema
        assert_eq!(schemas.connections["n1-n2"].as_value(), Some(&tool_schema));
        // flow output comes from the single return node
        assert_eq!(schemas.output.as_value().unwrap()["properties"]["answer"], json!({"type": "string"}));
    }

    #[test]
    fn test_call_flow_unresolved_without_target_flow() {
        let registry = NodeTypeRegistry::builtin();
        let model = FlowModel {
            id: "f1".to_string(),
            name: "flow".to_string(),
            nodes: vec![
                node("n1", "start", "trigger", json!({})),
                node("n2", "call_sub", "call_flow", json!({"target_flow_id": "other_flow"})),
            ],
            connections: vec![conn("n1", "main", "n2")],
            ..Default::default()
        };
        let graph = FlowGraph::build(&model, &registry).unwrap();

        // the target flow is not loaded: unresolved, not an error
        let schemas = SchemaPropagator::new(&NoExternalFlows).propagate(&graph);
        assert_eq!(schemas.nodes["n2"].output, SchemaState::Unresolved);
        assert!(schemas.has_unresolved_outputs());
    }

    #[test]
    fn test_call_flow_resolves_against_target_flow() {
        let registry = NodeTypeRegistry::builtin();
        let model = FlowModel {
            id: "f1".to_string(),
            name: "flow".to_string(),
            nodes: vec![
                node("n1", "start", "trigger", json!({"schema": {"type": "object"}})),
                node("n2", "call_sub", "call_flow", json!({"target_flow_id": "other_flow"})),
            ],
            connections: vec![conn("n1", "main", "n2")],
            ..Default::default()
        };
        let graph = FlowGraph::build(&model, &registry).unwrap();

        let target = json!({"type": "object", "properties": {"temperature": {"type": "number"}}});
        let source = MapSource(HashMap::from([("other_flow".to_string(), target.clone())]));
        let schemas = SchemaPropagator::new(&source).propagate(&graph);

        let output = schemas.nodes["n2"].output.as_value().unwrap();
        assert_eq!(output["properties"]["result"], target);
        assert!(!schemas.has_unresolved_outputs());
    }

    #[test]
    fn test_call_flow_without_target_has_no_schema_assumption() {
        let registry = NodeTypeRegistry::builtin();
        let model = FlowModel {
            id: "f1".to_string(),
            name: "flow".to_string(),
            nodes: vec![node("n1", "start", "trigger", json!({})), node("n2", "call_sub", "call_flow", json!({}))],
            connections: vec![conn("n1", "main", "n2")],
            ..Default::default()
        };
        let graph = FlowGraph::build(&model, &registry).unwrap();
        let schemas = SchemaPropagator::new(&NoExternalFlows).propagate(&graph);

        assert_eq!(schemas.nodes["n2"].output, SchemaState::Unresolved);
    }

    #[test]
    fn test_action_connection_carries_action_schema() {
        let registry = NodeTypeRegistry::builtin();
        let model = FlowModel {
            id: "f1".to_string(),
            name: "flow".to_string(),
            nodes: vec![
                node("n1", "start", "trigger", json!({})),
                node("n2", "posts", "post_list", json!({})),
                node("n3", "open_link", "link", json!({"href": "{{posts.url}}"})),
            ],
            connections: vec![conn("n1", "main", "n2"), conn("n2", "action:on_read_more", "n3")],
            ..Default::default()
        };
        let graph = FlowGraph::build(&model, &registry).unwrap();
        let schemas = SchemaPropagator::new(&NoExternalFlows).propagate(&graph);

        let edge_schema = schemas.connections["n2-n3"].as_value().unwrap();
        assert_eq!(edge_schema["required"], json!(["id", "title", "excerpt", "author", "published_at"]));
        // the node's own input schema is the rendered list, independent of
        // its action payload
        assert_eq!(schemas.nodes["n2"].input.as_value().unwrap()["type"], "array");
    }
}
