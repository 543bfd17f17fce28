//! Lookup table from node type name to its registered definition.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    AgentflowError, Result,
    flow::nodes::{CallFlowNode, HttpRequestNode, LinkNode, NodeType, PostListNode, ReturnValueNode, TransformNode, TriggerNode},
};

/// Registry of node type definitions.
///
/// Populated once at engine build and never mutated afterwards; lookups
/// happen at graph-build time, so a run never touches an unknown type.
pub struct NodeTypeRegistry {
    types: HashMap<&'static str, Arc<dyn NodeType>>,
}

impl NodeTypeRegistry {
    /// An empty registry, for hosts that want full control of the type set.
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// A registry holding the built-in node types.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for node_type in [
            Arc::new(TriggerNode) as Arc<dyn NodeType>,
            Arc::new(PostListNode),
            Arc::new(LinkNode),
            Arc::new(CallFlowNode),
            Arc::new(HttpRequestNode),
            Arc::new(TransformNode),
            Arc::new(ReturnValueNode),
        ] {
            // built-in names are distinct; the error path is unreachable
            let _ = registry.register(node_type);
        }
        registry
    }

    /// Register a node type. Duplicate names are definition errors.
    pub fn register(
        &mut self,
        node_type: Arc<dyn NodeType>,
    ) -> Result<()> {
        let name = node_type.name();
        if self.types.contains_key(name) {
            return Err(AgentflowError::Node(format!("node type '{}' is already registered", name)));
        }
        self.types.insert(name, node_type);
        Ok(())
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<Arc<dyn NodeType>> {
        self.types.get(name).cloned()
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.types.keys().copied().collect();
        names.sort();
        names
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
