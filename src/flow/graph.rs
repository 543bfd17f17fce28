//! Runtime flow representation as a directed graph.
//!
//! Wraps the flow model in a petgraph `DiGraph` for traversal and per-run
//! state tracking, and enforces the structural invariants of a flow
//! definition before any node can run: valid unique slugs, known node
//! types, declared output handles, acyclicity, and the placement rules for
//! trigger, return and link nodes.

use std::collections::{HashMap, HashSet};

use petgraph::{
    Direction,
    algo::toposort,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use crate::{
    AgentflowError, Result, ShareLock,
    flow::{
        connection::{Connection, ConnectionId, OutputHandle},
        node::{NodeId, NodeInstance, NodeState},
        nodes::{NodeCategory, NodeTypeRegistry},
        slug,
    },
    model::FlowModel,
};

/// Runtime flow graph.
///
/// Node and connection walk states are per-run; a fresh graph is built for
/// every run from the immutable model snapshot.
#[derive(Clone)]
pub struct FlowGraph {
    graph: ShareLock<DiGraph<NodeInstance, Connection>>,
}

impl std::fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowGraph").finish_non_exhaustive()
    }
}

impl FlowGraph {
    /// Build and validate a runtime graph from a flow model.
    pub fn build(
        model: &FlowModel,
        registry: &NodeTypeRegistry,
    ) -> Result<Self> {
        if model.nodes.is_empty() {
            return Err(AgentflowError::Flow("flow has no nodes".to_string()));
        }

        let mut graph: DiGraph<NodeInstance, Connection> = DiGraph::new();
        let mut indices: HashMap<NodeId, NodeIndex> = HashMap::new();
        let mut slugs: HashSet<String> = HashSet::new();

        for node in model.nodes.iter() {
            if !slug::is_valid_slug(&node.slug) {
                return Err(AgentflowError::Flow(format!("node '{}' has invalid slug '{}'", node.id, node.slug)));
            }
            if !slugs.insert(node.slug.clone()) {
                return Err(AgentflowError::Flow(format!("duplicate slug '{}'", node.slug)));
            }
            if indices.contains_key(&node.id) {
                return Err(AgentflowError::Flow(format!("duplicate node id '{}'", node.id)));
            }
            let instance = NodeInstance::new(node, registry)?;
            let idx = graph.add_node(instance);
            indices.insert(node.id.clone(), idx);
        }

        for conn in model.connections.iter() {
            let connection = Connection::new(conn)?;
            let source = *indices.get(&connection.source).ok_or(AgentflowError::Connection(format!("source node '{}' not found", connection.source)))?;
            let target = *indices.get(&connection.target).ok_or(AgentflowError::Connection(format!("target node '{}' not found", connection.target)))?;

            if !graph[source].node_type.outputs().contains(&connection.output) {
                return Err(AgentflowError::Connection(format!(
                    "node '{}' does not declare output '{}'",
                    connection.source, connection.output
                )));
            }
            if graph[target].node_type.inputs().is_empty() {
                return Err(AgentflowError::Connection(format!("node '{}' does not accept incoming connections", connection.target)));
            }
            graph.add_edge(source, target, connection);
        }

        Self::validate(&graph)?;

        Ok(Self {
            graph: ShareLock::new(graph.into()),
        })
    }

    fn validate(graph: &DiGraph<NodeInstance, Connection>) -> Result<()> {
        // a sub-flow call is a graph boundary; within one flow the graph
        // must be acyclic
        toposort(graph, None).map_err(|cycle| AgentflowError::Flow(format!("flow graph contains a cycle through node '{}'", graph[cycle.node_id()].id)))?;

        let triggers: Vec<NodeIndex> = graph.node_indices().filter(|idx| graph[*idx].category() == NodeCategory::Trigger).collect();
        if triggers.len() != 1 {
            return Err(AgentflowError::Flow(format!("flow must have exactly one trigger node, found {}", triggers.len())));
        }

        for idx in graph.node_indices() {
            let node = &graph[idx];
            let incoming = graph.neighbors_directed(idx, Direction::Incoming).count();
            let outgoing = graph.neighbors_directed(idx, Direction::Outgoing).count();

            match node.category() {
                NodeCategory::Trigger if incoming > 0 => {
                    return Err(AgentflowError::Flow(format!("trigger node '{}' must not have incoming connections", node.id)));
                }
                NodeCategory::Return if outgoing > 0 => {
                    return Err(AgentflowError::Flow(format!("return node '{}' must not have outgoing connections", node.id)));
                }
                _ => {}
            }

            // a link represents "open this URL when the user acts on the
            // rendered component", so it is only reachable from interface
            // nodes
            if node.uses == "link" {
                for edge in graph.edges_directed(idx, Direction::Incoming) {
                    let source = &graph[edge.source()];
                    if source.category() != NodeCategory::Interface {
                        return Err(AgentflowError::Flow(format!(
                            "link node '{}' may only be connected from an interface node, got '{}'",
                            node.id, source.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Human-readable dump of nodes, connections and walk states.
    pub fn dump(&self) -> String {
        let graph = self.graph.read().unwrap();
        let mut lines = Vec::new();

        lines.push(format!("nodes: {}, connections: {}", graph.node_count(), graph.edge_count()));
        for idx in graph.node_indices() {
            let node = &graph[idx];
            lines.push(format!("[{}] {} (type: {}, state: {})", node.id, node.slug, node.uses, node.state.as_ref()));
        }
        for idx in graph.edge_indices() {
            let edge = &graph[idx];
            lines.push(format!("{} --[{}]--> {} (state: {})", edge.source, edge.output, edge.target, edge.state.as_ref()));
        }
        lines.join("\n")
    }

    pub fn get_node(
        &self,
        id: &NodeId,
    ) -> Option<NodeInstance> {
        let graph = self.graph.read().unwrap();
        graph.node_indices().find(|idx| graph[*idx].id.eq(id)).map(|idx| graph[idx].clone())
    }

    pub fn get_node_state(
        &self,
        id: &NodeId,
    ) -> Option<NodeState> {
        self.get_node(id).map(|n| n.state)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        let graph = self.graph.read().unwrap();
        graph.node_indices().map(|idx| graph[idx].id.clone()).collect()
    }

    pub fn slugs(&self) -> HashSet<String> {
        let graph = self.graph.read().unwrap();
        graph.node_indices().map(|idx| graph[idx].slug.clone()).collect()
    }

    /// The flow's single trigger node.
    pub fn trigger_node(&self) -> Option<NodeInstance> {
        let graph = self.graph.read().unwrap();
        graph.node_indices().find(|idx| graph[*idx].category() == NodeCategory::Trigger).map(|idx| graph[idx].clone())
    }

    /// All return-category nodes.
    pub fn return_nodes(&self) -> Vec<NodeInstance> {
        let graph = self.graph.read().unwrap();
        graph.node_indices().filter(|idx| graph[*idx].category() == NodeCategory::Return).map(|idx| graph[idx].clone()).collect()
    }

    /// All nodes in topological order (used by the schema propagator).
    pub fn topo_order(&self) -> Vec<NodeInstance> {
        let graph = self.graph.read().unwrap();
        // acyclicity was checked at build time
        toposort(&*graph, None).unwrap_or_default().into_iter().map(|idx| graph[idx].clone()).collect()
    }

    pub fn connections(&self) -> Vec<Connection> {
        let graph = self.graph.read().unwrap();
        graph.edge_indices().map(|idx| graph[idx].clone()).collect()
    }

    pub fn outgoing_connections(
        &self,
        id: &NodeId,
    ) -> Vec<Connection> {
        let graph = self.graph.read().unwrap();
        graph
            .node_indices()
            .find(|idx| graph[*idx].id.eq(id))
            .map(|idx| graph.edges_directed(idx, Direction::Outgoing).map(|edge| edge.weight().clone()).collect())
            .unwrap_or_default()
    }

    pub fn mark_node(
        &self,
        id: &NodeId,
        state: NodeState,
    ) {
        let mut graph = self.graph.write().unwrap();
        if let Some(idx) = graph.node_indices().find(|idx| graph[*idx].id.eq(id)) {
            graph[idx].state = state;
        }
    }

    /// Downstream nodes of `id` reachable over connections matching
    /// `select` whose upstream dependencies have all settled.
    pub fn next_ready_nodes(
        &self,
        id: &NodeId,
        select: &OutputHandle,
    ) -> Vec<NodeId> {
        let graph = self.graph.read().unwrap();
        graph
            .node_indices()
            .find(|idx| graph[*idx].id.eq(id))
            .map(|src_idx| {
                graph
                    .edges_directed(src_idx, Direction::Outgoing)
                    .filter(|edge| edge.weight().output == *select)
                    .map(|edge| edge.target())
                    .filter(|dst_idx| {
                        graph[*dst_idx].state == NodeState::Pending
                            && graph.neighbors_directed(*dst_idx, Direction::Incoming).all(|pred| graph[pred].state.is_settled())
                    })
                    .map(|dst_idx| graph[dst_idx].id.clone())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    }

    /// Whether every node has settled (executed, failed or skipped).
    pub fn is_all_settled(&self) -> bool {
        let graph = self.graph.read().unwrap();
        graph.node_indices().all(|idx| graph[idx].state.is_settled())
    }

    /// Skip a connection and, transitively, every downstream node that has
    /// no other live path into it. Returns the skipped nodes.
    pub fn skip_branch(
        &self,
        connection_id: &ConnectionId,
    ) -> Vec<NodeId> {
        let mut skipped = Vec::new();
        let mut to_process = vec![connection_id.clone()];
        let mut graph = self.graph.write().unwrap();

        while let Some(current) = to_process.pop() {
            let Some(edge_idx) = graph.edge_indices().find(|idx| graph[*idx].id.eq(&current)) else {
                continue;
            };
            if graph[edge_idx].state == NodeState::Skipped {
                continue;
            }
            graph[edge_idx].state = NodeState::Skipped;

            let (_, target_idx) = graph.edge_endpoints(edge_idx).unwrap();
            let all_incoming_skipped = graph.edges_directed(target_idx, Direction::Incoming).all(|e| e.weight().state == NodeState::Skipped);

            if all_incoming_skipped && graph[target_idx].state == NodeState::Pending {
                graph[target_idx].state = NodeState::Skipped;
                skipped.push(graph[target_idx].id.clone());

                let outgoing: Vec<ConnectionId> = graph.edges_directed(target_idx, Direction::Outgoing).map(|e| e.weight().id.clone()).collect();
                to_process.extend(outgoing);
            }
        }
        skipped
    }

    /// Skip every outgoing branch of `id` except those leaving from
    /// `selected`. Returns the skipped nodes.
    pub fn skip_unselected_branches(
        &self,
        id: &NodeId,
        selected: &OutputHandle,
    ) -> Vec<NodeId> {
        let mut all_skipped = Vec::new();
        for connection in self.outgoing_connections(id) {
            if connection.output == *selected {
                continue;
            }
            all_skipped.extend(self.skip_branch(&connection.id));
        }
        all_skipped
    }

    /// Skip every outgoing branch of `id` (used when a failed node's
    /// dependents are skipped rather than halting the run).
    pub fn skip_outgoing(
        &self,
        id: &NodeId,
    ) -> Vec<NodeId> {
        let mut all_skipped = Vec::new();
        for connection in self.outgoing_connections(id) {
            all_skipped.extend(self.skip_branch(&connection.id));
        }
        all_skipped
    }
}
