use crate::{common::Vars, flow::node::NodeId};

#[derive(Debug, Clone)]
pub enum FlowEvent {
    Start(FlowStartEvent),
    /// An interface node rendered and the run is waiting for a user action.
    Suspended(FlowSuspendedEvent),
    Succeeded(FlowSucceededEvent),
    Failed(FlowFailedEvent),
    Aborted(FlowAbortedEvent),
}

impl FlowEvent {
    pub fn str(&self) -> &str {
        match self {
            FlowEvent::Start(_) => "Running",
            FlowEvent::Suspended(_) => "Suspended",
            FlowEvent::Succeeded(_) => "Succeeded",
            FlowEvent::Failed(_) => "Failed",
            FlowEvent::Aborted(_) => "Aborted",
        }
    }
}

/// Emitted when a run starts.
#[derive(Debug, Clone)]
pub struct FlowStartEvent {
    /// All node ids in the flow, for batch state initialization.
    pub node_ids: Vec<NodeId>,
}

/// Emitted when an interface node suspends the run.
#[derive(Debug, Clone)]
pub struct FlowSuspendedEvent {
    /// The suspended node.
    pub nid: NodeId,
    /// Render descriptor for the host UI collaborator.
    pub render: Vars,
    /// Action names the node accepts on resume.
    pub actions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FlowSucceededEvent {
    /// Terminal output captured from the return node that was reached.
    pub output: Vars,
}

#[derive(Debug, Clone)]
pub struct FlowFailedEvent {
    /// The node whose failure ended the run (empty for structural faults).
    pub nid: NodeId,
    pub error: String,
    /// Best-effort output of the failing node, so the caller can still show
    /// what was attempted.
    pub output: Vars,
}

#[derive(Debug, Clone)]
pub struct FlowAbortedEvent {
    pub reason: String,
}
