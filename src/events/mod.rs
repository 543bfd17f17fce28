//! Event types emitted during flow execution.
//!
//! Events notify subscribers about run and node state changes: starts,
//! suspensions (interface nodes awaiting a user action), completions,
//! failures and logs.

mod flow;
mod node;

pub use flow::*;
pub use node::*;

use crate::{flow::node::NodeId, runtime::RunId};

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type for flow graph events.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// Run-level events (start, suspended, succeeded, failed, aborted).
    Flow(FlowEvent),
    /// Node-level events (running, succeeded, suspended, skipped, error).
    Node(NodeEvent),
}

/// Event message carrying run and node context.
#[derive(Debug, Clone)]
pub struct Message {
    /// Run that generated this event.
    pub rid: RunId,
    /// Node that generated this event (empty for flow-level events).
    pub nid: NodeId,
    /// The actual event data.
    pub event: GraphEvent,
}

/// Log entry emitted by a node during execution.
#[derive(Debug, Clone)]
pub struct Log {
    pub rid: RunId,
    pub nid: NodeId,
    pub content: String,
    /// timestamp in milliseconds
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl GraphEvent {
    /// A terminal flow event: the run will accept no further commands.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GraphEvent::Flow(FlowEvent::Succeeded(_)) | GraphEvent::Flow(FlowEvent::Failed(_)) | GraphEvent::Flow(FlowEvent::Aborted(_))
        )
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, GraphEvent::Flow(FlowEvent::Succeeded(_)))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GraphEvent::Flow(FlowEvent::Failed(_)))
    }
}
