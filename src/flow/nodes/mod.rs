//! Node type definitions: the contract every node type implements, plus the
//! built-in set.
//!
//! A node type is a stateless definition registered once at engine build.
//! Any I/O happens inside `execute`, invoked by the dispatcher, never by the
//! registry. `execute` failures are values, not raised errors: the
//! dispatcher keeps its bookkeeping (timing, events, retries) regardless of
//! node outcome.

pub mod call_flow;
pub mod http_request;
pub mod link;
pub mod post_list;
mod registry;
pub mod return_value;
pub mod transform;
pub mod trigger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Result,
    common::Vars,
    flow::{connection::OutputHandle, node::ExecutionStatus},
    runtime::ExecutionContext,
    schema::SchemaState,
};

pub use call_flow::CallFlowNode;
pub use http_request::HttpRequestNode;
pub use link::LinkNode;
pub use post_list::PostListNode;
pub use registry::NodeTypeRegistry;
pub use return_value::ReturnValueNode;
pub use transform::TransformNode;
pub use trigger::TriggerNode;

/// Behavioral category of a node type.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeCategory {
    /// Flow entry; defines the tool's public parameter surface.
    Trigger,
    /// Renders UI, then branches on the reported user action (two-phase).
    Interface,
    /// Performs work, e.g. an outbound call.
    Action,
    /// Terminal; its output is the flow's output.
    Return,
    /// Pure data reshaping, no side effects.
    Transform,
}

/// A cross-reference the schema propagator must satisfy to resolve a
/// dynamic schema; information not computable from the node in isolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDependency {
    /// The output schema of another flow (the `call_flow` case).
    FlowOutput(String),
}

/// The contract every node type implements.
///
/// Static `input_schema`/`output_schema` describe the type-stable surface;
/// the `dynamic_*` getters compute a schema from configured parameters and
/// take precedence when they return one. `output_schema` must stay
/// structurally consistent with what `execute` puts in its output.
#[async_trait]
pub trait NodeType: Send + Sync {
    /// Registered type name, referenced by `NodeModel::uses`.
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn category(&self) -> NodeCategory;

    /// Incoming edge labels. Triggers accept none.
    fn inputs(&self) -> Vec<OutputHandle> {
        vec![OutputHandle::Main]
    }

    /// Outgoing edge labels. Return nodes declare none; interface nodes
    /// declare one `action:<name>` per user-triggerable action.
    fn outputs(&self) -> Vec<OutputHandle> {
        vec![OutputHandle::Main]
    }

    fn default_parameters(&self) -> Vars {
        Vars::new()
    }

    /// Static input schema.
    fn input_schema(&self) -> SchemaState {
        SchemaState::Unresolved
    }

    /// Static output schema.
    fn output_schema(&self) -> SchemaState {
        SchemaState::Unresolved
    }

    /// Input schema computed from configured parameters. Wins over the
    /// static schema when it returns one.
    fn dynamic_input_schema(
        &self,
        _parameters: &Vars,
    ) -> Option<Value> {
        None
    }

    /// Output schema computed from configured parameters. Wins over the
    /// static schema when it returns one. May contain `x-field-source:
    /// dynamic` slots for the propagator to fill.
    fn dynamic_output_schema(
        &self,
        _parameters: &Vars,
    ) -> Option<Value> {
        None
    }

    /// The cross-flow lookup needed to fill this type's dynamic slots.
    fn schema_dependency(
        &self,
        _parameters: &Vars,
    ) -> Option<SchemaDependency> {
        None
    }

    /// Payload schema of a named action edge; this types the downstream
    /// edge, not the node's own render output.
    fn action_schema(
        &self,
        _action: &str,
    ) -> Option<Value> {
        None
    }

    /// Execute the node. Parameters arrive template-resolved in `ctx`.
    ///
    /// Configuration and validation failures must be returned as a failed
    /// [`ExecutionResult`], never as `Err`; an `Err` escaping here is
    /// treated as an infrastructure fault by the dispatcher.
    async fn execute(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult>;
}

/// Result of a single node execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Node output; on failure this may carry a best-effort value alongside
    /// the error so the caller can show what was attempted.
    pub output: Vars,
    pub error: Option<String>,
    /// Named action edge selected by this execution, when branching.
    pub action: Option<String>,
}

impl ExecutionResult {
    pub fn success(output: Vars) -> Self {
        Self {
            status: ExecutionStatus::Succeeded,
            output,
            error: None,
            action: None,
        }
    }

    /// A successful execution that selects a named action branch.
    pub fn branch(
        output: Vars,
        action: impl Into<String>,
    ) -> Self {
        Self {
            status: ExecutionStatus::Succeeded,
            output,
            error: None,
            action: Some(action.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            output: Vars::new(),
            error: Some(error.into()),
            action: None,
        }
    }

    /// A failure that still carries a best-effort output.
    pub fn failed_with_output(
        error: impl Into<String>,
        output: Vars,
    ) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            output,
            error: Some(error.into()),
            action: None,
        }
    }

    /// An interface node's render descriptor; suspends the run until the
    /// node's action callback arrives.
    pub fn render(descriptor: Vars) -> Self {
        Self {
            status: ExecutionStatus::Suspended,
            output: descriptor,
            error: None,
            action: None,
        }
    }

    pub fn stopped() -> Self {
        Self {
            status: ExecutionStatus::Stopped,
            output: Vars::new(),
            error: None,
            action: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }
}
