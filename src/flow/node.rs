//! Runtime node instances and execution state.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    AgentflowError, Result,
    appearance::apply_appearance,
    common::Vars,
    flow::nodes::{NodeCategory, NodeType, NodeTypeRegistry},
    model::NodeModel,
};

/// node id
pub type NodeId = String;

/// Walk state of a node (or connection) during a run.
///
/// `Pending` nodes become ready once every upstream node has settled
/// (executed, failed or skipped); `Suspended` marks an interface node that
/// rendered and is waiting for its action callback.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeState {
    #[default]
    Pending,
    Running,
    Executed,
    Failed,
    Suspended,
    Skipped,
}

impl NodeState {
    /// A settled node no longer blocks its dependents.
    pub fn is_settled(&self) -> bool {
        matches!(self, NodeState::Executed | NodeState::Failed | NodeState::Skipped)
    }
}

/// Status reported by a single node execution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Suspended,
    Stopped,
}

/// Per-node retry policy.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RetryConfig {
    /// retry attempts after the first failure
    pub times: u64,
    /// interval between attempts in milliseconds
    pub interval: u64,
}

/// One node of a flow, bound to its registered type.
#[derive(Clone)]
pub struct NodeInstance {
    /// graph-local id
    pub id: NodeId,
    /// template-resolution key, unique within the flow
    pub slug: String,
    /// display name
    pub name: String,
    /// node type name
    pub uses: String,
    /// configured parameters, defaults merged in; may contain templates
    pub parameters: Vars,
    /// validated, defaulted appearance config
    pub appearance: Vars,
    /// retry policy
    pub retry: Option<RetryConfig>,
    /// execution timeout
    pub timeout: Option<Duration>,
    /// walk state during a run
    pub state: NodeState,
    /// the registered type definition
    pub node_type: Arc<dyn NodeType>,
}

impl NodeInstance {
    /// Bind a persisted node to its registered type, merging default
    /// parameters and defaulting the appearance config.
    pub fn new(
        model: &NodeModel,
        registry: &NodeTypeRegistry,
    ) -> Result<Self> {
        let node_type = registry.get(&model.uses).ok_or_else(|| AgentflowError::Node(format!("unknown node type '{}'", model.uses)))?;

        let mut parameters = node_type.default_parameters();
        if let serde_json::Value::Object(configured) = &model.parameters {
            for (k, v) in configured {
                parameters.insert(k.clone(), v.clone());
            }
        }

        let appearance = apply_appearance(&model.uses, model.appearance.as_ref())?;

        Ok(Self {
            id: model.id.clone(),
            slug: model.slug.clone(),
            name: model.name.clone(),
            uses: model.uses.clone(),
            parameters,
            appearance,
            retry: model.retry.as_ref().map(|r| RetryConfig {
                times: r.times,
                interval: r.interval,
            }),
            timeout: model.timeout.map(Duration::from_millis),
            state: NodeState::default(),
            node_type,
        })
    }

    pub fn category(&self) -> NodeCategory {
        self.node_type.category()
    }
}
