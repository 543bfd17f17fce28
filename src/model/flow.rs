use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    AgentflowError, Result,
    model::{ConnectionModel, NodeModel},
};

/// A complete flow definition as produced by the editor.
///
/// Immutable snapshot during a run; the engine never writes it back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub nodes: Vec<NodeModel>,
    pub connections: Vec<ConnectionModel>,
}

impl FlowModel {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<FlowModel>(s).map_err(|e| AgentflowError::Flow(format!("{}", e)))
    }
}
