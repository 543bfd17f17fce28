use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One node instance as persisted by the flow editor.
///
/// `slug` is the template-resolution key (see `flow::slug`); `uses` names a
/// registered node type; `parameters` may embed `{{slug.field}}` template
/// expressions. `position` is editor canvas state and ignored by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeModel {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
    pub uses: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appearance: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryModel>,
    /// execution timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
}

/// Per-node retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryModel {
    /// retry attempts after the first failure
    pub times: u64,
    /// interval between attempts in milliseconds
    pub interval: u64,
}
