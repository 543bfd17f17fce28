use serde::{Deserialize, Serialize};

fn default_output() -> String {
    "main".to_string()
}

/// A directed connection between two nodes.
///
/// `source_output` is the edge label on the source node: `"main"` for the
/// default data edge, `"action:<name>"` for a conditional action edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionModel {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default = "default_output")]
    pub source_output: String,
}
