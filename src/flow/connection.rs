//! Flow connections and output handles.
//!
//! Connections carry execution from a node's named output to a downstream
//! node. The `main` output is the unconditional data edge; `action:<name>`
//! outputs are mutually exclusive conditional edges, only one of which is
//! followed at runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    AgentflowError, Result,
    flow::node::{NodeId, NodeState},
    model::ConnectionModel,
    utils,
};

/// Unique identifier for a connection within a flow.
pub type ConnectionId = String;

/// A named output port on a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputHandle {
    /// Default output for sequential flow.
    Main,
    /// Conditional action output, fired only when the node (or the user
    /// interacting with its rendered UI) selects this branch.
    Action(String),
}

impl OutputHandle {
    pub fn action(name: impl Into<String>) -> Self {
        OutputHandle::Action(name.into())
    }

    pub fn is_action(&self) -> bool {
        matches!(self, OutputHandle::Action(_))
    }

    pub fn action_name(&self) -> Option<&str> {
        match self {
            OutputHandle::Action(name) => Some(name),
            OutputHandle::Main => None,
        }
    }
}

impl Default for OutputHandle {
    fn default() -> Self {
        OutputHandle::Main
    }
}

impl fmt::Display for OutputHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            OutputHandle::Main => write!(f, "main"),
            OutputHandle::Action(name) => write!(f, "action:{}", name),
        }
    }
}

impl FromStr for OutputHandle {
    type Err = AgentflowError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "main" {
            return Ok(OutputHandle::Main);
        }
        match s.strip_prefix("action:") {
            Some(name) if !name.is_empty() => Ok(OutputHandle::Action(name.to_string())),
            _ => Err(AgentflowError::Connection(format!("invalid output handle '{}'", s))),
        }
    }
}

impl Serialize for OutputHandle {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OutputHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Runtime connection between two nodes.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: NodeId,
    pub target: NodeId,
    /// Which output port of the source node this connection leaves from.
    pub output: OutputHandle,
    /// Walk state of this connection during a run.
    pub state: NodeState,
}

impl Connection {
    pub fn new(model: &ConnectionModel) -> Result<Self> {
        let output = model.source_output.parse()?;
        let id = if model.id.is_empty() {
            format!("conn_{}", utils::shortid())
        } else {
            model.id.clone()
        };

        Ok(Self {
            id,
            source: model.source.clone(),
            target: model.target.clone(),
            output,
            state: NodeState::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_handle_parse() {
        assert_eq!("main".parse::<OutputHandle>().unwrap(), OutputHandle::Main);
        assert_eq!("action:onReadMore".parse::<OutputHandle>().unwrap(), OutputHandle::action("onReadMore"));
        assert!("action:".parse::<OutputHandle>().is_err());
        assert!("secondary".parse::<OutputHandle>().is_err());
    }

    #[test]
    fn test_output_handle_display_round_trip() {
        for handle in [OutputHandle::Main, OutputHandle::action("onReadMore")] {
            assert_eq!(handle.to_string().parse::<OutputHandle>().unwrap(), handle);
        }
    }
}
