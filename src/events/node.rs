use std::fmt;

use crate::common::Vars;

#[derive(Debug, Clone)]
pub enum NodeEvent {
    Running(i64),
    Succeeded {
        at: i64,
        /// Named action edge selected by the node, when it branched.
        action: Option<String>,
    },
    /// Interface node rendered; the run suspends until its action callback.
    Suspended {
        at: i64,
        render: Vars,
    },
    Skipped,
    Stopped(i64),
    Retry,
    Error(ErrorReason),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Running(_) => "Running",
            NodeEvent::Succeeded { .. } => "Succeeded",
            NodeEvent::Suspended { .. } => "Suspended",
            NodeEvent::Skipped => "Skipped",
            NodeEvent::Stopped(_) => "Stopped",
            NodeEvent::Retry => "Retry",
            NodeEvent::Error(_) => "Error",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ErrorReason {
    Timeout,
    Failed(String),
    Exception(String),
}

impl fmt::Display for ErrorReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ErrorReason::Timeout => write!(f, "Timeout"),
            ErrorReason::Failed(msg) => write!(f, "Failed: {}", msg),
            ErrorReason::Exception(msg) => write!(f, "Exception: {}", msg),
        }
    }
}
