//! Error types for Agentflow.
//!
//! All errors in Agentflow are represented by the `AgentflowError` enum,
//! which provides specific variants for different error categories. Node
//! execution failures are NOT errors at this level: a node's failure is a
//! value (`ExecutionResult` with a failed status) so the dispatcher can keep
//! its bookkeeping going; `AgentflowError` covers the engine surface:
//! definition problems, lookups, queues, runtime faults.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Agentflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum AgentflowError {
    /// Engine-level errors (startup, shutdown, lifecycle).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// Runtime execution errors.
    #[error("{0}")]
    Runtime(String),

    /// Flow definition errors (structural validation failures).
    #[error("{0}")]
    Flow(String),

    /// Node definition or instantiation errors.
    #[error("{0}")]
    Node(String),

    /// Connection definition errors.
    #[error("{0}")]
    Connection(String),

    /// Schema propagation errors.
    #[error("{0}")]
    Schema(String),

    /// Run lifecycle errors (unknown run, bad resume).
    #[error("{0}")]
    Run(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl From<AgentflowError> for String {
    fn from(val: AgentflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for AgentflowError {
    fn from(error: std::io::Error) -> Self {
        AgentflowError::IoError(error.to_string())
    }
}

impl From<AgentflowError> for std::io::Error {
    fn from(val: AgentflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for AgentflowError {
    fn from(_: FromUtf8Error) -> Self {
        AgentflowError::Runtime("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for AgentflowError {
    fn from(error: serde_json::Error) -> Self {
        AgentflowError::Convert(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for AgentflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        AgentflowError::Runtime(error.to_string())
    }
}
