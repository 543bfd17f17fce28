//! # Agentflow
//!
//! Agentflow is a flow execution engine written in Rust. A *flow* is a
//! directed graph of typed nodes (triggers, UI-rendering interface steps,
//! actions, sub-flow calls, terminal returns) exposed to an LLM agent as a
//! single callable tool.
//!
//! ## Core Features
//!
//! - **Typed Node Registry**: every node type declares its category, edge
//!   labels and JSON-Schema surface once, at registration time
//! - **Template Resolution**: `{{slug.field.path}}` expressions pull values
//!   from upstream node outputs at execution time
//! - **Schema Propagation**: static and dynamic JSON-Schemas resolve across
//!   the graph at design time, including cross-flow lookups, so the editor
//!   and the runtime agree on what each node produces before it executes
//! - **Suspend/Resume Dispatch**: interface nodes render, suspend the run,
//!   and resume when the user's action callback arrives
//! - **Async Execution**: powered by `tokio`; independent branches run
//!   concurrently
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agentflow::{EngineBuilder, FlowModel, Vars};
//!
//! let engine = EngineBuilder::new().build()?;
//! engine.launch();
//!
//! let flow = FlowModel::from_json(json_str)?;
//! engine.deploy(&flow)?;
//!
//! let run = engine.build_run(&flow.id, Vars::new().with("query", "rust"))?;
//! engine.start_run(run)?;
//! ```

mod appearance;
mod builder;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
pub mod events;
mod flow;
mod model;
mod runtime;
mod schema;
mod utils;

use std::sync::{Arc, RwLock};

pub use appearance::{AppearanceKind, AppearanceOption, COMPONENT_APPEARANCE_REGISTRY, apply_appearance, default_appearance_config};
pub use builder::EngineBuilder;
pub use common::Vars;
pub use config::{Config, FailurePolicy};
pub use engine::Engine;
pub use error::AgentflowError;
pub use flow::{
    FlowGraph,
    connection::OutputHandle,
    node::{ExecutionStatus, NodeId, NodeInstance, NodeState},
    nodes::{ExecutionResult, NodeCategory, NodeType, NodeTypeRegistry, SchemaDependency},
    slug, template,
};
pub use model::*;
pub use runtime::{Channel, ChannelEvent, ChannelOptions, Context, ExecutionContext, FlowInvoker, FlowRun, RunId, RunOutcome};
pub use schema::{FlowSchemaSource, FlowSchemas, NoExternalFlows, NodeSchemas, SchemaPropagator, SchemaState};

/// Result type alias for Agentflow operations.
pub type Result<T> = std::result::Result<T, AgentflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
