use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::{Config, Engine, Result, flow::nodes::NodeType};

/// Builder for [`Engine`] instances.
pub struct EngineBuilder {
    config: Config,
    rt: Option<Arc<Runtime>>,
    node_types: Vec<Arc<dyn NodeType>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            rt: None,
            node_types: Vec::new(),
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    /// Use an existing tokio runtime instead of building one.
    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Register a host-defined node type alongside the built-in set.
    pub fn node_type(
        mut self,
        node_type: Arc<dyn NodeType>,
    ) -> Self {
        self.node_types.push(node_type);
        self
    }

    pub fn build(&self) -> Result<Engine> {
        let runtime = match &self.rt {
            Some(rt) => rt.clone(),
            None => Arc::new(
                Builder::new_multi_thread().worker_threads(self.config.async_worker_thread_number.into()).enable_all().build().expect("failed to build tokio runtime"),
            ),
        };
        Engine::from_parts(runtime, self.config.clone(), &self.node_types)
    }
}
