//! Flow engine - the main entry point for Agentflow.
//!
//! The engine owns the node type registry, the deployed-flow cache and the
//! live run cache. Deploying a flow validates it structurally and
//! propagates schemas across every deployed flow (so cross-flow `call_flow`
//! schemas settle once their targets arrive); invoking a flow builds a
//! fresh run whose lifecycle the host drives via the returned [`FlowRun`].

use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

use crate::{
    AgentflowError, Config, Result, ShareLock,
    common::{MemCache, Queue, Shutdown, Vars},
    flow::{
        FlowGraph,
        nodes::{NodeType, NodeTypeRegistry},
        template,
    },
    model::FlowModel,
    runtime::{Channel, ChannelEvent, ChannelOptions, FlowInvoker, FlowRun, RunId, RunOptions, RunOutcome},
    schema::{FlowSchemaSource, FlowSchemas, SchemaPropagator},
};

/// Maximum number of live runs kept in memory.
const RUN_CACHE_SIZE: usize = 2048;
/// Size of the queue for terminal-run notifications.
const RUN_COMPLETE_QUEUE_SIZE: usize = 100;

/// The flow engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().build()?;
/// engine.launch();
///
/// engine.deploy(&flow)?;
/// let run = engine.build_run(&flow.id, Vars::new().with("query", "rust"))?;
/// engine.start_run(run.clone())?;
///
/// match run.wait().await {
///     RunOutcome::Suspended { node, render, .. } => { /* hand render to the UI */ }
///     RunOutcome::Succeeded { output } => { /* serialize as the tool result */ }
///     _ => {}
/// }
/// ```
pub struct Engine {
    /// Event channel broadcasting run and node events.
    channel: Arc<Channel>,
    /// Registered node types; immutable after build.
    registry: Arc<NodeTypeRegistry>,
    /// Deployed flow models by flow id.
    flows: Arc<MemCache<String, Arc<FlowModel>>>,
    /// Schema annotations per deployed flow.
    schemas: ShareLock<HashMap<String, FlowSchemas>>,
    /// Live runs, including suspended ones awaiting an action callback.
    runs: Arc<MemCache<RunId, Arc<FlowRun>>>,
    /// Queue of runs that reached a terminal state.
    runs_complete_queue: Arc<Queue<RunId>>,

    running: Arc<AtomicBool>,
    runtime: Arc<Runtime>,
    shutdown: Arc<Shutdown>,
    config: Config,
}

impl Engine {
    /// Create an engine on an existing runtime with default configuration.
    pub fn new(runtime: Arc<Runtime>) -> Self {
        // the built-in registry has no duplicate names
        Self::from_parts(runtime, Config::default(), &[]).expect("default engine construction")
    }

    /// Create an engine with its own runtime from a configuration.
    pub fn new_with_config(config: Config) -> Self {
        let runtime = Arc::new(
            Builder::new_multi_thread().worker_threads(config.async_worker_thread_number.into()).enable_all().build().expect("failed to build tokio runtime"),
        );
        Self::from_parts(runtime, config, &[]).expect("default engine construction")
    }

    pub(crate) fn from_parts(
        runtime: Arc<Runtime>,
        config: Config,
        node_types: &[Arc<dyn NodeType>],
    ) -> Result<Self> {
        let mut registry = NodeTypeRegistry::builtin();
        for node_type in node_types {
            registry.register(node_type.clone())?;
        }

        let channel = Arc::new(Channel::new(runtime.clone()));

        Ok(Self {
            channel,
            registry: Arc::new(registry),
            flows: Arc::new(MemCache::new(1024)),
            schemas: Arc::new(HashMap::new().into()),
            runs: Arc::new(MemCache::new(RUN_CACHE_SIZE)),
            runs_complete_queue: Queue::new(RUN_COMPLETE_QUEUE_SIZE),
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
            config,
        })
    }

    /// Start the engine: begin listening on the event channel and clean up
    /// terminal runs. Suspended runs stay cached until their action
    /// callback arrives.
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        self.channel.listen();

        let runs_complete_queue = self.runs_complete_queue.clone();
        ChannelEvent::channel(self.channel.clone(), ChannelOptions::default()).on_event(move |event| {
            if event.event.is_terminal() {
                let _ = runs_complete_queue.send(event.rid.clone());
            }
        });

        let runs_complete_queue = self.runs_complete_queue.clone();
        let shutdown = self.shutdown.clone();
        let runs = self.runs.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Some(rid) = runs_complete_queue.next_async() => {
                        tracing::debug!(rid = %rid, "run reached a terminal state, dropping from cache");
                        runs.remove(&rid);
                    }
                }
            }
        });
    }

    /// Gracefully shut down: abort live runs and stop the event channel.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        self.shutdown.shutdown();
        for (_, run) in self.runs.iter() {
            run.abort();
        }
        self.channel.shutdown();
    }

    /// Deploy a flow: validate it structurally, cache it, and re-propagate
    /// schemas across all deployed flows so cross-flow slots can settle.
    pub fn deploy(
        &self,
        flow: &FlowModel,
    ) -> Result<()> {
        if flow.id.is_empty() {
            return Err(AgentflowError::Flow("flow id must not be empty".to_string()));
        }
        // structural validation happens before the flow becomes visible
        let graph = FlowGraph::build(flow, &self.registry)?;

        // lint dangling template references; resolution degrades them to
        // empty strings at run time, so these are warnings, not errors
        let valid_slugs = graph.slugs();
        for node in flow.nodes.iter() {
            let refs = template::extract_all_references(&node.parameters);
            for missing in template::validate_node_references(&refs, &valid_slugs) {
                tracing::warn!(fid = %flow.id, nid = %node.id, "parameter references unknown node '{}'", missing);
            }
        }

        tracing::info!(fid = %flow.id, "deploying flow '{}'", flow.name);
        self.flows.set(flow.id.clone(), Arc::new(flow.clone()));
        self.propagate_all();
        Ok(())
    }

    /// Schema annotations of a deployed flow.
    pub fn flow_schemas(
        &self,
        flow_id: &str,
    ) -> Option<FlowSchemas> {
        self.schemas.read().unwrap().get(flow_id).cloned()
    }

    /// Re-run schema propagation over every deployed flow until the
    /// annotations stop changing. Deferred cross-flow slots resolve here
    /// once their target flows are present.
    fn propagate_all(&self) {
        loop {
            let snapshot = SchemaSnapshot {
                outputs: self
                    .schemas
                    .read()
                    .unwrap()
                    .iter()
                    .filter_map(|(fid, schemas)| schemas.output.as_value().map(|v| (fid.clone(), v.clone())))
                    .collect(),
            };

            let mut changed = false;
            for (fid, model) in self.flows.iter() {
                let Ok(graph) = FlowGraph::build(&model, &self.registry) else {
                    continue;
                };
                let annotated = SchemaPropagator::new(&snapshot).propagate(&graph);

                let mut schemas = self.schemas.write().unwrap();
                if schemas.get(fid.as_str()) != Some(&annotated) {
                    schemas.insert(fid.to_string(), annotated);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Build a run of a deployed flow bound to the given trigger inputs.
    pub fn build_run(
        &self,
        flow_id: &str,
        inputs: Vars,
    ) -> Result<Arc<FlowRun>> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(AgentflowError::Engine("Engine is not running".to_string()));
        }
        let model = self.flows.get(&flow_id.to_string()).ok_or_else(|| AgentflowError::Flow(format!("flow '{}' is not deployed", flow_id)))?;

        FlowRun::new(
            &model,
            &self.registry,
            self.channel.clone(),
            self.runtime.clone(),
            RunOptions {
                inputs,
                depth: 0,
                max_call_depth: self.config.max_call_depth,
                failure_policy: self.config.failure_policy,
                invoker: Some(Arc::new(self.invoker())),
            },
        )
    }

    /// Cache and start a run, returning its id.
    pub fn start_run(
        &self,
        run: Arc<FlowRun>,
    ) -> Result<RunId> {
        let rid = run.id().to_string();
        self.runs.set(rid.clone(), run.clone());
        run.start();
        Ok(rid)
    }

    /// Deliver an interface node's action callback to a suspended run.
    pub fn resume(
        &self,
        run_id: &str,
        nid: &str,
        action: &str,
        payload: Value,
    ) -> Result<()> {
        let run = self.runs.get(&run_id.to_string()).ok_or_else(|| AgentflowError::Run(format!("run '{}' not found", run_id)))?;
        run.resume(nid, action, payload)
    }

    /// Abort a live run by id.
    pub fn stop(
        &self,
        run_id: &str,
    ) -> Result<()> {
        let run = self.runs.get(&run_id.to_string()).ok_or_else(|| AgentflowError::Run(format!("run '{}' not found", run_id)))?;
        run.abort();
        Ok(())
    }

    pub fn get_run(
        &self,
        run_id: &str,
    ) -> Option<Arc<FlowRun>> {
        self.runs.get(&run_id.to_string())
    }

    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    pub fn node_types(&self) -> Arc<NodeTypeRegistry> {
        self.registry.clone()
    }

    fn invoker(&self) -> EngineInvoker {
        EngineInvoker {
            flows: self.flows.clone(),
            registry: self.registry.clone(),
            channel: self.channel.clone(),
            runtime: self.runtime.clone(),
            config: self.config.clone(),
        }
    }
}

/// Snapshot of deployed flows' output schemas used as the propagation
/// source; decoupled from the live map so a pass sees a consistent view.
struct SchemaSnapshot {
    outputs: HashMap<String, Value>,
}

impl FlowSchemaSource for SchemaSnapshot {
    fn flow_output_schema(
        &self,
        flow_id: &str,
    ) -> Option<Value> {
        self.outputs.get(flow_id).cloned()
    }
}

/// Sub-flow entry point handed to run contexts. `call_flow` dispatch runs
/// the target flow to completion before control returns to the caller.
#[derive(Clone)]
struct EngineInvoker {
    flows: Arc<MemCache<String, Arc<FlowModel>>>,
    registry: Arc<NodeTypeRegistry>,
    channel: Arc<Channel>,
    runtime: Arc<Runtime>,
    config: Config,
}

#[async_trait]
impl FlowInvoker for EngineInvoker {
    async fn invoke(
        &self,
        flow_id: &str,
        inputs: Vars,
        depth: u32,
    ) -> Result<Vars> {
        let model = self.flows.get(&flow_id.to_string()).ok_or_else(|| AgentflowError::Flow(format!("flow '{}' is not deployed", flow_id)))?;

        let run = FlowRun::new(
            &model,
            &self.registry,
            self.channel.clone(),
            self.runtime.clone(),
            RunOptions {
                inputs,
                depth,
                max_call_depth: self.config.max_call_depth,
                failure_policy: self.config.failure_policy,
                invoker: Some(Arc::new(self.clone())),
            },
        )?;
        run.start();

        match run.wait().await {
            RunOutcome::Succeeded { output } => Ok(output),
            RunOutcome::Failed { error, .. } => Err(AgentflowError::Runtime(error)),
            RunOutcome::Aborted { reason } => Err(AgentflowError::Runtime(reason)),
            RunOutcome::Suspended { .. } => {
                // sub-flows are synchronous from the caller's view; one that
                // waits on user input cannot complete here
                run.abort();
                Err(AgentflowError::Runtime(format!("flow '{}' suspended waiting for user input", flow_id)))
            }
        }
    }
}
