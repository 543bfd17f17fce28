//! Per-run and per-node execution contexts.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    AgentflowError, Result,
    common::{MemCache, Shutdown, Vars},
    events::{Event, Log},
    flow::{node::NodeId, template},
    runtime::Channel,
    utils,
};

/// run id
pub type RunId = String;

/// Entry point for recursive sub-flow invocation.
///
/// Implemented by the engine; injected into run contexts so `call_flow`
/// nodes can dispatch another flow without the engine types leaking into
/// node code. `depth` is the sub-flow nesting level of the new run.
#[async_trait]
pub trait FlowInvoker: Send + Sync {
    async fn invoke(
        &self,
        flow_id: &str,
        inputs: Vars,
        depth: u32,
    ) -> Result<Vars>;
}

/// Per-run context: the output memo, environment, trigger inputs and the
/// sub-flow entry point. Allocated fresh per invocation and discarded after
/// the run; nothing here is shared across runs.
#[derive(Clone)]
pub struct Context {
    rid: RunId,
    fid: String,
    inputs: Vars,
    env: Arc<MemCache<String, String>>,
    outputs: Arc<MemCache<String, Vars>>,
    channel: Option<Arc<Channel>>,
    invoker: Option<Arc<dyn FlowInvoker>>,
    depth: u32,
    max_call_depth: u32,
    shutdown: Arc<Shutdown>,
}

impl Context {
    pub fn new(
        rid: RunId,
        fid: String,
    ) -> Self {
        Self {
            rid,
            fid,
            inputs: Vars::new(),
            env: Arc::new(MemCache::new(1024)),
            outputs: Arc::new(MemCache::new(1024)),
            channel: None,
            invoker: None,
            depth: 0,
            max_call_depth: 8,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Bind the trigger argument bag.
    pub fn with_inputs(
        mut self,
        inputs: Vars,
    ) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_channel(
        mut self,
        channel: Arc<Channel>,
    ) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Enable `call_flow` at the given nesting depth and depth limit.
    pub fn with_invoker(
        mut self,
        invoker: Arc<dyn FlowInvoker>,
        depth: u32,
        max_call_depth: u32,
    ) -> Self {
        self.invoker = Some(invoker);
        self.depth = depth;
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn rid(&self) -> RunId {
        self.rid.to_owned()
    }

    pub fn fid(&self) -> &str {
        &self.fid
    }

    pub fn inputs(&self) -> Vars {
        self.inputs.clone()
    }

    pub fn env(&self) -> Arc<MemCache<String, String>> {
        self.env.clone()
    }

    pub fn outputs(&self) -> Arc<MemCache<String, Vars>> {
        self.outputs.clone()
    }

    pub fn add_output(
        &self,
        slug: String,
        outputs: Vars,
    ) {
        self.outputs.set(slug, outputs);
    }

    /// The memoized output of an already-executed node.
    ///
    /// Fails loudly when the node has not executed yet: dependency-ordered
    /// scheduling guarantees upstream outputs exist, so a miss here is a
    /// correctness bug, never a silent null.
    pub fn node_value(
        &self,
        slug: &str,
    ) -> Result<Vars> {
        self.outputs
            .get(&slug.to_string())
            .ok_or_else(|| AgentflowError::Runtime(format!("node '{}' has not produced an output in this run", slug)))
    }

    /// Invoke another flow and wait for its terminal output.
    pub async fn call_flow(
        &self,
        flow_id: &str,
        inputs: Vars,
    ) -> Result<Vars> {
        let Some(invoker) = &self.invoker else {
            return Err(AgentflowError::Runtime("sub-flow invocation is not available in this context".to_string()));
        };
        let next_depth = self.depth + 1;
        // flows are not statically checked for cycles across flow
        // boundaries; fail closed instead of overflowing the stack
        if next_depth > self.max_call_depth {
            return Err(AgentflowError::Runtime(format!(
                "sub-flow call depth {} exceeds the configured limit of {}",
                next_depth, self.max_call_depth
            )));
        }
        invoker.invoke(flow_id, inputs, next_depth).await
    }

    pub(crate) fn channel(&self) -> Option<Arc<Channel>> {
        self.channel.clone()
    }

    pub fn emit_log(
        &self,
        nid: NodeId,
        content: String,
    ) {
        tracing::debug!(rid = %self.rid, nid = %nid, "{}", content);
        if let Some(channel) = &self.channel {
            let log = Log {
                rid: self.rid.clone(),
                nid,
                content,
                timestamp: utils::time::time_millis(),
            };
            let _ = channel.log_queue().send(Event::new(&log));
        }
    }

    /// Signal the run as finished; cancels in-flight node executions.
    pub fn done(&self) {
        self.shutdown.shutdown();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_terminated()
    }

    pub fn wait_shutdown(&self) -> impl Future<Output = ()> + Send + 'static {
        self.shutdown.wait()
    }
}

/// Per-node view of a run, handed to `NodeType::execute`.
///
/// Parameters arrive template-resolved; `node_value` and `call_flow` go
/// through the run context.
pub struct ExecutionContext {
    run: Context,
    nid: NodeId,
    slug: String,
    parameters: Vars,
    appearance: Vars,
}

impl ExecutionContext {
    pub fn new(
        run: &Context,
        nid: impl Into<NodeId>,
        slug: impl Into<String>,
        parameters: Vars,
    ) -> Self {
        Self {
            run: run.clone(),
            nid: nid.into(),
            slug: slug.into(),
            parameters,
            appearance: Vars::new(),
        }
    }

    pub fn with_appearance(
        mut self,
        appearance: Vars,
    ) -> Self {
        self.appearance = appearance;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run.rid
    }

    pub fn flow_id(&self) -> &str {
        &self.run.fid
    }

    pub fn node_id(&self) -> &str {
        &self.nid
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn parameters(&self) -> &Vars {
        &self.parameters
    }

    pub fn appearance(&self) -> &Vars {
        &self.appearance
    }

    /// The trigger argument bag of this run.
    pub fn inputs(&self) -> Vars {
        self.run.inputs()
    }

    /// See [`Context::node_value`].
    pub fn node_value(
        &self,
        slug: &str,
    ) -> Result<Vars> {
        self.run.node_value(slug)
    }

    /// Resolve template expressions in a string against this run's memo.
    pub fn resolve(
        &self,
        template: &str,
    ) -> String {
        template::resolve_template(&self.run, template)
    }

    /// Resolve template expressions in a JSON tree.
    pub fn resolve_value(
        &self,
        value: &Value,
    ) -> Value {
        template::resolve_value(&self.run, value)
    }

    /// See [`Context::call_flow`].
    pub async fn call_flow(
        &self,
        flow_id: &str,
        inputs: Vars,
    ) -> Result<Vars> {
        self.run.call_flow(flow_id, inputs).await
    }

    /// Cooperative cancellation flag; nodes performing external I/O should
    /// poll this or race against [`Context::wait_shutdown`].
    pub fn is_cancelled(&self) -> bool {
        self.run.is_cancelled()
    }

    pub fn emit_log(
        &self,
        content: String,
    ) {
        self.run.emit_log(self.nid.clone(), content);
    }
}
