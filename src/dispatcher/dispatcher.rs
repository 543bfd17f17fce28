//! Flow dispatcher: schedules nodes in dependency order and routes action
//! branches.
//!
//! The dispatcher is responsible for:
//! - Walking the flow graph as upstream dependencies settle
//! - Resolving node parameters immediately before each execution
//! - Following the action edge a node (or a resumed user action) selects
//!   and skipping the unselected branches
//! - Suspending at interface nodes and resuming on their action callback
//! - Retries, timeouts, cancellation and the failure policy

use std::{sync::Arc, time::Duration};

use tokio::{runtime::Runtime, sync::mpsc};

use crate::{
    ShareLock,
    common::{Queue, Shutdown, Vars},
    config::FailurePolicy,
    events::{ErrorReason, Event, FlowAbortedEvent, FlowEvent, FlowFailedEvent, FlowStartEvent, FlowSucceededEvent, FlowSuspendedEvent, GraphEvent, Message, NodeEvent},
    flow::{
        FlowGraph,
        connection::OutputHandle,
        node::{ExecutionStatus, NodeId, NodeInstance, NodeState},
        nodes::{ExecutionResult, NodeCategory},
        template,
    },
    runtime::{Context, ExecutionContext, RunCommand},
    utils,
};

/// Flow execution dispatcher.
///
/// One dispatcher per run. Commands (`Start`, `Resume`, `Abort`) arrive on
/// the command queue; node completions arrive on an internal channel; both
/// are processed by a single event loop, so graph state transitions are
/// serialized even though node bodies run as parallel tasks.
pub struct Dispatcher {
    ctx: Arc<Context>,
    graph: Arc<FlowGraph>,
    command_queue: Arc<Queue<RunCommand>>,
    runtime: Arc<Runtime>,
    policy: FailurePolicy,
    /// Output of the first return node reached; the flow's terminal result.
    terminal: ShareLock<Option<Vars>>,
    /// Last suspension, re-emitted when an invalid resume arrives.
    suspension: ShareLock<Option<FlowSuspendedEvent>>,
    /// Last node failure under the skip-dependents policy.
    last_error: ShareLock<Option<(NodeId, String)>>,
    shutdown: Arc<Shutdown>,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<Context>,
        graph: Arc<FlowGraph>,
        command_queue: Arc<Queue<RunCommand>>,
        runtime: Arc<Runtime>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            ctx,
            graph,
            command_queue,
            runtime,
            policy,
            terminal: Arc::new(None.into()),
            suspension: Arc::new(None.into()),
            last_error: Arc::new(None.into()),
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Start the dispatcher's event loop.
    pub fn start(&self) {
        let (tx, mut rx) = mpsc::channel::<(NodeId, NodeEvent)>(1024);

        let ctx = self.ctx.clone();
        let graph = self.graph.clone();
        let command_queue = self.command_queue.clone();
        let runtime = self.runtime.clone();
        let policy = self.policy;
        let terminal = self.terminal.clone();
        let suspension = self.suspension.clone();
        let last_error = self.last_error.clone();
        let shutdown = self.shutdown.clone();

        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,

                    Some((nid, event)) = rx.recv() => {
                        publish(&ctx, &nid, GraphEvent::Node(event.clone()));

                        match event {
                            NodeEvent::Succeeded { action, .. } => {
                                Self::handle_node_settled(&ctx, &graph, &runtime, &tx, &terminal, &last_error, nid, action);
                            }
                            NodeEvent::Suspended { render, .. } => {
                                Self::handle_node_suspended(&ctx, &graph, &suspension, nid, render);
                            }
                            NodeEvent::Error(reason) => {
                                match policy {
                                    FailurePolicy::HaltRun => {
                                        graph.mark_node(&nid, NodeState::Failed);
                                        let output = Self::node_output(&ctx, &graph, &nid);
                                        publish(&ctx, &nid, GraphEvent::Flow(FlowEvent::Failed(FlowFailedEvent {
                                            nid: nid.clone(),
                                            error: reason.to_string(),
                                            output,
                                        })));
                                        ctx.done();
                                        shutdown.shutdown();
                                    }
                                    FailurePolicy::SkipDependents => {
                                        tracing::warn!(rid = %ctx.rid(), nid = %nid, "node failed, skipping dependents: {}", reason);
                                        graph.mark_node(&nid, NodeState::Failed);
                                        *last_error.write().unwrap() = Some((nid.clone(), reason.to_string()));
                                        for skipped in graph.skip_outgoing(&nid) {
                                            publish(&ctx, &skipped, GraphEvent::Node(NodeEvent::Skipped));
                                        }
                                        Self::check_completion(&ctx, &graph, &terminal, &last_error);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }

                    cmd_opt = command_queue.next_async() => {
                        let Some(cmd) = cmd_opt else { continue };
                        match cmd {
                            RunCommand::Start => {
                                let Some(trigger) = graph.trigger_node() else {
                                    publish(&ctx, &"".to_string(), GraphEvent::Flow(FlowEvent::Failed(FlowFailedEvent {
                                        nid: "".to_string(),
                                        error: "flow has no trigger node".to_string(),
                                        output: Vars::new(),
                                    })));
                                    shutdown.shutdown();
                                    continue;
                                };
                                tracing::debug!(rid = %ctx.rid(), "starting run\n{}", graph.dump());
                                publish(&ctx, &"".to_string(), GraphEvent::Flow(FlowEvent::Start(FlowStartEvent {
                                    node_ids: graph.node_ids(),
                                })));
                                Self::spawn_node(&ctx, &graph, &runtime, &tx, trigger.id);
                            }
                            RunCommand::Resume { nid, action, payload } => {
                                Self::handle_resume(&ctx, &graph, &runtime, &tx, &terminal, &last_error, &suspension, nid, action, payload);
                            }
                            RunCommand::Abort => {
                                publish(&ctx, &"".to_string(), GraphEvent::Flow(FlowEvent::Aborted(FlowAbortedEvent {
                                    reason: "aborted by command".to_string(),
                                })));
                                ctx.done();
                                shutdown.shutdown();
                            }
                        }
                    }
                }
            }
        });
    }

    /// Stop the event loop.
    pub fn stop(&self) {
        self.shutdown.shutdown();
    }

    /// All node outputs collected during this run, keyed by slug.
    pub fn outputs(&self) -> Vars {
        let mut result = Vars::new();
        for (slug, vars) in self.ctx.outputs().iter() {
            result.set(slug.as_str(), vars.clone());
        }
        result
    }

    pub fn is_complete(&self) -> bool {
        self.shutdown.is_terminated()
    }

    /// Spawn a ready node as its own task; independent subgraphs run
    /// concurrently.
    fn spawn_node(
        ctx: &Arc<Context>,
        graph: &Arc<FlowGraph>,
        runtime: &Arc<Runtime>,
        tx: &mpsc::Sender<(NodeId, NodeEvent)>,
        nid: NodeId,
    ) {
        let ctx = ctx.clone();
        let graph = graph.clone();
        let tx = tx.clone();

        graph.mark_node(&nid, NodeState::Running);

        runtime.spawn(async move {
            let result = Self::execute_node(ctx, graph, nid.clone()).await;
            let _ = tx.send((nid, result)).await;
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_node_settled(
        ctx: &Arc<Context>,
        graph: &Arc<FlowGraph>,
        runtime: &Arc<Runtime>,
        tx: &mpsc::Sender<(NodeId, NodeEvent)>,
        terminal: &ShareLock<Option<Vars>>,
        last_error: &ShareLock<Option<(NodeId, String)>>,
        nid: NodeId,
        action: Option<String>,
    ) {
        graph.mark_node(&nid, NodeState::Executed);

        let Some(node) = graph.get_node(&nid) else {
            return;
        };

        // the first return node reached supplies the flow's output
        if node.category() == NodeCategory::Return {
            let mut slot = terminal.write().unwrap();
            if slot.is_none() {
                *slot = Some(Self::node_output(ctx, graph, &nid));
            }
        }

        let selected = action.map(OutputHandle::Action).unwrap_or_default();

        // conditional action branches are mutually exclusive: everything
        // not selected is skipped, not executed
        if node.node_type.outputs().iter().any(|h| h.is_action()) {
            for skipped in graph.skip_unselected_branches(&nid, &selected) {
                publish(ctx, &skipped, GraphEvent::Node(NodeEvent::Skipped));
            }
        }

        for next in graph.next_ready_nodes(&nid, &selected) {
            Self::spawn_node(ctx, graph, runtime, tx, next);
        }

        Self::check_completion(ctx, graph, terminal, last_error);
    }

    fn handle_node_suspended(
        ctx: &Arc<Context>,
        graph: &Arc<FlowGraph>,
        suspension: &ShareLock<Option<FlowSuspendedEvent>>,
        nid: NodeId,
        render: Vars,
    ) {
        graph.mark_node(&nid, NodeState::Suspended);

        let actions = graph
            .get_node(&nid)
            .map(|node| node.node_type.outputs().iter().filter_map(|h| h.action_name().map(str::to_string)).collect())
            .unwrap_or_default();

        let event = FlowSuspendedEvent {
            nid: nid.clone(),
            render,
            actions,
        };
        *suspension.write().unwrap() = Some(event.clone());
        publish(ctx, &nid, GraphEvent::Flow(FlowEvent::Suspended(event)));
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_resume(
        ctx: &Arc<Context>,
        graph: &Arc<FlowGraph>,
        runtime: &Arc<Runtime>,
        tx: &mpsc::Sender<(NodeId, NodeEvent)>,
        terminal: &ShareLock<Option<Vars>>,
        last_error: &ShareLock<Option<(NodeId, String)>>,
        suspension: &ShareLock<Option<FlowSuspendedEvent>>,
        nid: NodeId,
        action: String,
        payload: serde_json::Value,
    ) {
        let resumable = graph.get_node(&nid).filter(|node| node.state == NodeState::Suspended);
        let declared = resumable.as_ref().is_some_and(|node| node.node_type.outputs().contains(&OutputHandle::action(action.clone())));

        let Some(node) = resumable.filter(|_| declared) else {
            tracing::warn!(rid = %ctx.rid(), nid = %nid, action = %action, "invalid resume, restoring suspension");
            let restored = suspension.read().unwrap().clone();
            if let Some(event) = restored {
                publish(ctx, &event.nid.clone(), GraphEvent::Flow(FlowEvent::Suspended(event)));
            }
            return;
        };

        // the action payload, not the render descriptor, is what downstream
        // templates read from this node
        ctx.add_output(node.slug.clone(), Vars::from(payload));
        *suspension.write().unwrap() = None;

        publish(
            ctx,
            &nid,
            GraphEvent::Node(NodeEvent::Succeeded {
                at: utils::time::time_millis(),
                action: Some(action.clone()),
            }),
        );
        Self::handle_node_settled(ctx, graph, runtime, tx, terminal, last_error, nid, Some(action));
    }

    fn check_completion(
        ctx: &Arc<Context>,
        graph: &Arc<FlowGraph>,
        terminal: &ShareLock<Option<Vars>>,
        last_error: &ShareLock<Option<(NodeId, String)>>,
    ) {
        if !graph.is_all_settled() {
            return;
        }

        let output = terminal.read().unwrap().clone();
        match output {
            Some(output) => {
                publish(ctx, &"".to_string(), GraphEvent::Flow(FlowEvent::Succeeded(FlowSucceededEvent {
                    output,
                })));
            }
            None => match last_error.read().unwrap().clone() {
                // every branch settled but the failure swallowed the
                // terminal output
                Some((nid, error)) => {
                    let output = Self::node_output(ctx, graph, &nid);
                    publish(ctx, &nid.clone(), GraphEvent::Flow(FlowEvent::Failed(FlowFailedEvent {
                        nid,
                        error,
                        output,
                    })));
                }
                None => {
                    publish(ctx, &"".to_string(), GraphEvent::Flow(FlowEvent::Succeeded(FlowSucceededEvent {
                        output: Vars::new(),
                    })));
                }
            },
        }
        ctx.done();
    }

    /// Best-effort memoized output of a node, empty when it produced none.
    fn node_output(
        ctx: &Arc<Context>,
        graph: &Arc<FlowGraph>,
        nid: &NodeId,
    ) -> Vars {
        graph.get_node(nid).and_then(|node| ctx.outputs().get(&node.slug)).unwrap_or_default()
    }

    /// Execute a single node, including parameter resolution, retries,
    /// timeout and cancellation. Spawned as a separate task.
    async fn execute_node(
        ctx: Arc<Context>,
        graph: Arc<FlowGraph>,
        nid: NodeId,
    ) -> NodeEvent {
        let node = match graph.get_node(&nid) {
            Some(n) => Arc::new(n),
            None => {
                return NodeEvent::Error(ErrorReason::Exception(format!("node {} not found", nid)));
            }
        };

        let mut retry_times = node.retry.as_ref().map(|r| r.times).unwrap_or(0);
        let retry_interval = node.retry.as_ref().map(|r| r.interval).unwrap_or(0);

        let start_time = utils::time::time_millis();
        publish(&ctx, &nid, GraphEvent::Node(NodeEvent::Running(start_time)));

        loop {
            // parameters are template-resolved against the memo right
            // before execution, once upstream outputs exist
            let parameters = template::resolve_vars(&ctx, &node.parameters);
            let exec_ctx = ExecutionContext::new(&ctx, node.id.clone(), node.slug.clone(), parameters).with_appearance(node.appearance.clone());

            let ret = tokio::select! {
                _ = ctx.wait_shutdown() => return NodeEvent::Stopped(utils::time::time_millis()),
                res = Self::run_node(&node, &exec_ctx) => res,
            };
            let end_time = utils::time::time_millis();

            // an Err escaping the node boundary is still representable as a
            // failed result; the dispatcher's bookkeeping continues
            let result = match ret {
                Ok(result) => result,
                Err(e) => ExecutionResult::failed(e.to_string()),
            };

            if result.status == ExecutionStatus::Failed && retry_times > 0 {
                retry_times -= 1;
                if retry_interval > 0 {
                    tokio::select! {
                        _ = ctx.wait_shutdown() => return NodeEvent::Stopped(utils::time::time_millis()),
                        _ = tokio::time::sleep(Duration::from_millis(retry_interval)) => {}
                    }
                }
                publish(&ctx, &nid, GraphEvent::Node(NodeEvent::Retry));
                continue;
            }

            return match result.status {
                ExecutionStatus::Pending => unreachable!(),
                ExecutionStatus::Succeeded => {
                    ctx.add_output(node.slug.clone(), result.output);
                    NodeEvent::Succeeded {
                        at: end_time,
                        action: result.action,
                    }
                }
                ExecutionStatus::Failed => {
                    // keep the degraded output so the caller can show what
                    // was attempted
                    ctx.add_output(node.slug.clone(), result.output);
                    NodeEvent::Error(ErrorReason::Failed(result.error.unwrap_or_default()))
                }
                ExecutionStatus::Suspended => NodeEvent::Suspended {
                    at: end_time,
                    render: result.output,
                },
                ExecutionStatus::Stopped => NodeEvent::Stopped(end_time),
            };
        }
    }

    async fn run_node(
        node: &NodeInstance,
        exec_ctx: &ExecutionContext,
    ) -> crate::Result<ExecutionResult> {
        if let Some(timeout) = node.timeout {
            match tokio::time::timeout(timeout, node.node_type.execute(exec_ctx)).await {
                Ok(result) => result,
                Err(_) => Ok(ExecutionResult::failed("Timeout")),
            }
        } else {
            node.node_type.execute(exec_ctx).await
        }
    }
}

fn publish(
    ctx: &Arc<Context>,
    nid: &NodeId,
    event: GraphEvent,
) {
    if let Some(channel) = ctx.channel() {
        let _ = channel.event_queue().send(Event::new(&Message {
            rid: ctx.rid(),
            nid: nid.clone(),
            event,
        }));
    }
}
