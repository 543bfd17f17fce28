//! One invocation of a flow: the suspend/resume state machine handed back
//! to the host.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::{runtime::Runtime, sync::watch};

use crate::{
    AgentflowError, Result,
    common::{Queue, Vars},
    config::FailurePolicy,
    dispatcher::Dispatcher,
    events::{FlowEvent, GraphEvent},
    flow::{FlowGraph, node::NodeId, nodes::NodeTypeRegistry},
    model::FlowModel,
    runtime::{Channel, ChannelEvent, ChannelOptions, Context, FlowInvoker, RunId},
    utils,
};

const COMMAND_QUEUE_SIZE: usize = 100;

/// Commands accepted by a live run.
#[derive(Debug, Clone)]
pub enum RunCommand {
    Start,
    /// User-action callback for a suspended interface node.
    Resume {
        nid: NodeId,
        action: String,
        payload: Value,
    },
    Abort,
}

/// Settled state of a run, serialized back through the host transport.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// An interface node rendered; the run waits for one of `actions`.
    Suspended {
        node: NodeId,
        render: Vars,
        actions: Vec<String>,
    },
    Succeeded {
        output: Vars,
    },
    Failed {
        error: String,
        /// Best-effort output of the failing node.
        output: Vars,
    },
    Aborted {
        reason: String,
    },
}

impl RunOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunOutcome::Suspended { .. })
    }
}

/// Construction options for a run.
pub struct RunOptions {
    /// Trigger argument bag (the tool-call arguments).
    pub inputs: Vars,
    /// Sub-flow nesting depth of this run.
    pub depth: u32,
    pub max_call_depth: u32,
    pub failure_policy: FailurePolicy,
    pub invoker: Option<Arc<dyn FlowInvoker>>,
}

/// A single flow invocation.
///
/// The run object outlives the render/resume round trip of interface nodes:
/// the host keeps it (via the engine's run cache) between the initial call
/// and the action callback.
pub struct FlowRun {
    id: RunId,
    fid: String,
    dispatcher: Arc<Dispatcher>,
    command_queue: Arc<Queue<RunCommand>>,
    channel: Arc<Channel>,
    outcome: watch::Sender<Option<RunOutcome>>,
}

impl std::fmt::Debug for FlowRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRun")
            .field("id", &self.id)
            .field("fid", &self.fid)
            .finish_non_exhaustive()
    }
}

impl FlowRun {
    pub(crate) fn new(
        model: &FlowModel,
        registry: &NodeTypeRegistry,
        channel: Arc<Channel>,
        runtime: Arc<Runtime>,
        options: RunOptions,
    ) -> Result<Arc<FlowRun>> {
        let rid = utils::longid();

        let graph = FlowGraph::build(model, registry)?;
        let command_queue = Queue::new(COMMAND_QUEUE_SIZE);

        let mut ctx = Context::new(rid.clone(), model.id.clone()).with_inputs(options.inputs).with_channel(channel.clone());
        if let Some(invoker) = options.invoker {
            ctx = ctx.with_invoker(invoker, options.depth, options.max_call_depth);
        }
        model.env.iter().for_each(|(k, v)| ctx.env().set(k.clone(), v.clone()));

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(ctx),
            Arc::new(graph),
            command_queue.clone(),
            runtime.clone(),
            options.failure_policy,
        ));

        let (outcome, _) = watch::channel(None);

        Ok(Arc::new(FlowRun {
            id: rid,
            fid: model.id.clone(),
            dispatcher,
            command_queue,
            channel,
            outcome,
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fid(&self) -> &str {
        &self.fid
    }

    pub fn start(&self) {
        self.dispatcher.start();

        let dispatcher = self.dispatcher.clone();
        let outcome = self.outcome.clone();

        ChannelEvent::channel(self.channel.clone(), ChannelOptions::with_rid(self.id.to_owned())).on_event(move |event| {
            let GraphEvent::Flow(e) = &event.event else {
                return;
            };
            match e {
                FlowEvent::Suspended(s) => {
                    let _ = outcome.send(Some(RunOutcome::Suspended {
                        node: s.nid.clone(),
                        render: s.render.clone(),
                        actions: s.actions.clone(),
                    }));
                }
                FlowEvent::Succeeded(s) => {
                    let _ = outcome.send(Some(RunOutcome::Succeeded {
                        output: s.output.clone(),
                    }));
                    dispatcher.stop();
                }
                FlowEvent::Failed(f) => {
                    let _ = outcome.send(Some(RunOutcome::Failed {
                        error: f.error.clone(),
                        output: f.output.clone(),
                    }));
                    dispatcher.stop();
                }
                FlowEvent::Aborted(a) => {
                    let _ = outcome.send(Some(RunOutcome::Aborted {
                        reason: a.reason.clone(),
                    }));
                    dispatcher.stop();
                }
                FlowEvent::Start(_) => {}
            }
        });

        let _ = self.command_queue.send(RunCommand::Start);
    }

    /// Deliver a user action for the suspended interface node and resume
    /// dispatch from its matching action edge.
    pub fn resume(
        &self,
        nid: &str,
        action: &str,
        payload: Value,
    ) -> Result<()> {
        match self.outcome.borrow().as_ref() {
            Some(RunOutcome::Suspended { .. }) => {}
            _ => return Err(AgentflowError::Run(format!("run '{}' is not suspended", self.id))),
        }
        let _ = self.outcome.send(None);
        self.command_queue.send(RunCommand::Resume {
            nid: nid.to_string(),
            action: action.to_string(),
            payload,
        })
    }

    pub fn abort(&self) {
        let _ = self.command_queue.send(RunCommand::Abort);
    }

    /// The current settled state, if any.
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait until the run settles (suspends or terminates).
    pub async fn wait(&self) -> RunOutcome {
        let mut rx = self.outcome.subscribe();
        match rx.wait_for(|o| o.is_some()).await {
            Ok(guard) => guard.clone().expect("checked by wait_for"),
            Err(_) => RunOutcome::Aborted {
                reason: "run outcome channel closed".to_string(),
            },
        }
    }

    /// All node outputs collected so far, keyed by slug.
    pub fn outputs(&self) -> Vars {
        self.dispatcher.outputs()
    }

    pub fn is_complete(&self) -> bool {
        self.dispatcher.is_complete()
    }
}
