mod channel;
mod context;
mod run;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use context::{Context, ExecutionContext, FlowInvoker, RunId};
pub use run::{FlowRun, RunCommand, RunOptions, RunOutcome};
