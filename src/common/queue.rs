//! Message queues for inter-component communication.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{AgentflowError, Result};

/// Bounded MPMC queue where each message is consumed by exactly one
/// receiver. Used for run command queues. Backed by flume.
#[derive(Clone)]
pub struct Queue<T> {
    receiver: Arc<flume::Receiver<T>>,
    sender: Arc<flume::Sender<T>>,
}

#[allow(unused)]
impl<T> Queue<T> {
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, rx) = flume::bounded(cap);

        Arc::new(Self {
            receiver: Arc::new(rx),
            sender: Arc::new(tx),
        })
    }

    pub fn send(
        &self,
        msg: T,
    ) -> Result<()> {
        self.sender.send(msg).map_err(|e| AgentflowError::Queue(e.to_string()))
    }

    /// Blocking receive; returns `None` when all senders are gone.
    pub fn next(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Async receive; returns `None` when all senders are gone.
    pub async fn next_async(&self) -> Option<T> {
        self.receiver.recv_async().await.ok()
    }
}

/// One-to-many broadcast queue; every subscriber sees every message.
/// Backed by tokio's broadcast channel.
#[derive(Clone)]
pub struct BroadcastQueue<T> {
    sender: Arc<broadcast::Sender<T>>,
}

impl<T: Clone> BroadcastQueue<T> {
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(cap);

        Arc::new(Self {
            sender: Arc::new(tx),
        })
    }

    /// Send to all current subscribers. Sending with no subscribers is not
    /// an error here; events emitted before anyone listens are dropped.
    pub fn send(
        &self,
        msg: T,
    ) -> Result<()> {
        let _ = self.sender.send(msg);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}
