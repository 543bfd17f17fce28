//! Cooperative shutdown signal shared between the dispatcher, the run
//! context and in-flight node tasks.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::Notify;

struct Inner {
    terminated: AtomicBool,
    notify: Notify,
}

/// A one-shot, multi-listener termination signal.
///
/// `wait()` futures created before or after `shutdown()` both resolve; the
/// flag is checked again after every wakeup so late subscribers never hang.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                terminated: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Trip the signal. Idempotent.
    pub fn shutdown(&self) {
        self.inner.terminated.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// A future resolving once the signal trips.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let inner = self.inner.clone();
        async move {
            loop {
                if inner.terminated.load(Ordering::SeqCst) {
                    return;
                }
                let notified = inner.notify.notified();
                if inner.terminated.load(Ordering::SeqCst) {
                    return;
                }
                notified.await;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
