//! Trailing-edge debouncing
//!
//! Collapses bursts of "something changed" notifications into a single
//! refresh once the host has been quiet for a fixed delay.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// The one pending delayed task, shared by all clones
#[derive(Default)]
struct Pending {
    /// Bumped by every `schedule()`; a task only fires if it still matches
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Trailing-edge debouncer
///
/// Each [`Debouncer::schedule`] supersedes the pending delayed task. When the
/// delay elapses without another call, exactly one `()` is sent on the ready
/// channel. There is no flush or cancel: the only way to affect a pending
/// firing is to schedule again.
#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    runtime: Handle,
    ready: mpsc::UnboundedSender<()>,
    pending: Arc<Mutex<Pending>>,
}

impl Debouncer {
    /// Create a debouncer and the receiver its firings arrive on
    pub fn new(delay: Duration, runtime: Handle) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (ready, ready_rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            delay,
            runtime,
            ready,
            pending: Arc::new(Mutex::new(Pending::default())),
        };
        (debouncer, ready_rx)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)start the quiet window
    ///
    /// Never fires synchronously. Safe to call from any thread.
    pub fn schedule(&self) {
        let mut pending = self.pending.lock();
        pending.generation = pending.generation.wrapping_add(1);
        let generation = pending.generation;

        if let Some(task) = pending.task.take() {
            task.abort();
        }

        let slot = Arc::clone(&self.pending);
        let ready = self.ready.clone();
        let delay = self.delay;
        pending.task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut pending = slot.lock();
                // An abort can lose the race against a finished sleep
                if pending.generation != generation {
                    return;
                }
                pending.task = None;
            }

            trace!(generation, "debounce window elapsed");
            // Receiver gone means nobody is listening any more
            let _ = ready.send(());
        }));
    }

    /// Whether a firing is currently pending
    pub fn is_pending(&self) -> bool {
        self.pending.lock().task.is_some()
    }
}
