//! Observer registry and tracked views
//!
//! A view keeps one forwarder task per tracked entry, so a state change on
//! any of them (a project unloading, a file going away) schedules another
//! debounced refresh. Subscriptions follow the analyzer's own deltas: added
//! entries are subscribed and removed entries dropped in the same pass.

use crate::analyzer::{Analyzer, Delta};
use crate::debounce::Debouncer;
use ahash::AHashMap;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use ts_core::{CoreError, StableKey};

/// Per-entry change forwarders, keyed by [`StableKey`]
pub struct ObserverRegistry {
    runtime: Handle,
    debouncer: Debouncer,
    observers: AHashMap<StableKey, JoinHandle<()>>,
}

impl ObserverRegistry {
    /// Forward entry changes into `debouncer`
    pub fn new(debouncer: Debouncer, runtime: Handle) -> Self {
        Self {
            runtime,
            debouncer,
            observers: AHashMap::new(),
        }
    }

    /// Subscribe added entries and drop removed ones
    pub fn apply(&mut self, delta: &Delta) {
        for entry in &delta.removed {
            if let Some(task) = self.observers.remove(entry.key()) {
                task.abort();
                trace!(key = %entry.key(), "stopped observing");
            }
        }

        for entry in &delta.added {
            if self.observers.contains_key(entry.key()) {
                continue;
            }

            let mut signals = entry.watch();
            let debouncer = self.debouncer.clone();
            let key = entry.key().clone();
            let task = self.runtime.spawn(async move {
                while signals.changed().await.is_ok() {
                    let signal = *signals.borrow_and_update();
                    trace!(%key, change = ?signal.change, "observed entry changed");
                    debouncer.schedule();
                    if signal.disposed {
                        break;
                    }
                }
            });
            self.observers.insert(entry.key().clone(), task);
        }
    }

    pub fn contains(&self, key: &StableKey) -> bool {
        self.observers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Stop every forwarder
    pub fn clear(&mut self) {
        for (_, task) in self.observers.drain() {
            task.abort();
        }
    }
}

impl Drop for ObserverRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Analyzer that refreshes itself when its inputs change
///
/// Triggers are deltas of followed upstream analyzers and state changes of
/// the entries it currently tracks; both go through one debouncer.
pub struct TrackedView {
    runtime: Handle,
    analyzer: Analyzer,
    observers: ObserverRegistry,
    debouncer: Debouncer,
    ready: mpsc::UnboundedReceiver<()>,
    followers: Vec<JoinHandle<()>>,
}

impl TrackedView {
    pub fn new(analyzer: Analyzer, delay: Duration, runtime: Handle) -> Self {
        let (debouncer, ready) = Debouncer::new(delay, runtime.clone());
        Self {
            runtime: runtime.clone(),
            analyzer,
            observers: ObserverRegistry::new(debouncer.clone(), runtime),
            debouncer,
            ready,
            followers: Vec::new(),
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Debouncer feeding this view; `schedule()` requests a refresh
    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Refresh whenever `upstream` publishes a delta
    pub fn follow(&mut self, mut upstream: broadcast::Receiver<Delta>) {
        let debouncer = self.debouncer.clone();
        let view = self.analyzer.name().to_string();
        let task = self.runtime.spawn(async move {
            loop {
                match upstream.recv().await {
                    Ok(_) => debouncer.schedule(),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(%view, missed, "upstream deltas lagged");
                        debouncer.schedule();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(%view, "upstream closed");
        });
        self.followers.push(task);
    }

    /// Refresh now and resubscribe to the changed entries
    pub fn refresh(&mut self) -> Result<Option<Delta>, CoreError> {
        let delta = self.analyzer.refresh()?;
        if let Some(delta) = &delta {
            self.observers.apply(delta);
        }
        Ok(delta)
    }

    /// Wait for debounced triggers until a refresh changes something
    pub async fn next_delta(&mut self) -> Result<Option<Delta>, CoreError> {
        while self.ready.recv().await.is_some() {
            if let Some(delta) = self.refresh()? {
                return Ok(Some(delta));
            }
        }
        Ok(None)
    }
}

impl Drop for TrackedView {
    fn drop(&mut self) {
        for task in self.followers.drain(..) {
            task.abort();
        }
    }
}
