//! Refresh loop
//!
//! Host change notifications arrive as [`ChangeSignal`]s from any thread.
//! The loop routes them through one debouncer and, once the host has been
//! quiet, refreshes every analyzer in order and forwards the non-empty
//! deltas. An optional reconcile interval forces a refresh even when no
//! signal came in, to recover from notifications the host never sent.

use crate::analyzer::{Analyzer, Delta};
use crate::config::WatchConfig;
use crate::debounce::Debouncer;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};
use ts_core::CoreError;

/// "Something in the host tree changed"
///
/// Carries no payload: every signal means the same thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSignal;

/// Delta tagged with the analyzer that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedDelta {
    pub analyzer: String,
    pub delta: Delta,
}

/// Debounced driver for a set of analyzers
pub struct RefreshLoop {
    analyzers: Vec<Analyzer>,
    delay: Duration,
    reconcile: Option<Duration>,
}

impl RefreshLoop {
    pub fn new(delay: Duration) -> Self {
        Self {
            analyzers: Vec::new(),
            delay,
            reconcile: None,
        }
    }

    /// Debounce and reconcile settings from `config`
    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.debounce_delay()).reconcile_every(config.reconcile_interval())
    }

    /// Force a refresh every `period` (`None` disables)
    pub fn reconcile_every(mut self, period: Option<Duration>) -> Self {
        self.reconcile = period;
        self
    }

    pub fn push(&mut self, analyzer: Analyzer) {
        self.analyzers.push(analyzer);
    }

    pub fn with_analyzer(mut self, analyzer: Analyzer) -> Self {
        self.push(analyzer);
        self
    }

    pub fn analyzers(&self) -> &[Analyzer] {
        &self.analyzers
    }

    /// Refresh every analyzer once, in order
    pub fn refresh_all(&mut self) -> Result<Vec<NamedDelta>, CoreError> {
        let mut deltas = Vec::new();
        for analyzer in &mut self.analyzers {
            if let Some(delta) = analyzer.refresh()? {
                deltas.push(NamedDelta {
                    analyzer: analyzer.name().to_string(),
                    delta,
                });
            }
        }
        debug!(analyzers = self.analyzers.len(), changed = deltas.len(), "refresh pass complete");
        Ok(deltas)
    }

    /// Run until the signal channel closes or the delta consumer goes away
    ///
    /// An initial refresh runs immediately. A protocol violation stops the
    /// loop with an error.
    pub async fn run(mut self, mut signals: mpsc::Receiver<ChangeSignal>, out: mpsc::Sender<NamedDelta>) -> Result<()> {
        let (debouncer, mut ready) = Debouncer::new(self.delay, Handle::current());
        let mut reconcile = self.reconcile.map(|period| {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        info!(
            analyzers = self.analyzers.len(),
            delay = ?self.delay,
            reconcile = ?self.reconcile,
            "Starting refresh loop"
        );

        if !self.publish(&out).await? {
            return Ok(());
        }

        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(ChangeSignal) => debouncer.schedule(),
                    None => {
                        // Don't drop a change that is still settling
                        if debouncer.is_pending() {
                            self.publish(&out).await?;
                        }
                        info!("Change source closed; stopping refresh loop");
                        break;
                    }
                },
                Some(()) = ready.recv() => {
                    if !self.publish(&out).await? {
                        break;
                    }
                }
                () = tick(&mut reconcile) => {
                    debug!("Periodic reconciliation");
                    if !self.publish(&out).await? {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Refresh and forward; `false` once nobody receives deltas
    async fn publish(&mut self, out: &mpsc::Sender<NamedDelta>) -> Result<bool> {
        let deltas = self.refresh_all().context("Refresh aborted")?;
        for named in deltas {
            info!(
                analyzer = %named.analyzer,
                added = named.delta.added.len(),
                removed = named.delta.removed.len(),
                "Delta"
            );
            if out.send(named).await.is_err() {
                info!("Delta consumer gone; stopping refresh loop");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
