//! Fixture-backed host change source
//!
//! Watches a TOML fixture file with `notify`. Every write reloads the
//! [`MemoryHost`] in place and sends one [`ChangeSignal`]; the refresh loop's
//! debouncer absorbs the bursts editors produce when saving.

use crate::pipeline::ChangeSignal;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use ts_core::{FixtureTree, MemoryHost};

/// Read and parse a fixture file
pub fn load_fixture(path: &Path) -> Result<FixtureTree> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse fixture {}", path.display()))
}

/// Whether `event` is a content change of `fixture`
fn touches_fixture(event: &Event, fixture: &Path) -> bool {
    let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
    relevant && event.paths.iter().any(|p| p.file_name() == fixture.file_name())
}

/// Keeps a `MemoryHost` in sync with a fixture file
///
/// Watching stops when this value is dropped.
pub struct FixtureWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FixtureWatcher {
    /// Start watching `path`
    ///
    /// The parent directory is watched, since editors often replace the
    /// file instead of writing it in place.
    pub fn spawn(path: &Path, host: Arc<MemoryHost>, signals: mpsc::Sender<ChangeSignal>) -> Result<Self> {
        let path = std::path::absolute(path)
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .context("Fixture path has no parent directory")?;

        let fixture = path.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("Fixture watch error: {}", e);
                    return;
                }
            };
            if !touches_fixture(&event, &fixture) {
                return;
            }

            match load_fixture(&fixture) {
                Ok(tree) => {
                    host.load_fixture(&tree);
                    debug!(nodes = host.len(), "Fixture reloaded");
                    // Runs on the notify thread, outside the runtime
                    if signals.blocking_send(ChangeSignal).is_err() {
                        debug!("Refresh loop gone; ignoring fixture change");
                    }
                }
                // Half-written file; the next event brings the rest
                Err(e) => warn!("Skipping fixture reload: {:#}", e),
            }
        })
        .context("Failed to create fixture watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        info!("Watching fixture {}", path.display());

        Ok(Self {
            path,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
