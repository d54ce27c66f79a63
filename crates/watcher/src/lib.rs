//! Incremental views over a host tree
//!
//! This crate provides:
//! - Differencing analyzers that re-walk part of the tree and publish only
//!   the added/removed entries
//! - Analyzer presets (source files, external dependencies, shared documents)
//! - Trailing-edge debouncing of host change notifications
//! - Tracked views that refresh when their entries or upstream analyzers change
//! - A refresh loop with optional periodic reconciliation
//! - A `notify`-based change source for fixture-backed hosts

pub mod analyzer;
pub mod config;
pub mod debounce;
pub mod fixture;
pub mod pipeline;
pub mod presets;
pub mod view;

pub use analyzer::{Analyzer, AnalyzerSpec, Delta, RootLocator, SnapshotPolicy};
pub use config::{AnalyzerConfig, ConfigError, WatchConfig};
pub use debounce::Debouncer;
pub use fixture::{load_fixture, FixtureWatcher};
pub use pipeline::{ChangeSignal, NamedDelta, RefreshLoop};
pub use view::{ObserverRegistry, TrackedView};
