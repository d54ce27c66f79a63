//! Watch configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file
//! at all) yields a working configuration:
//!
//! ```toml
//! [debounce]
//! delay_ms = 250
//!
//! [reconcile]
//! interval_secs = 0   # 0 = disabled
//!
//! [analyzers]
//! source_extensions = ["h", "hpp", "cpp"]
//! min_reference_scopes = 2
//! skip_guid_folders = true
//! external_dependencies_folder = "External Dependencies"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading/validation failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{key} = {value} is out of range ({range})")]
    Invalid {
        key: &'static str,
        value: String,
        range: &'static str,
    },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub debounce: DebounceConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub analyzers: AnalyzerConfig,
}

/// Change coalescing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Quiet window before a refresh runs (default: 250ms)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
        }
    }
}

/// Periodic forced refresh, for notifications the host never sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Seconds between forced refreshes (0 = disabled)
    #[serde(default)]
    pub interval_secs: u64,
}

/// Analyzer presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Extensions (no dot) accepted as source files
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,

    /// Owning scopes a document needs before it counts as shared
    #[serde(default = "default_min_reference_scopes")]
    pub min_reference_scopes: usize,

    /// Skip GUID-named virtual folders while walking
    #[serde(default = "default_true")]
    pub skip_guid_folders: bool,

    /// Folder holding a project's external dependencies
    #[serde(default = "default_external_dependencies_folder")]
    pub external_dependencies_folder: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            source_extensions: default_source_extensions(),
            min_reference_scopes: default_min_reference_scopes(),
            skip_guid_folders: true,
            external_dependencies_folder: default_external_dependencies_folder(),
        }
    }
}

fn default_delay_ms() -> u64 {
    250
}

fn default_source_extensions() -> Vec<String> {
    ["h", "hpp", "cpp", "c", "cc", "cxx", "hxx", "inl"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_min_reference_scopes() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_external_dependencies_folder() -> String {
    "External Dependencies".to_string()
}

impl WatchConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: WatchConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(10..=60_000).contains(&self.debounce.delay_ms) {
            return Err(ConfigError::Invalid {
                key: "debounce.delay_ms",
                value: self.debounce.delay_ms.to_string(),
                range: "10-60000",
            });
        }

        let interval = self.reconcile.interval_secs;
        if interval != 0 && !(1..=86_400).contains(&interval) {
            return Err(ConfigError::Invalid {
                key: "reconcile.interval_secs",
                value: interval.to_string(),
                range: "0 or 1-86400",
            });
        }

        if self.analyzers.min_reference_scopes == 0 {
            return Err(ConfigError::Invalid {
                key: "analyzers.min_reference_scopes",
                value: "0".to_string(),
                range: ">= 1",
            });
        }

        if self.analyzers.source_extensions.iter().any(|e| e.trim_start_matches('.').is_empty()) {
            return Err(ConfigError::Invalid {
                key: "analyzers.source_extensions",
                value: format!("{:?}", self.analyzers.source_extensions),
                range: "non-empty extensions",
            });
        }

        Ok(())
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce.delay_ms)
    }

    /// Forced refresh period, `None` when disabled
    pub fn reconcile_interval(&self) -> Option<Duration> {
        match self.reconcile.interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
