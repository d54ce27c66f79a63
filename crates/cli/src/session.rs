//! Engine setup shared by the commands
//!
//! A session is one fixture-backed host, one entity store and the analyzers
//! built over it from the configuration.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ts_core::walk::is_guid_name;
use ts_core::{EntityStore, HostTree, MemoryHost, NodeRef};
use watcher::config::AnalyzerConfig;
use watcher::{load_fixture, presets, Analyzer, WatchConfig};

pub struct Session {
    pub config: WatchConfig,
    pub host: Arc<MemoryHost>,
    pub store: EntityStore,
    pub analyzers: Vec<Analyzer>,
}

impl Session {
    /// Load config and fixture, then build the analyzers
    ///
    /// Every project gets a source-file and an external-dependency analyzer
    /// (or only `project`, when given); `document` adds a reference analyzer.
    pub fn open(config_path: &Path, fixture_path: &Path, project: Option<&str>, document: Option<&str>) -> Result<Self> {
        let config = WatchConfig::load(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?;

        let fixture = load_fixture(fixture_path)?;
        let host = Arc::new(MemoryHost::from_fixture(&fixture));
        let store = EntityStore::new();

        let analyzers = build_analyzers(&host, &store, &config.analyzers, project, document)?;
        debug!(analyzers = analyzers.len(), nodes = host.len(), "Session ready");

        Ok(Self {
            config,
            host,
            store,
            analyzers,
        })
    }
}

fn build_analyzers(
    host: &Arc<MemoryHost>,
    store: &EntityStore,
    config: &AnalyzerConfig,
    project: Option<&str>,
    document: Option<&str>,
) -> Result<Vec<Analyzer>> {
    let shared: Arc<dyn HostTree> = host.clone();
    let root = host.root();

    let mut analyzers = vec![Analyzer::new(
        "projects",
        store.clone(),
        shared.clone(),
        presets::projects(root, config),
    )];

    let mut projects = find_projects(host.as_ref());
    if let Some(wanted) = project {
        projects.retain(|(name, _)| name.eq_ignore_ascii_case(wanted));
        if projects.is_empty() {
            anyhow::bail!("No project named '{}' in fixture", wanted);
        }
    }

    for (name, node) in projects {
        analyzers.push(Analyzer::new(
            format!("sources:{name}"),
            store.clone(),
            shared.clone(),
            presets::source_files(node, config),
        ));
        analyzers.push(Analyzer::new(
            format!("dependencies:{name}"),
            store.clone(),
            shared.clone(),
            presets::external_dependencies(node, config),
        ));
    }

    if let Some(document) = document {
        analyzers.push(Analyzer::new(
            "references",
            store.clone(),
            shared,
            presets::document_references(root, document, config),
        ));
    }

    Ok(analyzers)
}

/// Projects in walk order, looking through solution folders
fn find_projects(host: &dyn HostTree) -> Vec<(String, NodeRef)> {
    let root = host.root();
    let mut projects = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if node != root {
            let name = match host.name(node) {
                Ok(name) => name,
                Err(e) => {
                    warn!("Skipping {}: {}", node, e);
                    continue;
                }
            };
            // Project contents are left to the per-project analyzers
            if node.is_scope_root() {
                projects.push((name, node));
                continue;
            }
            if is_guid_name(&name) {
                continue;
            }
        }

        match host.children(node) {
            Ok(children) => stack.extend(children.into_iter().rev()),
            Err(e) => warn!("Skipping children of {}: {}", node, e),
        }
    }

    projects
}
