//! Ready-made analyzer specs
//!
//! Each preset pairs a root locator with accept/descend predicates and takes
//! its tunables from [`AnalyzerConfig`].

use crate::analyzer::{AnalyzerSpec, RootLocator, SnapshotPolicy};
use crate::config::AnalyzerConfig;
use ts_core::identity::normalize_key_path;
use ts_core::walk::{always, descend_unless_guid_named, has_extension};
use ts_core::{EntryHandle, NodeRef};

fn descend_for(config: &AnalyzerConfig) -> fn(&EntryHandle) -> bool {
    if config.skip_guid_folders {
        descend_unless_guid_named
    } else {
        always
    }
}

/// Source files of one project
pub fn source_files(project: NodeRef, config: &AnalyzerConfig) -> AnalyzerSpec {
    AnalyzerSpec::new(RootLocator::Fixed(project))
        .accept(has_extension(&config.source_extensions))
        .descend(descend_for(config))
}

/// Files under a project's external dependencies folder
///
/// The folder is looked up on every refresh; until the host creates it the
/// analyzer stays empty.
pub fn external_dependencies(project: NodeRef, config: &AnalyzerConfig) -> AnalyzerSpec {
    AnalyzerSpec::new(RootLocator::ChildNamed {
        parent: project,
        name: config.external_dependencies_folder.clone(),
    })
    .accept(|entry: &EntryHandle| entry.is_resolved() && entry.canonical_name().is_some())
    .descend(descend_for(config))
}

/// Every occurrence of one document across the solution
///
/// Only reported once the document is shared by at least
/// `min_reference_scopes` projects.
pub fn document_references(solution_root: NodeRef, document: &str, config: &AnalyzerConfig) -> AnalyzerSpec {
    let target = normalize_key_path(document);
    AnalyzerSpec::new(RootLocator::Fixed(solution_root))
        .accept(move |entry: &EntryHandle| entry.canonical_name().is_some() && entry.key().path() == target)
        .descend(descend_for(config))
        .policy(SnapshotPolicy::min_distinct_scopes(config.min_reference_scopes))
}

/// Projects in the solution, loaded or not
pub fn projects(solution_root: NodeRef, config: &AnalyzerConfig) -> AnalyzerSpec {
    let is_project = move |entry: &EntryHandle| {
        entry
            .node()
            .is_some_and(|node| node.is_scope_root() && node != solution_root)
    };
    let descend = descend_for(config);

    AnalyzerSpec::new(RootLocator::Fixed(solution_root))
        .accept(is_project)
        // Project contents belong to other analyzers
        .descend(move |entry: &EntryHandle| !is_project(entry) && descend(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use std::sync::Arc;
    use ts_core::{EntityStore, FixtureTree, HostTree, MemoryHost};

    const FIXTURE: &str = r#"
name = "Engine"

[[items]]
name = "{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}"

[[items.items]]
name = "hidden.h"
path = "/src/hidden.h"

[[projects]]
name = "Core"
path = "/src/core/core.proj"

[[projects.items]]
name = "core.h"
path = "/src/core/core.h"

[[projects.items]]
name = "shared.h"
path = "/src/common/shared.h"

[[projects.items]]
name = "README.md"
path = "/src/core/README.md"

[[projects.items]]
name = "External Dependencies"

[[projects.items.items]]
name = "vector"
path = "/usr/include/c++/vector"

[[projects]]
name = "Game"
path = "/src/game/game.proj"

[[projects.items]]
name = "Source Files"

[[projects.items.items]]
name = "main.cpp"
path = "/src/game/main.cpp"

[[projects.items.items]]
name = "SHARED.H"
path = "/SRC/Common/shared.h"

[[projects]]
name = "Tools"
path = "/src/tools/tools.proj"
loaded = false
"#;

    fn host() -> Arc<MemoryHost> {
        let fixture: FixtureTree = toml::from_str(FIXTURE).unwrap();
        Arc::new(MemoryHost::from_fixture(&fixture))
    }

    fn run(host: &Arc<MemoryHost>, spec: AnalyzerSpec) -> Vec<String> {
        let mut analyzer = Analyzer::new("preset", EntityStore::new(), host.clone(), spec);
        analyzer.refresh().unwrap();
        analyzer.snapshot().iter().map(EntryHandle::name).collect()
    }

    #[test]
    fn test_source_files_filters_by_extension() {
        let host = host();
        let core = host.child_named(host.root(), "Core").unwrap();

        let names = run(&host, source_files(core, &AnalyzerConfig::default()));
        assert_eq!(names, ["core.h", "shared.h"]);
    }

    #[test]
    fn test_external_dependencies_lists_folder_files() {
        let host = host();
        let core = host.child_named(host.root(), "Core").unwrap();
        let game = host.child_named(host.root(), "Game").unwrap();
        let config = AnalyzerConfig::default();

        assert_eq!(run(&host, external_dependencies(core, &config)), ["vector"]);
        assert!(run(&host, external_dependencies(game, &config)).is_empty());
    }

    #[test]
    fn test_document_references_needs_enough_scopes() {
        let host = host();
        let mut config = AnalyzerConfig::default();

        let names = run(&host, document_references(host.root(), "/src/common/shared.h", &config));
        assert_eq!(names, ["shared.h", "SHARED.H"]);

        config.min_reference_scopes = 3;
        assert!(run(&host, document_references(host.root(), "/src/common/shared.h", &config)).is_empty());

        config.min_reference_scopes = 1;
        assert_eq!(run(&host, document_references(host.root(), "/src/core/core.h", &config)), ["core.h"]);
    }

    #[test]
    fn test_projects_include_unloaded() {
        let host = host();
        let names = run(&host, projects(host.root(), &AnalyzerConfig::default()));
        assert_eq!(names, ["Core", "Game", "Tools"]);
    }

    #[test]
    fn test_guid_folders_follow_config() {
        let host = host();
        let mut config = AnalyzerConfig::default();
        let everything = |config: &AnalyzerConfig| {
            AnalyzerSpec::new(RootLocator::HostRoot)
                .accept(has_extension(&["h"]))
                .descend(descend_for(config))
        };

        assert!(!run(&host, everything(&config)).contains(&"hidden.h".to_string()));
        config.skip_guid_folders = false;
        assert!(run(&host, everything(&config)).contains(&"hidden.h".to_string()));
    }
}
