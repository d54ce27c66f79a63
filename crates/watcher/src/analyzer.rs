//! Differencing analyzer
//!
//! An analyzer owns one named snapshot ("source files of project X"). Each
//! refresh re-walks its part of the host tree, diffs the accepted entries
//! against the previous snapshot by [`StableKey`], and publishes only the
//! added/removed delta.

use ahash::AHashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use ts_core::walk::always;
use ts_core::{
    collect_items_recursive, CoreError, EntityStore, EntryHandle, HostError, HostTree, NodeRef, Predicate, ScopeId,
    StableKey,
};

/// Capacity of each analyzer's delta channel
const DELTA_CHANNEL_CAPACITY: usize = 64;

/// Where an analyzer's walk starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootLocator {
    /// The host root
    HostRoot,
    /// A known node
    Fixed(NodeRef),
    /// A direct child of `parent`, matched by display name (case-insensitive)
    ChildNamed { parent: NodeRef, name: String },
}

impl RootLocator {
    /// Find the root node, `None` when it is not (or no longer) in the tree
    pub fn locate(&self, host: &dyn HostTree) -> Result<Option<NodeRef>, HostError> {
        match self {
            RootLocator::HostRoot => Ok(Some(host.root())),
            RootLocator::Fixed(node) => Ok(host.contains(*node).then_some(*node)),
            RootLocator::ChildNamed { parent, name } => {
                if !host.contains(*parent) {
                    return Ok(None);
                }
                for child in host.children(*parent)? {
                    if host.name(child)?.eq_ignore_ascii_case(name) {
                        return Ok(Some(child));
                    }
                }
                Ok(None)
            }
        }
    }
}

/// Threshold applied to a fresh snapshot before diffing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Fewer distinct owning scopes than this empties the snapshot (0 = off)
    pub min_distinct_scopes: usize,
}

impl SnapshotPolicy {
    pub fn min_distinct_scopes(min: usize) -> Self {
        Self {
            min_distinct_scopes: min,
        }
    }

    /// Whether `entries` pass the threshold
    pub fn admits(&self, entries: &[EntryHandle]) -> bool {
        if self.min_distinct_scopes == 0 {
            return true;
        }
        let scopes: AHashSet<ScopeId> = entries.iter().map(|e| e.key().scope()).collect();
        scopes.len() >= self.min_distinct_scopes
    }
}

/// Fixed inputs of an analyzer
#[derive(Clone)]
pub struct AnalyzerSpec {
    pub root: RootLocator,
    pub accept: Arc<Predicate>,
    pub descend: Arc<Predicate>,
    pub policy: SnapshotPolicy,
}

impl AnalyzerSpec {
    /// Accept and descend into everything under `root`
    pub fn new(root: RootLocator) -> Self {
        Self {
            root,
            accept: Arc::new(always),
            descend: Arc::new(always),
            policy: SnapshotPolicy::default(),
        }
    }

    pub fn accept(mut self, accept: impl Fn(&EntryHandle) -> bool + Send + Sync + 'static) -> Self {
        self.accept = Arc::new(accept);
        self
    }

    pub fn descend(mut self, descend: impl Fn(&EntryHandle) -> bool + Send + Sync + 'static) -> Self {
        self.descend = Arc::new(descend);
        self
    }

    pub fn policy(mut self, policy: SnapshotPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl fmt::Debug for AnalyzerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerSpec")
            .field("root", &self.root)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Difference between two consecutive snapshots
///
/// `added` and `removed` never share a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub added: Vec<EntryHandle>,
    pub removed: Vec<EntryHandle>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Total number of changed entries
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Named, incrementally refreshed subset of the host tree
pub struct Analyzer {
    name: String,
    store: EntityStore,
    host: Arc<dyn HostTree>,
    spec: AnalyzerSpec,
    /// Accepted entries in walk order, unique by key
    snapshot: Vec<EntryHandle>,
    deltas: broadcast::Sender<Delta>,
}

impl Analyzer {
    pub fn new(name: impl Into<String>, store: EntityStore, host: Arc<dyn HostTree>, spec: AnalyzerSpec) -> Self {
        let (deltas, _) = broadcast::channel(DELTA_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            store,
            host,
            spec,
            snapshot: Vec::new(),
            deltas,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current snapshot, in walk order
    pub fn snapshot(&self) -> &[EntryHandle] {
        &self.snapshot
    }

    pub fn spec(&self) -> &AnalyzerSpec {
        &self.spec
    }

    /// Receive every non-empty delta published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Delta> {
        self.deltas.subscribe()
    }

    /// Re-walk, diff and publish
    ///
    /// Returns the delta when something changed. A missing root leaves the
    /// snapshot untouched. Host failures only shrink the walk; a protocol
    /// violation aborts the refresh before the snapshot is replaced.
    pub fn refresh(&mut self) -> Result<Option<Delta>, CoreError> {
        // 1. Locate the root
        let root = match self.spec.root.locate(self.host.as_ref()) {
            Ok(Some(root)) => root,
            Ok(None) => {
                debug!(analyzer = %self.name, root = ?self.spec.root, "root not found; snapshot retained");
                return Ok(None);
            }
            Err(err) => {
                warn!(analyzer = %self.name, error = %err, "failed to locate root; snapshot retained");
                return Ok(None);
            }
        };

        // 2. Walk into a fresh snapshot
        let mut fresh = Vec::new();
        let mut seen: AHashSet<StableKey> = AHashSet::new();
        let walk = collect_items_recursive(
            &self.store,
            self.host.as_ref(),
            root,
            self.spec.accept.as_ref(),
            self.spec.descend.as_ref(),
        );
        for entry in walk {
            let entry = entry?;
            if seen.insert(entry.key().clone()) {
                fresh.push(entry);
            }
        }

        // 3. Apply the threshold
        if !self.spec.policy.admits(&fresh) {
            debug!(analyzer = %self.name, found = fresh.len(), "below threshold; snapshot emptied");
            fresh.clear();
            seen.clear();
        }

        // 4. Diff by key
        let previous: AHashSet<&StableKey> = self.snapshot.iter().map(EntryHandle::key).collect();
        let delta = Delta {
            added: fresh.iter().filter(|e| !previous.contains(e.key())).cloned().collect(),
            removed: self.snapshot.iter().filter(|e| !seen.contains(e.key())).cloned().collect(),
        };

        // 5. Retire removed entries whose node left the host
        for entry in &delta.removed {
            self.store.retire_if_gone(self.host.as_ref(), entry.id())?;
        }

        // 6. Replace the snapshot, even when nothing changed
        self.snapshot = fresh;

        // 7. Publish
        if delta.is_empty() {
            debug!(analyzer = %self.name, size = self.snapshot.len(), "refresh: no changes");
            return Ok(None);
        }
        info!(
            analyzer = %self.name,
            added = delta.added.len(),
            removed = delta.removed.len(),
            size = self.snapshot.len(),
            "snapshot changed"
        );
        // No subscribers is fine
        let _ = self.deltas.send(delta.clone());
        Ok(Some(delta))
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("snapshot", &self.snapshot.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ts_core::walk::has_extension;
    use ts_core::{HostKind, MemoryHost};

    fn names(entries: &[EntryHandle]) -> Vec<String> {
        entries.iter().map(EntryHandle::name).collect()
    }

    fn source_analyzer(host: &Arc<MemoryHost>, root: NodeRef) -> Analyzer {
        let spec = AnalyzerSpec::new(RootLocator::Fixed(root)).accept(has_extension(&["h", "hpp", "cpp"]));
        Analyzer::new("sources", EntityStore::new(), host.clone(), spec)
    }

    #[test]
    fn test_add_and_remove_scenario() {
        let host = Arc::new(MemoryHost::new("Solution"));
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        let a = host.add_item(project, "A.h", Some("/src/app/A.h"));
        host.add_item(project, "B.txt", Some("/src/app/B.txt"));
        let mut analyzer = source_analyzer(&host, project);

        let first = analyzer.refresh().unwrap().unwrap();
        assert_eq!(names(&first.added), ["A.h"]);
        assert!(first.removed.is_empty());
        let a_entry = first.added[0].clone();

        host.add_item(project, "C.cpp", Some("/src/app/C.cpp"));
        host.remove_node(a);

        let second = analyzer.refresh().unwrap().unwrap();
        assert_eq!(names(&second.added), ["C.cpp"]);
        assert_eq!(second.removed, vec![a_entry.clone()]);
        assert_eq!(names(analyzer.snapshot()), ["C.cpp"]);

        // Removed and gone from the host: retired
        assert!(a_entry.is_invalidated());
        assert!(a_entry.is_disposed());
    }

    #[test]
    fn test_refresh_without_host_change_is_empty() {
        let host = Arc::new(MemoryHost::new("Solution"));
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        host.add_item(project, "main.cpp", Some("/src/app/main.cpp"));
        let mut analyzer = source_analyzer(&host, project);

        assert!(analyzer.refresh().unwrap().is_some());
        assert!(analyzer.refresh().unwrap().is_none());
        assert!(analyzer.refresh().unwrap().is_none());
        assert_eq!(analyzer.snapshot().len(), 1);
    }

    #[test]
    fn test_delta_is_a_pure_set_difference() {
        let host = Arc::new(MemoryHost::new("Solution"));
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        let keep = host.add_item(project, "keep.h", Some("/src/app/keep.h"));
        let dropped = host.add_item(project, "drop.h", Some("/src/app/drop.h"));
        let mut analyzer = source_analyzer(&host, project);
        analyzer.refresh().unwrap();
        let old: Vec<_> = analyzer.snapshot().to_vec();

        host.remove_node(dropped);
        host.add_item(project, "new.cpp", Some("/src/app/new.cpp"));
        let delta = analyzer.refresh().unwrap().unwrap();

        let added: AHashSet<_> = delta.added.iter().map(|e| e.key().clone()).collect();
        let removed: AHashSet<_> = delta.removed.iter().map(|e| e.key().clone()).collect();
        assert!(added.is_disjoint(&removed));

        let mut expected: AHashSet<_> = old.iter().map(|e| e.key().clone()).collect();
        expected.retain(|k| !removed.contains(k));
        expected.extend(added);
        let actual: AHashSet<_> = analyzer.snapshot().iter().map(|e| e.key().clone()).collect();
        assert_eq!(actual, expected);
        assert!(host.contains(keep));
    }

    #[test]
    fn test_missing_root_keeps_snapshot() {
        let host = Arc::new(MemoryHost::new("Solution"));
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        let deps = host.add_folder(project, "External Dependencies");
        host.add_item(deps, "vector", Some("/usr/include/c++/vector"));

        let spec = AnalyzerSpec::new(RootLocator::ChildNamed {
            parent: project,
            name: "external dependencies".to_string(),
        });
        let mut analyzer = Analyzer::new("deps", EntityStore::new(), host.clone(), spec);
        assert!(analyzer.refresh().unwrap().is_some());
        let before = analyzer.snapshot().to_vec();

        host.remove_node(deps);
        assert!(analyzer.refresh().unwrap().is_none());
        assert_eq!(analyzer.snapshot(), before.as_slice());
    }

    #[test]
    fn test_threshold_empties_snapshot() {
        let host = Arc::new(MemoryHost::new("Solution"));
        let app = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        host.add_item(app, "shared.h", Some("/src/shared.h"));
        let accept = |e: &EntryHandle| e.name() == "shared.h";
        let spec = AnalyzerSpec::new(RootLocator::HostRoot)
            .accept(accept)
            .policy(SnapshotPolicy::min_distinct_scopes(2));
        let mut analyzer = Analyzer::new("refs", EntityStore::new(), host.clone(), spec);

        // One owning scope
        assert!(analyzer.refresh().unwrap().is_none());
        assert!(analyzer.snapshot().is_empty());

        let lib = host.add_project(host.root(), "Lib", Some("/src/lib/lib.proj"), HostKind::Resolved);
        host.add_item(lib, "shared.h", Some("/src/shared.h"));
        let delta = analyzer.refresh().unwrap().unwrap();
        assert_eq!(delta.added.len(), 2);
    }

    #[test]
    fn test_host_failure_shrinks_snapshot() {
        let host = Arc::new(MemoryHost::new("Solution"));
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        let folder = host.add_folder(project, "Source");
        host.add_item(folder, "a.cpp", Some("/src/app/a.cpp"));
        host.add_item(project, "b.h", Some("/src/app/b.h"));
        let mut analyzer = source_analyzer(&host, project);
        analyzer.refresh().unwrap();

        host.fail_node(folder, true);
        let delta = analyzer.refresh().unwrap().unwrap();
        assert_eq!(names(&delta.removed), ["a.cpp"]);
        // Still in the host, so not retired
        assert!(!delta.removed[0].is_disposed());

        host.fail_node(folder, false);
        let delta = analyzer.refresh().unwrap().unwrap();
        assert_eq!(names(&delta.added), ["a.cpp"]);
    }

    #[test]
    fn test_rename_is_remove_plus_add() {
        let host = Arc::new(MemoryHost::new("Solution"));
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        let file = host.add_item(project, "old.cpp", Some("/src/app/old.cpp"));
        let mut analyzer = source_analyzer(&host, project);
        analyzer.refresh().unwrap();

        host.rename(file, "new.cpp", Some("/src/app/new.cpp"));
        let delta = analyzer.refresh().unwrap().unwrap();

        assert_eq!(names(&delta.added), ["new.cpp"]);
        assert_eq!(delta.removed.len(), 1);
        assert!(delta.removed[0].is_disposed());
    }

    #[tokio::test]
    async fn test_subscribers_receive_deltas() {
        let host = Arc::new(MemoryHost::new("Solution"));
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        host.add_item(project, "main.cpp", Some("/src/app/main.cpp"));
        let mut analyzer = source_analyzer(&host, project);
        let mut deltas = analyzer.subscribe();

        analyzer.refresh().unwrap();
        analyzer.refresh().unwrap();

        let delta = deltas.recv().await.unwrap();
        assert_eq!(names(&delta.added), ["main.cpp"]);
        assert!(deltas.try_recv().is_err());
    }
}
