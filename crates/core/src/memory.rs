//! In-memory host tree
//!
//! A mutable [`HostTree`] used by tests and by the CLI, which loads it from
//! a TOML fixture. Node ids are interned by identity (canonical path, or the
//! parent chain plus name), so reloading a fixture keeps ids stable for
//! nodes that survived the edit.

use crate::error::HostError;
use crate::host::{Children, HostKind, HostTree, ItemId, NodeRef, ScopeId};
use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Fixture describing a whole host tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureTree {
    #[serde(default = "default_solution_name")]
    pub name: String,

    /// Projects directly under the root
    #[serde(default)]
    pub projects: Vec<FixtureProject>,

    /// Root-level items (solution folders, loose files)
    #[serde(default)]
    pub items: Vec<FixtureItem>,
}

/// One project; opens its own scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureProject {
    pub name: String,

    /// Project file path
    #[serde(default)]
    pub path: Option<String>,

    /// Unloaded projects appear as placeholders
    #[serde(default = "default_true")]
    pub loaded: bool,

    #[serde(default)]
    pub items: Vec<FixtureItem>,
}

/// File or folder inside a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureItem {
    pub name: String,

    #[serde(default)]
    pub path: Option<String>,

    /// Non-empty for folders
    #[serde(default)]
    pub items: Vec<FixtureItem>,
}

fn default_solution_name() -> String {
    "Solution".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
struct NodeRecord {
    name: String,
    canonical_name: Option<String>,
    kind: HostKind,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
    /// Interning identity
    identity: String,
    /// Injected query failure
    failing: bool,
}

impl NodeRecord {
    fn new(name: &str, canonical_name: Option<&str>, kind: HostKind, parent: Option<NodeRef>, identity: String) -> Self {
        Self {
            name: name.to_string(),
            canonical_name: canonical_name.map(str::to_string),
            kind,
            parent,
            children: Vec::new(),
            identity,
            failing: false,
        }
    }
}

/// Id allocation that survives node removal and fixture reloads
#[derive(Debug, Default)]
struct Interner {
    scopes: AHashMap<String, ScopeId>,
    items: AHashMap<(ScopeId, String), ItemId>,
    next_scope: u64,
    next_item: AHashMap<ScopeId, u32>,
}

impl Interner {
    fn scope(&mut self, identity: &str, live: &AHashMap<NodeRef, NodeRecord>) -> ScopeId {
        let key = identity.to_lowercase();
        if let Some(&scope) = self.scopes.get(&key) {
            if !live.contains_key(&NodeRef::scope_root(scope)) {
                return scope;
            }
            return self.fresh_scope();
        }
        let scope = self.fresh_scope();
        self.scopes.insert(key, scope);
        scope
    }

    fn fresh_scope(&mut self) -> ScopeId {
        self.next_scope += 1;
        ScopeId(self.next_scope)
    }

    fn item(&mut self, scope: ScopeId, identity: &str, live: &AHashMap<NodeRef, NodeRecord>) -> ItemId {
        let key = (scope, identity.to_lowercase());
        if let Some(&item) = self.items.get(&key) {
            if !live.contains_key(&NodeRef::new(scope, item)) {
                return item;
            }
            return self.fresh_item(scope);
        }
        let item = self.fresh_item(scope);
        self.items.insert(key, item);
        item
    }

    fn fresh_item(&mut self, scope: ScopeId) -> ItemId {
        // Item 0 is reserved for the scope root
        let next = self.next_item.entry(scope).or_insert(0);
        *next += 1;
        ItemId(*next)
    }
}

#[derive(Debug, Default)]
struct Inner {
    nodes: AHashMap<NodeRef, NodeRecord>,
    interner: Interner,
}

impl Inner {
    fn add_project(&mut self, parent: NodeRef, name: &str, canonical_name: Option<&str>, kind: HostKind) -> NodeRef {
        let identity = canonical_name.unwrap_or(name).to_string();
        let node = NodeRef::scope_root(self.interner.scope(&identity, &self.nodes));
        self.attach(parent, node, NodeRecord::new(name, canonical_name, kind, Some(parent), identity));
        node
    }

    fn add_item(&mut self, parent: NodeRef, name: &str, canonical_name: Option<&str>) -> NodeRef {
        let identity = match canonical_name {
            Some(path) => path.to_string(),
            None => {
                let parent_identity = self.nodes.get(&parent).map(|r| r.identity.as_str()).unwrap_or("");
                format!("{parent_identity}/{name}")
            }
        };
        let node = NodeRef::new(parent.scope, self.interner.item(parent.scope, &identity, &self.nodes));
        self.attach(parent, node, NodeRecord::new(name, canonical_name, HostKind::Resolved, Some(parent), identity));
        node
    }

    fn add_fixture_item(&mut self, parent: NodeRef, item: &FixtureItem) {
        let node = self.add_item(parent, &item.name, item.path.as_deref());
        for child in &item.items {
            self.add_fixture_item(node, child);
        }
    }

    fn attach(&mut self, parent: NodeRef, node: NodeRef, record: NodeRecord) {
        if let Some(parent_record) = self.nodes.get_mut(&parent) {
            parent_record.children.push(node);
        }
        self.nodes.insert(node, record);
    }

    fn clear(&mut self, root: NodeRef) {
        self.nodes.retain(|node, _| *node == root);
        if let Some(record) = self.nodes.get_mut(&root) {
            record.children.clear();
        }
    }
}

/// Mutable host tree kept in memory
#[derive(Debug)]
pub struct MemoryHost {
    root: NodeRef,
    inner: RwLock<Inner>,
}

impl MemoryHost {
    /// Create a host holding only a root node
    pub fn new(root_name: &str) -> Self {
        let root = NodeRef::scope_root(ScopeId(0));
        let mut inner = Inner::default();
        inner.nodes.insert(
            root,
            NodeRecord::new(root_name, None, HostKind::Resolved, None, String::new()),
        );
        Self {
            root,
            inner: RwLock::new(inner),
        }
    }

    /// Build a host from a fixture
    pub fn from_fixture(fixture: &FixtureTree) -> Self {
        let host = Self::new(&fixture.name);
        host.load_fixture(fixture);
        host
    }

    /// Replace the whole tree with `fixture`, keeping interned ids
    ///
    /// Runs under one write lock; readers see either the old tree or the
    /// new one, never a partial reload.
    pub fn load_fixture(&self, fixture: &FixtureTree) {
        let root = self.root;
        let mut inner = self.inner.write();
        inner.clear(root);
        if let Some(record) = inner.nodes.get_mut(&root) {
            record.name = fixture.name.clone();
            record.canonical_name = None;
        }

        for item in &fixture.items {
            inner.add_fixture_item(root, item);
        }
        for project in &fixture.projects {
            let kind = if project.loaded { HostKind::Resolved } else { HostKind::Stub };
            let node = inner.add_project(root, &project.name, project.path.as_deref(), kind);
            for item in &project.items {
                inner.add_fixture_item(node, item);
            }
        }
    }

    /// Add a project node under `parent`; it roots a new scope
    pub fn add_project(&self, parent: NodeRef, name: &str, canonical_name: Option<&str>, kind: HostKind) -> NodeRef {
        self.inner.write().add_project(parent, name, canonical_name, kind)
    }

    /// Add a folder (no canonical name) under `parent`
    pub fn add_folder(&self, parent: NodeRef, name: &str) -> NodeRef {
        self.add_item(parent, name, None)
    }

    /// Add a file or folder in the parent's scope
    pub fn add_item(&self, parent: NodeRef, name: &str, canonical_name: Option<&str>) -> NodeRef {
        self.inner.write().add_item(parent, name, canonical_name)
    }

    /// Remove a node and its subtree; returns whether it existed
    pub fn remove_node(&self, node: NodeRef) -> bool {
        let mut inner = self.inner.write();
        let Some(record) = inner.nodes.remove(&node) else {
            return false;
        };

        if let Some(parent) = record.parent.and_then(|p| inner.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != node);
        }

        let mut pending = record.children;
        while let Some(child) = pending.pop() {
            if let Some(removed) = inner.nodes.remove(&child) {
                pending.extend(removed.children);
            }
        }
        true
    }

    /// Drop every node except the root
    pub fn clear(&self) {
        self.inner.write().clear(self.root);
    }

    /// Change display and canonical names in place
    pub fn rename(&self, node: NodeRef, name: &str, canonical_name: Option<&str>) {
        if let Some(record) = self.inner.write().nodes.get_mut(&node) {
            record.name = name.to_string();
            record.canonical_name = canonical_name.map(str::to_string);
        }
    }

    /// Load or unload a node
    pub fn set_kind(&self, node: NodeRef, kind: HostKind) {
        if let Some(record) = self.inner.write().nodes.get_mut(&node) {
            record.kind = kind;
        }
    }

    /// Make every query on `node` fail (or succeed again)
    pub fn fail_node(&self, node: NodeRef, failing: bool) {
        if let Some(record) = self.inner.write().nodes.get_mut(&node) {
            record.failing = failing;
        }
    }

    /// Find a direct child by display name (case-insensitive)
    pub fn child_named(&self, parent: NodeRef, name: &str) -> Option<NodeRef> {
        let inner = self.inner.read();
        inner.nodes.get(&parent)?.children.iter().copied().find(|child| {
            inner
                .nodes
                .get(child)
                .is_some_and(|r| r.name.eq_ignore_ascii_case(name))
        })
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_record<R>(&self, node: NodeRef, f: impl FnOnce(&NodeRecord) -> R) -> Result<R, HostError> {
        let inner = self.inner.read();
        let record = inner.nodes.get(&node).ok_or(HostError::NotFound(node))?;
        if record.failing {
            return Err(HostError::Query {
                node,
                reason: "injected failure".to_string(),
            });
        }
        Ok(f(record))
    }
}

impl HostTree for MemoryHost {
    fn root(&self) -> NodeRef {
        self.root
    }

    fn name(&self, node: NodeRef) -> Result<String, HostError> {
        self.with_record(node, |r| r.name.clone())
    }

    fn canonical_name(&self, node: NodeRef) -> Result<Option<String>, HostError> {
        self.with_record(node, |r| r.canonical_name.clone())
    }

    fn children(&self, node: NodeRef) -> Result<Children, HostError> {
        self.with_record(node, |r| r.children.iter().copied().collect())
    }

    fn kind(&self, node: NodeRef) -> Result<HostKind, HostError> {
        self.with_record(node, |r| r.kind)
    }

    fn contains(&self, node: NodeRef) -> bool {
        self.inner.read().nodes.contains_key(&node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
name = "Engine"

[[items]]
name = "{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}"

[[projects]]
name = "Core"
path = "/src/core/core.proj"

[[projects.items]]
name = "a.h"
path = "/src/core/a.h"

[[projects.items]]
name = "Source Files"

[[projects.items.items]]
name = "a.cpp"
path = "/src/core/a.cpp"

[[projects]]
name = "Tools"
path = "/src/tools/tools.proj"
loaded = false
"#;

    fn fixture() -> FixtureTree {
        toml::from_str(FIXTURE).unwrap()
    }

    #[test]
    fn test_fixture_builds_tree() {
        let host = MemoryHost::from_fixture(&fixture());

        assert_eq!(host.name(host.root()).unwrap(), "Engine");
        let top = host.children(host.root()).unwrap();
        assert_eq!(top.len(), 3);

        let core = host.child_named(host.root(), "core").unwrap();
        assert!(core.is_scope_root());
        assert_eq!(host.kind(core).unwrap(), HostKind::Resolved);

        let tools = host.child_named(host.root(), "Tools").unwrap();
        assert_eq!(host.kind(tools).unwrap(), HostKind::Stub);
        assert_ne!(core.scope, tools.scope);

        let folder = host.child_named(core, "Source Files").unwrap();
        assert_eq!(folder.scope, core.scope);
        assert_eq!(host.canonical_name(folder).unwrap(), None);
        assert_eq!(host.children(folder).unwrap().len(), 1);
    }

    #[test]
    fn test_reload_keeps_ids_stable() {
        let host = MemoryHost::from_fixture(&fixture());
        let core = host.child_named(host.root(), "Core").unwrap();
        let header = host.child_named(core, "a.h").unwrap();

        let mut edited = fixture();
        edited.projects[0].items.remove(1);
        edited.projects[0].items.insert(
            0,
            FixtureItem {
                name: "b.h".into(),
                path: Some("/src/core/b.h".into()),
                items: vec![],
            },
        );
        host.load_fixture(&edited);

        let core_again = host.child_named(host.root(), "Core").unwrap();
        assert_eq!(core_again, core);
        assert_eq!(host.child_named(core_again, "a.h"), Some(header));
        assert!(host.child_named(core_again, "Source Files").is_none());
    }

    #[test]
    fn test_reload_is_never_seen_half_done() {
        let host = MemoryHost::from_fixture(&fixture());
        let tree = fixture();
        let done = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..200 {
                    host.load_fixture(&tree);
                }
                done.store(true, std::sync::atomic::Ordering::SeqCst);
            });

            while !done.load(std::sync::atomic::Ordering::SeqCst) {
                assert_eq!(host.children(host.root()).unwrap().len(), 3);
                assert!(host.child_named(host.root(), "Core").is_some());
            }
        });
    }

    #[test]
    fn test_remove_node_detaches_subtree() {
        let host = MemoryHost::from_fixture(&fixture());
        let core = host.child_named(host.root(), "Core").unwrap();
        let folder = host.child_named(core, "Source Files").unwrap();
        let source = host.children(folder).unwrap()[0];

        assert!(host.remove_node(folder));
        assert!(!host.contains(folder));
        assert!(!host.contains(source));
        assert_eq!(host.children(core).unwrap().len(), 1);
        assert!(!host.remove_node(folder));
        assert_eq!(host.name(source), Err(HostError::NotFound(source)));
    }

    #[test]
    fn test_injected_failure() {
        let host = MemoryHost::new("Solution");
        let project = host.add_project(host.root(), "App", None, HostKind::Resolved);

        host.fail_node(project, true);
        assert!(matches!(host.name(project), Err(HostError::Query { .. })));
        assert!(host.contains(project));

        host.fail_node(project, false);
        assert_eq!(host.name(project).unwrap(), "App");
    }

    #[test]
    fn test_duplicate_names_get_distinct_ids() {
        let host = MemoryHost::new("Solution");
        let project = host.add_project(host.root(), "App", None, HostKind::Resolved);
        let first = host.add_folder(project, "Docs");
        let second = host.add_folder(project, "Docs");

        assert_ne!(first, second);
    }
}
