//! Long-lived entry handles
//!
//! A handle is what consumers keep. It holds the entity's arena index and
//! key, and reads everything else live from the store, so a transition is
//! visible through existing handles without re-fetching them.

use crate::error::HostError;
use crate::host::{Children, HostTree, NodeRef};
use crate::identity::{StableKey, DISPOSED};
use crate::store::{EntityId, EntitySignal, EntityStore};
use crate::variant::VariantTag;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Consumer-facing reference to one entity
///
/// Equality and hashing use the [`StableKey`] only.
#[derive(Clone)]
pub struct EntryHandle {
    id: EntityId,
    key: StableKey,
    /// Keeps the arena slot from being reused while this handle lives
    _slot: Arc<()>,
    store: EntityStore,
}

impl EntryHandle {
    pub(crate) fn new(id: EntityId, key: StableKey, slot: Arc<()>, store: EntityStore) -> Self {
        Self {
            id,
            key,
            _slot: slot,
            store,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn key(&self) -> &StableKey {
        &self.key
    }

    /// Host node, `None` once disposed
    pub fn node(&self) -> Option<NodeRef> {
        self.store.read(self.id, |c| c.cell().node()).flatten()
    }

    /// Active variant, `None` before first activation
    pub fn tag(&self) -> Option<VariantTag> {
        self.store.read(self.id, |c| c.tag()).flatten()
    }

    /// Variant that was active before the last transition
    pub fn previous_tag(&self) -> Option<VariantTag> {
        self.store.read(self.id, |c| c.previous()).flatten()
    }

    pub fn is_resolved(&self) -> bool {
        self.tag() == Some(VariantTag::Resolved)
    }

    pub fn is_stub(&self) -> bool {
        self.tag() == Some(VariantTag::Stub)
    }

    pub fn is_invalidated(&self) -> bool {
        self.tag() == Some(VariantTag::Invalidated)
    }

    pub fn is_disposed(&self) -> bool {
        self.store.read(self.id, |c| c.cell().is_disposed()).unwrap_or(true)
    }

    pub fn name(&self) -> String {
        self.store
            .read(self.id, |c| c.cell().name().to_string())
            .unwrap_or_else(|| DISPOSED.to_string())
    }

    pub fn canonical_name(&self) -> Option<String> {
        self.store
            .read(self.id, |c| c.cell().canonical_name().map(str::to_string))
            .flatten()
    }

    /// Absolute path derived from the canonical name (empty once disposed)
    pub fn file_path(&self) -> PathBuf {
        self.store
            .read(self.id, |c| c.cell().file_path().to_path_buf())
            .unwrap_or_default()
    }

    /// Subscribe to state and property changes of this entity
    ///
    /// The current value is marked seen; `changed()` resolves on the next
    /// published change.
    pub fn watch(&self) -> watch::Receiver<EntitySignal> {
        match self.store.read(self.id, |c| c.subscribe()) {
            Some(receiver) => receiver,
            None => {
                let (_, receiver) = watch::channel(EntitySignal {
                    revision: 0,
                    tag: None,
                    disposed: true,
                    change: crate::store::Change::Created,
                });
                receiver
            }
        }
    }

    /// Capabilities of a resolved entity
    pub fn as_resolved(&self) -> Option<ResolvedEntry<'_>> {
        self.is_resolved().then_some(ResolvedEntry { handle: self })
    }

    /// Capabilities of a placeholder entity
    pub fn as_stub(&self) -> Option<StubEntry<'_>> {
        self.is_stub().then_some(StubEntry { handle: self })
    }
}

impl PartialEq for EntryHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for EntryHandle {}

impl Hash for EntryHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryHandle")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

impl fmt::Display for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// View over a resolved entity
#[derive(Debug, Clone, Copy)]
pub struct ResolvedEntry<'a> {
    handle: &'a EntryHandle,
}

impl ResolvedEntry<'_> {
    pub fn file_path(&self) -> PathBuf {
        self.handle.file_path()
    }

    pub fn name(&self) -> String {
        self.handle.name()
    }

    pub fn canonical_name(&self) -> Option<String> {
        self.handle.canonical_name()
    }

    /// Children as currently reported by the host
    pub fn children(&self, host: &dyn HostTree) -> Result<Children, HostError> {
        let node = self.handle.node().ok_or(HostError::Detached)?;
        host.children(node)
    }
}

/// View over a placeholder entity
///
/// A placeholder has a name but no loaded content.
#[derive(Debug, Clone, Copy)]
pub struct StubEntry<'a> {
    handle: &'a EntryHandle,
}

impl StubEntry<'_> {
    pub fn name(&self) -> String {
        self.handle.name()
    }

    pub fn canonical_name(&self) -> Option<String> {
        self.handle.canonical_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostKind;
    use crate::memory::MemoryHost;
    use crate::store::Change;
    use std::collections::HashSet;

    #[test]
    fn test_handle_sees_transition_without_refetch() {
        let host = MemoryHost::new("Solution");
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Stub);
        let store = EntityStore::new();

        let handle = store.locate(&host, project).unwrap();
        store.activate(&host, handle.id()).unwrap();
        assert!(handle.is_stub());
        assert!(handle.as_stub().is_some());
        assert!(handle.as_resolved().is_none());

        host.set_kind(project, HostKind::Resolved);
        store.activate(&host, handle.id()).unwrap();

        assert!(handle.is_resolved());
        assert!(!handle.is_stub());
        assert_eq!(handle.previous_tag(), None);
        assert!(handle.as_resolved().is_some());
    }

    #[test]
    fn test_handles_compare_by_key() {
        let host = MemoryHost::new("Solution");
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        let file = host.add_item(project, "Main.cpp", Some("/src/app/Main.cpp"));
        let first_store = EntityStore::new();
        let second_store = EntityStore::new();

        let a = first_store.locate(&host, file).unwrap();
        let b = second_store.locate(&host, file).unwrap();

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_resolved_view_lists_children() {
        let host = MemoryHost::new("Solution");
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        let file = host.add_item(project, "main.cpp", Some("/src/app/main.cpp"));
        let store = EntityStore::new();

        let handle = store.locate(&host, project).unwrap();
        store.activate(&host, handle.id()).unwrap();

        let children = handle.as_resolved().unwrap().children(&host).unwrap();
        assert_eq!(children.as_slice(), &[file]);
    }

    #[tokio::test]
    async fn test_watch_reports_dispose_once() {
        let host = MemoryHost::new("Solution");
        let project = host.add_project(host.root(), "App", Some("/src/app/app.proj"), HostKind::Resolved);
        let store = EntityStore::new();

        let handle = store.locate(&host, project).unwrap();
        let mut signals = handle.watch();

        assert!(store.dispose(handle.id()).unwrap());
        assert!(!store.dispose(handle.id()).unwrap());

        signals.changed().await.unwrap();
        let signal = *signals.borrow_and_update();
        assert!(signal.disposed);
        assert_eq!(signal.change, Change::PropertyChanged(crate::store::Property::FilePath));
        assert_eq!(signal.revision, 1);
        assert!(!signals.has_changed().unwrap());

        assert_eq!(handle.name(), DISPOSED);
        assert_eq!(handle.file_path(), PathBuf::new());
    }
}
