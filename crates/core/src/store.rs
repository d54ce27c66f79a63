//! Arena-backed entity store
//!
//! Owns one state container per identity cell. Containers are addressed by
//! [`EntityId`] and never move, so handles and variants hold an index rather
//! than a reference. The store is the only place that swaps active variants.

use crate::error::{CoreError, HostError};
use crate::handle::EntryHandle;
use crate::host::{HostKind, HostTree, NodeRef};
use crate::identity::IdentityCell;
use crate::variant::{Variant, VariantFactories, VariantTag, FACTORIES};
use crate::Result;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, trace};

/// Arena slot index plus the generation of the container occupying it
///
/// A reclaimed slot gets a new generation, so ids of the entity that used
/// it before no longer resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    pub fn from_index(index: usize) -> Self {
        Self {
            index: index as u32,
            generation: 0,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    fn next_generation(self) -> Self {
        Self {
            index: self.index,
            generation: self.generation.wrapping_add(1),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generation {
            0 => write!(f, "#{}", self.index),
            generation => write!(f, "#{}.{}", self.index, generation),
        }
    }
}

/// Entity field that can change after observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    FilePath,
}

/// What the last signal was about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Container created, no variant active yet
    Created,
    /// Active variant swapped
    StateChanged {
        from: Option<VariantTag>,
        to: VariantTag,
    },
    /// A derived field changed
    PropertyChanged(Property),
}

/// Latest state of an entity as seen by subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySignal {
    /// Bumped on every published change
    pub revision: u64,
    /// Active variant, `None` before first activation
    pub tag: Option<VariantTag>,
    pub disposed: bool,
    pub change: Change,
}

/// One identity cell plus its active variant
pub(crate) struct StateContainer {
    id: EntityId,
    cell: IdentityCell,
    active: Option<Variant>,
    /// Tag that was active before the last committed transition
    previous: Option<VariantTag>,
    factories: &'static VariantFactories,
    signals: watch::Sender<EntitySignal>,
    /// One clone per live handle
    handles: Arc<()>,
}

impl StateContainer {
    fn new(id: EntityId, cell: IdentityCell) -> Self {
        let (signals, _) = watch::channel(EntitySignal {
            revision: 0,
            tag: None,
            disposed: false,
            change: Change::Created,
        });
        Self {
            id,
            cell,
            active: None,
            previous: None,
            factories: &FACTORIES,
            signals,
            handles: Arc::new(()),
        }
    }

    pub(crate) fn cell(&self) -> &IdentityCell {
        &self.cell
    }

    pub(crate) fn tag(&self) -> Option<VariantTag> {
        self.active.as_ref().map(Variant::tag)
    }

    pub(crate) fn previous(&self) -> Option<VariantTag> {
        self.previous
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<EntitySignal> {
        self.signals.subscribe()
    }

    fn handle(&self, store: &EntityStore) -> EntryHandle {
        EntryHandle::new(self.id, self.cell.key().clone(), self.handles.clone(), store.clone())
    }

    /// Disposed and no longer referenced by any handle
    fn reclaimable(&self) -> bool {
        self.cell.is_disposed() && Arc::strong_count(&self.handles) == 1
    }

    /// Swap to `next`, checking legality against the current variant
    ///
    /// Same-tag requests are a silent no-op. A refused activation is rolled
    /// back before the error is returned. Returns whether a swap happened.
    fn transition(
        &mut self,
        next: VariantTag,
        classify: impl FnOnce() -> std::result::Result<HostKind, HostError>,
    ) -> Result<bool> {
        let current = self.tag();
        if current == Some(next) {
            return Ok(false);
        }

        // 1. Materialize the target around the shared cell
        let incoming = self.factories.make(next, self.id);

        // 2. Disable the outgoing variant
        if let Some(outgoing) = &self.active {
            outgoing.on_disabled(&self.cell);
        }

        // 3. Swap, remembering what was active
        let prior_previous = self.previous;
        let outgoing = self.active.replace(incoming);
        self.previous = outgoing.as_ref().map(Variant::tag);

        // 4. Enable the incoming variant (legality check)
        let verdict = match &self.active {
            Some(active) => active.on_enabled(self.previous, &self.cell, classify),
            None => Ok(()),
        };
        if let Err(err) = verdict {
            self.active = outgoing;
            self.previous = prior_previous;
            if err.is_protocol_violation() {
                error!(entity = %self.id, error = %err, "illegal state transition");
            }
            return Err(err);
        }

        self.publish(Change::StateChanged { from: current, to: next });
        Ok(true)
    }

    /// Forget the active variant so the next activation starts from unknown
    fn reset(&mut self) {
        self.active = None;
    }

    fn publish(&mut self, change: Change) {
        let tag = self.tag();
        let disposed = self.cell.is_disposed();
        self.signals.send_modify(|signal| {
            signal.revision += 1;
            signal.tag = tag;
            signal.disposed = disposed;
            signal.change = change;
        });
    }
}

#[derive(Default)]
struct Arena {
    slots: Vec<StateContainer>,
    /// Live (non-disposed) entity per host node
    by_node: AHashMap<NodeRef, EntityId>,
    /// Slots of disposed entities, reused once their last handle is gone
    retired: Vec<usize>,
}

impl Arena {
    fn get(&self, id: EntityId) -> Option<&StateContainer> {
        self.slots.get(id.index()).filter(|slot| slot.id == id)
    }

    fn slot(&self, id: EntityId) -> Result<&StateContainer> {
        self.get(id).ok_or(CoreError::UnknownEntity(id))
    }

    fn slot_mut(&mut self, id: EntityId) -> Result<&mut StateContainer> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.id == id)
            .ok_or(CoreError::UnknownEntity(id))
    }

    fn insert(&mut self, cell: IdentityCell) -> EntityId {
        let node = cell.node();
        let reusable = self
            .retired
            .iter()
            .position(|&index| self.slots.get(index).is_some_and(StateContainer::reclaimable));

        let id = match reusable {
            Some(position) => {
                let index = self.retired.swap_remove(position);
                let id = self.slots[index].id.next_generation();
                // Drops the old signal sender; its receivers see the channel close
                self.slots[index] = StateContainer::new(id, cell);
                trace!(entity = %id, "slot reclaimed");
                id
            }
            None => {
                let id = EntityId::from_index(self.slots.len());
                self.slots.push(StateContainer::new(id, cell));
                id
            }
        };

        if let Some(node) = node {
            self.by_node.insert(node, id);
        }
        id
    }

    fn dispose(&mut self, id: EntityId) -> Result<bool> {
        let slot = self.slot_mut(id)?;
        let node = slot.cell.node();
        if !slot.cell.dispose() {
            return Ok(false);
        }
        slot.publish(Change::PropertyChanged(Property::FilePath));

        if let Some(node) = node {
            if self.by_node.get(&node) == Some(&id) {
                self.by_node.remove(&node);
            }
        }
        self.retired.push(id.index());
        Ok(true)
    }
}

/// Shared handle to the entity arena
///
/// Cloning is cheap; all clones see the same containers. Mutation is
/// expected from one owning task at a time.
#[derive(Clone, Default)]
pub struct EntityStore {
    inner: Arc<RwLock<Arena>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the entity for `node`
    ///
    /// A known node has its cell refreshed in place. If the host now reports
    /// a different canonical path, the old entity is invalidated and disposed
    /// and a fresh one takes over the node. The returned entity may still be
    /// in the unknown state; see [`EntityStore::activate`].
    pub fn locate(&self, host: &dyn HostTree, node: NodeRef) -> Result<EntryHandle> {
        let name = host.name(node)?;
        let canonical_name = host.canonical_name(node)?;
        let key = IdentityCell::key_for(node, &name, canonical_name.as_deref());

        let mut arena = self.inner.write();
        if let Some(&id) = arena.by_node.get(&node) {
            let slot = arena.slot_mut(id)?;
            if slot.cell.key() == &key {
                slot.cell.refresh(name, canonical_name);
                return Ok(slot.handle(self));
            }

            debug!(entity = %id, old = %slot.cell.key(), new = %key, "canonical path changed; re-keying");
            slot.transition(VariantTag::Invalidated, || Ok(HostKind::Resolved))?;
            arena.dispose(id)?;
        }

        let id = arena.insert(IdentityCell::from_parts(node, name, canonical_name));
        arena.slot(id).map(|slot| slot.handle(self))
    }

    /// Bring an entity in line with the host's current classification
    ///
    /// Unknown entities activate directly. A Stub/Resolved flip, or an
    /// invalidated entity whose node is back, goes through
    /// [`EntityStore::recreate`].
    ///
    /// The host is asked for the classification once; the legality check
    /// runs against that same answer, so a host flipping the node mid-call
    /// cannot turn into a protocol violation.
    pub fn activate(&self, host: &dyn HostTree, id: EntityId) -> Result<VariantTag> {
        let node = self.node_of(id)?;
        let kind = host.kind(node)?;
        let target = VariantTag::from_host(kind);

        let mut arena = self.inner.write();
        let slot = arena.slot_mut(id)?;
        let current = slot.tag();
        match current {
            Some(tag) if tag == target => Ok(target),
            None => {
                slot.transition(target, || Ok(kind))?;
                Ok(target)
            }
            Some(_) => {
                drop(arena);
                self.recreate(host, id)
            }
        }
    }

    /// Request a transition on one entity
    ///
    /// Fails with [`CoreError::ProtocolViolation`] when the move is illegal
    /// from the currently active variant.
    pub fn transition(&self, host: &dyn HostTree, id: EntityId, next: VariantTag) -> Result<bool> {
        let mut arena = self.inner.write();
        let slot = arena.slot_mut(id)?;
        let node = slot.cell.node();
        slot.transition(next, || match node {
            Some(node) => host.kind(node),
            None => Err(HostError::Detached),
        })
    }

    /// Re-create an entity from the unknown state
    ///
    /// The container is invalidated, reset, refreshed from the host and
    /// activated to the host's classification. The entity id (and every
    /// handle to it) stays the same.
    pub fn recreate(&self, host: &dyn HostTree, id: EntityId) -> Result<VariantTag> {
        let node = self.node_of(id)?;
        let name = host.name(node)?;
        let canonical_name = host.canonical_name(node)?;
        let kind = host.kind(node)?;
        let target = VariantTag::from_host(kind);

        let mut arena = self.inner.write();
        let slot = arena.slot_mut(id)?;
        slot.transition(VariantTag::Invalidated, || Ok(kind))?;
        slot.reset();
        slot.cell.refresh(name, canonical_name);
        slot.transition(target, || Ok(kind))?;
        debug!(entity = %id, key = %slot.cell.key(), state = %target, "entity re-created");
        Ok(target)
    }

    /// Invalidate and dispose an entity whose node left the host tree
    ///
    /// Returns whether the entity was retired.
    pub fn retire_if_gone(&self, host: &dyn HostTree, id: EntityId) -> Result<bool> {
        let Some(node) = self.inner.read().slot(id)?.cell.node() else {
            return Ok(false);
        };
        if host.contains(node) {
            return Ok(false);
        }

        let mut arena = self.inner.write();
        arena
            .slot_mut(id)?
            .transition(VariantTag::Invalidated, || Ok(HostKind::Resolved))?;
        arena.dispose(id)?;
        debug!(entity = %id, %node, "entity retired");
        Ok(true)
    }

    /// Dispose an entity; idempotent
    pub fn dispose(&self, id: EntityId) -> Result<bool> {
        self.inner.write().dispose(id)
    }

    /// Handle for an existing entity
    pub fn handle(&self, id: EntityId) -> Option<EntryHandle> {
        self.inner.read().get(id).map(|slot| slot.handle(self))
    }

    /// Live entity currently bound to `node`
    pub fn find(&self, node: NodeRef) -> Option<EntryHandle> {
        let id = *self.inner.read().by_node.get(&node)?;
        self.handle(id)
    }

    /// Containers in the arena, disposed ones included until reclaimed
    pub fn len(&self) -> usize {
        self.inner.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Containers whose cell is not disposed
    pub fn live_count(&self) -> usize {
        self.inner.read().by_node.len()
    }

    /// Run `f` against one container under the read lock
    pub(crate) fn read<R>(&self, id: EntityId, f: impl FnOnce(&StateContainer) -> R) -> Option<R> {
        self.inner.read().get(id).map(f)
    }

    fn node_of(&self, id: EntityId) -> Result<NodeRef> {
        let arena = self.inner.read();
        arena.slot(id)?.cell.node().ok_or(CoreError::Disposed(id))
    }
}

impl fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("entities", &self.len())
            .finish()
    }
}
