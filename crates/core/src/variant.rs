//! Entity variants and the transition legality table
//!
//! Every entity presents as exactly one of Resolved, Stub or Invalidated.
//! Each variant wraps the arena index of the shared identity cell; the
//! legality of entering a variant depends only on the previously active tag.

use crate::error::{CoreError, HostError};
use crate::host::HostKind;
use crate::identity::IdentityCell;
use crate::store::EntityId;
use std::fmt;
use tracing::trace;

/// Runtime tag of a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantTag {
    Resolved,
    Stub,
    Invalidated,
}

impl VariantTag {
    pub fn as_str(self) -> &'static str {
        match self {
            VariantTag::Resolved => "resolved",
            VariantTag::Stub => "stub",
            VariantTag::Invalidated => "invalidated",
        }
    }

    /// Tag matching a host classification
    pub fn from_host(kind: HostKind) -> Self {
        match kind {
            HostKind::Resolved => VariantTag::Resolved,
            HostKind::Stub => VariantTag::Stub,
        }
    }

    /// Render a previous tag, where `None` is the never-activated state
    pub fn describe(previous: &Option<VariantTag>) -> &'static str {
        previous.map_or("unknown", VariantTag::as_str)
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully loaded node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    id: EntityId,
}

/// Placeholder for a node the host has not loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stub {
    id: EntityId,
}

/// Node that no longer exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidated {
    id: EntityId,
}

/// Active shape of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Resolved(Resolved),
    Stub(Stub),
    Invalidated(Invalidated),
}

impl Variant {
    pub fn tag(&self) -> VariantTag {
        match self {
            Variant::Resolved(_) => VariantTag::Resolved,
            Variant::Stub(_) => VariantTag::Stub,
            Variant::Invalidated(_) => VariantTag::Invalidated,
        }
    }

    /// Arena index of the wrapped identity cell
    pub fn id(&self) -> EntityId {
        match self {
            Variant::Resolved(v) => v.id,
            Variant::Stub(v) => v.id,
            Variant::Invalidated(v) => v.id,
        }
    }

    /// Hook run on the outgoing variant before the swap
    pub(crate) fn on_disabled(&self, cell: &IdentityCell) {
        trace!(key = %cell.key(), state = %self.tag(), "variant disabled");
    }

    /// Hook run on the incoming variant after the swap
    ///
    /// Checks that `previous` may lead into this variant. `classify` is only
    /// consulted when entering Resolved or Stub from the unknown state.
    pub(crate) fn on_enabled(
        &self,
        previous: Option<VariantTag>,
        cell: &IdentityCell,
        classify: impl FnOnce() -> Result<HostKind, HostError>,
    ) -> Result<(), CoreError> {
        let to = self.tag();
        check_activation(previous, to, classify).map_err(|err| match err {
            Activation::Host(err) => CoreError::Host(err),
            Activation::Illegal(reason) => CoreError::ProtocolViolation {
                key: cell.key().clone(),
                from: previous,
                to,
                reason,
            },
        })?;
        trace!(key = %cell.key(), from = VariantTag::describe(&previous), to = %to, "variant enabled");
        Ok(())
    }
}

/// Factory table used to (re)materialize variants around a cell
#[derive(Debug)]
pub struct VariantFactories {
    pub resolved: fn(EntityId) -> Variant,
    pub stub: fn(EntityId) -> Variant,
    pub invalidated: fn(EntityId) -> Variant,
}

impl VariantFactories {
    pub fn make(&self, tag: VariantTag, id: EntityId) -> Variant {
        match tag {
            VariantTag::Resolved => (self.resolved)(id),
            VariantTag::Stub => (self.stub)(id),
            VariantTag::Invalidated => (self.invalidated)(id),
        }
    }
}

/// Factories shared by every state container
pub static FACTORIES: VariantFactories = VariantFactories {
    resolved: make_resolved,
    stub: make_stub,
    invalidated: make_invalidated,
};

fn make_resolved(id: EntityId) -> Variant {
    Variant::Resolved(Resolved { id })
}

fn make_stub(id: EntityId) -> Variant {
    Variant::Stub(Stub { id })
}

fn make_invalidated(id: EntityId) -> Variant {
    Variant::Invalidated(Invalidated { id })
}

/// Why an activation was refused
#[derive(Debug)]
enum Activation {
    Host(HostError),
    Illegal(&'static str),
}

/// Legality of entering `to` when `previous` was active
fn check_activation(
    previous: Option<VariantTag>,
    to: VariantTag,
    classify: impl FnOnce() -> Result<HostKind, HostError>,
) -> Result<(), Activation> {
    use VariantTag as T;

    match (previous, to) {
        // Any state may be invalidated
        (_, T::Invalidated) => Ok(()),

        (None, T::Resolved) => match classify().map_err(Activation::Host)? {
            HostKind::Resolved => Ok(()),
            HostKind::Stub => Err(Activation::Illegal("host reports a placeholder node")),
        },
        (None, T::Stub) => match classify().map_err(Activation::Host)? {
            HostKind::Stub => Ok(()),
            HostKind::Resolved => Err(Activation::Illegal("host reports a loaded node")),
        },

        (Some(T::Resolved), T::Resolved) | (Some(T::Stub), T::Stub) => Ok(()),

        (Some(T::Stub), T::Resolved) => {
            Err(Activation::Illegal("a stub must be re-created before resolving"))
        }
        (Some(T::Resolved), T::Stub) => {
            Err(Activation::Illegal("a resolved entity must be re-created before stubbing"))
        }
        (Some(T::Invalidated), T::Resolved) | (Some(T::Invalidated), T::Stub) => {
            Err(Activation::Illegal("an invalidated entity must be re-created"))
        }
    }
}
