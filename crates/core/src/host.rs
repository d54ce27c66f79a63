//! Host tree contract
//!
//! The hierarchy is owned by the host environment. The engine only reads it
//! through [`HostTree`]; every query may fail independently.

use crate::error::HostError;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Owning-scope identifier (one per project hierarchy)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub u64);

/// Stable per-node id within a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u32);

impl ItemId {
    /// Id of the node that roots a scope
    pub const ROOT: ItemId = ItemId(0);
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to one node of the host tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    /// Scope the node belongs to
    pub scope: ScopeId,
    /// Id of the node inside its scope
    pub item: ItemId,
}

impl NodeRef {
    pub const fn new(scope: ScopeId, item: ItemId) -> Self {
        Self { scope, item }
    }

    /// Root node of `scope`
    pub const fn scope_root(scope: ScopeId) -> Self {
        Self::new(scope, ItemId::ROOT)
    }

    /// Whether this node roots its scope
    pub fn is_scope_root(&self) -> bool {
        self.item == ItemId::ROOT
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.item)
    }
}

/// Host classification of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    /// Real, loaded node
    Resolved,
    /// Placeholder for a node the host has not loaded
    Stub,
}

/// Ordered child list returned by the host
///
/// Most nodes have only a handful of children, so they stay inline.
pub type Children = SmallVec<[NodeRef; 8]>;

/// Read-only view of the host hierarchy
pub trait HostTree: Send + Sync {
    /// Root of the whole tree
    fn root(&self) -> NodeRef;

    /// Display name of a node
    fn name(&self, node: NodeRef) -> Result<String, HostError>;

    /// Canonical (full path) name, when the host has one
    fn canonical_name(&self, node: NodeRef) -> Result<Option<String>, HostError>;

    /// Ordered children of a node; may cross into nested scopes
    fn children(&self, node: NodeRef) -> Result<Children, HostError>;

    /// Real vs placeholder classification
    fn kind(&self, node: NodeRef) -> Result<HostKind, HostError>;

    /// Whether the node still exists in the tree
    fn contains(&self, node: NodeRef) -> bool;
}

impl<T: HostTree + ?Sized> HostTree for Arc<T> {
    fn root(&self) -> NodeRef {
        (**self).root()
    }

    fn name(&self, node: NodeRef) -> Result<String, HostError> {
        (**self).name(node)
    }

    fn canonical_name(&self, node: NodeRef) -> Result<Option<String>, HostError> {
        (**self).canonical_name(node)
    }

    fn children(&self, node: NodeRef) -> Result<Children, HostError> {
        (**self).children(node)
    }

    fn kind(&self, node: NodeRef) -> Result<HostKind, HostError> {
        (**self).kind(node)
    }

    fn contains(&self, node: NodeRef) -> bool {
        (**self).contains(node)
    }
}
