//! Identity cells and stable keys
//!
//! An identity cell is the durable record behind one host node. It is
//! refreshed in place on every re-observation so handles stay valid, and
//! compares purely by its [`StableKey`].

use crate::error::HostError;
use crate::host::{HostTree, ItemId, NodeRef, ScopeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Value of name fields once a cell is disposed
pub const DISPOSED: &str = "<disposed>";

/// Composite identity: owning scope + node id + case-folded canonical path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StableKey {
    scope: ScopeId,
    item: ItemId,
    path: Arc<str>,
}

impl StableKey {
    /// Build a key, normalizing `path` for case-insensitive comparison
    pub fn new(scope: ScopeId, item: ItemId, path: &str) -> Self {
        Self {
            scope,
            item,
            path: normalize_key_path(path).into(),
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    /// Normalized (lower-case, `/`-separated) path component
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for StableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scope, self.item, self.path)
    }
}

/// Normalize a path for key comparison
///
/// - Unifies `\` to `/`
/// - Trims trailing separators (a bare root stays `/`)
/// - Folds case
pub fn normalize_key_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let trimmed = unified.trim_end_matches('/');
    if trimmed.is_empty() && !unified.is_empty() {
        return "/".to_string();
    }
    trimmed.to_lowercase()
}

/// Resolve a host name to an absolute, lexically normalized path
///
/// Relative names resolve against the working directory. The result never
/// carries a trailing separator.
pub fn normalize_file_path(raw: &str) -> PathBuf {
    if raw.is_empty() {
        return PathBuf::new();
    }

    let path = Path::new(raw);
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Durable record for one host node
#[derive(Debug)]
pub struct IdentityCell {
    key: StableKey,
    node: Option<NodeRef>,
    name: String,
    canonical_name: Option<String>,
    /// Derived once from `canonical_name ?? name`
    file_path: OnceLock<PathBuf>,
    disposed: bool,
}

impl IdentityCell {
    /// Read a node's identity from the host
    pub fn observe(host: &dyn HostTree, node: NodeRef) -> Result<Self, HostError> {
        let name = host.name(node)?;
        let canonical_name = host.canonical_name(node)?;
        Ok(Self::from_parts(node, name, canonical_name))
    }

    /// Build a cell from already-read host fields
    pub fn from_parts(node: NodeRef, name: String, canonical_name: Option<String>) -> Self {
        let key = Self::key_for(node, &name, canonical_name.as_deref());
        Self {
            key,
            node: Some(node),
            name,
            canonical_name,
            file_path: OnceLock::new(),
            disposed: false,
        }
    }

    /// Key a node would get with the given names
    pub fn key_for(node: NodeRef, name: &str, canonical_name: Option<&str>) -> StableKey {
        StableKey::new(node.scope, node.item, canonical_name.unwrap_or(name))
    }

    pub fn key(&self) -> &StableKey {
        &self.key
    }

    /// Host node, `None` once disposed
    pub fn node(&self) -> Option<NodeRef> {
        self.node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn canonical_name(&self) -> Option<&str> {
        self.canonical_name.as_deref()
    }

    /// Absolute path of the node, computed on first access
    ///
    /// Returns the empty path once disposed.
    pub fn file_path(&self) -> &Path {
        if self.disposed {
            return Path::new("");
        }
        self.file_path.get_or_init(|| {
            normalize_file_path(self.canonical_name.as_deref().unwrap_or(&self.name))
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Refresh host fields in place
    ///
    /// The key is fixed; callers re-create the cell when the names would
    /// produce a different key. No-op once disposed. Returns whether a field
    /// changed.
    pub fn refresh(&mut self, name: String, canonical_name: Option<String>) -> bool {
        if self.disposed {
            return false;
        }
        let changed = self.name != name || self.canonical_name != canonical_name;
        self.name = name;
        self.canonical_name = canonical_name;
        changed
    }

    /// Release the host reference and clear derived fields
    ///
    /// Idempotent. Returns `true` only for the call that actually disposed
    /// the cell, so the owner fires exactly one path notification.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.node = None;
        self.name = DISPOSED.to_string();
        self.canonical_name = Some(DISPOSED.to_string());
        self.file_path.take();
        self.disposed = true;
        true
    }
}

impl PartialEq for IdentityCell {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for IdentityCell {}

impl Hash for IdentityCell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
