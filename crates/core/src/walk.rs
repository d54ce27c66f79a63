//! Depth-first tree walker
//!
//! [`collect_items_recursive`] walks the host tree in pre-order, bringing
//! each visited node's entity in line with the host and yielding the ones
//! the accept predicate keeps. Host query failures drop the node (and its
//! subtree) from the walk; protocol violations end it.

use crate::error::CoreError;
use crate::handle::EntryHandle;
use crate::host::{HostTree, NodeRef};
use crate::store::EntityStore;
use std::path::Path;
use tracing::{trace, warn};
use uuid::Uuid;

/// Predicate over visited entries
pub type Predicate = dyn Fn(&EntryHandle) -> bool + Send + Sync;

/// Start a lazy walk from `root`
///
/// Children are only visited when `descend` keeps the entry and the entry is
/// resolved; placeholders have no loaded content.
pub fn collect_items_recursive<'a>(
    store: &'a EntityStore,
    host: &'a dyn HostTree,
    root: NodeRef,
    accept: &'a Predicate,
    descend: &'a Predicate,
) -> CollectItems<'a> {
    CollectItems {
        store,
        host,
        accept,
        descend,
        stack: vec![root],
    }
}

/// Lazy, single-pass walk over the host tree
///
/// Yields `Err` at most once, after which the walk is over.
pub struct CollectItems<'a> {
    store: &'a EntityStore,
    host: &'a dyn HostTree,
    accept: &'a Predicate,
    descend: &'a Predicate,
    stack: Vec<NodeRef>,
}

impl CollectItems<'_> {
    fn visit(&self, node: NodeRef) -> Result<EntryHandle, CoreError> {
        let entry = self.store.locate(self.host, node)?;
        self.store.activate(self.host, entry.id())?;
        Ok(entry)
    }
}

impl Iterator for CollectItems<'_> {
    type Item = Result<EntryHandle, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            let entry = match self.visit(node) {
                Ok(entry) => entry,
                Err(CoreError::Host(err)) => {
                    warn!(%node, error = %err, "host query failed; skipping node");
                    continue;
                }
                Err(err) => {
                    self.stack.clear();
                    return Some(Err(err));
                }
            };

            if entry.is_resolved() && (self.descend)(&entry) {
                match self.host.children(node) {
                    // Reversed so the first child is popped first
                    Ok(children) => self.stack.extend(children.into_iter().rev()),
                    Err(err) => warn!(%node, error = %err, "failed to list children"),
                }
            }

            if (self.accept)(&entry) {
                trace!(key = %entry.key(), "accepted");
                return Some(Ok(entry));
            }
        }
        None
    }
}

/// Accept / descend into everything
pub fn always(_: &EntryHandle) -> bool {
    true
}

/// Whether a display name is a GUID (hyphenated or braced)
///
/// Hosts use such names for internal virtual folders.
pub fn is_guid_name(name: &str) -> bool {
    let shaped = name.len() == 36 || (name.len() == 38 && name.starts_with('{') && name.ends_with('}'));
    shaped && Uuid::try_parse(name).is_ok()
}

/// Descend predicate skipping GUID-named virtual folders
pub fn descend_unless_guid_named(entry: &EntryHandle) -> bool {
    !is_guid_name(&entry.name())
}

/// Accept predicate matching file extensions (case-insensitive, no dot)
pub fn has_extension<S: AsRef<str>>(extensions: &[S]) -> impl Fn(&EntryHandle) -> bool + Send + Sync + 'static {
    let extensions: Vec<String> = extensions
        .iter()
        .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
        .collect();
    move |entry| {
        let name = entry.canonical_name().unwrap_or_else(|| entry.name());
        Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }
}
