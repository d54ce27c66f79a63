//! Entity engine for treesync
//!
//! This crate provides:
//! - The host tree contract ([`HostTree`]) and an in-memory host
//! - Identity cells keyed by [`StableKey`]
//! - Resolved / Stub / Invalidated variants with a checked transition protocol
//! - The arena-backed [`EntityStore`] and long-lived [`EntryHandle`]s
//! - A lazy depth-first tree walker with accept/descend predicates

pub mod error;
pub mod handle;
pub mod host;
pub mod identity;
pub mod memory;
pub mod store;
pub mod variant;
pub mod walk;

// Re-exports
pub use error::{CoreError, HostError};
pub use handle::{EntryHandle, ResolvedEntry, StubEntry};
pub use host::{Children, HostKind, HostTree, ItemId, NodeRef, ScopeId};
pub use identity::{IdentityCell, StableKey, DISPOSED};
pub use memory::{FixtureItem, FixtureProject, FixtureTree, MemoryHost};
pub use store::{Change, EntityId, EntitySignal, EntityStore, Property};
pub use variant::{Variant, VariantTag};
pub use walk::{collect_items_recursive, CollectItems, Predicate};

/// Result type for entity operations
pub type Result<T> = std::result::Result<T, CoreError>;
