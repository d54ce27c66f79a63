//! Error taxonomy for the entity engine

use crate::host::NodeRef;
use crate::identity::StableKey;
use crate::store::EntityId;
use crate::variant::VariantTag;
use thiserror::Error;

/// Failure while reading a node from the host
///
/// Recovered locally: the walker logs it and leaves the node out of the walk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("node {0} is not in the host tree")]
    NotFound(NodeRef),

    #[error("host query failed for node {node}: {reason}")]
    Query { node: NodeRef, reason: String },

    #[error("entity is no longer bound to a host node")]
    Detached,
}

/// Errors raised by the entity engine
#[derive(Debug, Error)]
pub enum CoreError {
    /// Illegal state transition requested by the caller
    ///
    /// Never recoverable: it means the walk sequencing is broken.
    #[error(
        "protocol violation on {key}: {} -> {to} ({reason})",
        VariantTag::describe(.from)
    )]
    ProtocolViolation {
        key: StableKey,
        from: Option<VariantTag>,
        to: VariantTag,
        reason: &'static str,
    },

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    #[error("entity {0} is disposed")]
    Disposed(EntityId),
}

impl CoreError {
    /// Whether this error must abort the enclosing operation
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, CoreError::ProtocolViolation { .. })
    }
}
