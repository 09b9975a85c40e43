//! Error types.
//!
//! Failures surface either as typed errors from the operation that caused
//! them or, for async actions, as an error state in the data model.
//! Listener panics are deliberately not caught anywhere: they propagate to
//! whoever called `set` or `subscribe`.

use std::sync::Arc;

use thiserror::Error;

use crate::value::{Key, Kind};

/// Error type carried by failed async actions.
///
/// Stored behind `Arc` so the error state stays cloneable through the
/// store machinery.
pub type ActionError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Wrap any error into an [`ActionError`].
pub fn action_error<E>(err: E) -> ActionError
where
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(err)
}

/// Errors from store and computed-store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A computed store read its own value while it was evaluating.
    #[error("circular dependency: computed store read its own value during evaluation")]
    CircularDependency,

    /// A typed container handle was used against a value of another kind.
    #[error("expected a {expected} value, found {found}")]
    KindMismatch { expected: Kind, found: Kind },

    /// Collection arguments could not be canonicalized into a cache key.
    #[error("collection arguments are not serializable: {0}")]
    Arguments(String),
}

/// Errors from applying patches to a value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatchError {
    /// The patch path descends through a key that does not exist.
    #[error("no value at key `{key}` (depth {depth})")]
    PathNotFound { key: Key, depth: usize },

    /// The patch path descends into a scalar, or uses the wrong key shape
    /// for the container at that point.
    #[error("cannot index into {kind} with key `{key}` (depth {depth})")]
    WrongContainer { kind: Kind, key: Key, depth: usize },

    /// An `add` at a list or set position beyond the current length.
    #[error("insert position {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// An `add` or `replace` patch without a value to apply.
    #[error("{op} patch is missing its value")]
    MissingValue { op: &'static str },
}

/// Errors from a synchronization session.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An incoming message does not extend the locally accepted chain.
    /// Fatal for the session: the consumer must re-bootstrap.
    #[error("causal mismatch: expected previous id {expected:?}, message carries {received:?}")]
    CausalMismatch {
        expected: Option<String>,
        received: Option<String>,
    },

    /// A message's patches failed to apply.
    #[error(transparent)]
    Patch(#[from] PatchError),
}
