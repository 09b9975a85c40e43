//! Async store state.

use std::fmt;

use crate::error::ActionError;

/// The settled portion of an async store's state.
///
/// Exactly one of value/error is present outside `Empty`.
#[derive(Clone)]
pub enum Status<T> {
    /// No value has ever landed.
    Empty,
    /// The last settlement produced a value.
    Value(T),
    /// The last settlement produced an error.
    Error(ActionError),
}

/// Snapshot of an async store: a status tag plus two orthogonal flags.
///
/// `is_pending` means a run is in flight; `is_stale` means the current
/// value or error is known out of date but still being served. A
/// `Value` state can be stale and pending at once while a refresh runs.
#[derive(Clone)]
pub struct AsyncState<T> {
    pub status: Status<T>,
    pub is_pending: bool,
    pub is_stale: bool,
}

impl<T> AsyncState<T> {
    /// The initial state: empty, not pending, not stale.
    pub fn empty() -> Self {
        Self {
            status: Status::Empty,
            is_pending: false,
            is_stale: false,
        }
    }

    /// The current value, if the last settlement produced one.
    pub fn value(&self) -> Option<&T> {
        match &self.status {
            Status::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The current error, if the last settlement produced one.
    pub fn error(&self) -> Option<&ActionError> {
        match &self.status {
            Status::Error(error) => Some(error),
            _ => None,
        }
    }

    /// True before any settlement.
    pub fn is_empty(&self) -> bool {
        matches!(self.status, Status::Empty)
    }

    /// True once a value or error is present and no run is in flight.
    pub fn is_settled(&self) -> bool {
        !self.is_pending && !self.is_empty()
    }
}

impl<T> Default for AsyncState<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match &self.status {
            Status::Empty => "empty".to_string(),
            Status::Value(value) => format!("value({value:?})"),
            Status::Error(error) => format!("error({error})"),
        };
        f.debug_struct("AsyncState")
            .field("status", &tag)
            .field("is_pending", &self.is_pending)
            .field("is_stale", &self.is_stale)
            .finish()
    }
}
