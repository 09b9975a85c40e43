//! Mutable Store Core
//!
//! The atomic unit of observable state. A [`Store`] holds a value, a set
//! of listeners, and lifecycle hooks fired when the store gains its first
//! listener or loses its last one. Everything else in the crate (computed
//! stores, async stores, the sync engine) is built on the
//! `get`/`set`/`subscribe` contract defined here.

mod actions;
mod core;
mod listener;
mod options;

pub use actions::{ListHandle, MapHandle, RecordHandle, SetHandle};
pub use core::{Store, StoreId, Subscription};
pub use options::SubscribeOptions;
