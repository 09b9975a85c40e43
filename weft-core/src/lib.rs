//! Weft Core
//!
//! This crate provides the core runtime for the Weft reactive state
//! library. It implements:
//!
//! - Observable stores with equality-gated, throttleable subscriptions
//!   and activity lifecycle hooks
//! - Lazy computed stores with automatic dependency tracking
//! - Async stores: action-driven state with pending/stale semantics,
//!   race-safe cancellation, push sources, timers, and memoized
//!   collections
//! - A structural diff/patch engine over a JSON-like value model
//! - Patch-based store synchronization with a causal message chain
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `store`: Observable containers, subscriptions, typed container handles
//! - `computed`: Derived stores and the read-tracking context
//! - `async_store`: The async state machine and memoized collections
//! - `value` / `equality`: The structural data model and its equality engines
//! - `patch`: Diffing, inverse patches, and pure patch application
//! - `sync`: Bootstrap-plus-increments replication between stores
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::store::Store;
//! use weft_core::computed::Computed;
//!
//! // Create a store
//! let count = Store::new(0);
//!
//! // Create a derived value
//! let count_for_doubled = count.clone();
//! let doubled = Computed::new(move |cx| cx.get(&count_for_doubled) * 2);
//!
//! // Observe it
//! let _sub = doubled.subscribe(|value| {
//!     println!("doubled: {value}");
//! });
//!
//! // Update the store; the subscriber sees 10
//! count.set(5);
//! ```

pub mod async_store;
pub mod computed;
pub mod equality;
pub mod error;
pub mod patch;
pub mod store;
pub mod sync;
pub mod value;

pub use async_store::{AsyncCollection, AsyncState, AsyncStore, Status};
pub use computed::Computed;
pub use equality::Equality;
pub use error::{ActionError, PatchError, StoreError, SyncError};
pub use patch::{apply_patches, diff, Patch, PatchOp};
pub use store::{Store, Subscription};
pub use value::{Key, Value};
