//! Async Computation Engine
//!
//! Extends the computation engine with asynchronous production functions.
//! An [`AsyncStore`] runs an action on first subscription, tracks the
//! stores the action reads (same contract as computed stores), and drives
//! a pending/value/error state machine with orthogonal stale and pending
//! flags. Timers can invalidate or clear the store after settlement, and
//! long-lived push sources (sockets, polling loops) can feed values in
//! out of band through a registered handle.
//!
//! [`AsyncCollection`] memoizes instances per argument tuple so repeated
//! calls with equal arguments share one instance and one in-flight run.
//!
//! Everything here assumes an ambient tokio runtime: runs are spawned
//! tasks and timers are tokio sleeps.

mod collection;
mod instance;
mod state;

pub use collection::AsyncCollection;
pub use instance::{AsyncCx, AsyncOptions, AsyncStore, Delay, PushHandle};
pub use state::{AsyncState, Status};
