//! Dependency tracking context.
//!
//! During one evaluation pass the context records an edge per distinct
//! source read, deduplicated by store id. Edges are deferred watch
//! factories: the computation commits them wholesale after the pass,
//! replacing the previous dependency set.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::store::{Store, StoreId, SubscribeOptions, Subscription};

/// Anything a computation can read and depend on.
///
/// Implemented by [`Store`] and [`Computed`](crate::Computed), so derived
/// stores can depend on other derived stores.
pub trait Source: Clone + Send + Sync + 'static {
    /// The value this source yields.
    type Output: Clone + Send + Sync + 'static;

    /// Identity used to deduplicate dependency edges.
    fn key(&self) -> StoreId;

    /// Read the current value without tracking.
    fn current(&self) -> Self::Output;

    /// Subscribe an invalidation callback; the callback must not fire for
    /// the current value, only for subsequent changes.
    fn watch(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Subscription;
}

impl<T> Source for Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn key(&self) -> StoreId {
        self.id()
    }

    fn current(&self) -> T {
        self.get()
    }

    fn watch(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        self.subscribe_with(
            move |_| on_change(),
            SubscribeOptions::default().run_now(false),
        )
    }
}

/// One recorded dependency edge: the source's identity plus a deferred
/// subscription factory, consumed when the computation commits its new
/// dependency set.
pub(crate) struct Edge {
    key: StoreId,
    watch: Box<dyn FnOnce(Arc<dyn Fn() + Send + Sync>) -> Subscription + Send>,
}

impl Edge {
    pub(crate) fn connect(self, on_change: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        (self.watch)(on_change)
    }
}

/// The read-tracking handle passed to computation functions.
pub struct ComputeCx {
    edges: SmallVec<[Edge; 4]>,
}

impl ComputeCx {
    pub(crate) fn new() -> Self {
        Self {
            edges: SmallVec::new(),
        }
    }

    /// Read a source's current value and record it as a dependency.
    ///
    /// Reading the same source multiple times records a single edge.
    pub fn get<S: Source>(&mut self, source: &S) -> S::Output {
        let key = source.key();
        if !self.edges.iter().any(|edge| edge.key == key) {
            let handle = source.clone();
            self.edges.push(Edge {
                key,
                watch: Box::new(move |on_change| handle.watch(on_change)),
            });
        }
        source.current()
    }

    /// Read without recording a dependency.
    pub fn peek<S: Source>(&self, source: &S) -> S::Output {
        source.current()
    }

    #[cfg(test)]
    pub(crate) fn dependency_count(&self) -> usize {
        self.edges.len()
    }

    pub(crate) fn into_edges(self) -> SmallVec<[Edge; 4]> {
        self.edges
    }
}
