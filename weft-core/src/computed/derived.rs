//! Computed store implementation.
//!
//! # Laziness
//!
//! A dependency change never recomputes eagerly. It drops the cached
//! value and bumps an internal version store; the bump propagates through
//! the normal store notification path to this computed store's own
//! subscribers, and the next `get` (from a subscriber's delivery or a
//! direct read) runs the computation again.
//!
//! # Dependency resubscription
//!
//! Every evaluation collects a fresh dependency set and replaces the
//! previous subscriptions wholesale. A source read only inside a branch
//! is subscribed only while that branch is taken.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::equality::Equality;
use crate::error::StoreError;
use crate::store::{Store, StoreId, SubscribeOptions, Subscription};

use super::context::{ComputeCx, Source};

struct ComputedInner<T> {
    id: StoreId,
    compute: Box<dyn Fn(&mut ComputeCx) -> T + Send + Sync>,
    cache: Mutex<Option<T>>,
    /// Guards against the computation reading its own value.
    computing: AtomicBool,
    /// Current dependency subscriptions; replaced wholesale on recompute.
    dependencies: Mutex<Vec<Subscription>>,
    /// Bumped on invalidation; subscribers listen here.
    version: Store<u64>,
}

/// A read-only store derived from other stores via a tracked function.
///
/// # Example
///
/// ```rust,ignore
/// let base = Store::new(2);
/// let doubled = Computed::new({
///     let base = base.clone();
///     move |cx| cx.get(&base) * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// base.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed store. The function does not run until the first
    /// read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&mut ComputeCx) -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ComputedInner {
                id: StoreId::new(),
                compute: Box::new(compute),
                cache: Mutex::new(None),
                computing: AtomicBool::new(false),
                dependencies: Mutex::new(Vec::new()),
                version: Store::new(0),
            }),
        }
    }

    /// The computed store's unique ID.
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    /// Get the current value, recomputing if a dependency invalidated it.
    ///
    /// # Panics
    ///
    /// Panics if the computation reads its own value during evaluation.
    /// Use [`try_get`](Computed::try_get) to handle that case as an error.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value, or [`StoreError::CircularDependency`] if the
    /// computation is already evaluating on this computed store.
    pub fn try_get(&self) -> Result<T, StoreError> {
        if let Some(value) = self.inner.cache.lock().clone() {
            return Ok(value);
        }
        self.recompute()
    }

    /// Whether a cached value is present (false after invalidation).
    pub fn is_fresh(&self) -> bool {
        self.inner.cache.lock().is_some()
    }

    /// Number of dependency subscriptions held from the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }

    /// Register a listener, materializing the value as needed.
    pub fn subscribe(&self, listener: impl FnMut(&T) + Send + 'static) -> Subscription {
        self.subscribe_with(listener, SubscribeOptions::default())
    }

    /// Register a listener with options. Throttling coalesces
    /// invalidations; the value delivered at the trailing edge is the one
    /// current at delivery time.
    pub fn subscribe_with(
        &self,
        mut listener: impl FnMut(&T) + Send + 'static,
        options: SubscribeOptions<T>,
    ) -> Subscription {
        // Evaluate up front when the listener is deferred: an unevaluated
        // computed holds no dependency watches, so nothing would ever bump
        // the version.
        if !options.run_now {
            let _ = self.try_get();
        }
        let this = self.clone();
        let equals = options.equals;
        let mut last_delivered: Option<T> = None;
        let wrapper = move |_version: &u64| {
            let value = this.get();
            if let Some(last) = &last_delivered {
                if equals.is_equal(last, &value) {
                    return;
                }
            }
            last_delivered = Some(value.clone());
            listener(&value);
        };
        self.inner.version.subscribe_with(
            wrapper,
            SubscribeOptions {
                run_now: options.run_now,
                throttle: options.throttle,
                equals: Equality::Always,
            },
        )
    }

    fn recompute(&self) -> Result<T, StoreError> {
        if self.inner.computing.swap(true, Ordering::SeqCst) {
            return Err(StoreError::CircularDependency);
        }
        // Reset the guard even if the computation panics.
        struct Reset<'a>(&'a AtomicBool);
        impl Drop for Reset<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }
        let reset = Reset(&self.inner.computing);

        let mut cx = ComputeCx::new();
        let value = (self.inner.compute)(&mut cx);
        drop(reset);

        *self.inner.cache.lock() = Some(value.clone());

        // Replace the dependency set with exactly the sources read during
        // this pass. Dropping the old subscriptions tears the old edges
        // down.
        let weak = Arc::downgrade(&self.inner);
        let on_change: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                invalidate(&inner);
            }
        });
        let fresh: Vec<Subscription> = cx
            .into_edges()
            .into_iter()
            .map(|edge| edge.connect(on_change.clone()))
            .collect();
        *self.inner.dependencies.lock() = fresh;

        Ok(value)
    }
}

/// Drop the cache and bump the version store. The bump is what reaches
/// this computed store's subscribers; recomputation waits for the next
/// read.
fn invalidate<T>(inner: &Arc<ComputedInner<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    let was_fresh = inner.cache.lock().take().is_some();
    if was_fresh {
        inner.version.update(|v| v + 1);
    }
}

impl<T> Source for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn key(&self) -> StoreId {
        self.inner.id
    }

    fn current(&self) -> T {
        self.get()
    }

    fn watch(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        self.inner.version.subscribe_with(
            move |_| on_change(),
            SubscribeOptions::default().run_now(false),
        )
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Computed<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("fresh", &self.is_fresh())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}
