//! Store implementation.
//!
//! # Notification
//!
//! `set` replaces the value first, then notifies. The notification loop
//! snapshots the listener registry (so mutation during iteration is safe)
//! and captures the store's generation counter. After each listener
//! invocation the live counter is compared against the captured one; if a
//! listener's side effect re-entered `set`, the counter moved and the
//! remaining loop is abandoned. The nested notification round has already
//! delivered the newer value to every listener, so later rounds always
//! supersede earlier ones and no listener observes values out of order.
//!
//! # Failure semantics
//!
//! Listener panics are not caught. They unwind through `set` (or
//! `subscribe`, for `run_now` deliveries) to the caller that triggered
//! the notification.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::listener::{ListenerId, ListenerSlot};
use super::options::SubscribeOptions;

/// Unique identifier for a store.
///
/// Computed stores use these to deduplicate dependency edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    /// Generate a new unique store ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for a registered listener or lifecycle hook.
///
/// Dropping the guard cancels the registration. Call
/// [`detach`](Subscription::detach) to keep the registration alive for the
/// life of the store instead.
pub struct Subscription(Option<Box<dyn FnOnce() + Send>>);

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(cancel)))
    }

    /// Cancel the registration now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }

    /// Keep the registration alive without holding the guard.
    pub fn detach(mut self) {
        self.0.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.0.is_some())
            .finish()
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

struct StoreInner<T> {
    id: StoreId,
    value: RwLock<T>,
    listeners: Mutex<Vec<ListenerSlot<T>>>,
    /// Bumped on every notification round; see the module docs.
    generation: AtomicU64,
    on_active: Mutex<Vec<(ListenerId, Hook)>>,
    on_inactive: Mutex<Vec<(ListenerId, Hook)>>,
}

/// A mutable container that exposes `get`/`set`/`subscribe`.
///
/// Cloning a `Store` produces another handle to the same state, the same
/// listeners, and the same lifecycle hooks.
///
/// # Example
///
/// ```rust,ignore
/// let count = Store::new(0);
///
/// let _sub = count.subscribe(|v| println!("count is {v}"));
///
/// count.set(5);
/// count.update(|v| v + 1);
/// ```
pub struct Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<StoreInner<T>>,
}

impl<T> Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new store with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: StoreId::new(),
                value: RwLock::new(value),
                listeners: Mutex::new(Vec::new()),
                generation: AtomicU64::new(0),
                on_active: Mutex::new(Vec::new()),
                on_inactive: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The store's unique ID.
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// Synchronous, never blocks on anything but the value lock, and has
    /// no side effects.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Replace the value and notify listeners.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            *guard = value;
        }
        self.notify_listeners();
    }

    /// Derive the next value from the current one, then `set` it.
    ///
    /// The update function runs against a clone of the current value and
    /// must be pure; the value is fully replaced before anyone is
    /// notified.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get();
        self.set(f(&current));
    }

    /// Register a listener with default options (`run_now`, no throttle,
    /// every `set` counts as a change).
    pub fn subscribe(&self, listener: impl FnMut(&T) + Send + 'static) -> Subscription {
        self.subscribe_with(listener, SubscribeOptions::default())
    }

    /// Register a listener.
    ///
    /// If this is the store's first listener, `on_active` hooks fire
    /// before the listener is added. With `run_now` the listener is
    /// invoked immediately with the current value, which also primes its
    /// equality gate.
    pub fn subscribe_with(
        &self,
        listener: impl FnMut(&T) + Send + 'static,
        options: SubscribeOptions<T>,
    ) -> Subscription {
        let slot = ListenerSlot::new(listener, options.equals, options.throttle);
        let slot_id = slot.id();

        let first = self.inner.listeners.lock().is_empty();
        if first {
            for (_, hook) in self.snapshot_hooks(&self.inner.on_active) {
                hook();
            }
        }
        self.inner.listeners.lock().push(slot.clone());

        if options.run_now {
            slot.notify(&self.get());
        }

        let inner = Arc::clone(&self.inner);
        Subscription::new(move || {
            slot.cancel();
            let emptied = {
                let mut listeners = inner.listeners.lock();
                let before = listeners.len();
                listeners.retain(|s| s.id() != slot_id);
                before > 0 && listeners.is_empty()
            };
            if emptied {
                let hooks: Vec<(ListenerId, Hook)> =
                    inner.on_inactive.lock().iter().cloned().collect();
                for (_, hook) in hooks {
                    hook();
                }
            }
        })
    }

    /// Register a callback fired on every 0 → 1 listener transition.
    pub fn on_active(&self, hook: impl Fn() + Send + Sync + 'static) -> Subscription {
        Self::add_hook(&self.inner, |inner| &inner.on_active, hook)
    }

    /// Register a callback fired on every 1 → 0 listener transition.
    pub fn on_inactive(&self, hook: impl Fn() + Send + Sync + 'static) -> Subscription {
        Self::add_hook(&self.inner, |inner| &inner.on_inactive, hook)
    }

    fn add_hook(
        inner: &Arc<StoreInner<T>>,
        select: impl Fn(&StoreInner<T>) -> &Mutex<Vec<(ListenerId, Hook)>> + Send + 'static,
        hook: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let id = ListenerId::new();
        select(inner).lock().push((id, Arc::new(hook)));
        let inner = Arc::clone(inner);
        Subscription::new(move || {
            select(&inner).lock().retain(|(hook_id, _)| *hook_id != id);
        })
    }

    fn snapshot_hooks(&self, hooks: &Mutex<Vec<(ListenerId, Hook)>>) -> Vec<(ListenerId, Hook)> {
        hooks.lock().iter().cloned().collect()
    }

    /// True while the store has at least one listener.
    pub fn is_active(&self) -> bool {
        !self.inner.listeners.lock().is_empty()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    fn notify_listeners(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot: Vec<ListenerSlot<T>> = self.inner.listeners.lock().clone();
        if snapshot.is_empty() {
            return;
        }
        let value = self.get();
        for slot in snapshot {
            slot.notify(&value);
            // A nested `set` inside the listener started a newer round
            // that already delivered the newer value; abandon this one.
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                break;
            }
        }
    }
}

impl<T> Clone for Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Store<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("value", &self.get())
            .field("listener_count", &self.listener_count())
            .finish()
    }
}
