//! Memoized families of async stores keyed by argument value.
//!
//! A collection maps canonicalized arguments to one [`AsyncStore`]
//! instance each, so every caller asking for the same arguments shares
//! one run, one settled value, and one set of timers. Keys are the
//! canonical JSON form of the arguments with object keys recursively
//! sorted, so argument structures that differ only in field order map to
//! the same instance.
//!
//! Instances are evicted after sitting without subscribers for
//! `clear_unused_after`; a resubscription inside that window keeps the
//! instance (and its settled value) alive.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::error::{ActionError, StoreError};

use super::instance::{AsyncCx, AsyncOptions, AsyncStore};

type ActionFuture<T> = Pin<Box<dyn Future<Output = Result<T, ActionError>> + Send>>;
type CollectionAction<A, T> = Arc<dyn Fn(AsyncCx<T>, A) -> ActionFuture<T> + Send + Sync>;

struct CollectionInner<A, T>
where
    T: Clone + Send + Sync + 'static,
{
    stores: DashMap<String, AsyncStore<T>>,
    action: CollectionAction<A, T>,
    options: AsyncOptions<T>,
}

/// A memoized family of [`AsyncStore`]s, one per distinct argument value.
pub struct AsyncCollection<A, T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<CollectionInner<A, T>>,
}

impl<A, T> Clone for AsyncCollection<A, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> AsyncCollection<A, T>
where
    A: Clone + Serialize + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create a collection with default per-instance options.
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn(AsyncCx<T>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ActionError>> + Send + 'static,
    {
        Self::with_options(action, AsyncOptions::default())
    }

    /// Create a collection whose instances all share `options`.
    pub fn with_options<F, Fut>(action: F, options: AsyncOptions<T>) -> Self
    where
        F: Fn(AsyncCx<T>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ActionError>> + Send + 'static,
    {
        let action: CollectionAction<A, T> = Arc::new(move |cx, args| Box::pin(action(cx, args)));
        Self {
            inner: Arc::new(CollectionInner {
                stores: DashMap::new(),
                action,
                options,
            }),
        }
    }

    /// Fetch (or lazily create) the instance for `args`.
    ///
    /// The instance does not run until it gains a subscriber.
    pub fn get(&self, args: &A) -> Result<AsyncStore<T>, StoreError> {
        let key = canonical_key(args)?;
        if let Some(existing) = self.inner.stores.get(&key) {
            return Ok(existing.clone());
        }
        let store = self
            .inner
            .stores
            .entry(key.clone())
            .or_insert_with(|| self.build_store(key, args.clone()))
            .clone();
        Ok(store)
    }

    /// Mark every live instance stale; active ones re-run immediately.
    pub fn invalidate_all(&self) {
        for entry in self.inner.stores.iter() {
            entry.value().invalidate();
        }
    }

    /// Reset every live instance to empty; active ones re-run immediately.
    pub fn clear_all(&self) {
        for entry in self.inner.stores.iter() {
            entry.value().clear();
        }
    }

    /// Number of live (not yet evicted) instances.
    pub fn len(&self) -> usize {
        self.inner.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.stores.is_empty()
    }

    fn build_store(&self, key: String, args: A) -> AsyncStore<T> {
        let action = Arc::clone(&self.inner.action);
        let store = AsyncStore::with_options(
            move |cx| (action)(cx, args.clone()),
            self.inner.options.clone(),
        );

        // Epoch-checked eviction: every activation bumps the epoch, and
        // the deactivation timer only removes the instance if no
        // activation happened while it slept.
        let epoch = Arc::new(AtomicU64::new(0));
        let epoch_on_active = Arc::clone(&epoch);
        store
            .on_active(move || {
                epoch_on_active.fetch_add(1, Ordering::SeqCst);
            })
            .detach();

        let weak: Weak<CollectionInner<A, T>> = Arc::downgrade(&self.inner);
        let linger = self.inner.options.clear_unused_after;
        store
            .on_inactive(move || {
                let snapshot = epoch.load(Ordering::SeqCst);
                let epoch = Arc::clone(&epoch);
                let weak = weak.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(linger).await;
                    if epoch.load(Ordering::SeqCst) != snapshot {
                        return;
                    }
                    if let Some(inner) = weak.upgrade() {
                        let removed = inner.stores.remove_if(&key, |_, store| !store.is_active());
                        if removed.is_some() {
                            debug!(%key, "evicted unused collection instance");
                        }
                    }
                });
            })
            .detach();

        store
    }
}

/// Canonical cache key for an argument value: its JSON form with object
/// keys recursively sorted.
fn canonical_key<A: Serialize>(args: &A) -> Result<String, StoreError> {
    let value = serde_json::to_value(args).map_err(|err| StoreError::Arguments(err.to_string()))?;
    Ok(canonical(value).to_string())
}

fn canonical(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> = map
                .into_iter()
                .map(|(key, value)| (key, canonical(value)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(entries.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(canonical).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_store::AsyncState;
    use crate::value::Value;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    fn record(entries: &[(&str, i64)]) -> Value {
        Value::record(entries.iter().map(|(k, v)| (k.to_string(), Value::from(*v))))
    }

    #[tokio::test]
    async fn same_args_share_one_instance_and_one_run() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_inner = runs.clone();
        let collection: AsyncCollection<i64, i64> =
            AsyncCollection::new(move |_cx, args| {
                let runs = runs_inner.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(args * 10)
                }
            });

        let first = collection.get(&4).unwrap();
        let second = collection.get(&4).unwrap();
        assert_eq!(first.id(), second.id());

        assert_eq!(first.value().await.unwrap(), 40);
        assert_eq!(second.get().value(), Some(&40));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let other = collection.get(&5).unwrap();
        assert_ne!(other.id(), first.id());
        assert_eq!(collection.len(), 2);
    }

    #[tokio::test]
    async fn argument_field_order_does_not_split_instances() {
        let collection: AsyncCollection<Value, i64> =
            AsyncCollection::new(|_cx, _args| async { Ok(0) });

        let forward = collection
            .get(&record(&[("page", 1), ("query", 2)]))
            .unwrap();
        let reversed = collection
            .get(&record(&[("query", 2), ("page", 1)]))
            .unwrap();
        assert_eq!(forward.id(), reversed.id());
        assert_eq!(collection.len(), 1);

        // Nested records canonicalize too.
        let nested_a = Value::record([
            ("outer".to_string(), record(&[("a", 1), ("b", 2)])),
            ("flag".to_string(), Value::from(true)),
        ]);
        let nested_b = Value::record([
            ("flag".to_string(), Value::from(true)),
            ("outer".to_string(), record(&[("b", 2), ("a", 1)])),
        ]);
        assert_eq!(
            collection.get(&nested_a).unwrap().id(),
            collection.get(&nested_b).unwrap().id()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unused_instances_are_evicted_after_the_linger_window() {
        let collection: AsyncCollection<i64, i64> = AsyncCollection::with_options(
            |_cx, args| async move { Ok(args) },
            AsyncOptions::default().clear_unused_after(Duration::from_secs(60)),
        );

        let store = collection.get(&1).unwrap();
        let sub = store.subscribe(|_: &AsyncState<i64>| {});
        assert_eq!(store.value().await.unwrap(), 1);
        sub.cancel();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(collection.is_empty());

        // A fresh fetch builds a new, empty instance.
        let fresh = collection.get(&1).unwrap();
        assert_ne!(fresh.id(), store.id());
        assert!(fresh.get().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resubscription_inside_the_window_keeps_the_instance() {
        let collection: AsyncCollection<i64, i64> = AsyncCollection::with_options(
            |_cx, args| async move { Ok(args) },
            AsyncOptions::default().clear_unused_after(Duration::from_secs(60)),
        );

        let store = collection.get(&1).unwrap();
        assert_eq!(store.value().await.unwrap(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let sub = store.subscribe(|_: &AsyncState<i64>| {});
        tokio::time::sleep(Duration::from_secs(40)).await;

        assert_eq!(collection.len(), 1);
        assert_eq!(store.get().value(), Some(&1));
        drop(sub);
    }

    #[tokio::test]
    async fn invalidate_all_refreshes_active_instances() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_inner = runs.clone();
        let collection: AsyncCollection<i64, i32> =
            AsyncCollection::new(move |_cx, _args| {
                let runs = runs_inner.clone();
                async move { Ok(runs.fetch_add(1, Ordering::SeqCst) + 1) }
            });

        let active = collection.get(&1).unwrap();
        let _sub = active.subscribe(|_: &AsyncState<i32>| {});
        assert_eq!(active.value().await.unwrap(), 1);

        let idle = collection.get(&2).unwrap();
        assert!(idle.get().is_empty());

        collection.invalidate_all();

        // The active instance re-runs; the idle one only carries the flag.
        assert_eq!(active.value().await.unwrap(), 2);
        assert!(idle.get().is_empty());
        assert!(!idle.get().is_pending);
    }
}
