//! Async store implementation.
//!
//! # Run lifecycle
//!
//! Each run captures a fresh generation number and an abort handle. A run
//! commits its settlement only if, after the action's future resolves,
//! the store's live generation still matches the captured one and the run
//! was not cancelled; otherwise the result is dropped. Cancellation is
//! cooperative: superseding runs, `clear`, and external overrides abort
//! the task, flip the run's cancelled flag, and fire any cleanups the
//! action registered for its push sources.
//!
//! # Timers
//!
//! `invalidate_after` and `clear_after` are rescheduled on every
//! settlement and cancelled on every cancellation, so only the latest
//! settled state is ever timed out.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::computed::{ComputeCx, Source};
use crate::error::ActionError;
use crate::store::{Store, StoreId, SubscribeOptions, Subscription};

use super::state::{AsyncState, Status};

type ActionFuture<T> = Pin<Box<dyn Future<Output = Result<T, ActionError>> + Send>>;
type BoxedAction<T> = Arc<dyn Fn(AsyncCx<T>) -> ActionFuture<T> + Send + Sync>;
type UpdateFn<T> = Box<dyn FnOnce(Option<&T>) -> T + Send>;

/// A timer duration: fixed, or derived from the state being timed out.
pub enum Delay<T> {
    Fixed(Duration),
    From(Arc<dyn Fn(&AsyncState<T>) -> Option<Duration> + Send + Sync>),
}

impl<T> Delay<T> {
    /// Derive the duration from the settled state; `None` disables the
    /// timer for this settlement.
    pub fn from_state(f: impl Fn(&AsyncState<T>) -> Option<Duration> + Send + Sync + 'static) -> Self {
        Delay::From(Arc::new(f))
    }

    fn duration_for(&self, state: &AsyncState<T>) -> Option<Duration> {
        match self {
            Delay::Fixed(duration) => Some(*duration),
            Delay::From(f) => f(state),
        }
    }
}

impl<T> Clone for Delay<T> {
    fn clone(&self) -> Self {
        match self {
            Delay::Fixed(duration) => Delay::Fixed(*duration),
            Delay::From(f) => Delay::From(Arc::clone(f)),
        }
    }
}

impl<T> From<Duration> for Delay<T> {
    fn from(duration: Duration) -> Self {
        Delay::Fixed(duration)
    }
}

/// Options for an [`AsyncStore`].
pub struct AsyncOptions<T> {
    /// Mark the store stale (re-running if active) this long after each
    /// settlement.
    pub invalidate_after: Option<Delay<T>>,

    /// Reset the store to empty (re-running if active) this long after
    /// each settlement.
    pub clear_after: Option<Delay<T>>,

    /// How long a memoized instance may sit without subscribers before
    /// its collection evicts it.
    pub clear_unused_after: Duration,
}

impl<T> AsyncOptions<T> {
    pub fn invalidate_after(mut self, delay: impl Into<Delay<T>>) -> Self {
        self.invalidate_after = Some(delay.into());
        self
    }

    pub fn clear_after(mut self, delay: impl Into<Delay<T>>) -> Self {
        self.clear_after = Some(delay.into());
        self
    }

    pub fn clear_unused_after(mut self, duration: Duration) -> Self {
        self.clear_unused_after = duration;
        self
    }
}

impl<T> Default for AsyncOptions<T> {
    fn default() -> Self {
        Self {
            invalidate_after: None,
            clear_after: None,
            clear_unused_after: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl<T> Clone for AsyncOptions<T> {
    fn clone(&self) -> Self {
        Self {
            invalidate_after: self.invalidate_after.clone(),
            clear_after: self.clear_after.clone(),
            clear_unused_after: self.clear_unused_after,
        }
    }
}

/// Shared state of one run: the cancellation flag, registered cleanups,
/// and the push buffer.
struct RunShared<T>
where
    T: Clone + Send + Sync + 'static,
{
    cancelled: AtomicBool,
    settled: AtomicBool,
    cleanups: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    buffered: Mutex<Vec<UpdateFn<T>>>,
    store: Weak<AsyncInner<T>>,
}

struct CurrentRun<T>
where
    T: Clone + Send + Sync + 'static,
{
    shared: Arc<RunShared<T>>,
    abort: AbortHandle,
}

/// Handle given to registered push sources.
///
/// Push updates are serialized in arrival order. Updates pushed before
/// the run's first settlement are buffered and replayed once a value
/// lands; updates pushed after the run was cancelled are dropped with a
/// warning.
pub struct PushHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    run: Weak<RunShared<T>>,
}

impl<T> Clone for PushHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            run: Weak::clone(&self.run),
        }
    }
}

impl<T> PushHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Apply an out-of-band update to the store's value.
    pub fn push(&self, update: impl FnOnce(Option<&T>) -> T + Send + 'static) {
        let Some(run) = self.run.upgrade() else {
            warn!("push after async store teardown; update dropped");
            return;
        };
        if run.cancelled.load(Ordering::SeqCst) {
            warn!("push after run cancellation; update dropped");
            return;
        }
        if !run.settled.load(Ordering::SeqCst) {
            run.buffered.lock().push(Box::new(update));
            return;
        }
        if let Some(inner) = run.store.upgrade() {
            apply_push(&inner, Box::new(update));
        }
    }
}

/// The tracking and registration handle passed to async actions.
pub struct AsyncCx<T>
where
    T: Clone + Send + Sync + 'static,
{
    edges: Arc<Mutex<ComputeCx>>,
    run: Arc<RunShared<T>>,
}

impl<T> Clone for AsyncCx<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            edges: Arc::clone(&self.edges),
            run: Arc::clone(&self.run),
        }
    }
}

impl<T> AsyncCx<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Read a source and record it as a dependency of this run. When any
    /// recorded dependency changes after settlement, the store is cleared
    /// (re-running immediately if active).
    pub fn get<S: Source>(&self, source: &S) -> S::Output {
        self.edges.lock().get(source)
    }

    /// Read a source without recording a dependency.
    pub fn peek<S: Source>(&self, source: &S) -> S::Output {
        self.edges.lock().peek(source)
    }

    /// Register a long-lived push source. `setup` receives a
    /// [`PushHandle`] and returns a cleanup closure invoked when the run
    /// is cancelled.
    pub fn register<S, C>(&self, setup: S)
    where
        S: FnOnce(PushHandle<T>) -> C,
        C: FnOnce() + Send + 'static,
    {
        let handle = PushHandle {
            run: Arc::downgrade(&self.run),
        };
        let cleanup = setup(handle);
        self.run.cleanups.lock().push(Box::new(cleanup));
    }
}

struct AsyncInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    state: Store<AsyncState<T>>,
    action: BoxedAction<T>,
    generation: AtomicU64,
    current_run: Mutex<Option<CurrentRun<T>>>,
    dependencies: Mutex<Vec<Subscription>>,
    timers: Mutex<Vec<AbortHandle>>,
    options: AsyncOptions<T>,
}

/// An asynchronously produced store value with pending/stale semantics.
///
/// The action runs on the ambient tokio runtime, triggered by the first
/// subscriber (or an explicit `invalidate`/`clear` while active).
///
/// # Example
///
/// ```rust,ignore
/// let user = AsyncStore::new(|_cx| async move {
///     Ok(fetch_user().await?)
/// });
///
/// let _sub = user.subscribe(|state| {
///     if let Some(value) = state.value() {
///         println!("user: {value:?}");
///     }
/// });
/// ```
pub struct AsyncStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<AsyncInner<T>>,
}

impl<T> Clone for AsyncStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> AsyncStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an async store with default options.
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn(AsyncCx<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ActionError>> + Send + 'static,
    {
        Self::with_options(action, AsyncOptions::default())
    }

    /// Create an async store.
    pub fn with_options<F, Fut>(action: F, options: AsyncOptions<T>) -> Self
    where
        F: Fn(AsyncCx<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ActionError>> + Send + 'static,
    {
        let boxed: BoxedAction<T> = Arc::new(move |cx| Box::pin(action(cx)));
        let inner = Arc::new(AsyncInner {
            state: Store::new(AsyncState::empty()),
            action: boxed,
            generation: AtomicU64::new(0),
            current_run: Mutex::new(None),
            dependencies: Mutex::new(Vec::new()),
            timers: Mutex::new(Vec::new()),
            options,
        });

        // First-subscriber trigger. Deferred to a task so the subscriber
        // observes the pre-run state before the pending transition.
        let weak = Arc::downgrade(&inner);
        inner
            .state
            .on_active(move || {
                if let Some(inner) = weak.upgrade() {
                    tokio::spawn(async move {
                        maybe_run(&inner);
                    });
                }
            })
            .detach();

        Self { inner }
    }

    /// The underlying state store's unique ID.
    pub fn id(&self) -> StoreId {
        self.inner.state.id()
    }

    /// Snapshot the current state.
    pub fn get(&self) -> AsyncState<T> {
        self.inner.state.get()
    }

    /// True while the store has at least one subscriber.
    pub fn is_active(&self) -> bool {
        self.inner.state.is_active()
    }

    /// Subscribe to state transitions with default options.
    pub fn subscribe(&self, listener: impl FnMut(&AsyncState<T>) + Send + 'static) -> Subscription {
        self.inner.state.subscribe(listener)
    }

    /// Subscribe to state transitions.
    pub fn subscribe_with(
        &self,
        listener: impl FnMut(&AsyncState<T>) + Send + 'static,
        options: SubscribeOptions<AsyncState<T>>,
    ) -> Subscription {
        self.inner.state.subscribe_with(listener, options)
    }

    /// Register a callback fired on every 0 → 1 subscriber transition.
    pub fn on_active(&self, hook: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.state.on_active(hook)
    }

    /// Register a callback fired on every 1 → 0 subscriber transition.
    pub fn on_inactive(&self, hook: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.state.on_inactive(hook)
    }

    /// Mark the current value stale; if the store is active, re-run
    /// immediately.
    pub fn invalidate(&self) {
        let state = self.inner.state.get();
        if !state.is_stale {
            self.inner.state.update(|s| AsyncState {
                status: s.status.clone(),
                is_pending: s.is_pending,
                is_stale: true,
            });
        }
        if self.inner.state.is_active() {
            run(&self.inner);
        }
    }

    /// Reset to empty. If the store is active the reset state is pending
    /// and a new run starts immediately; otherwise it is truly empty.
    pub fn clear(&self) {
        clear_inner(&self.inner);
    }

    /// Externally override the value, cancelling any in-flight run and
    /// resetting the settlement timers.
    pub fn set_value(&self, value: T) {
        override_settle(&self.inner, Ok(value));
    }

    /// Externally override with an error; same cancellation semantics as
    /// [`set_value`](AsyncStore::set_value).
    pub fn set_error(&self, error: ActionError) {
        override_settle(&self.inner, Err(error));
    }

    /// Resolve with the value (or reject with the error) of the first
    /// settled, non-pending, non-stale state. Subscribing here counts as
    /// activity, so calling this on an idle store starts a run.
    pub async fn value(&self) -> Result<T, ActionError> {
        self.value_with(false).await
    }

    /// As [`value`](AsyncStore::value); `return_stale` accepts a stale
    /// settlement instead of waiting for the refresh.
    pub async fn value_with(&self, return_stale: bool) -> Result<T, ActionError> {
        let notify = Arc::new(Notify::new());
        let waker = Arc::clone(&notify);
        let _sub = self.inner.state.subscribe_with(
            move |_| waker.notify_waiters(),
            SubscribeOptions::default().run_now(false),
        );
        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let state = self.inner.state.get();
            if !state.is_pending && (return_stale || !state.is_stale) {
                match &state.status {
                    Status::Value(value) => return Ok(value.clone()),
                    Status::Error(error) => return Err(Arc::clone(error)),
                    Status::Empty => {}
                }
            }
            notified.await;
        }
    }
}

impl<T> fmt::Debug for AsyncStore<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncStore")
            .field("id", &self.id())
            .field("state", &self.get())
            .field("active", &self.is_active())
            .finish()
    }
}

fn maybe_run<T>(inner: &Arc<AsyncInner<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    let state = inner.state.get();
    if state.is_pending {
        return;
    }
    if state.is_empty() || state.is_stale {
        run(inner);
    }
}

fn run<T>(inner: &Arc<AsyncInner<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
    cancel_current(inner);
    clear_timers(inner);
    mark_pending(inner);
    debug!(generation, "async store run started");

    let shared = Arc::new(RunShared {
        cancelled: AtomicBool::new(false),
        settled: AtomicBool::new(false),
        cleanups: Mutex::new(Vec::new()),
        buffered: Mutex::new(Vec::new()),
        store: Arc::downgrade(inner),
    });
    let cx = AsyncCx {
        edges: Arc::new(Mutex::new(ComputeCx::new())),
        run: Arc::clone(&shared),
    };
    let edges = Arc::clone(&cx.edges);
    let future = (inner.action)(cx);

    let weak = Arc::downgrade(inner);
    let shared_task = Arc::clone(&shared);
    let task = tokio::spawn(async move {
        let result = future.await;
        if shared_task.cancelled.load(Ordering::SeqCst) {
            debug!("async run settled after cancellation; result dropped");
            return;
        }
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if inner.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "async run superseded; result dropped");
            return;
        }
        commit(&inner, result, &edges, &shared_task);
    });
    *inner.current_run.lock() = Some(CurrentRun {
        shared,
        abort: task.abort_handle(),
    });
}

fn commit<T>(
    inner: &Arc<AsyncInner<T>>,
    result: Result<T, ActionError>,
    edges: &Arc<Mutex<ComputeCx>>,
    shared: &Arc<RunShared<T>>,
) where
    T: Clone + Send + Sync + 'static,
{
    settle_state(inner, result);

    // Commit the dependency set captured during the run; a dependency
    // change from here on clears the store.
    let weak = Arc::downgrade(inner);
    let on_change: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
        if let Some(inner) = weak.upgrade() {
            debug!("async store dependency changed; clearing");
            clear_inner(&inner);
        }
    });
    let collected = std::mem::replace(&mut *edges.lock(), ComputeCx::new());
    let fresh: Vec<Subscription> = collected
        .into_edges()
        .into_iter()
        .map(|edge| edge.connect(Arc::clone(&on_change)))
        .collect();
    *inner.dependencies.lock() = fresh;

    schedule_timers(inner);

    // Replay buffered push updates in arrival order.
    shared.settled.store(true, Ordering::SeqCst);
    let buffered: Vec<UpdateFn<T>> = shared.buffered.lock().drain(..).collect();
    for update in buffered {
        apply_push(inner, update);
    }
}

fn settle_state<T>(inner: &Arc<AsyncInner<T>>, result: Result<T, ActionError>)
where
    T: Clone + Send + Sync + 'static,
{
    let status = match result {
        Ok(value) => Status::Value(value),
        Err(error) => Status::Error(error),
    };
    inner.state.set(AsyncState {
        status,
        is_pending: false,
        is_stale: false,
    });
}

fn override_settle<T>(inner: &Arc<AsyncInner<T>>, result: Result<T, ActionError>)
where
    T: Clone + Send + Sync + 'static,
{
    // Bump the generation so a racing settlement loses even if the abort
    // arrives late.
    inner.generation.fetch_add(1, Ordering::SeqCst);
    cancel_current(inner);
    settle_state(inner, result);
    schedule_timers(inner);
}

fn clear_inner<T>(inner: &Arc<AsyncInner<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    inner.generation.fetch_add(1, Ordering::SeqCst);
    cancel_current(inner);
    clear_timers(inner);
    inner.dependencies.lock().clear();
    if inner.state.is_active() {
        inner.state.set(AsyncState {
            status: Status::Empty,
            is_pending: true,
            is_stale: false,
        });
        run(inner);
    } else {
        inner.state.set(AsyncState::empty());
    }
}

fn apply_push<T>(inner: &Arc<AsyncInner<T>>, update: UpdateFn<T>)
where
    T: Clone + Send + Sync + 'static,
{
    inner.state.update(|state| AsyncState {
        status: Status::Value(update(state.value())),
        is_pending: state.is_pending,
        is_stale: state.is_stale,
    });
    schedule_timers(inner);
}

fn mark_pending<T>(inner: &Arc<AsyncInner<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    if !inner.state.get().is_pending {
        inner.state.update(|state| AsyncState {
            status: state.status.clone(),
            is_pending: true,
            is_stale: state.is_stale,
        });
    }
}

fn cancel_current<T>(inner: &Arc<AsyncInner<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    let current = inner.current_run.lock().take();
    if let Some(run) = current {
        run.shared.cancelled.store(true, Ordering::SeqCst);
        run.abort.abort();
        let cleanups: Vec<Box<dyn FnOnce() + Send>> = run.shared.cleanups.lock().drain(..).collect();
        for cleanup in cleanups {
            cleanup();
        }
    }
}

fn clear_timers<T>(inner: &Arc<AsyncInner<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    for timer in inner.timers.lock().drain(..) {
        timer.abort();
    }
}

fn schedule_timers<T>(inner: &Arc<AsyncInner<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    clear_timers(inner);
    let state = inner.state.get();
    let mut timers = inner.timers.lock();

    if let Some(delay) = &inner.options.invalidate_after {
        if let Some(duration) = delay.duration_for(&state) {
            let weak = Arc::downgrade(inner);
            let task = tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                if let Some(inner) = weak.upgrade() {
                    AsyncStore { inner }.invalidate();
                }
            });
            timers.push(task.abort_handle());
        }
    }

    if let Some(delay) = &inner.options.clear_after {
        if let Some(duration) = delay.duration_for(&state) {
            let weak = Arc::downgrade(inner);
            let task = tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                if let Some(inner) = weak.upgrade() {
                    clear_inner(&inner);
                }
            });
            timers.push(task.abort_handle());
        }
    }
}
