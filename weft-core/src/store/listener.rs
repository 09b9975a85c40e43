//! Listener delivery pipeline.
//!
//! A registered listener sits behind two gates. The throttle gate (when
//! configured) coalesces deliveries into a time window, keeping only the
//! most recent value and emitting it on the trailing edge. The equality
//! gate remembers the last value that actually reached the listener and
//! suppresses deliveries the subscription's comparator considers equal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::equality::Equality;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The equality gate plus the listener itself.
struct Pipeline<T> {
    listener: Box<dyn FnMut(&T) + Send>,
    equals: Equality<T>,
    last_delivered: Option<T>,
}

impl<T: Clone> Pipeline<T> {
    fn deliver(&mut self, value: &T) {
        if let Some(last) = &self.last_delivered {
            if self.equals.is_equal(last, value) {
                return;
            }
        }
        self.last_delivered = Some(value.clone());
        (self.listener)(value);
    }
}

/// Trailing-edge throttle state.
struct ThrottleState<T> {
    last_emit: Option<Instant>,
    pending: Option<T>,
    scheduled: bool,
}

struct Throttle<T> {
    window: Duration,
    state: Mutex<ThrottleState<T>>,
}

/// One registered listener, shared between the store's registry and any
/// in-flight throttle task.
pub(crate) struct ListenerSlot<T> {
    id: ListenerId,
    cancelled: Arc<AtomicBool>,
    pipeline: Arc<Mutex<Pipeline<T>>>,
    queued: Arc<Mutex<Option<T>>>,
    throttle: Option<Arc<Throttle<T>>>,
}

impl<T> Clone for ListenerSlot<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cancelled: Arc::clone(&self.cancelled),
            pipeline: Arc::clone(&self.pipeline),
            queued: Arc::clone(&self.queued),
            throttle: self.throttle.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ListenerSlot<T> {
    pub(crate) fn new(
        listener: impl FnMut(&T) + Send + 'static,
        equals: Equality<T>,
        throttle: Option<Duration>,
    ) -> Self {
        Self {
            id: ListenerId::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            pipeline: Arc::new(Mutex::new(Pipeline {
                listener: Box::new(listener),
                equals,
                last_delivered: None,
            })),
            queued: Arc::new(Mutex::new(None)),
            throttle: throttle.map(|window| {
                Arc::new(Throttle {
                    window,
                    state: Mutex::new(ThrottleState {
                        last_emit: None,
                        pending: None,
                        scheduled: false,
                    }),
                })
            }),
        }
    }

    pub(crate) fn id(&self) -> ListenerId {
        self.id
    }

    /// Mark the slot cancelled; in-flight throttle tasks become no-ops.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Push a value through the throttle and equality gates.
    pub(crate) fn notify(&self, value: &T) {
        if self.is_cancelled() {
            return;
        }
        match &self.throttle {
            None => self.dispatch(value),
            Some(throttle) => self.notify_throttled(throttle, value),
        }
    }

    /// Run the equality gate and listener for a value.
    ///
    /// A listener may itself mutate the store, which re-enters this slot
    /// while the pipeline lock is still held. The value is stashed first,
    /// so a re-entrant caller parks it and returns; the delivery holding
    /// the lock drains it once the listener comes back.
    fn dispatch(&self, value: &T) {
        *self.queued.lock() = Some(value.clone());
        loop {
            let Some(mut pipeline) = self.pipeline.try_lock() else {
                return;
            };
            loop {
                // Take in its own statement so the `queued` guard drops
                // before the listener runs; a re-entrant notify must be
                // able to park its value here.
                let next = self.queued.lock().take();
                let Some(next) = next else { break };
                pipeline.deliver(&next);
            }
            drop(pipeline);
            // A racing notify may have parked a value after the drain saw
            // the queue empty but before the lock was released.
            if self.queued.lock().is_none() {
                return;
            }
        }
    }

    fn notify_throttled(&self, throttle: &Arc<Throttle<T>>, value: &T) {
        let mut state = throttle.state.lock();
        let now = Instant::now();
        match state.last_emit {
            Some(last) if now < last + throttle.window => {
                // Inside the window: stash the value and make sure one
                // trailing-edge task is waiting for the window to close.
                state.pending = Some(value.clone());
                if !state.scheduled {
                    state.scheduled = true;
                    let deadline = last + throttle.window;
                    let throttle = Arc::clone(throttle);
                    let slot = self.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep_until(deadline).await;
                        let pending = {
                            let mut state = throttle.state.lock();
                            state.scheduled = false;
                            state.last_emit = Some(Instant::now());
                            state.pending.take()
                        };
                        if let Some(value) = pending {
                            if !slot.is_cancelled() {
                                slot.dispatch(&value);
                            }
                        }
                    });
                }
            }
            _ => {
                state.last_emit = Some(now);
                drop(state);
                self.dispatch(value);
            }
        }
    }
}
