//! Patch-based store synchronization.
//!
//! # How a session works
//!
//! The publishing side greets every consumer with a bootstrap message: a
//! single root `replace` carrying the current value and no
//! `previous_id`. Every subsequent message carries the patches of one
//! store change plus the id of the message before it, forming a causal
//! chain. The consuming side tracks the last id it accepted and rejects
//! any message whose `previous_id` does not match — a gap or reorder in
//! the chain is unrecoverable for the session and the consumer must
//! re-bootstrap.
//!
//! Transport is out of scope: the publisher hands messages to a closure
//! and the consumer reads them from any [`Stream`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::SyncError;
use crate::patch::Patch;
use crate::store::{Store, Subscription};
use crate::value::Value;

/// One step in a sync session's causal chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    /// Unique id of this message.
    pub id: String,

    /// Id of the message this one extends; `None` marks a bootstrap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,

    /// The edits of one store change. A bootstrap carries exactly one
    /// root `replace`.
    pub patches: Vec<Patch>,
}

impl SyncMessage {
    pub fn is_bootstrap(&self) -> bool {
        self.previous_id.is_none()
    }
}

/// Process-unique message ids: a per-process nonce plus a counter, so
/// ids from different publishers never collide by accident.
fn next_id() -> String {
    static NONCE: OnceLock<String> = OnceLock::new();
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nonce = NONCE.get_or_init(|| {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        format!("{:x}{:x}", std::process::id(), nanos)
    });
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nonce}-{count}")
}

/// Publish a store to one consumer.
///
/// Sends the bootstrap immediately, then one chained message per store
/// change for as long as the returned subscription lives.
pub fn connect_to_client(
    store: &Store<Value>,
    mut send: impl FnMut(SyncMessage) + Send + 'static,
) -> Subscription {
    let bootstrap = SyncMessage {
        id: next_id(),
        previous_id: None,
        patches: vec![Patch::replace(Vec::new(), store.get())],
    };
    let mut last_id = bootstrap.id.clone();
    debug!(id = %bootstrap.id, "sync session bootstrapped");
    send(bootstrap);

    store.subscribe_patches(move |patches, _inverse| {
        let message = SyncMessage {
            id: next_id(),
            previous_id: Some(last_id.clone()),
            patches: patches.to_vec(),
        };
        last_id = message.id.clone();
        send(message);
    })
}

/// The consuming half of a session: applies incoming messages to a
/// replica store, enforcing the causal chain.
#[derive(Debug, Default)]
pub struct SyncSession {
    last_accepted: Option<String>,
}

impl SyncSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one message to the replica.
    ///
    /// Bootstraps are always accepted and replace the replica's value
    /// wholesale; chained messages must extend the last accepted id.
    /// Both failure modes are fatal for the session.
    pub fn accept(&mut self, store: &Store<Value>, message: SyncMessage) -> Result<(), SyncError> {
        if !message.is_bootstrap() && message.previous_id != self.last_accepted {
            error!(
                expected = ?self.last_accepted,
                received = ?message.previous_id,
                "sync chain broken; session must re-bootstrap"
            );
            return Err(SyncError::CausalMismatch {
                expected: self.last_accepted.clone(),
                received: message.previous_id,
            });
        }

        store.apply_patches(&message.patches)?;
        debug!(id = %message.id, patches = message.patches.len(), "sync message applied");
        self.last_accepted = Some(message.id);
        Ok(())
    }
}

/// Mirror a publisher into `store` until the stream ends or the chain
/// breaks.
pub async fn connect_to_server<S>(store: &Store<Value>, stream: S) -> Result<(), SyncError>
where
    S: Stream<Item = SyncMessage>,
{
    let mut session = SyncSession::new();
    futures_util::pin_mut!(stream);
    while let Some(message) = stream.next().await {
        session.accept(store, message)?;
    }
    Ok(())
}
