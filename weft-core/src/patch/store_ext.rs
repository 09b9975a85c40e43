//! Patch-level operations on value stores.

use crate::error::PatchError;
use crate::store::{Store, SubscribeOptions, Subscription};
use crate::value::Value;

use super::{apply_patches, diff, Patch};

impl Store<Value> {
    /// Subscribe to the store as a stream of patch lists.
    ///
    /// On every change the listener receives the forward patches from the
    /// previously observed value and the inverse patches back to it.
    /// Changes that diff to nothing are not delivered.
    pub fn subscribe_patches(
        &self,
        mut listener: impl FnMut(&[Patch], &[Patch]) + Send + 'static,
    ) -> Subscription {
        let mut previous = self.get();
        self.subscribe_with(
            move |next: &Value| {
                let result = diff(&previous, next);
                if !result.is_empty() {
                    listener(&result.patches, &result.inverse);
                }
                previous = next.clone();
            },
            SubscribeOptions::default().run_now(false),
        )
    }

    /// Apply patches to the current value and store the result.
    ///
    /// The store is untouched if any patch fails.
    pub fn apply_patches(&self, patches: &[Patch]) -> Result<(), PatchError> {
        let next = apply_patches(&self.get(), patches)?;
        self.set(next);
        Ok(())
    }
}
