//! Per-batch critical sections
//!
//! Every mutating batch operation holds the batch's guard for its whole
//! read-validate-write sequence, so two requests against the same batch are
//! applied one after the other. Different batches never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Idle entries are swept once the map grows past this size
const PRUNE_THRESHOLD: usize = 256;

#[derive(Default)]
pub struct BatchLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl BatchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `batch_id`
    pub async fn acquire(&self, batch_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                // Only the map holds an idle entry
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(batch_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
