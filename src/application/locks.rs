use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Size above which idle lock entries are pruned on the next acquisition.
const PRUNE_THRESHOLD: usize = 1024;

/// Per-order advisory locks.
///
/// Callbacks touching the same order run one at a time; different orders
/// proceed in parallel.
#[derive(Default, Clone)]
pub struct OrderLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, order_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(order_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
