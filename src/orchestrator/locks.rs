// Per-chronicle serialization of check-then-write sequences.
//
// Admitting a generation, changing a chronicle's files and deleting a
// chronicle each read some state (audio file count, pending compositions)
// and then write based on it. Holding the chronicle's lock across both steps
// keeps two such sequences on the same chronicle from interleaving.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::ChronicleId;

#[derive(Default)]
pub(crate) struct ChronicleLocks {
    locks: Mutex<HashMap<ChronicleId, Arc<Mutex<()>>>>,
}

impl ChronicleLocks {
    /// Wait for exclusive access to `id`. Released when the guard drops.
    pub async fn acquire(&self, id: &ChronicleId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the entry of a deleted chronicle.
    pub async fn forget(&self, id: &ChronicleId) {
        self.locks.lock().await.remove(id);
    }
}
