//! Population Locks
//!
//! At most one evolution cycle runs per population at a time.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use recoup::{ids::ShopUuid, variants::PopulationKey};
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockKey = (ShopUuid, PopulationKey);

#[derive(Debug, Clone, Default)]
pub struct PopulationLocks {
    locks: Arc<StdMutex<FxHashMap<LockKey, Arc<Mutex<()>>>>>,
}

impl PopulationLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the population, or `None` while another cycle holds it.
    pub fn try_acquire(&self, shop: ShopUuid, key: &PopulationKey) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

            Arc::clone(locks.entry((shop, key.clone())).or_default())
        };

        lock.try_lock_owned().ok()
    }
}
