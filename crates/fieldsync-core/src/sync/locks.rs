//! Per-record critical sections for the push path

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::EntityKind;

type RecordKey = (EntityKind, Uuid);

struct Slot {
    lock: Arc<AsyncMutex<()>>,
    /// Holders plus waiters
    users: usize,
}

/// Table of async locks keyed by `(entity type, uuid)`.
///
/// Changes to the same record are linearized; changes to different records
/// never wait on each other. Slots are dropped once nobody holds or awaits them.
#[derive(Clone, Default)]
pub struct RecordLocks {
    slots: Arc<Mutex<HashMap<RecordKey, Slot>>>,
}

/// Registration in a slot, taken before waiting and released on drop
struct SlotLease {
    key: RecordKey,
    locks: RecordLocks,
}

/// Held for the duration of one record's read-decide-write cycle
pub struct RecordGuard {
    // Field order matters: the mutex is released before the lease.
    _guard: OwnedMutexGuard<()>,
    _lease: SlotLease,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one record
    pub async fn acquire(&self, kind: EntityKind, uuid: Uuid) -> RecordGuard {
        let (lease, lock) = self.enter((kind, uuid));
        let guard = lock.lock_owned().await;
        RecordGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    /// Number of records currently locked or awaited
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enter(&self, key: RecordKey) -> (SlotLease, Arc<AsyncMutex<()>>) {
        let mut slots = self.slots();
        let slot = slots.entry(key).or_insert_with(|| Slot {
            lock: Arc::default(),
            users: 0,
        });
        slot.users += 1;
        let lease = SlotLease {
            key,
            locks: self.clone(),
        };
        (lease, Arc::clone(&slot.lock))
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<RecordKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        let mut slots = self.locks.slots();
        let vacant = slots.get_mut(&self.key).is_some_and(|slot| {
            slot.users = slot.users.saturating_sub(1);
            slot.users == 0
        });
        if vacant {
            slots.remove(&self.key);
        }
    }
}
