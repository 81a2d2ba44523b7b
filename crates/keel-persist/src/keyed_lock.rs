use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use keel_types::Ghid;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type SlotMap = Arc<Mutex<HashMap<Ghid, Arc<AsyncMutex<()>>>>>;

/// Per-ghid async mutual exclusion.
///
/// Ingestion serializes on the object's deduplication ghid so that two
/// concurrent uploads of the same bytes cannot both pass the contains check.
/// Slots are created on demand and removed again once the last holder drops
/// its guard, so the map never grows with dead keys.
#[derive(Clone, Default)]
pub struct KeyedLock {
    slots: SlotMap,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another holder has it.
    pub async fn lock(&self, key: Ghid) -> KeyedGuard {
        let slot = {
            let mut slots = self.slots.lock().expect("lock poisoned");
            slots
                .entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = slot.clone().lock_owned().await;
        KeyedGuard {
            _guard: guard,
            key,
            slot,
            slots: Arc::clone(&self.slots),
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().expect("lock poisoned").len()
    }
}

/// Guard for one key; releases the slot (and evicts it if idle) on drop.
pub struct KeyedGuard {
    _guard: OwnedMutexGuard<()>,
    key: Ghid,
    slot: Arc<AsyncMutex<()>>,
    slots: SlotMap,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().expect("lock poisoned");
        // Three handles exist when nobody else is waiting: the map entry,
        // this guard's clone, and the owned mutex guard's own clone. Any
        // waiter holds a fourth, in which case the entry must stay.
        if Arc::strong_count(&self.slot) <= 3 {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn g(seed: u8) -> Ghid {
        Ghid::from_raw([seed; 32])
    }

    #[tokio::test]
    async fn same_key_is_mutually_exclusive() {
        let lock = KeyedLock::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = lock.lock(g(1)).await;
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(seen, 0, "two holders inside the critical section");
                tokio::time::sleep(Duration::from_millis(2)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let lock = KeyedLock::new();
        let _a = lock.lock(g(1)).await;
        // Completes immediately despite the held guard on another key.
        let _b = lock.lock(g(2)).await;
    }

    #[tokio::test]
    async fn idle_slots_are_evicted() {
        let lock = KeyedLock::new();
        {
            let _a = lock.lock(g(1)).await;
            let _b = lock.lock(g(2)).await;
            assert_eq!(lock.slot_count(), 2);
        }
        assert_eq!(lock.slot_count(), 0);
    }

    #[tokio::test]
    async fn slot_survives_while_contended() {
        let lock = KeyedLock::new();
        let guard = lock.lock(g(1)).await;
        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move {
                let _guard = lock.lock(g(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(lock.slot_count(), 1);
        drop(guard);
        waiter.await.unwrap();
        assert_eq!(lock.slot_count(), 0);
    }
}
