use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use seatline_core::locks::{SeatKey, SeatLease, SeatLockManager};
use seatline_core::{CoreError, CoreResult};
use tokio::sync::Mutex as SeatMutex;
use tracing::debug;
use uuid::Uuid;

/// Per-seat `tokio` mutexes for a single process.
///
/// Entries are created on demand and pruned once no lease or waiter references them.
#[derive(Default)]
pub struct LocalSeatLocks {
    seats: Mutex<HashMap<SeatKey, Arc<SeatMutex<()>>>>,
}

impl LocalSeatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: SeatKey) -> CoreResult<Arc<SeatMutex<()>>> {
        let mut seats = self
            .seats
            .lock()
            .map_err(|_| CoreError::Storage("seat lock table poisoned".to_string()))?;
        Ok(seats.entry(key).or_default().clone())
    }

    /// Number of seats currently tracked.
    pub fn tracked(&self) -> usize {
        self.seats.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SeatLockManager for LocalSeatLocks {
    async fn try_acquire(&self, key: SeatKey) -> CoreResult<Option<SeatLease>> {
        let slot = self.slot(key)?;
        match slot.try_lock_owned() {
            Ok(guard) => Ok(Some(SeatLease::local(key, Uuid::new_v4().to_string(), guard))),
            Err(_) => {
                debug!(seat = %key, "Seat locked by another claim, skipping");
                Ok(None)
            }
        }
    }

    async fn acquire(&self, key: SeatKey) -> CoreResult<SeatLease> {
        let slot = self.slot(key)?;
        let guard = slot.lock_owned().await;
        Ok(SeatLease::local(key, Uuid::new_v4().to_string(), guard))
    }

    async fn release(&self, lease: SeatLease) -> CoreResult<()> {
        let key = lease.key;
        drop(lease);

        let mut seats = self
            .seats
            .lock()
            .map_err(|_| CoreError::Storage("seat lock table poisoned".to_string()))?;
        // Only the map holds it: nobody is locked on or waiting for this seat.
        if seats.get(&key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            seats.remove(&key);
        }
        Ok(())
    }
}
