use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::OwnedMutexGuard;

use crate::error::CoreResult;
use crate::models::{RunKey, SeatId, TrainId};

/// Lock granularity for seat claims: one seat of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeatKey {
    pub train_id: TrainId,
    pub date: NaiveDate,
    pub seat_id: SeatId,
}

impl SeatKey {
    pub fn new(run: RunKey, seat_id: SeatId) -> Self {
        Self {
            train_id: run.train_id,
            date: run.date,
            seat_id,
        }
    }
}

impl fmt::Display for SeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seat:{}:{}:{}", self.train_id, self.date, self.seat_id)
    }
}

/// Proof of holding a seat lock. Hand it back through [`SeatLockManager::release`].
pub struct SeatLease {
    pub key: SeatKey,
    pub token: String,
    local: Option<OwnedMutexGuard<()>>,
}

impl SeatLease {
    /// Lease backed by an in-process mutex; dropping it unlocks.
    pub fn local(key: SeatKey, token: String, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            key,
            token,
            local: Some(guard),
        }
    }

    /// Lease held in an external lock store under `token`.
    pub fn remote(key: SeatKey, token: String) -> Self {
        Self { key, token, local: None }
    }

    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }
}

impl fmt::Debug for SeatLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeatLease")
            .field("key", &self.key)
            .field("local", &self.local.is_some())
            .finish()
    }
}

/// Exclusive per-seat locks shared by every allocator and canceller.
#[async_trait]
pub trait SeatLockManager: Send + Sync {
    /// Non-blocking. `None` means another claimant holds the seat right now.
    async fn try_acquire(&self, key: SeatKey) -> CoreResult<Option<SeatLease>>;

    /// Wait for the seat. Used by cancellation, which must not skip.
    async fn acquire(&self, key: SeatKey) -> CoreResult<SeatLease>;

    async fn release(&self, lease: SeatLease) -> CoreResult<()>;
}
