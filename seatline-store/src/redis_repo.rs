use std::time::Duration;

use async_trait::async_trait;
use seatline_core::locks::{SeatKey, SeatLease, SeatLockManager};
use seatline_core::{CoreError, CoreResult};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage_error;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Delete the key only if it still carries our token.
const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

/// Seat locks shared by every API instance through Redis.
#[derive(Clone)]
pub struct RedisSeatLocks {
    client: redis::Client,
    ttl_ms: u64,
    acquire_timeout: Duration,
}

impl RedisSeatLocks {
    pub fn new(connection_string: &str, ttl_ms: u64, acquire_timeout_ms: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            ttl_ms,
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
        })
    }

    async fn set_nx(&self, key: &SeatKey, token: &str) -> CoreResult<bool> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(storage_error)?;

        // SET NX: only set if the seat is not already held
        let result: Option<String> = redis::cmd("SET")
            .arg(key.to_string())
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(storage_error)?;

        Ok(result.is_some())
    }
}

#[async_trait]
impl SeatLockManager for RedisSeatLocks {
    async fn try_acquire(&self, key: SeatKey) -> CoreResult<Option<SeatLease>> {
        let token = Uuid::new_v4().to_string();
        if self.set_nx(&key, &token).await? {
            Ok(Some(SeatLease::remote(key, token)))
        } else {
            debug!(seat = %key, "Seat locked by another claim, skipping");
            Ok(None)
        }
    }

    async fn acquire(&self, key: SeatKey) -> CoreResult<SeatLease> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.acquire_timeout;
        loop {
            if self.set_nx(&key, &token).await? {
                return Ok(SeatLease::remote(key, token));
            }
            if Instant::now() >= deadline {
                warn!(seat = %key, "Timed out waiting for seat lock");
                return Err(CoreError::LockTimeout(key.to_string()));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn release(&self, lease: SeatLease) -> CoreResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(storage_error)?;

        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(lease.key.to_string())
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await
            .map_err(storage_error)?;

        if deleted == 0 {
            // TTL elapsed while held; someone else may own it now.
            warn!(seat = %lease.key, "Seat lock expired before release");
        }
        Ok(())
    }
}
