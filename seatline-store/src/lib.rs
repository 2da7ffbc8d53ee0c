pub mod app_config;
pub mod database;
pub mod events;
pub mod memory;
pub mod redis_repo;
pub mod schedule_repo;
pub mod seat_locks;
pub mod ticket_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use events::EventPublisher;
pub use memory::{MemoryLedger, MemorySchedule};
pub use redis_repo::RedisSeatLocks;
pub use schedule_repo::PgScheduleRepository;
pub use seat_locks::LocalSeatLocks;
pub use ticket_repo::PgBookingLedger;

pub(crate) fn storage_error(err: impl std::fmt::Display) -> seatline_core::CoreError {
    seatline_core::CoreError::Storage(err.to_string())
}
