use std::sync::Arc;

use seatline_catalog::ScheduleRepository;
use seatline_order::BookingManager;
use seatline_store::EventPublisher;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BookingManager>,
    pub schedule: Arc<dyn ScheduleRepository>,
    pub events: EventPublisher,
    pub auth: AuthConfig,
}
