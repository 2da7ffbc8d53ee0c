use seatline_shared::BookingEvent;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 1024;

/// Fan-out of committed booking events to in-process subscribers (SSE streams).
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<BookingEvent>,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Best effort. Having no subscribers is normal.
    pub fn publish(&self, event: BookingEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => debug!(event = name, receivers, "Event published"),
            Err(_) => debug!(event = name, "Event dropped, no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn cancelled(train_id: i64) -> BookingEvent {
        BookingEvent::TicketCancelled {
            pnr: "ABCDEFGHJK".to_string(),
            train_id,
            trip_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            freed_seat: None,
            timestamp: Utc::now().timestamp(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let publisher = EventPublisher::default();
        publisher.publish(cancelled(1));

        let mut rx = publisher.subscribe();
        publisher.publish(cancelled(2));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.train_id(), 2);
    }
}
