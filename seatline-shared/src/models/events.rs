use chrono::NaiveDate;

/// Published after every committed inventory change. `train_id` lets stream
/// consumers filter by train.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEvent {
    SeatClaimed {
        pnr: String,
        train_id: i64,
        trip_date: NaiveDate,
        seat_number: String,
        from_position: i32,
        to_position: i32,
        timestamp: i64,
    },
    Waitlisted {
        pnr: String,
        train_id: i64,
        trip_date: NaiveDate,
        from_position: i32,
        to_position: i32,
        timestamp: i64,
    },
    TicketCancelled {
        pnr: String,
        train_id: i64,
        trip_date: NaiveDate,
        freed_seat: Option<String>,
        timestamp: i64,
    },
    WaitlistPromoted {
        pnr: String,
        train_id: i64,
        trip_date: NaiveDate,
        seat_number: String,
        timestamp: i64,
    },
    PaymentSettled {
        pnr: String,
        train_id: i64,
        gateway_order_id: String,
        succeeded: bool,
        timestamp: i64,
    },
}

impl BookingEvent {
    pub fn train_id(&self) -> i64 {
        match self {
            BookingEvent::SeatClaimed { train_id, .. }
            | BookingEvent::Waitlisted { train_id, .. }
            | BookingEvent::TicketCancelled { train_id, .. }
            | BookingEvent::WaitlistPromoted { train_id, .. }
            | BookingEvent::PaymentSettled { train_id, .. } => *train_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::SeatClaimed { .. } => "seat_claimed",
            BookingEvent::Waitlisted { .. } => "waitlisted",
            BookingEvent::TicketCancelled { .. } => "ticket_cancelled",
            BookingEvent::WaitlistPromoted { .. } => "waitlist_promoted",
            BookingEvent::PaymentSettled { .. } => "payment_settled",
        }
    }
}
