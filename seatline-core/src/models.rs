use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use seatline_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::segment::{Route, SegmentInterval};

pub type TrainId = i64;
pub type SeatId = i64;

/// Identity of a train run: one train on one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    pub train_id: TrainId,
    pub date: NaiveDate,
}

impl RunKey {
    pub fn new(train_id: TrainId, date: NaiveDate) -> Self {
        Self { train_id, date }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.train_id, self.date)
    }
}

/// A physical seat, owned by one train for all dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub train_id: TrainId,
    pub number: String,
}

/// Everything the booking core needs to know about a scheduled run.
#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub key: RunKey,
    pub route: Route,
    pub seats: Vec<Seat>,
    pub start_time: NaiveTime,
}

impl ResolvedRun {
    pub fn total_seats(&self) -> usize {
        self.seats.len()
    }

    pub fn seat(&self, seat_id: SeatId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.id == seat_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    PaymentPending,
    Confirmed,
    Waitlisted,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::PaymentPending => "PAYMENT_PENDING",
            TicketStatus::Confirmed => "CONFIRMED",
            TicketStatus::Waitlisted => "WAITLISTED",
            TicketStatus::Cancelled => "CANCELLED",
        }
    }

    /// Allowed lifecycle edges. Cancellation is final.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (PaymentPending, Confirmed)
                | (PaymentPending, Waitlisted)
                | (PaymentPending, Cancelled)
                | (Waitlisted, Confirmed)
                | (Waitlisted, Cancelled)
                | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAYMENT_PENDING" => Ok(TicketStatus::PaymentPending),
            "CONFIRMED" => Ok(TicketStatus::Confirmed),
            "WAITLISTED" => Ok(TicketStatus::Waitlisted),
            "CANCELLED" => Ok(TicketStatus::Cancelled),
            other => Err(CoreError::Storage(format!("unknown ticket status {}", other))),
        }
    }
}

/// Seat-assignment status. `Booked` holds a seat while payment is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Booked,
    Confirmed,
    Waitlisted,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "BOOKED",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Waitlisted => "WAITLISTED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    /// Active bookings count against seat occupancy.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Booked | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKED" => Ok(BookingStatus::Booked),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "WAITLISTED" => Ok(BookingStatus::Waitlisted),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::Storage(format!("unknown booking status {}", other))),
        }
    }
}

/// One passenger's journey request. `created_at` is the waitlist fairness key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub pnr: String,
    pub user_id: String,
    pub train_id: TrainId,
    pub source_code: String,
    pub dest_code: String,
    pub trip_date: NaiveDate,
    pub status: TicketStatus,
    pub fare_paise: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn run_key(&self) -> RunKey {
        RunKey::new(self.train_id, self.trip_date)
    }

    pub fn transition(&mut self, next: TicketStatus) -> CoreResult<()> {
        if self.status == TicketStatus::Cancelled && next == TicketStatus::Cancelled {
            return Err(CoreError::AlreadyCancelled(self.pnr.clone()));
        }
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// The seat assignment for a ticket's single interval. Never split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub pnr: String,
    pub run: RunKey,
    pub interval: SegmentInterval,
    pub seat_id: Option<SeatId>,
    pub status: BookingStatus,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active() && self.seat_id.is_some()
    }

    pub fn is_waitlisted(&self) -> bool {
        self.status == BookingStatus::Waitlisted && self.seat_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Created,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Created => "CREATED",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(TransactionStatus::Created),
            "SUCCESS" => Ok(TransactionStatus::Success),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(CoreError::Storage(format!("unknown transaction status {}", other))),
        }
    }
}

/// Payment record linking a ticket to an external gateway order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub pnr: String,
    pub booking_id: Uuid,
    pub user_id: String,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<Masked<String>>,
    pub amount_paise: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Records written together when a booking request is accepted.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub ticket: Ticket,
    pub booking: Booking,
    pub transaction: Option<Transaction>,
}
