use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use seatline_shared::pii::Masked;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::models::{Booking, BookingStatus, NewBooking, RunKey, SeatId, Ticket, TicketStatus, Transaction, TransactionStatus};

/// A waitlisted booking together with the fields the promoter orders and decides on.
#[derive(Debug, Clone)]
pub struct WaitlistEntry {
    pub booking: Booking,
    pub ticket_status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

/// Assign a freed seat to a waitlisted booking.
///
/// Applied only if the candidate is still waitlisted, seatless, and its ticket is
/// still in `expected_ticket_status`; otherwise the whole release is reported stale.
#[derive(Debug, Clone)]
pub struct Promotion {
    pub booking_id: Uuid,
    pub pnr: String,
    pub seat_id: SeatId,
    pub expected_ticket_status: TicketStatus,
    pub booking_status: BookingStatus,
    pub ticket_status: TicketStatus,
}

/// Outcome of a payment verification, as stored on the transaction.
#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: Masked<String>,
    pub status: TransactionStatus,
}

/// Cancel one ticket, optionally settle its payment as failed and promote one candidate.
/// Ledgers commit all of it or none of it.
#[derive(Debug, Clone)]
pub struct SeatRelease {
    pub pnr: String,
    pub booking_id: Uuid,
    /// Seat the caller believes the booking holds. A mismatch aborts with `SeatChanged`.
    pub held_seat: Option<SeatId>,
    pub failed_payment: Option<PaymentSettlement>,
    pub promotion: Option<Promotion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Committed,
    /// The planned promotion candidate changed underneath; nothing was written.
    StaleCandidate(Uuid),
    /// The cancelled booking was assigned or lost a seat since it was read; nothing was written.
    SeatChanged,
}

/// Ticket and booking status after a successful payment, given the booking's state at
/// the moment of settlement.
pub fn settled_statuses(booking: BookingStatus) -> (TicketStatus, BookingStatus) {
    match booking {
        BookingStatus::Booked | BookingStatus::Confirmed => (TicketStatus::Confirmed, BookingStatus::Confirmed),
        BookingStatus::Waitlisted => (TicketStatus::Waitlisted, BookingStatus::Waitlisted),
        BookingStatus::Cancelled => (TicketStatus::Cancelled, BookingStatus::Cancelled),
    }
}

/// Storage of tickets, bookings and payment transactions.
///
/// Each method is one atomic unit. Seat assignment writes (`insert` with a seat,
/// promotions inside `commit_release`) are only issued while the caller holds the
/// seat's lock from a [`crate::locks::SeatLockManager`].
#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Fails with `DuplicatePnr` when the pnr is taken.
    async fn insert(&self, record: &NewBooking) -> CoreResult<()>;

    async fn find(&self, pnr: &str) -> CoreResult<Option<(Ticket, Booking)>>;

    /// Tickets of one user travelling on or after `from`, ascending by trip date.
    async fn tickets_for_user(&self, user_id: &str, from: NaiveDate) -> CoreResult<Vec<(Ticket, Booking)>>;

    /// Consistent snapshot of every active booking of a run.
    async fn active_bookings(&self, run: RunKey) -> CoreResult<Vec<Booking>>;

    /// Committed active bookings holding one seat of a run.
    async fn active_on_seat(&self, run: RunKey, seat_id: SeatId) -> CoreResult<Vec<Booking>>;

    /// Waitlisted bookings of a run, earliest ticket first.
    async fn waitlist(&self, run: RunKey) -> CoreResult<Vec<WaitlistEntry>>;

    async fn commit_release(&self, release: &SeatRelease) -> CoreResult<ReleaseOutcome>;

    async fn transaction_by_order(&self, gateway_order_id: &str) -> CoreResult<Option<Transaction>>;

    /// Mark a `CREATED` transaction successful and move its ticket out of
    /// `PAYMENT_PENDING` per [`settled_statuses`]. Returns the updated ticket.
    async fn settle_payment(&self, settlement: &PaymentSettlement) -> CoreResult<Ticket>;
}
