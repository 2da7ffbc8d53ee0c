use std::sync::Arc;

use seatline_core::locks::{SeatKey, SeatLockManager};
use seatline_core::repository::{BookingLedger, PaymentSettlement, Promotion, ReleaseOutcome, SeatRelease, WaitlistEntry};
use seatline_core::{Booking, BookingStatus, CoreError, CoreResult, SeatId, TicketStatus};
use tracing::{info, warn};

/// Bound on re-planning when waitlist candidates keep changing underneath a cancellation.
const MAX_PLAN_ATTEMPTS: usize = 32;

/// What a committed cancellation did.
#[derive(Debug, Clone)]
pub struct ReleaseReport {
    pub freed_seat: Option<SeatId>,
    pub promotion: Option<Promotion>,
}

/// First paid waitlisted candidate (earliest ticket first) whose interval clears every
/// remaining active booking on the freed seat. At most one promotion per release.
///
/// Unpaid waitlisted bookings are passed over; they become eligible once their payment
/// settles and the ticket turns `WAITLISTED`.
pub fn plan(waitlist: &[WaitlistEntry], on_seat: &[Booking], seat_id: SeatId, released: uuid::Uuid) -> Option<Promotion> {
    let remaining: Vec<&Booking> = on_seat.iter().filter(|b| b.id != released && b.is_active()).collect();

    waitlist.iter().find_map(|entry| {
        let candidate = &entry.booking;
        if !candidate.is_waitlisted() || entry.ticket_status != TicketStatus::Waitlisted {
            return None;
        }
        if remaining.iter().any(|b| b.interval.overlaps(&candidate.interval)) {
            return None;
        }
        Some(Promotion {
            booking_id: candidate.id,
            pnr: candidate.pnr.clone(),
            seat_id,
            expected_ticket_status: TicketStatus::Waitlisted,
            booking_status: BookingStatus::Confirmed,
            ticket_status: TicketStatus::Confirmed,
        })
    })
}

/// Runs cancellation and the promotion scan as one commit under the freed seat's lock.
#[derive(Clone)]
pub struct WaitlistPromoter {
    ledger: Arc<dyn BookingLedger>,
    locks: Arc<dyn SeatLockManager>,
}

impl WaitlistPromoter {
    pub fn new(ledger: Arc<dyn BookingLedger>, locks: Arc<dyn SeatLockManager>) -> Self {
        Self { ledger, locks }
    }

    /// Cancel `booking` (optionally recording a failed payment) and, if it held a seat,
    /// hand that seat to the first eligible waitlisted booking.
    ///
    /// `booking` may be stale; if its seat changed before the commit it is re-read.
    pub async fn release(&self, booking: &Booking, failed_payment: Option<PaymentSettlement>) -> CoreResult<ReleaseReport> {
        let mut current = booking.clone();
        for attempt in 1..=MAX_PLAN_ATTEMPTS {
            let settled = match current.seat_id.filter(|_| current.is_active()) {
                Some(seat_id) => {
                    // Cancellation never skips: wait for any in-flight claim on this seat.
                    let lease = self.locks.acquire(SeatKey::new(current.run, seat_id)).await?;
                    let outcome = self.release_seat(&current, seat_id, &failed_payment).await;
                    self.locks.release(lease).await?;
                    outcome?
                }
                None => match self.commit(&current, None, failed_payment.clone(), None).await? {
                    ReleaseOutcome::Committed => Some(ReleaseReport {
                        freed_seat: None,
                        promotion: None,
                    }),
                    _ => None,
                },
            };

            if let Some(report) = settled {
                return Ok(report);
            }
            warn!(pnr = %current.pnr, attempt, "Seat assignment changed before cancellation, re-reading");
            current = self
                .ledger
                .find(&current.pnr)
                .await?
                .map(|(_, b)| b)
                .ok_or_else(|| CoreError::NotFound(current.pnr.clone()))?;
        }

        Err(CoreError::Storage(format!(
            "cancellation of {} did not settle after {} attempts",
            booking.pnr, MAX_PLAN_ATTEMPTS
        )))
    }

    /// `None` when the booking no longer holds `seat_id`.
    async fn release_seat(&self, booking: &Booking, seat_id: SeatId, failed_payment: &Option<PaymentSettlement>) -> CoreResult<Option<ReleaseReport>> {
        for attempt in 1..=MAX_PLAN_ATTEMPTS {
            let waitlist = self.ledger.waitlist(booking.run).await?;
            let on_seat = self.ledger.active_on_seat(booking.run, seat_id).await?;
            let promotion = plan(&waitlist, &on_seat, seat_id, booking.id);

            match self.commit(booking, Some(seat_id), failed_payment.clone(), promotion.clone()).await? {
                ReleaseOutcome::Committed => {
                    match &promotion {
                        Some(p) => info!(
                            cancelled = %booking.pnr,
                            promoted = %p.pnr,
                            seat_id,
                            status = %p.ticket_status,
                            "Waitlisted ticket promoted to freed seat"
                        ),
                        None => info!(cancelled = %booking.pnr, seat_id, "Seat freed, no waitlisted candidate fits"),
                    }
                    return Ok(Some(ReleaseReport {
                        freed_seat: Some(seat_id),
                        promotion,
                    }));
                }
                ReleaseOutcome::StaleCandidate(candidate) => {
                    warn!(cancelled = %booking.pnr, %candidate, attempt, "Promotion candidate changed, re-planning");
                }
                ReleaseOutcome::SeatChanged => return Ok(None),
            }
        }

        Err(CoreError::Storage(format!(
            "promotion for {} did not settle after {} attempts",
            booking.pnr, MAX_PLAN_ATTEMPTS
        )))
    }

    async fn commit(
        &self,
        booking: &Booking,
        held_seat: Option<SeatId>,
        failed_payment: Option<PaymentSettlement>,
        promotion: Option<Promotion>,
    ) -> CoreResult<ReleaseOutcome> {
        self.ledger
            .commit_release(&SeatRelease {
                pnr: booking.pnr.clone(),
                booking_id: booking.id,
                held_seat,
                failed_payment,
                promotion,
            })
            .await
    }
}
