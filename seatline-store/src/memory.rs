use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use seatline_catalog::{ScheduleBook, ScheduleRepository, ScheduleRunRequest, Station, StopTime, TrainRun};
use seatline_core::repository::{
    settled_statuses, BookingLedger, PaymentSettlement, ReleaseOutcome, SeatRelease, WaitlistEntry,
};
use seatline_core::{
    Booking, BookingStatus, CoreError, CoreResult, NewBooking, ResolvedRun, RunKey, SeatId, Ticket,
    TicketStatus, TrainId, Transaction, TransactionStatus,
};
use tokio::sync::RwLock;
use tracing::error;
use uuid::Uuid;

#[derive(Default)]
struct LedgerState {
    tickets: HashMap<String, Ticket>,
    bookings: HashMap<Uuid, Booking>,
    booking_by_pnr: HashMap<String, Uuid>,
    transactions: HashMap<String, Transaction>,
    /// Booking ids per run, in insertion order.
    by_run: HashMap<RunKey, Vec<Uuid>>,
}

impl LedgerState {
    fn run_bookings(&self, run: RunKey) -> impl Iterator<Item = &Booking> {
        self.by_run
            .get(&run)
            .into_iter()
            .flatten()
            .filter_map(|id| self.bookings.get(id))
    }

    fn collision(&self, run: RunKey, seat_id: SeatId, candidate: &Booking, ignore: Option<Uuid>) -> Option<&Booking> {
        self.run_bookings(run).find(|b| {
            Some(b.id) != ignore
                && b.id != candidate.id
                && b.is_active()
                && b.seat_id == Some(seat_id)
                && b.interval.overlaps(&candidate.interval)
        })
    }
}

fn check_transition(ticket: &Ticket, next: TicketStatus) -> CoreResult<()> {
    if ticket.status == next {
        return Ok(());
    }
    let mut trial = ticket.clone();
    trial.transition(next)
}

/// Ledger held in process memory behind one `RwLock`.
///
/// Every trait call takes the lock once, so each call is observed atomically.
#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingLedger for MemoryLedger {
    async fn insert(&self, record: &NewBooking) -> CoreResult<()> {
        let mut state = self.state.write().await;

        let pnr = &record.ticket.pnr;
        if state.tickets.contains_key(pnr) {
            return Err(CoreError::DuplicatePnr(pnr.clone()));
        }
        if let Some(tx) = &record.transaction {
            if state.transactions.contains_key(&tx.gateway_order_id) {
                return Err(CoreError::Storage(format!("gateway order {} already recorded", tx.gateway_order_id)));
            }
        }

        let booking = &record.booking;
        if let Some(seat_id) = booking.seat_id.filter(|_| booking.is_active()) {
            if let Some(existing) = state.collision(booking.run, seat_id, booking, None) {
                error!(
                    seat_id,
                    run = %booking.run,
                    existing = %existing.pnr,
                    incoming = %booking.pnr,
                    "Refusing overlapping active booking"
                );
                return Err(CoreError::Integrity(format!(
                    "seat {} already holds {} for {}",
                    seat_id, existing.pnr, existing.interval
                )));
            }
        }

        state.tickets.insert(pnr.clone(), record.ticket.clone());
        state.booking_by_pnr.insert(pnr.clone(), booking.id);
        state.bookings.insert(booking.id, booking.clone());
        state.by_run.entry(booking.run).or_default().push(booking.id);
        if let Some(tx) = &record.transaction {
            state.transactions.insert(tx.gateway_order_id.clone(), tx.clone());
        }
        Ok(())
    }

    async fn find(&self, pnr: &str) -> CoreResult<Option<(Ticket, Booking)>> {
        let state = self.state.read().await;
        let found = state.tickets.get(pnr).and_then(|ticket| {
            let id = state.booking_by_pnr.get(pnr)?;
            let booking = state.bookings.get(id)?;
            Some((ticket.clone(), booking.clone()))
        });
        Ok(found)
    }

    async fn tickets_for_user(&self, user_id: &str, from: NaiveDate) -> CoreResult<Vec<(Ticket, Booking)>> {
        let state = self.state.read().await;
        let mut rows: Vec<(Ticket, Booking)> = state
            .tickets
            .values()
            .filter(|t| t.user_id == user_id && t.trip_date >= from)
            .filter_map(|t| {
                let id = state.booking_by_pnr.get(&t.pnr)?;
                Some((t.clone(), state.bookings.get(id)?.clone()))
            })
            .collect();
        rows.sort_by(|a, b| (a.0.trip_date, a.0.created_at).cmp(&(b.0.trip_date, b.0.created_at)));
        Ok(rows)
    }

    async fn active_bookings(&self, run: RunKey) -> CoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(state.run_bookings(run).filter(|b| b.is_active()).cloned().collect())
    }

    async fn active_on_seat(&self, run: RunKey, seat_id: SeatId) -> CoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(state
            .run_bookings(run)
            .filter(|b| b.is_active() && b.seat_id == Some(seat_id))
            .cloned()
            .collect())
    }

    async fn waitlist(&self, run: RunKey) -> CoreResult<Vec<WaitlistEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<WaitlistEntry> = state
            .run_bookings(run)
            .filter(|b| b.is_waitlisted())
            .filter_map(|b| {
                let ticket = state.tickets.get(&b.pnr)?;
                Some(WaitlistEntry {
                    booking: b.clone(),
                    ticket_status: ticket.status,
                    created_at: ticket.created_at,
                })
            })
            .collect();
        // Stable: equal timestamps keep insertion order.
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn commit_release(&self, release: &SeatRelease) -> CoreResult<ReleaseOutcome> {
        let mut state = self.state.write().await;

        let ticket = state
            .tickets
            .get(&release.pnr)
            .ok_or_else(|| CoreError::NotFound(release.pnr.clone()))?;
        let booking = state
            .bookings
            .get(&release.booking_id)
            .filter(|b| b.pnr == release.pnr)
            .ok_or_else(|| CoreError::NotFound(release.pnr.clone()))?;
        if ticket.status == TicketStatus::Cancelled {
            return Err(CoreError::AlreadyCancelled(release.pnr.clone()));
        }
        if booking.seat_id != release.held_seat {
            return Ok(ReleaseOutcome::SeatChanged);
        }
        check_transition(ticket, TicketStatus::Cancelled)?;

        if let Some(failed) = &release.failed_payment {
            match state.transactions.get(&failed.gateway_order_id) {
                Some(tx) if tx.status == TransactionStatus::Created => {}
                Some(_) => return Err(CoreError::AlreadySettled(failed.gateway_order_id.clone())),
                None => return Err(CoreError::TransactionNotFound(failed.gateway_order_id.clone())),
            }
        }

        if let Some(promotion) = &release.promotion {
            let candidate = state.bookings.get(&promotion.booking_id);
            let candidate_ticket = state.tickets.get(&promotion.pnr);
            let fresh = match (candidate, candidate_ticket) {
                (Some(b), Some(t)) => b.is_waitlisted() && b.pnr == promotion.pnr && t.status == promotion.expected_ticket_status,
                _ => false,
            };
            if !fresh {
                return Ok(ReleaseOutcome::StaleCandidate(promotion.booking_id));
            }
            if let (Some(candidate), Some(candidate_ticket)) = (candidate, candidate_ticket) {
                check_transition(candidate_ticket, promotion.ticket_status)?;
                if let Some(blocker) = state.collision(candidate.run, promotion.seat_id, candidate, Some(release.booking_id)) {
                    error!(
                        seat_id = promotion.seat_id,
                        candidate = %candidate.pnr,
                        blocker = %blocker.pnr,
                        "Promotion would overlap an active booking"
                    );
                    return Err(CoreError::Integrity(format!(
                        "promoting {} onto seat {} overlaps {}",
                        candidate.pnr, promotion.seat_id, blocker.pnr
                    )));
                }
            }
        }

        // Every check passed; apply all writes.
        if let Some(ticket) = state.tickets.get_mut(&release.pnr) {
            ticket.status = TicketStatus::Cancelled;
        }
        if let Some(booking) = state.bookings.get_mut(&release.booking_id) {
            booking.status = BookingStatus::Cancelled;
            booking.seat_id = None;
        }
        if let Some(failed) = &release.failed_payment {
            if let Some(tx) = state.transactions.get_mut(&failed.gateway_order_id) {
                tx.status = failed.status;
                tx.gateway_payment_id = Some(failed.gateway_payment_id.clone());
                tx.gateway_signature = Some(failed.gateway_signature.clone());
            }
        }
        if let Some(promotion) = &release.promotion {
            if let Some(candidate) = state.bookings.get_mut(&promotion.booking_id) {
                candidate.seat_id = Some(promotion.seat_id);
                candidate.status = promotion.booking_status;
            }
            if let Some(candidate_ticket) = state.tickets.get_mut(&promotion.pnr) {
                candidate_ticket.status = promotion.ticket_status;
            }
        }
        Ok(ReleaseOutcome::Committed)
    }

    async fn transaction_by_order(&self, gateway_order_id: &str) -> CoreResult<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(gateway_order_id).cloned())
    }

    async fn settle_payment(&self, settlement: &PaymentSettlement) -> CoreResult<Ticket> {
        let mut state = self.state.write().await;

        let tx = state
            .transactions
            .get(&settlement.gateway_order_id)
            .ok_or_else(|| CoreError::TransactionNotFound(settlement.gateway_order_id.clone()))?;
        if tx.status != TransactionStatus::Created {
            return Err(CoreError::AlreadySettled(settlement.gateway_order_id.clone()));
        }
        let (pnr, booking_id) = (tx.pnr.clone(), tx.booking_id);

        let ticket = state
            .tickets
            .get(&pnr)
            .ok_or_else(|| CoreError::NotFound(pnr.clone()))?;
        if ticket.status == TicketStatus::Cancelled {
            return Err(CoreError::AlreadyCancelled(pnr));
        }
        let booking = state
            .bookings
            .get(&booking_id)
            .ok_or_else(|| CoreError::NotFound(pnr.clone()))?;
        let (ticket_status, booking_status) = settled_statuses(booking.status);
        let mut updated = ticket.clone();
        updated.transition(ticket_status)?;

        if let Some(tx) = state.transactions.get_mut(&settlement.gateway_order_id) {
            tx.status = settlement.status;
            tx.gateway_payment_id = Some(settlement.gateway_payment_id.clone());
            tx.gateway_signature = Some(settlement.gateway_signature.clone());
        }
        if let Some(booking) = state.bookings.get_mut(&booking_id) {
            booking.status = booking_status;
        }
        state.tickets.insert(pnr, updated.clone());
        Ok(updated)
    }
}

/// [`ScheduleBook`] shared behind a `RwLock` for the in-memory backend.
#[derive(Default)]
pub struct MemorySchedule {
    book: RwLock<ScheduleBook>,
}

impl MemorySchedule {
    pub fn new(book: ScheduleBook) -> Self {
        Self { book: RwLock::new(book) }
    }

    pub async fn train_id(&self, number: &str) -> Option<TrainId> {
        self.book.read().await.train_by_number(number).map(|t| t.id)
    }
}

#[async_trait]
impl ScheduleRepository for MemorySchedule {
    async fn resolve_run(&self, train_id: TrainId, date: NaiveDate) -> CoreResult<ResolvedRun> {
        self.book.read().await.resolve_run(train_id, date)
    }

    async fn schedule_run(&self, req: &ScheduleRunRequest, today: NaiveDate) -> CoreResult<TrainRun> {
        self.book.write().await.schedule_run(req, today)
    }

    async fn timetable(&self, train_id: TrainId, date: NaiveDate) -> CoreResult<Vec<StopTime>> {
        self.book.read().await.timetable(train_id, date)
    }

    async fn station(&self, code: &str) -> CoreResult<Option<Station>> {
        Ok(self.book.read().await.station(code).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use seatline_core::repository::Promotion;
    use seatline_core::SegmentInterval;
    use seatline_shared::Masked;

    fn run() -> RunKey {
        RunKey::new(1, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
    }

    fn record(pnr: &str, seat: Option<SeatId>, from: i32, to: i32, age_secs: i64) -> NewBooking {
        let (ticket_status, booking_status) = match seat {
            Some(_) => (TicketStatus::Confirmed, BookingStatus::Confirmed),
            None => (TicketStatus::Waitlisted, BookingStatus::Waitlisted),
        };
        NewBooking {
            ticket: Ticket {
                pnr: pnr.to_string(),
                user_id: "user-1".to_string(),
                train_id: run().train_id,
                source_code: "NDLS".to_string(),
                dest_code: "PRYJ".to_string(),
                trip_date: run().date,
                status: ticket_status,
                fare_paise: 50_000,
                currency: "INR".to_string(),
                created_at: Utc::now() - Duration::seconds(age_secs),
            },
            booking: Booking {
                id: Uuid::new_v4(),
                pnr: pnr.to_string(),
                run: run(),
                interval: SegmentInterval::new(from, to).unwrap(),
                seat_id: seat,
                status: booking_status,
            },
            transaction: None,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_pnr_and_overlap() {
        let ledger = MemoryLedger::new();
        ledger.insert(&record("AAA", Some(1), 0, 20, 0)).await.unwrap();

        let dup = ledger.insert(&record("AAA", Some(2), 0, 20, 0)).await;
        assert!(matches!(dup, Err(CoreError::DuplicatePnr(_))));

        let overlap = ledger.insert(&record("BBB", Some(1), 10, 30, 0)).await;
        assert!(matches!(overlap, Err(CoreError::Integrity(_))));

        // Touching intervals share the seat.
        ledger.insert(&record("CCC", Some(1), 20, 40, 0)).await.unwrap();
        assert_eq!(ledger.active_on_seat(run(), 1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_waitlist_is_fifo() {
        let ledger = MemoryLedger::new();
        ledger.insert(&record("LATE", None, 0, 10, 1)).await.unwrap();
        ledger.insert(&record("EARLY", None, 0, 10, 30)).await.unwrap();
        ledger.insert(&record("MID", None, 0, 10, 10)).await.unwrap();

        let order: Vec<String> = ledger
            .waitlist(run())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.booking.pnr)
            .collect();
        assert_eq!(order, vec!["EARLY", "MID", "LATE"]);
    }

    #[tokio::test]
    async fn test_commit_release_with_promotion() {
        let ledger = MemoryLedger::new();
        let held = record("HELD", Some(1), 0, 20, 60);
        let waiting = record("WAIT", None, 0, 10, 30);
        ledger.insert(&held).await.unwrap();
        ledger.insert(&waiting).await.unwrap();

        let outcome = ledger
            .commit_release(&SeatRelease {
                pnr: "HELD".to_string(),
                booking_id: held.booking.id,
                held_seat: Some(1),
                failed_payment: None,
                promotion: Some(Promotion {
                    booking_id: waiting.booking.id,
                    pnr: "WAIT".to_string(),
                    seat_id: 1,
                    expected_ticket_status: TicketStatus::Waitlisted,
                    booking_status: BookingStatus::Confirmed,
                    ticket_status: TicketStatus::Confirmed,
                }),
            })
            .await
            .unwrap();
        assert_eq!(outcome, ReleaseOutcome::Committed);

        let (ticket, booking) = ledger.find("HELD").await.unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Cancelled);
        assert_eq!(booking.seat_id, None);

        let (ticket, booking) = ledger.find("WAIT").await.unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Confirmed);
        assert_eq!(booking.seat_id, Some(1));
        assert!(ledger.waitlist(run()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_candidate_writes_nothing() {
        let ledger = MemoryLedger::new();
        let held = record("HELD", Some(1), 0, 20, 60);
        let waiting = record("WAIT", None, 0, 10, 30);
        ledger.insert(&held).await.unwrap();
        ledger.insert(&waiting).await.unwrap();

        // Planned against a candidate that has since been cancelled.
        let cancelled = ledger
            .commit_release(&SeatRelease {
                pnr: "WAIT".to_string(),
                booking_id: waiting.booking.id,
                held_seat: None,
                failed_payment: None,
                promotion: None,
            })
            .await
            .unwrap();
        assert_eq!(cancelled, ReleaseOutcome::Committed);

        let outcome = ledger
            .commit_release(&SeatRelease {
                pnr: "HELD".to_string(),
                booking_id: held.booking.id,
                held_seat: Some(1),
                failed_payment: None,
                promotion: Some(Promotion {
                    booking_id: waiting.booking.id,
                    pnr: "WAIT".to_string(),
                    seat_id: 1,
                    expected_ticket_status: TicketStatus::Waitlisted,
                    booking_status: BookingStatus::Confirmed,
                    ticket_status: TicketStatus::Confirmed,
                }),
            })
            .await
            .unwrap();
        assert_eq!(outcome, ReleaseOutcome::StaleCandidate(waiting.booking.id));

        let (ticket, booking) = ledger.find("HELD").await.unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Confirmed);
        assert_eq!(booking.seat_id, Some(1));
    }

    #[tokio::test]
    async fn test_release_of_stale_seat_writes_nothing() {
        let ledger = MemoryLedger::new();
        let held = record("HELD", Some(2), 0, 20, 0);
        ledger.insert(&held).await.unwrap();

        // Caller read the booking while it was still waitlisted.
        let outcome = ledger
            .commit_release(&SeatRelease {
                pnr: "HELD".to_string(),
                booking_id: held.booking.id,
                held_seat: None,
                failed_payment: None,
                promotion: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome, ReleaseOutcome::SeatChanged);

        let (ticket, booking) = ledger.find("HELD").await.unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Confirmed);
        assert_eq!(booking.seat_id, Some(2));
    }

    #[tokio::test]
    async fn test_release_twice_is_already_cancelled() {
        let ledger = MemoryLedger::new();
        let held = record("HELD", Some(1), 0, 20, 0);
        ledger.insert(&held).await.unwrap();

        let release = SeatRelease {
            pnr: "HELD".to_string(),
            booking_id: held.booking.id,
            held_seat: Some(1),
            failed_payment: None,
            promotion: None,
        };
        ledger.commit_release(&release).await.unwrap();
        assert!(matches!(ledger.commit_release(&release).await, Err(CoreError::AlreadyCancelled(_))));
    }

    #[tokio::test]
    async fn test_settle_payment() {
        let ledger = MemoryLedger::new();
        let mut pending = record("PAY", Some(3), 0, 20, 0);
        pending.ticket.status = TicketStatus::PaymentPending;
        pending.booking.status = BookingStatus::Booked;
        pending.transaction = Some(Transaction {
            id: Uuid::new_v4(),
            pnr: "PAY".to_string(),
            booking_id: pending.booking.id,
            user_id: "user-1".to_string(),
            gateway_order_id: "order_1".to_string(),
            gateway_payment_id: None,
            gateway_signature: None,
            amount_paise: 50_000,
            currency: "INR".to_string(),
            status: TransactionStatus::Created,
            created_at: Utc::now(),
        });
        ledger.insert(&pending).await.unwrap();

        let settlement = PaymentSettlement {
            gateway_order_id: "order_1".to_string(),
            gateway_payment_id: "pay_1".to_string(),
            gateway_signature: Masked("sig".to_string()),
            status: TransactionStatus::Success,
        };
        let ticket = ledger.settle_payment(&settlement).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Confirmed);

        let (_, booking) = ledger.find("PAY").await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert!(matches!(ledger.settle_payment(&settlement).await, Err(CoreError::AlreadySettled(_))));
    }
}
