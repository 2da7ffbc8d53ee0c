use std::sync::Arc;

use seatline_catalog::InventoryIndex;
use seatline_core::locks::{SeatKey, SeatLockManager};
use seatline_core::repository::BookingLedger;
use seatline_core::{CoreError, CoreResult, NewBooking, ResolvedRun, Seat, SegmentInterval};
use tracing::{debug, error, info};

/// Result of a claim: the records as persisted, plus the seat if one was assigned.
#[derive(Debug, Clone)]
pub struct Claim {
    pub record: NewBooking,
    pub seat: Option<Seat>,
}

/// Lock-and-skip seat allocation.
///
/// A seat is only written while its lock is held and after the committed bookings on
/// it have been re-read, so two claims can never both land on overlapping intervals.
#[derive(Clone)]
pub struct Allocator {
    ledger: Arc<dyn BookingLedger>,
    locks: Arc<dyn SeatLockManager>,
}

impl Allocator {
    pub fn new(ledger: Arc<dyn BookingLedger>, locks: Arc<dyn SeatLockManager>) -> Self {
        Self { ledger, locks }
    }

    /// Claim a seat for `interval` and persist the booking built by `build`.
    ///
    /// `build` receives the chosen seat, or `None` when every candidate is taken or
    /// locked by a concurrent claim; the record is then inserted as waitlisted.
    pub async fn claim_seat<F>(&self, run: &ResolvedRun, interval: SegmentInterval, build: F) -> CoreResult<Claim>
    where
        F: Fn(Option<&Seat>) -> NewBooking + Send + Sync,
    {
        // The snapshot only orders candidates. Whether a seat is taken is decided under
        // its lock against committed bookings, so a seat freed after the snapshot is found.
        let snapshot = self.ledger.active_bookings(run.key).await?;
        let index = InventoryIndex::new(run.key, run.total_seats(), snapshot);
        index.free_count(&interval)?;

        let (likely_free, likely_taken): (Vec<&Seat>, Vec<&Seat>) =
            run.seats.iter().partition(|s| index.is_seat_free(s.id, &interval));
        for seat in likely_free.into_iter().chain(likely_taken) {
            if let Some(claim) = self.try_seat(run, seat, interval, &build).await? {
                return Ok(claim);
            }
        }

        let record = build(None);
        self.ledger.insert(&record).await?;
        info!(
            pnr = %record.ticket.pnr,
            run = %run.key,
            interval = %interval,
            "No seat free for segment, waitlisted"
        );
        Ok(Claim { record, seat: None })
    }

    async fn try_seat<F>(&self, run: &ResolvedRun, seat: &Seat, interval: SegmentInterval, build: &F) -> CoreResult<Option<Claim>>
    where
        F: Fn(Option<&Seat>) -> NewBooking + Send + Sync,
    {
        let key = SeatKey::new(run.key, seat.id);
        let Some(lease) = self.locks.try_acquire(key).await? else {
            return Ok(None);
        };

        let outcome = self.claim_locked(run, seat, interval, build).await;
        self.locks.release(lease).await?;
        outcome
    }

    async fn claim_locked<F>(&self, run: &ResolvedRun, seat: &Seat, interval: SegmentInterval, build: &F) -> CoreResult<Option<Claim>>
    where
        F: Fn(Option<&Seat>) -> NewBooking + Send + Sync,
    {
        let committed = self.ledger.active_on_seat(run.key, seat.id).await?;
        InventoryIndex::new(run.key, run.total_seats(), committed.clone()).check_disjoint()?;

        if let Some(blocker) = committed.iter().find(|b| b.interval.overlaps(&interval)) {
            debug!(seat = %seat.number, blocker = %blocker.pnr, "Seat taken, skipping");
            return Ok(None);
        }

        let record = build(Some(seat));
        if record.booking.seat_id != Some(seat.id) {
            error!(pnr = %record.booking.pnr, seat = seat.id, "Booking built for a different seat than claimed");
            return Err(CoreError::Integrity(format!(
                "booking {} does not carry claimed seat {}",
                record.booking.pnr, seat.id
            )));
        }
        self.ledger.insert(&record).await?;
        info!(
            pnr = %record.ticket.pnr,
            run = %run.key,
            seat = %seat.number,
            interval = %interval,
            "Seat claimed"
        );
        Ok(Some(Claim {
            record,
            seat: Some(seat.clone()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use seatline_core::repository::{PaymentSettlement, ReleaseOutcome, SeatRelease, WaitlistEntry};
    use seatline_core::{Booking, BookingStatus, Route, RouteStop, RunKey, SeatId, Ticket, TicketStatus, Transaction};
    use seatline_store::{LocalSeatLocks, MemoryLedger};
    use uuid::Uuid;

    fn run(seats: usize) -> ResolvedRun {
        let stops = ["NDLS", "CNB", "PRYJ"]
            .iter()
            .enumerate()
            .map(|(i, code)| RouteStop {
                station_id: i as i64 + 1,
                code: code.to_string(),
                position: i as i32 * 10,
                distance_from_start_km: i as i32 * 300,
            })
            .collect();
        let key = RunKey::new(1, NaiveDate::from_ymd_opt(2030, 1, 7).unwrap());
        ResolvedRun {
            key,
            route: Route::new(1, "test", 600, stops).unwrap(),
            seats: (1..=seats as i64)
                .map(|id| Seat { id, train_id: 1, number: id.to_string() })
                .collect(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        }
    }

    fn builder(pnr: &'static str, run: &ResolvedRun, interval: SegmentInterval) -> impl Fn(Option<&Seat>) -> NewBooking + Send + Sync {
        let key = run.key;
        move |seat: Option<&Seat>| NewBooking {
            ticket: Ticket {
                pnr: pnr.to_string(),
                user_id: "u".to_string(),
                train_id: key.train_id,
                source_code: "NDLS".to_string(),
                dest_code: "PRYJ".to_string(),
                trip_date: key.date,
                status: if seat.is_some() { TicketStatus::Confirmed } else { TicketStatus::Waitlisted },
                fare_paise: 50_000,
                currency: "INR".to_string(),
                created_at: Utc::now(),
            },
            booking: Booking {
                id: Uuid::new_v4(),
                pnr: pnr.to_string(),
                run: key,
                interval,
                seat_id: seat.map(|s| s.id),
                status: if seat.is_some() { BookingStatus::Confirmed } else { BookingStatus::Waitlisted },
            },
            transaction: None,
        }
    }

    fn allocator() -> (Allocator, Arc<MemoryLedger>, Arc<LocalSeatLocks>) {
        let ledger = Arc::new(MemoryLedger::new());
        let locks = Arc::new(LocalSeatLocks::new());
        (Allocator::new(ledger.clone(), locks.clone()), ledger, locks)
    }

    #[tokio::test]
    async fn test_claims_then_waitlists() {
        let (allocator, _, _) = allocator();
        let run = run(1);
        let whole = SegmentInterval::new(0, 20).unwrap();

        let first = allocator.claim_seat(&run, whole, builder("A", &run, whole)).await.unwrap();
        assert_eq!(first.seat.map(|s| s.id), Some(1));

        let first_leg = SegmentInterval::new(0, 10).unwrap();
        let second = allocator.claim_seat(&run, first_leg, builder("B", &run, first_leg)).await.unwrap();
        assert!(second.seat.is_none());
        assert_eq!(second.record.booking.status, BookingStatus::Waitlisted);
    }

    #[tokio::test]
    async fn test_touching_segments_share_a_seat() {
        let (allocator, ledger, _) = allocator();
        let run = run(1);
        let first_leg = SegmentInterval::new(0, 10).unwrap();
        let second_leg = SegmentInterval::new(10, 20).unwrap();

        let a = allocator.claim_seat(&run, first_leg, builder("A", &run, first_leg)).await.unwrap();
        let b = allocator.claim_seat(&run, second_leg, builder("B", &run, second_leg)).await.unwrap();
        assert_eq!(a.seat.map(|s| s.id), Some(1));
        assert_eq!(b.seat.map(|s| s.id), Some(1));
        assert_eq!(ledger.active_on_seat(run.key, 1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_locked_seat_is_skipped() {
        let (allocator, _, locks) = allocator();
        let run = run(2);
        let held = locks.try_acquire(SeatKey::new(run.key, 1)).await.unwrap().unwrap();

        let whole = SegmentInterval::new(0, 20).unwrap();
        let claim = allocator.claim_seat(&run, whole, builder("A", &run, whole)).await.unwrap();
        assert_eq!(claim.seat.map(|s| s.id), Some(2));

        // Seat 2 is now taken and seat 1 still locked: waitlist instead of waiting.
        let other = SegmentInterval::new(0, 10).unwrap();
        let claim = allocator.claim_seat(&run, other, builder("B", &run, other)).await.unwrap();
        assert!(claim.seat.is_none());

        locks.release(held).await.unwrap();
    }

    /// Commits one pending cancellation right after the next snapshot is taken.
    struct CancelAfterSnapshot {
        inner: Arc<MemoryLedger>,
        pending: std::sync::Mutex<Option<SeatRelease>>,
    }

    #[async_trait::async_trait]
    impl BookingLedger for CancelAfterSnapshot {
        async fn insert(&self, record: &NewBooking) -> CoreResult<()> {
            self.inner.insert(record).await
        }

        async fn find(&self, pnr: &str) -> CoreResult<Option<(Ticket, Booking)>> {
            self.inner.find(pnr).await
        }

        async fn tickets_for_user(&self, user_id: &str, from: NaiveDate) -> CoreResult<Vec<(Ticket, Booking)>> {
            self.inner.tickets_for_user(user_id, from).await
        }

        async fn active_bookings(&self, run: RunKey) -> CoreResult<Vec<Booking>> {
            let snapshot = self.inner.active_bookings(run).await?;
            let pending = self.pending.lock().unwrap().take();
            if let Some(release) = pending {
                self.inner.commit_release(&release).await?;
            }
            Ok(snapshot)
        }

        async fn active_on_seat(&self, run: RunKey, seat_id: SeatId) -> CoreResult<Vec<Booking>> {
            self.inner.active_on_seat(run, seat_id).await
        }

        async fn waitlist(&self, run: RunKey) -> CoreResult<Vec<WaitlistEntry>> {
            self.inner.waitlist(run).await
        }

        async fn commit_release(&self, release: &SeatRelease) -> CoreResult<ReleaseOutcome> {
            self.inner.commit_release(release).await
        }

        async fn transaction_by_order(&self, gateway_order_id: &str) -> CoreResult<Option<Transaction>> {
            self.inner.transaction_by_order(gateway_order_id).await
        }

        async fn settle_payment(&self, settlement: &PaymentSettlement) -> CoreResult<Ticket> {
            self.inner.settle_payment(settlement).await
        }
    }

    #[tokio::test]
    async fn test_seat_freed_after_snapshot_is_claimed() {
        let memory = Arc::new(MemoryLedger::new());
        let run = run(1);
        let whole = SegmentInterval::new(0, 20).unwrap();

        let holder = builder("HOLD", &run, whole)(run.seats.first());
        memory.insert(&holder).await.unwrap();

        let ledger = Arc::new(CancelAfterSnapshot {
            inner: memory.clone(),
            pending: std::sync::Mutex::new(Some(SeatRelease {
                pnr: "HOLD".to_string(),
                booking_id: holder.booking.id,
                held_seat: Some(1),
                failed_payment: None,
                promotion: None,
            })),
        });
        let allocator = Allocator::new(ledger, Arc::new(LocalSeatLocks::new()));

        // The snapshot still shows seat 1 taken; committed state no longer does.
        let claim = allocator.claim_seat(&run, whole, builder("NEXT", &run, whole)).await.unwrap();
        assert_eq!(claim.seat.map(|s| s.id), Some(1));
        assert_eq!(claim.record.booking.status, BookingStatus::Confirmed);
        assert!(memory.waitlist(run.key).await.unwrap().is_empty());
        assert_eq!(memory.active_on_seat(run.key, 1).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_claims_on_single_seat() {
        let (allocator, ledger, _) = allocator();
        let run = Arc::new(run(1));
        let whole = SegmentInterval::new(0, 20).unwrap();

        let pnrs: Vec<&'static str> = vec!["P0", "P1", "P2", "P3", "P4", "P5", "P6", "P7", "P8", "P9", "PA", "PB"];
        let handles: Vec<_> = pnrs
            .into_iter()
            .map(|pnr| {
                let allocator = allocator.clone();
                let run = run.clone();
                tokio::spawn(async move { allocator.claim_seat(&run, whole, builder(pnr, &run, whole)).await })
            })
            .collect();

        let mut seated = 0;
        let mut waitlisted = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap().seat {
                Some(_) => seated += 1,
                None => waitlisted += 1,
            }
        }
        assert_eq!(seated, 1);
        assert_eq!(waitlisted, 11);
        assert_eq!(ledger.active_on_seat(run.key, 1).await.unwrap().len(), 1);
    }
}
