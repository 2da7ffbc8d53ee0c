use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use seatline_core::{Booking, CoreError, CoreResult, RunKey, SeatId, SegmentInterval};
use tracing::error;

/// Seat counts for one segment of one run, as shown to a traveller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub train_id: i64,
    pub trip_date: NaiveDate,
    pub total_seats: usize,
    pub available_seats: usize,
}

impl Availability {
    pub fn status_label(&self) -> String {
        if self.available_seats > 0 {
            format!("AVAILABLE {}", self.available_seats)
        } else {
            "WAITLIST".to_string()
        }
    }
}

/// Occupancy of one run, built from a single snapshot of its active bookings.
///
/// Read-only; the snapshot may already be stale by the time it is consulted, which is
/// fine for display and candidate filtering but never for the final claim decision.
#[derive(Debug, Clone)]
pub struct InventoryIndex {
    run: RunKey,
    total_seats: usize,
    active: Vec<Booking>,
}

impl InventoryIndex {
    pub fn new(run: RunKey, total_seats: usize, bookings: Vec<Booking>) -> Self {
        let active = bookings
            .into_iter()
            .filter(|b| b.run == run && b.is_active())
            .collect();
        Self {
            run,
            total_seats,
            active,
        }
    }

    pub fn run(&self) -> RunKey {
        self.run
    }

    pub fn total_seats(&self) -> usize {
        self.total_seats
    }

    /// Seats carrying at least one active booking overlapping `interval`.
    pub fn occupied_seats(&self, interval: &SegmentInterval) -> BTreeSet<SeatId> {
        self.active
            .iter()
            .filter(|b| b.interval.overlaps(interval))
            .filter_map(|b| b.seat_id)
            .collect()
    }

    pub fn is_seat_free(&self, seat_id: SeatId, interval: &SegmentInterval) -> bool {
        !self
            .active
            .iter()
            .any(|b| b.seat_id == Some(seat_id) && b.interval.overlaps(interval))
    }

    /// `total - |occupied|`. More occupied seats than the train owns means bookings
    /// reference foreign seats, which is reported rather than clamped.
    pub fn free_count(&self, interval: &SegmentInterval) -> CoreResult<usize> {
        let occupied = self.occupied_seats(interval).len();
        self.total_seats.checked_sub(occupied).ok_or_else(|| {
            error!(
                run = %self.run,
                total = self.total_seats,
                occupied,
                "Inventory invariant violated: occupied seats exceed train capacity"
            );
            CoreError::Integrity(format!(
                "run {} has {} occupied seats for {} but only {} seats",
                self.run, occupied, interval, self.total_seats
            ))
        })
    }

    /// Display figure: floors at zero, still logging the violation.
    pub fn availability(&self, interval: &SegmentInterval) -> Availability {
        let available_seats = self.free_count(interval).unwrap_or(0);
        Availability {
            train_id: self.run.train_id,
            trip_date: self.run.date,
            total_seats: self.total_seats,
            available_seats,
        }
    }

    /// Fails if two active bookings on the same seat overlap.
    pub fn check_disjoint(&self) -> CoreResult<()> {
        let mut by_seat: HashMap<SeatId, Vec<&Booking>> = HashMap::new();
        for booking in &self.active {
            if let Some(seat_id) = booking.seat_id {
                by_seat.entry(seat_id).or_default().push(booking);
            }
        }

        for (seat_id, bookings) in by_seat {
            for (i, a) in bookings.iter().enumerate() {
                if let Some(b) = bookings[i + 1..].iter().find(|b| a.interval.overlaps(&b.interval)) {
                    error!(
                        run = %self.run,
                        seat_id,
                        first = %a.pnr,
                        second = %b.pnr,
                        "Inventory invariant violated: overlapping active bookings on one seat"
                    );
                    return Err(CoreError::Integrity(format!(
                        "seat {} of run {} holds overlapping bookings {} {} and {} {}",
                        seat_id, self.run, a.pnr, a.interval, b.pnr, b.interval
                    )));
                }
            }
        }
        Ok(())
    }
}
