pub mod error;
pub mod segment;
pub mod models;
pub mod repository;
pub mod locks;
pub mod payment;

pub use error::{CoreError, CoreResult, ErrorKind};
pub use segment::{Route, RoutePosition, RouteStop, SegmentInterval};
pub use models::{
    Booking, BookingStatus, NewBooking, ResolvedRun, RunKey, Seat, SeatId, Ticket, TicketStatus,
    TrainId, Transaction, TransactionStatus,
};

/// Parse a trip date in the `YYYY-MM-DD` form used on every boundary.
pub fn parse_trip_date(raw: &str) -> CoreResult<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trip_date() {
        let date = parse_trip_date("2026-03-14").unwrap();
        assert_eq!(date.to_string(), "2026-03-14");

        assert!(matches!(parse_trip_date("14/03/2026"), Err(CoreError::InvalidDate(_))));
        assert!(matches!(parse_trip_date("2026-02-30"), Err(CoreError::InvalidDate(_))));
    }
}
