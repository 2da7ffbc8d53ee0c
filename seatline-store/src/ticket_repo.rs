use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use seatline_core::repository::{
    settled_statuses, BookingLedger, PaymentSettlement, ReleaseOutcome, SeatRelease, WaitlistEntry,
};
use seatline_core::{
    Booking, CoreError, CoreResult, NewBooking, RunKey, SeatId, SegmentInterval, Ticket, TicketStatus,
    Transaction,
};
use seatline_shared::Masked;
use sqlx::{PgPool, Postgres, Transaction as PgTx};
use tracing::error;
use uuid::Uuid;

use crate::storage_error;

const EXCLUSION_VIOLATION: &str = "23P01";
const UNIQUE_VIOLATION: &str = "23505";

pub struct PgBookingLedger {
    pool: PgPool,
}

impl PgBookingLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    pnr: String,
    user_id: String,
    train_id: i64,
    source_code: String,
    dest_code: String,
    trip_date: NaiveDate,
    status: String,
    fare_paise: i64,
    currency: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = CoreError;

    fn try_from(row: TicketRow) -> CoreResult<Self> {
        Ok(Ticket {
            pnr: row.pnr,
            user_id: row.user_id,
            train_id: row.train_id,
            source_code: row.source_code,
            dest_code: row.dest_code,
            trip_date: row.trip_date,
            status: row.status.parse()?,
            fare_paise: row.fare_paise,
            currency: row.currency,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    pnr: String,
    train_id: i64,
    trip_date: NaiveDate,
    from_position: i32,
    to_position: i32,
    seat_id: Option<i64>,
    status: String,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> CoreResult<Self> {
        Ok(Booking {
            id: row.id,
            pnr: row.pnr,
            run: RunKey::new(row.train_id, row.trip_date),
            interval: SegmentInterval::new(row.from_position, row.to_position)?,
            seat_id: row.seat_id,
            status: row.status.parse()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    pnr: String,
    booking_id: Uuid,
    user_id: String,
    gateway_order_id: String,
    gateway_payment_id: Option<String>,
    gateway_signature: Option<String>,
    amount_paise: i64,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = CoreError;

    fn try_from(row: TransactionRow) -> CoreResult<Self> {
        Ok(Transaction {
            id: row.id,
            pnr: row.pnr,
            booking_id: row.booking_id,
            user_id: row.user_id,
            gateway_order_id: row.gateway_order_id,
            gateway_payment_id: row.gateway_payment_id,
            gateway_signature: row.gateway_signature.map(Masked),
            amount_paise: row.amount_paise,
            currency: row.currency,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

/// Joined ticket+booking row.
#[derive(sqlx::FromRow)]
struct TicketBookingRow {
    #[sqlx(flatten)]
    ticket: TicketRow,
    booking_id: Uuid,
    from_position: i32,
    to_position: i32,
    seat_id: Option<i64>,
    booking_status: String,
}

impl TicketBookingRow {
    fn into_pair(self) -> CoreResult<(Ticket, Booking)> {
        let booking = BookingRow {
            id: self.booking_id,
            pnr: self.ticket.pnr.clone(),
            train_id: self.ticket.train_id,
            trip_date: self.ticket.trip_date,
            from_position: self.from_position,
            to_position: self.to_position,
            seat_id: self.seat_id,
            status: self.booking_status,
        };
        Ok((self.ticket.try_into()?, booking.try_into()?))
    }
}

const TICKET_BOOKING_SELECT: &str = r#"
    SELECT t.pnr, t.user_id, t.train_id, t.source_code, t.dest_code, t.trip_date, t.status,
           t.fare_paise, t.currency, t.created_at,
           b.id AS booking_id, b.from_position, b.to_position, b.seat_id, b.status AS booking_status
    FROM tickets t
    JOIN bookings b ON b.pnr = t.pnr
"#;

const BOOKING_COLUMNS: &str =
    "id, pnr, train_id, trip_date, from_position, to_position, seat_id, status";

fn map_write_error(err: sqlx::Error, pnr: &str) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(EXCLUSION_VIOLATION) => {
                error!(pnr, "Database refused overlapping active booking");
                return CoreError::Integrity(format!("booking {} overlaps an active booking on its seat", pnr));
            }
            Some(UNIQUE_VIOLATION) if db.constraint() == Some("tickets_pkey") => {
                return CoreError::DuplicatePnr(pnr.to_string());
            }
            _ => {}
        }
    }
    storage_error(err)
}

async fn set_ticket_status(tx: &mut PgTx<'_, Postgres>, pnr: &str, status: TicketStatus) -> CoreResult<()> {
    sqlx::query("UPDATE tickets SET status = $1 WHERE pnr = $2")
        .bind(status.as_str())
        .bind(pnr)
        .execute(&mut **tx)
        .await
        .map_err(storage_error)?;
    Ok(())
}

async fn record_payment(tx: &mut PgTx<'_, Postgres>, settlement: &PaymentSettlement) -> CoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE transactions
        SET status = $1, gateway_payment_id = $2, gateway_signature = $3
        WHERE gateway_order_id = $4 AND status = 'CREATED'
        "#,
    )
    .bind(settlement.status.as_str())
    .bind(&settlement.gateway_payment_id)
    .bind(settlement.gateway_signature.expose())
    .bind(&settlement.gateway_order_id)
    .execute(&mut **tx)
    .await
    .map_err(storage_error)?;
    Ok(result.rows_affected())
}

async fn settlement_conflict(tx: &mut PgTx<'_, Postgres>, gateway_order_id: &str) -> CoreError {
    let exists: Result<Option<(String,)>, _> =
        sqlx::query_as("SELECT status FROM transactions WHERE gateway_order_id = $1")
            .bind(gateway_order_id)
            .fetch_optional(&mut **tx)
            .await;
    match exists {
        Ok(Some(_)) => CoreError::AlreadySettled(gateway_order_id.to_string()),
        Ok(None) => CoreError::TransactionNotFound(gateway_order_id.to_string()),
        Err(e) => storage_error(e),
    }
}

#[async_trait]
impl BookingLedger for PgBookingLedger {
    async fn insert(&self, record: &NewBooking) -> CoreResult<()> {
        let ticket = &record.ticket;
        let booking = &record.booking;
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO tickets (pnr, user_id, train_id, source_code, dest_code, trip_date, status, fare_paise, currency, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&ticket.pnr)
        .bind(&ticket.user_id)
        .bind(ticket.train_id)
        .bind(&ticket.source_code)
        .bind(&ticket.dest_code)
        .bind(ticket.trip_date)
        .bind(ticket.status.as_str())
        .bind(ticket.fare_paise)
        .bind(&ticket.currency)
        .bind(ticket.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, &ticket.pnr))?;

        sqlx::query(
            r#"
            INSERT INTO bookings (id, pnr, train_id, trip_date, from_position, to_position, seat_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.pnr)
        .bind(booking.run.train_id)
        .bind(booking.run.date)
        .bind(booking.interval.from())
        .bind(booking.interval.to())
        .bind(booking.seat_id)
        .bind(booking.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, &booking.pnr))?;

        if let Some(payment) = &record.transaction {
            sqlx::query(
                r#"
                INSERT INTO transactions (id, pnr, booking_id, user_id, gateway_order_id, amount_paise, currency, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(payment.id)
            .bind(&payment.pnr)
            .bind(payment.booking_id)
            .bind(&payment.user_id)
            .bind(&payment.gateway_order_id)
            .bind(payment.amount_paise)
            .bind(&payment.currency)
            .bind(payment.status.as_str())
            .bind(payment.created_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)
    }

    async fn find(&self, pnr: &str) -> CoreResult<Option<(Ticket, Booking)>> {
        let row: Option<TicketBookingRow> = sqlx::query_as(&format!("{} WHERE t.pnr = $1", TICKET_BOOKING_SELECT))
            .bind(pnr)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.map(TicketBookingRow::into_pair).transpose()
    }

    async fn tickets_for_user(&self, user_id: &str, from: NaiveDate) -> CoreResult<Vec<(Ticket, Booking)>> {
        let rows: Vec<TicketBookingRow> = sqlx::query_as(&format!(
            "{} WHERE t.user_id = $1 AND t.trip_date >= $2 ORDER BY t.trip_date, t.created_at",
            TICKET_BOOKING_SELECT
        ))
        .bind(user_id)
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.into_iter().map(TicketBookingRow::into_pair).collect()
    }

    async fn active_bookings(&self, run: RunKey) -> CoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE train_id = $1 AND trip_date = $2 \
             AND status IN ('BOOKED', 'CONFIRMED') AND seat_id IS NOT NULL",
            BOOKING_COLUMNS
        ))
        .bind(run.train_id)
        .bind(run.date)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn active_on_seat(&self, run: RunKey, seat_id: SeatId) -> CoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE train_id = $1 AND trip_date = $2 AND seat_id = $3 \
             AND status IN ('BOOKED', 'CONFIRMED')",
            BOOKING_COLUMNS
        ))
        .bind(run.train_id)
        .bind(run.date)
        .bind(seat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn waitlist(&self, run: RunKey) -> CoreResult<Vec<WaitlistEntry>> {
        let rows: Vec<TicketBookingRow> = sqlx::query_as(&format!(
            "{} WHERE b.train_id = $1 AND b.trip_date = $2 AND b.status = 'WAITLISTED' AND b.seat_id IS NULL \
             ORDER BY t.created_at, t.seq",
            TICKET_BOOKING_SELECT
        ))
        .bind(run.train_id)
        .bind(run.date)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter()
            .map(|row| {
                let (ticket, booking) = row.into_pair()?;
                Ok(WaitlistEntry {
                    booking,
                    ticket_status: ticket.status,
                    created_at: ticket.created_at,
                })
            })
            .collect()
    }

    async fn commit_release(&self, release: &SeatRelease) -> CoreResult<ReleaseOutcome> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM tickets WHERE pnr = $1 FOR UPDATE")
            .bind(&release.pnr)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?;
        let status: TicketStatus = match current {
            Some((status,)) => status.parse()?,
            None => return Err(CoreError::NotFound(release.pnr.clone())),
        };
        if status == TicketStatus::Cancelled {
            return Err(CoreError::AlreadyCancelled(release.pnr.clone()));
        }

        let held: Option<(Option<i64>,)> = sqlx::query_as("SELECT seat_id FROM bookings WHERE id = $1 AND pnr = $2 FOR UPDATE")
            .bind(release.booking_id)
            .bind(&release.pnr)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?;
        match held {
            None => return Err(CoreError::NotFound(release.pnr.clone())),
            Some((seat_id,)) if seat_id != release.held_seat => {
                tx.rollback().await.map_err(storage_error)?;
                return Ok(ReleaseOutcome::SeatChanged);
            }
            Some(_) => {}
        }

        sqlx::query("UPDATE bookings SET status = 'CANCELLED', seat_id = NULL WHERE id = $1")
            .bind(release.booking_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        set_ticket_status(&mut tx, &release.pnr, TicketStatus::Cancelled).await?;

        if let Some(failed) = &release.failed_payment {
            if record_payment(&mut tx, failed).await? == 0 {
                return Err(settlement_conflict(&mut tx, &failed.gateway_order_id).await);
            }
        }

        if let Some(promotion) = &release.promotion {
            // Compare-and-swap on the candidate; zero rows means the plan went stale.
            let promoted = sqlx::query(
                r#"
                UPDATE bookings SET seat_id = $1, status = $2
                WHERE id = $3 AND pnr = $4 AND status = 'WAITLISTED' AND seat_id IS NULL
                  AND EXISTS (SELECT 1 FROM tickets WHERE pnr = $4 AND status = $5)
                "#,
            )
            .bind(promotion.seat_id)
            .bind(promotion.booking_status.as_str())
            .bind(promotion.booking_id)
            .bind(&promotion.pnr)
            .bind(promotion.expected_ticket_status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, &promotion.pnr))?;

            if promoted.rows_affected() == 0 {
                tx.rollback().await.map_err(storage_error)?;
                return Ok(ReleaseOutcome::StaleCandidate(promotion.booking_id));
            }
            set_ticket_status(&mut tx, &promotion.pnr, promotion.ticket_status).await?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(ReleaseOutcome::Committed)
    }

    async fn transaction_by_order(&self, gateway_order_id: &str) -> CoreResult<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, pnr, booking_id, user_id, gateway_order_id, gateway_payment_id, gateway_signature,
                   amount_paise, currency, status, created_at
            FROM transactions WHERE gateway_order_id = $1
            "#,
        )
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;
        row.map(Transaction::try_from).transpose()
    }

    async fn settle_payment(&self, settlement: &PaymentSettlement) -> CoreResult<Ticket> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let row: Option<TicketBookingRow> = sqlx::query_as(&format!(
            "{} JOIN transactions x ON x.pnr = t.pnr WHERE x.gateway_order_id = $1 FOR UPDATE OF t, b",
            TICKET_BOOKING_SELECT
        ))
        .bind(&settlement.gateway_order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error)?;
        let (mut ticket, booking) = match row {
            Some(row) => row.into_pair()?,
            None => return Err(CoreError::TransactionNotFound(settlement.gateway_order_id.clone())),
        };

        if ticket.status == TicketStatus::Cancelled {
            return Err(CoreError::AlreadyCancelled(ticket.pnr));
        }
        let (ticket_status, booking_status) = settled_statuses(booking.status);
        if record_payment(&mut tx, settlement).await? == 0 {
            return Err(settlement_conflict(&mut tx, &settlement.gateway_order_id).await);
        }
        ticket.transition(ticket_status)?;

        set_ticket_status(&mut tx, &ticket.pnr, ticket.status).await?;
        if booking_status != booking.status {
            sqlx::query("UPDATE bookings SET status = $1 WHERE id = $2")
                .bind(booking_status.as_str())
                .bind(booking.id)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(ticket)
    }
}

