use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use seatline_catalog::{Fare, FarePolicy, InventoryIndex, ScheduleRepository};
use seatline_core::locks::SeatLockManager;
use seatline_core::payment::{GatewayOrder, PaymentGateway, PaymentProof};
use seatline_core::repository::{BookingLedger, PaymentSettlement};
use seatline_core::{
    Booking, BookingStatus, CoreError, CoreResult, NewBooking, ResolvedRun, RunKey, Seat, SeatId, SegmentInterval, Ticket,
    TicketStatus, TrainId, Transaction, TransactionStatus,
};
use seatline_shared::BookingEvent;
use seatline_store::EventPublisher;
use tracing::{info, warn};
use uuid::Uuid;

use crate::allocator::{Allocator, Claim};
use crate::orchestrator::PaymentOrchestrator;
use crate::pnr::generate_pnr;
use crate::promoter::{ReleaseReport, WaitlistPromoter};

const MAX_PNR_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub fare: FarePolicy,
    /// When set, tickets start `PAYMENT_PENDING` and a gateway order is opened per booking.
    pub require_payment: bool,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            fare: FarePolicy::default(),
            require_payment: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub train_id: TrainId,
    pub trip_date: NaiveDate,
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityView {
    pub train_id: TrainId,
    pub trip_date: NaiveDate,
    pub source: String,
    pub destination: String,
    pub total_seats: usize,
    pub available_seats: usize,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    pub pnr: String,
    pub status: TicketStatus,
    pub seat_number: Option<String>,
    pub fare: Fare,
    /// Present when payment is required: the client pays against this order.
    pub payment: Option<GatewayOrder>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationRef {
    pub code: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketDetails {
    pub pnr: String,
    pub train_id: TrainId,
    pub trip_date: NaiveDate,
    pub source: StationRef,
    pub destination: StationRef,
    pub status: TicketStatus,
    pub booking_status: BookingStatus,
    pub seat_number: Option<String>,
    pub fare_paise: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationReport {
    pub pnr: String,
    pub freed_seat: Option<String>,
    pub promoted_pnr: Option<String>,
}

/// Ticket and booking lifecycle: availability, booking, cancellation and payment.
pub struct BookingManager {
    schedule: Arc<dyn ScheduleRepository>,
    ledger: Arc<dyn BookingLedger>,
    allocator: Allocator,
    promoter: WaitlistPromoter,
    payments: PaymentOrchestrator,
    events: EventPublisher,
    config: BookingConfig,
}

impl BookingManager {
    pub fn new(
        schedule: Arc<dyn ScheduleRepository>,
        ledger: Arc<dyn BookingLedger>,
        locks: Arc<dyn SeatLockManager>,
        gateway: Arc<dyn PaymentGateway>,
        events: EventPublisher,
        config: BookingConfig,
    ) -> Self {
        Self {
            allocator: Allocator::new(ledger.clone(), locks.clone()),
            promoter: WaitlistPromoter::new(ledger.clone(), locks),
            payments: PaymentOrchestrator::new(gateway),
            schedule,
            ledger,
            events,
            config,
        }
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    /// Informational seat count for one segment. May lag in-flight claims.
    pub async fn check_availability(&self, train_id: TrainId, trip_date: NaiveDate, source: &str, destination: &str) -> CoreResult<AvailabilityView> {
        let run = self.schedule.resolve_run(train_id, trip_date).await?;
        let interval = run.route.segment(source, destination)?;

        let snapshot = self.ledger.active_bookings(run.key).await?;
        let availability = InventoryIndex::new(run.key, run.total_seats(), snapshot).availability(&interval);

        Ok(AvailabilityView {
            train_id,
            trip_date,
            source: source.to_string(),
            destination: destination.to_string(),
            total_seats: availability.total_seats,
            available_seats: availability.available_seats,
            status: availability.status_label(),
        })
    }

    pub async fn book(&self, user_id: &str, req: &BookingRequest) -> CoreResult<BookingReceipt> {
        // Validation first: nothing below runs for a bad request.
        let run = self.schedule.resolve_run(req.train_id, req.trip_date).await?;
        let interval = run.route.segment(&req.source, &req.destination)?;
        let fare = self.config.fare.quote(&interval);

        let mut pnr = generate_pnr();
        let payment = if self.config.require_payment {
            Some(self.payments.open_order(&pnr, &fare).await?)
        } else {
            None
        };

        let created_at = Utc::now();
        let mut attempt = 0;
        let claim = loop {
            attempt += 1;
            let draft = Draft {
                user_id,
                req,
                key: run.key,
                interval,
                fare: &fare,
                pnr: &pnr,
                payment: payment.as_ref(),
                created_at,
                booking_id: Uuid::new_v4(),
            };
            match self.allocator.claim_seat(&run, interval, |seat| draft.record(seat)).await {
                Ok(claim) => break claim,
                Err(CoreError::DuplicatePnr(taken)) if attempt < MAX_PNR_ATTEMPTS => {
                    warn!(pnr = %taken, attempt, "PNR collision, regenerating");
                    pnr = generate_pnr();
                }
                Err(e) => return Err(e),
            }
        };

        self.publish_claim(&claim, interval);
        let Claim { record, seat } = claim;
        info!(
            pnr = %record.ticket.pnr,
            user_id,
            status = %record.ticket.status,
            seat = seat.as_ref().map(|s| s.number.as_str()).unwrap_or("-"),
            "Booking accepted"
        );

        Ok(BookingReceipt {
            pnr: record.ticket.pnr,
            status: record.ticket.status,
            seat_number: seat.map(|s| s.number),
            fare,
            payment,
        })
    }

    /// Owner-scoped: another user's pnr reports `NotFound`.
    pub async fn cancel(&self, user_id: &str, pnr: &str) -> CoreResult<CancellationReport> {
        let (ticket, booking) = self.owned(user_id, pnr).await?;
        if ticket.status == TicketStatus::Cancelled {
            return Err(CoreError::AlreadyCancelled(pnr.to_string()));
        }

        let run = self.schedule.resolve_run(ticket.train_id, ticket.trip_date).await.ok();
        let report = self.promoter.release(&booking, None).await?;
        info!(pnr, user_id, "Ticket cancelled");
        Ok(self.publish_release(&ticket, run.as_ref(), &report))
    }

    /// Verify the gateway's signature and settle the transaction.
    ///
    /// A bad signature fails the transaction and cancels the ticket, freeing its seat
    /// for the waitlist, then reports `PaymentRejected`.
    pub async fn confirm_payment(&self, user_id: &str, proof: &PaymentProof) -> CoreResult<Ticket> {
        let order_id = &proof.gateway_order_id;
        let transaction = self
            .ledger
            .transaction_by_order(order_id)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| CoreError::TransactionNotFound(order_id.clone()))?;
        if transaction.status != TransactionStatus::Created {
            return Err(CoreError::AlreadySettled(order_id.clone()));
        }
        let (ticket, booking) = self
            .ledger
            .find(&transaction.pnr)
            .await?
            .ok_or_else(|| CoreError::NotFound(transaction.pnr.clone()))?;
        if ticket.status == TicketStatus::Cancelled {
            return Err(CoreError::AlreadyCancelled(ticket.pnr));
        }

        let settlement = |status: TransactionStatus| PaymentSettlement {
            gateway_order_id: order_id.clone(),
            gateway_payment_id: proof.gateway_payment_id.clone(),
            gateway_signature: proof.gateway_signature.clone(),
            status,
        };

        match self.payments.verify(proof) {
            Ok(()) => {
                let settled = self.ledger.settle_payment(&settlement(TransactionStatus::Success)).await?;
                info!(pnr = %settled.pnr, order_id = %order_id, status = %settled.status, "Payment settled");
                self.events.publish(BookingEvent::PaymentSettled {
                    pnr: settled.pnr.clone(),
                    train_id: settled.train_id,
                    gateway_order_id: order_id.clone(),
                    succeeded: true,
                    timestamp: Utc::now().timestamp(),
                });
                Ok(settled)
            }
            Err(CoreError::PaymentRejected(reason)) => {
                let run = self.schedule.resolve_run(ticket.train_id, ticket.trip_date).await.ok();
                let report = self
                    .promoter
                    .release(&booking, Some(settlement(TransactionStatus::Failed)))
                    .await?;
                warn!(pnr = %ticket.pnr, order_id = %order_id, "Payment failed, ticket rolled back");
                self.events.publish(BookingEvent::PaymentSettled {
                    pnr: ticket.pnr.clone(),
                    train_id: ticket.train_id,
                    gateway_order_id: order_id.clone(),
                    succeeded: false,
                    timestamp: Utc::now().timestamp(),
                });
                self.publish_release(&ticket, run.as_ref(), &report);
                Err(CoreError::PaymentRejected(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Owner-scoped ticket lookup.
    pub async fn ticket(&self, user_id: &str, pnr: &str) -> CoreResult<TicketDetails> {
        let (ticket, booking) = self.owned(user_id, pnr).await?;
        let mut names = HashMap::new();
        let mut runs = HashMap::new();
        self.details(ticket, booking, &mut names, &mut runs).await
    }

    /// Tickets travelling on or after `today`, earliest trip first.
    pub async fn my_bookings(&self, user_id: &str, today: NaiveDate) -> CoreResult<Vec<TicketDetails>> {
        let rows = self.ledger.tickets_for_user(user_id, today).await?;
        let mut names = HashMap::new();
        let mut runs = HashMap::new();

        let mut out = Vec::with_capacity(rows.len());
        for (ticket, booking) in rows {
            out.push(self.details(ticket, booking, &mut names, &mut runs).await?);
        }
        Ok(out)
    }

    async fn owned(&self, user_id: &str, pnr: &str) -> CoreResult<(Ticket, Booking)> {
        self.ledger
            .find(pnr)
            .await?
            .filter(|(t, _)| t.user_id == user_id)
            .ok_or_else(|| CoreError::NotFound(pnr.to_string()))
    }

    async fn details(
        &self,
        ticket: Ticket,
        booking: Booking,
        names: &mut HashMap<String, Option<String>>,
        runs: &mut HashMap<RunKey, Option<ResolvedRun>>,
    ) -> CoreResult<TicketDetails> {
        let source = self.station_ref(&ticket.source_code, names).await?;
        let destination = self.station_ref(&ticket.dest_code, names).await?;

        let key = ticket.run_key();
        if !runs.contains_key(&key) {
            let resolved = self.schedule.resolve_run(key.train_id, key.date).await.ok();
            runs.insert(key, resolved);
        }
        let seat_number = booking
            .seat_id
            .and_then(|id| runs.get(&key)?.as_ref()?.seat(id))
            .map(|s| s.number.clone());

        Ok(TicketDetails {
            pnr: ticket.pnr,
            train_id: ticket.train_id,
            trip_date: ticket.trip_date,
            source,
            destination,
            status: ticket.status,
            booking_status: booking.status,
            seat_number,
            fare_paise: ticket.fare_paise,
            currency: ticket.currency,
            created_at: ticket.created_at,
        })
    }

    async fn station_ref(&self, code: &str, names: &mut HashMap<String, Option<String>>) -> CoreResult<StationRef> {
        if !names.contains_key(code) {
            let name = self.schedule.station(code).await?.map(|s| s.name);
            names.insert(code.to_string(), name);
        }
        Ok(StationRef {
            code: code.to_string(),
            name: names.get(code).cloned().flatten(),
        })
    }

    fn publish_claim(&self, claim: &Claim, interval: SegmentInterval) {
        let ticket = &claim.record.ticket;
        let event = match &claim.seat {
            Some(seat) => BookingEvent::SeatClaimed {
                pnr: ticket.pnr.clone(),
                train_id: ticket.train_id,
                trip_date: ticket.trip_date,
                seat_number: seat.number.clone(),
                from_position: interval.from(),
                to_position: interval.to(),
                timestamp: Utc::now().timestamp(),
            },
            None => BookingEvent::Waitlisted {
                pnr: ticket.pnr.clone(),
                train_id: ticket.train_id,
                trip_date: ticket.trip_date,
                from_position: interval.from(),
                to_position: interval.to(),
                timestamp: Utc::now().timestamp(),
            },
        };
        self.events.publish(event);
    }

    fn publish_release(&self, ticket: &Ticket, run: Option<&ResolvedRun>, report: &ReleaseReport) -> CancellationReport {
        let seat_number = |id: SeatId| run.and_then(|r| r.seat(id)).map(|s: &Seat| s.number.clone()).unwrap_or_else(|| id.to_string());
        let freed_seat = report.freed_seat.map(seat_number);

        self.events.publish(BookingEvent::TicketCancelled {
            pnr: ticket.pnr.clone(),
            train_id: ticket.train_id,
            trip_date: ticket.trip_date,
            freed_seat: freed_seat.clone(),
            timestamp: Utc::now().timestamp(),
        });
        if let Some(promotion) = &report.promotion {
            self.events.publish(BookingEvent::WaitlistPromoted {
                pnr: promotion.pnr.clone(),
                train_id: ticket.train_id,
                trip_date: ticket.trip_date,
                seat_number: seat_number(promotion.seat_id),
                timestamp: Utc::now().timestamp(),
            });
        }

        CancellationReport {
            pnr: ticket.pnr.clone(),
            freed_seat,
            promoted_pnr: report.promotion.as_ref().map(|p| p.pnr.clone()),
        }
    }
}

/// Inputs for the records of one booking attempt.
struct Draft<'a> {
    user_id: &'a str,
    req: &'a BookingRequest,
    key: RunKey,
    interval: SegmentInterval,
    fare: &'a Fare,
    pnr: &'a str,
    payment: Option<&'a GatewayOrder>,
    created_at: DateTime<Utc>,
    booking_id: Uuid,
}

impl Draft<'_> {
    fn record(&self, seat: Option<&Seat>) -> NewBooking {
        let (ticket_status, booking_status) = match (seat.is_some(), self.payment.is_some()) {
            (true, true) => (TicketStatus::PaymentPending, BookingStatus::Booked),
            (false, true) => (TicketStatus::PaymentPending, BookingStatus::Waitlisted),
            (true, false) => (TicketStatus::Confirmed, BookingStatus::Confirmed),
            (false, false) => (TicketStatus::Waitlisted, BookingStatus::Waitlisted),
        };

        let transaction = self.payment.map(|order| Transaction {
            id: Uuid::new_v4(),
            pnr: self.pnr.to_string(),
            booking_id: self.booking_id,
            user_id: self.user_id.to_string(),
            gateway_order_id: order.id.clone(),
            gateway_payment_id: None,
            gateway_signature: None,
            amount_paise: order.amount_paise,
            currency: order.currency.clone(),
            status: TransactionStatus::Created,
            created_at: self.created_at,
        });

        NewBooking {
            ticket: Ticket {
                pnr: self.pnr.to_string(),
                user_id: self.user_id.to_string(),
                train_id: self.key.train_id,
                source_code: self.req.source.clone(),
                dest_code: self.req.destination.clone(),
                trip_date: self.key.date,
                status: ticket_status,
                fare_paise: self.fare.amount_paise,
                currency: self.fare.currency.clone(),
                created_at: self.created_at,
            },
            booking: Booking {
                id: self.booking_id,
                pnr: self.pnr.to_string(),
                run: self.key,
                interval: self.interval,
                seat_id: seat.map(|s| s.id),
                status: booking_status,
            },
            transaction,
        }
    }
}
