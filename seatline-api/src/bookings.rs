use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use seatline_core::{parse_trip_date, TrainId};
use seatline_order::{AvailabilityView, BookingReceipt, BookingRequest, CancellationReport, TicketDetails};
use tracing::info;

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, Claims};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub train_id: TrainId,
    pub trip_date: String,
    pub source: String,
    pub destination: String,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let authenticated = Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/me", get(my_bookings))
        .route("/v1/bookings/{pnr}", get(get_ticket).delete(cancel_ticket))
        .route_layer(from_fn_with_state(state, customer_auth_middleware));

    Router::new()
        .route("/v1/bookings/availability", get(check_availability))
        .merge(authenticated)
}

async fn check_availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityView>, AppError> {
    let trip_date = parse_trip_date(&query.trip_date)?;
    let view = state
        .manager
        .check_availability(query.train_id, trip_date, &query.source, &query.destination)
        .await?;
    Ok(Json(view))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingReceipt>), AppError> {
    let receipt = state.manager.book(&claims.sub, &req).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<TicketDetails>>, AppError> {
    let today = Utc::now().date_naive();
    Ok(Json(state.manager.my_bookings(&claims.sub, today).await?))
}

async fn get_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(pnr): Path<String>,
) -> Result<Json<TicketDetails>, AppError> {
    Ok(Json(state.manager.ticket(&claims.sub, &pnr).await?))
}

async fn cancel_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(pnr): Path<String>,
) -> Result<StatusCode, AppError> {
    let CancellationReport { freed_seat, promoted_pnr, .. } = state.manager.cancel(&claims.sub, &pnr).await?;
    info!(
        pnr = %pnr,
        freed_seat = freed_seat.as_deref().unwrap_or("-"),
        promoted = promoted_pnr.as_deref().unwrap_or("-"),
        "Cancellation served"
    );
    Ok(StatusCode::NO_CONTENT)
}
