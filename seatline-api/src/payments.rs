use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::post,
    Extension, Json, Router,
};
use seatline_core::payment::PaymentProof;
use seatline_core::{Ticket, TicketStatus};
use serde::Serialize;

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, Claims};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct PaymentResponse {
    pnr: String,
    status: TicketStatus,
}

impl From<Ticket> for PaymentResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            pnr: ticket.pnr,
            status: ticket.status,
        }
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/payments/verify", post(verify_payment))
        .route_layer(from_fn_with_state(state, customer_auth_middleware))
}

async fn verify_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(proof): Json<PaymentProof>,
) -> Result<Json<PaymentResponse>, AppError> {
    let ticket = state.manager.confirm_payment(&claims.sub, &proof).await?;
    Ok(Json(ticket.into()))
}
