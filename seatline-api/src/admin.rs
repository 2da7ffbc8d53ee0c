use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use seatline_catalog::{ScheduleRunRequest, TrainRun};
use tracing::info;

use crate::error::AppError;
use crate::middleware::{admin_auth_middleware, Claims};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/admin/runs", post(schedule_run))
        .route_layer(from_fn_with_state(state, admin_auth_middleware))
}

async fn schedule_run(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ScheduleRunRequest>,
) -> Result<(StatusCode, Json<TrainRun>), AppError> {
    let run = state.schedule.schedule_run(&req, Utc::now().date_naive()).await?;
    info!(admin = %claims.sub, train = %req.train_number, date = %run.date, "Run scheduled via admin API");
    Ok((StatusCode::CREATED, Json(run)))
}
