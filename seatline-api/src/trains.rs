use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::stream::Stream;
use seatline_catalog::StopTime;
use seatline_core::{parse_trip_date, TrainId};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trains/{train_id}/runs/{date}", get(timetable))
        .route("/v1/trains/{train_id}/stream", get(booking_stream))
}

async fn timetable(
    State(state): State<AppState>,
    Path((train_id, date)): Path<(TrainId, String)>,
) -> Result<Json<Vec<StopTime>>, AppError> {
    let date = parse_trip_date(&date)?;
    Ok(Json(state.schedule.timetable(train_id, date).await?))
}

/// Live booking events for one train. Slow consumers skip what they missed.
async fn booking_stream(
    State(state): State<AppState>,
    Path(train_id): Path<TrainId>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(train_id, "SSE subscriber attached");
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(move |msg| {
        let event = match msg {
            Ok(event) if event.train_id() == train_id => event,
            Ok(_) => return None,
            Err(lagged) => {
                warn!(train_id, error = %lagged, "SSE subscriber lagged");
                return None;
            }
        };
        match Event::default().event(event.name()).json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                warn!(train_id, error = %e, "Failed to encode booking event");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
