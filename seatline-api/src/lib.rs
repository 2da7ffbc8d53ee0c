use axum::{http::Method, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod error;
pub mod middleware;
pub mod payments;
pub mod state;
pub mod trains;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .merge(auth::routes())
        .merge(bookings::routes(state.clone()))
        .merge(payments::routes(state.clone()))
        .merge(admin::routes(state.clone()))
        .merge(trains::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
