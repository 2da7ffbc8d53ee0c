use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, NaiveTime};
use seatline_api::{app, AppState, AuthConfig};
use seatline_catalog::{ScheduleBook, ScheduleRunRequest};
use seatline_core::TrainId;
use seatline_order::{BookingConfig, BookingManager, MockPaymentGateway};
use seatline_store::{EventPublisher, LocalSeatLocks, MemoryLedger, MemorySchedule};
use serde_json::{json, Value};
use tower::ServiceExt;

const TRIP_DATE: &str = "2099-01-05";

struct TestApp {
    router: Router,
    gateway: Arc<MockPaymentGateway>,
    train_id: TrainId,
    route_id: i64,
}

fn test_app(seats: usize, require_payment: bool) -> TestApp {
    let mut book = ScheduleBook::new();
    book.add_station("NDLS", "New Delhi", "Delhi");
    book.add_station("CNB", "Kanpur Central", "Kanpur");
    book.add_station("PRYJ", "Prayagraj Junction", "Prayagraj");
    let route = book
        .add_route("NDLS-PRYJ", &[("NDLS", 0, 0), ("CNB", 10, 440), ("PRYJ", 20, 634)])
        .unwrap();
    let train = book.add_train("12417", "Prayagraj Express", 60, seats).unwrap();
    book.add_train("12418", "Prayagraj Express Return", 60, seats).unwrap();
    book.schedule_run(
        &ScheduleRunRequest {
            train_number: "12417".to_string(),
            route_id: route.id,
            date: NaiveDate::parse_from_str(TRIP_DATE, "%Y-%m-%d").unwrap(),
            start_time: NaiveTime::from_hms_opt(22, 10, 0).unwrap(),
        },
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
    )
    .unwrap();

    let schedule = Arc::new(MemorySchedule::new(book));
    let gateway = Arc::new(MockPaymentGateway::new("rzp_test", "api_test_secret"));
    let events = EventPublisher::default();
    let manager = BookingManager::new(
        schedule.clone(),
        Arc::new(MemoryLedger::new()),
        Arc::new(LocalSeatLocks::new()),
        gateway.clone(),
        events.clone(),
        BookingConfig {
            require_payment,
            ..BookingConfig::default()
        },
    );

    let state = AppState {
        manager: Arc::new(manager),
        schedule,
        events,
        auth: AuthConfig {
            secret: "api_test_jwt".to_string(),
            expiration: 3600,
        },
    };

    TestApp {
        router: app(state),
        gateway,
        train_id: train.id,
        route_id: route.id,
    }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn token(&self, user_id: &str, role: &str) -> String {
        let (status, body) = self
            .call(Method::POST, "/v1/auth/token", None, Some(json!({ "user_id": user_id, "role": role })))
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn book(&self, token: &str, source: &str, destination: &str) -> (StatusCode, Value) {
        let body = json!({
            "train_id": self.train_id,
            "trip_date": TRIP_DATE,
            "source": source,
            "destination": destination,
        });
        self.call(Method::POST, "/v1/bookings", Some(token), Some(body)).await
    }
}

#[tokio::test]
async fn test_book_query_and_cancel() {
    let app = test_app(1, false);
    let alice = app.token("alice", "CUSTOMER").await;
    let bob = app.token("bob", "CUSTOMER").await;

    let (status, receipt) = app.book(&alice, "NDLS", "PRYJ").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["status"], "CONFIRMED");
    assert_eq!(receipt["seat_number"], "1");
    let pnr = receipt["pnr"].as_str().unwrap().to_string();

    let availability = format!(
        "/v1/bookings/availability?train_id={}&trip_date={}&source=NDLS&destination=CNB",
        app.train_id, TRIP_DATE
    );
    let (status, view) = app.call(Method::GET, &availability, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["available_seats"], 0);
    assert_eq!(view["status"], "WAITLIST");

    let (_, waiting) = app.book(&bob, "NDLS", "CNB").await;
    assert_eq!(waiting["status"], "WAITLISTED");
    let bob_pnr = waiting["pnr"].as_str().unwrap().to_string();

    let (status, mine) = app.call(Method::GET, "/v1/bookings/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["source"]["name"], "New Delhi");

    // Bob cannot see or cancel Alice's ticket.
    let ticket_uri = format!("/v1/bookings/{}", pnr);
    let (status, _) = app.call(Method::GET, &ticket_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.call(Method::DELETE, &ticket_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call(Method::DELETE, &ticket_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = app.call(Method::DELETE, &ticket_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (_, promoted) = app
        .call(Method::GET, &format!("/v1/bookings/{}", bob_pnr), Some(&bob), None)
        .await;
    assert_eq!(promoted["status"], "CONFIRMED");
    assert_eq!(promoted["seat_number"], "1");
}

#[tokio::test]
async fn test_validation_errors_map_to_bad_request() {
    let app = test_app(1, false);
    let alice = app.token("alice", "CUSTOMER").await;

    let (status, _) = app.book(&alice, "PRYJ", "NDLS").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.book(&alice, "NDLS", "HWH").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unscheduled = json!({
        "train_id": app.train_id,
        "trip_date": "2099-01-06",
        "source": "NDLS",
        "destination": "PRYJ",
    });
    let (status, _) = app.call(Method::POST, "/v1/bookings", Some(&alice), Some(unscheduled)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_date = format!(
        "/v1/bookings/availability?train_id={}&trip_date=05-01-2099&source=NDLS&destination=CNB",
        app.train_id
    );
    let (status, _) = app.call(Method::GET, &bad_date, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bearer_token_required() {
    let app = test_app(1, false);

    let (status, _) = app.call(Method::GET, "/v1/bookings/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.call(Method::GET, "/v1/bookings/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(Method::POST, "/v1/auth/token", None, Some(json!({ "user_id": "x", "role": "ROOT" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let customer = app.token("alice", "CUSTOMER").await;
    let run = json!({ "train_number": "12418", "route_id": app.route_id, "date": "2099-02-01", "start_time": "06:00:00" });
    let (status, _) = app.call(Method::POST, "/v1/admin/runs", Some(&customer), Some(run)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_schedules_run_and_timetable() {
    let app = test_app(2, false);
    let admin = app.token("ops", "ADMIN").await;

    let route_id = app.route_id;

    let (status, timetable) = app
        .call(Method::GET, &format!("/v1/trains/{}/runs/{}", app.train_id, TRIP_DATE), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(timetable.as_array().unwrap().len(), 3);
    assert_eq!(timetable[0]["code"], "NDLS");
    assert_eq!(timetable[0]["arrival_time"], "22:10:00");

    let run = json!({ "train_number": "12418", "route_id": route_id, "date": "2099-02-01", "start_time": "06:00:00" });
    let (status, created) = app.call(Method::POST, "/v1/admin/runs", Some(&admin), Some(run.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["date"], "2099-02-01");

    let (status, _) = app.call(Method::POST, "/v1/admin/runs", Some(&admin), Some(run)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let unknown = json!({ "train_number": "99999", "route_id": route_id, "date": "2099-02-01", "start_time": "06:00:00" });
    let (status, _) = app.call(Method::POST, "/v1/admin/runs", Some(&admin), Some(unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(Method::GET, &format!("/v1/trains/{}/runs/2099-03-01", app.train_id), None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payment_verification_flow() {
    let app = test_app(1, true);
    let alice = app.token("alice", "CUSTOMER").await;
    let bob = app.token("bob", "CUSTOMER").await;

    let (status, receipt) = app.book(&alice, "NDLS", "PRYJ").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["status"], "PAYMENT_PENDING");
    let order_id = receipt["payment"]["id"].as_str().unwrap().to_string();
    assert_eq!(receipt["payment"]["amount_paise"], 50_000);

    let signature = app.gateway.sign(&order_id, "pay_1").unwrap();
    let proof = json!({
        "gateway_order_id": order_id,
        "gateway_payment_id": "pay_1",
        "gateway_signature": signature,
    });

    // Only the ticket owner may settle.
    let (status, _) = app.call(Method::POST, "/v1/payments/verify", Some(&bob), Some(proof.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, paid) = app.call(Method::POST, "/v1/payments/verify", Some(&alice), Some(proof.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "CONFIRMED");

    let (status, _) = app.call(Method::POST, "/v1/payments/verify", Some(&alice), Some(proof)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, waiting) = app.book(&bob, "NDLS", "PRYJ").await;
    let forged = json!({
        "gateway_order_id": waiting["payment"]["id"],
        "gateway_payment_id": "pay_2",
        "gateway_signature": "deadbeef",
    });
    let (status, body) = app.call(Method::POST, "/v1/payments/verify", Some(&bob), Some(forged)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(body["error"].is_string());

    let (_, rolled_back) = app
        .call(Method::GET, &format!("/v1/bookings/{}", waiting["pnr"].as_str().unwrap()), Some(&bob), None)
        .await;
    assert_eq!(rolled_back["status"], "CANCELLED");
}

#[tokio::test]
async fn test_gateway_outage_is_bad_gateway() {
    let app = test_app(1, true);
    let alice = app.token("alice", "CUSTOMER").await;
    app.gateway.set_available(false);

    let (status, _) = app.book(&alice, "NDLS", "PRYJ").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (_, mine) = app.call(Method::GET, "/v1/bookings/me", Some(&alice), None).await;
    assert!(mine.as_array().unwrap().is_empty());
}
