use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use seatline_catalog::{estimate_arrival, ScheduleRepository, ScheduleRunRequest, Station, StopTime, TrainRun};
use seatline_core::{CoreError, CoreResult, ResolvedRun, Route, RouteStop, RunKey, Seat, TrainId};
use sqlx::PgPool;
use tracing::info;

use crate::storage_error;

pub struct PgScheduleRepository {
    pool: PgPool,
}

impl PgScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn route(&self, route_id: i64) -> CoreResult<Route> {
        let header: Option<(String, i32)> = sqlx::query_as("SELECT name, distance_km FROM routes WHERE id = $1")
            .bind(route_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        let (name, distance_km) = header.ok_or(CoreError::RouteNotFound(route_id))?;

        let stops: Vec<StopRow> = sqlx::query_as(
            r#"
            SELECT rs.station_id, s.code, rs.position, rs.distance_from_start_km
            FROM route_stations rs
            JOIN stations s ON s.id = rs.station_id
            WHERE rs.route_id = $1
            ORDER BY rs.position
            "#,
        )
        .bind(route_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let stops = stops
            .into_iter()
            .map(|s| RouteStop {
                station_id: s.station_id,
                code: s.code,
                position: s.position,
                distance_from_start_km: s.distance_from_start_km,
            })
            .collect();
        Route::new(route_id, name, distance_km, stops)
    }
}

#[derive(sqlx::FromRow)]
struct StopRow {
    station_id: i64,
    code: String,
    position: i32,
    distance_from_start_km: i32,
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: i64,
    train_id: i64,
    run_date: NaiveDate,
    route_id: i64,
    start_time: NaiveTime,
}

impl From<RunRow> for TrainRun {
    fn from(row: RunRow) -> Self {
        TrainRun {
            id: row.id,
            train_id: row.train_id,
            date: row.run_date,
            route_id: row.route_id,
            start_time: row.start_time,
        }
    }
}

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn resolve_run(&self, train_id: TrainId, date: NaiveDate) -> CoreResult<ResolvedRun> {
        let run: Option<RunRow> = sqlx::query_as(
            "SELECT id, train_id, run_date, route_id, start_time FROM train_runs WHERE train_id = $1 AND run_date = $2",
        )
        .bind(train_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;
        let run = run.ok_or(CoreError::TrainNotScheduled { train_id, date })?;

        let route = self.route(run.route_id).await?;
        let seats: Vec<(i64, String)> = sqlx::query_as("SELECT id, number FROM seats WHERE train_id = $1 ORDER BY id")
            .bind(train_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(ResolvedRun {
            key: RunKey::new(train_id, date),
            route,
            seats: seats
                .into_iter()
                .map(|(id, number)| Seat { id, train_id, number })
                .collect(),
            start_time: run.start_time,
        })
    }

    async fn schedule_run(&self, req: &ScheduleRunRequest, today: NaiveDate) -> CoreResult<TrainRun> {
        let train: Option<(i64,)> = sqlx::query_as("SELECT id FROM trains WHERE number = $1")
            .bind(&req.train_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        let (train_id,) = train.ok_or_else(|| CoreError::TrainNotFound(req.train_number.clone()))?;

        let route: Option<(i64,)> = sqlx::query_as("SELECT id FROM routes WHERE id = $1")
            .bind(req.route_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        if route.is_none() {
            return Err(CoreError::RouteNotFound(req.route_id));
        }
        if req.date < today {
            return Err(CoreError::DateInPast(req.date));
        }

        let inserted: Option<RunRow> = sqlx::query_as(
            r#"
            INSERT INTO train_runs (train_id, run_date, route_id, start_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (train_id, run_date) DO NOTHING
            RETURNING id, train_id, run_date, route_id, start_time
            "#,
        )
        .bind(train_id)
        .bind(req.date)
        .bind(req.route_id)
        .bind(req.start_time)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let run = inserted.ok_or(CoreError::DuplicateSchedule { train_id, date: req.date })?;
        info!(train = %req.train_number, date = %req.date, route_id = req.route_id, "Train run scheduled");
        Ok(run.into())
    }

    async fn timetable(&self, train_id: TrainId, date: NaiveDate) -> CoreResult<Vec<StopTime>> {
        let resolved = self.resolve_run(train_id, date).await?;
        let speed: Option<(i32,)> = sqlx::query_as("SELECT average_speed_kmh FROM trains WHERE id = $1")
            .bind(train_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        let speed = speed.map(|(s,)| s).unwrap_or(0);

        let stations: Vec<Station> = sqlx::query_as::<_, (i64, String, String, String)>(
            r#"
            SELECT s.id, s.code, s.name, s.city
            FROM route_stations rs JOIN stations s ON s.id = rs.station_id
            JOIN train_runs r ON r.route_id = rs.route_id
            WHERE r.train_id = $1 AND r.run_date = $2
            "#,
        )
        .bind(train_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?
        .into_iter()
        .map(|(id, code, name, city)| Station { id, code, name, city })
        .collect();

        Ok(resolved
            .route
            .stops()
            .iter()
            .map(|stop| {
                let station = stations.iter().find(|s| s.id == stop.station_id);
                StopTime {
                    station_id: stop.station_id,
                    code: stop.code.clone(),
                    name: station.map(|s| s.name.clone()).unwrap_or_default(),
                    city: station.map(|s| s.city.clone()).unwrap_or_default(),
                    position: stop.position,
                    distance_from_start_km: stop.distance_from_start_km,
                    arrival_time: estimate_arrival(resolved.start_time, stop.distance_from_start_km, speed),
                }
            })
            .collect())
    }

    async fn station(&self, code: &str) -> CoreResult<Option<Station>> {
        let row: Option<(i64, String, String, String)> =
            sqlx::query_as("SELECT id, code, name, city FROM stations WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(row.map(|(id, code, name, city)| Station { id, code, name, city }))
    }
}
