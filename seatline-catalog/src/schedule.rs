use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use seatline_core::{
    CoreError, CoreResult, ResolvedRun, Route, RoutePosition, RouteStop, RunKey, Seat, TrainId,
};
use tracing::info;

pub const DEFAULT_SPEED_KMH: i32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Train {
    pub id: TrainId,
    pub number: String,
    pub name: String,
    pub average_speed_kmh: i32,
}

/// A train assigned to a route on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainRun {
    pub id: i64,
    pub train_id: TrainId,
    pub date: NaiveDate,
    pub route_id: i64,
    pub start_time: NaiveTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRunRequest {
    pub train_number: String,
    pub route_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

/// One row of a run's timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopTime {
    pub station_id: i64,
    pub code: String,
    pub name: String,
    pub city: String,
    pub position: RoutePosition,
    pub distance_from_start_km: i32,
    pub arrival_time: NaiveTime,
}

/// Estimated arrival at a stop `distance_km` into the journey. Wraps past midnight.
pub fn estimate_arrival(start: NaiveTime, distance_km: i32, average_speed_kmh: i32) -> NaiveTime {
    let speed = if average_speed_kmh <= 0 { DEFAULT_SPEED_KMH } else { average_speed_kmh };
    let minutes = i64::from(distance_km) * 60 / i64::from(speed);
    start.overflowing_add_signed(Duration::minutes(minutes)).0
}

/// Scheduling/topology collaborator consulted by the booking core.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Fails with `TrainNotScheduled` when no run exists for (train, date).
    async fn resolve_run(&self, train_id: TrainId, date: NaiveDate) -> CoreResult<ResolvedRun>;

    async fn schedule_run(&self, req: &ScheduleRunRequest, today: NaiveDate) -> CoreResult<TrainRun>;

    async fn timetable(&self, train_id: TrainId, date: NaiveDate) -> CoreResult<Vec<StopTime>>;

    async fn station(&self, code: &str) -> CoreResult<Option<Station>>;
}

/// In-process registry of stations, routes, trains, seats and runs.
#[derive(Debug, Default)]
pub struct ScheduleBook {
    stations: BTreeMap<String, Station>,
    routes: HashMap<i64, Route>,
    trains: HashMap<TrainId, Train>,
    seats: HashMap<TrainId, Vec<Seat>>,
    runs: BTreeMap<RunKey, TrainRun>,
    next_id: i64,
}

impl ScheduleBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Insert or update a station by code.
    pub fn add_station(&mut self, code: &str, name: &str, city: &str) -> Station {
        let id = match self.stations.get(code) {
            Some(existing) => existing.id,
            None => self.allocate_id(),
        };
        let station = Station {
            id,
            code: code.to_string(),
            name: name.to_string(),
            city: city.to_string(),
        };
        self.stations.insert(code.to_string(), station.clone());
        station
    }

    pub fn station(&self, code: &str) -> Option<&Station> {
        self.stations.get(code)
    }

    /// Build a route from `(station_code, position, km_from_start)` triples.
    pub fn add_route(&mut self, name: &str, stops: &[(&str, RoutePosition, i32)]) -> CoreResult<Route> {
        let mut route_stops = Vec::with_capacity(stops.len());
        for (code, position, km) in stops {
            let station = self
                .stations
                .get(*code)
                .ok_or_else(|| CoreError::InvalidRoute(format!("unknown station {}", code)))?;
            route_stops.push(RouteStop {
                station_id: station.id,
                code: station.code.clone(),
                position: *position,
                distance_from_start_km: *km,
            });
        }
        let distance_km = route_stops.iter().map(|s| s.distance_from_start_km).max().unwrap_or(0);

        let id = self.allocate_id();
        let route = Route::new(id, name, distance_km, route_stops)?;
        self.routes.insert(id, route.clone());
        Ok(route)
    }

    /// Register a train with seats numbered `1..=seat_count`.
    pub fn add_train(&mut self, number: &str, name: &str, average_speed_kmh: i32, seat_count: usize) -> CoreResult<Train> {
        if self.train_by_number(number).is_some() {
            return Err(CoreError::DuplicateTrain(number.to_string()));
        }

        let id = self.allocate_id();
        let train = Train {
            id,
            number: number.to_string(),
            name: name.to_string(),
            average_speed_kmh,
        };
        let seats = (1..=seat_count)
            .map(|n| Seat {
                id: self.allocate_id(),
                train_id: id,
                number: n.to_string(),
            })
            .collect();

        self.trains.insert(id, train.clone());
        self.seats.insert(id, seats);
        Ok(train)
    }

    pub fn train(&self, train_id: TrainId) -> Option<&Train> {
        self.trains.get(&train_id)
    }

    pub fn train_by_number(&self, number: &str) -> Option<&Train> {
        self.trains.values().find(|t| t.number == number)
    }

    pub fn schedule_run(&mut self, req: &ScheduleRunRequest, today: NaiveDate) -> CoreResult<TrainRun> {
        let train_id = self
            .train_by_number(&req.train_number)
            .map(|t| t.id)
            .ok_or_else(|| CoreError::TrainNotFound(req.train_number.clone()))?;
        if !self.routes.contains_key(&req.route_id) {
            return Err(CoreError::RouteNotFound(req.route_id));
        }
        if req.date < today {
            return Err(CoreError::DateInPast(req.date));
        }

        let key = RunKey::new(train_id, req.date);
        if self.runs.contains_key(&key) {
            return Err(CoreError::DuplicateSchedule {
                train_id,
                date: req.date,
            });
        }

        let run = TrainRun {
            id: self.allocate_id(),
            train_id,
            date: req.date,
            route_id: req.route_id,
            start_time: req.start_time,
        };
        self.runs.insert(key, run.clone());
        info!(train = %req.train_number, date = %req.date, route_id = req.route_id, "Train run scheduled");
        Ok(run)
    }

    pub fn runs(&self) -> impl Iterator<Item = &TrainRun> {
        self.runs.values()
    }

    pub fn resolve_run(&self, train_id: TrainId, date: NaiveDate) -> CoreResult<ResolvedRun> {
        let key = RunKey::new(train_id, date);
        let run = self
            .runs
            .get(&key)
            .ok_or(CoreError::TrainNotScheduled { train_id, date })?;
        let route = self
            .routes
            .get(&run.route_id)
            .cloned()
            .ok_or(CoreError::RouteNotFound(run.route_id))?;

        Ok(ResolvedRun {
            key,
            route,
            seats: self.seats.get(&train_id).cloned().unwrap_or_default(),
            start_time: run.start_time,
        })
    }

    pub fn timetable(&self, train_id: TrainId, date: NaiveDate) -> CoreResult<Vec<StopTime>> {
        let resolved = self.resolve_run(train_id, date)?;
        let speed = self
            .trains
            .get(&train_id)
            .map(|t| t.average_speed_kmh)
            .unwrap_or(DEFAULT_SPEED_KMH);

        Ok(resolved
            .route
            .stops()
            .iter()
            .map(|stop| {
                let station = self.stations.get(&stop.code);
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn book() -> (ScheduleBook, Route) {
        let mut book = ScheduleBook::new();
        book.add_station("NDLS", "New Delhi", "Delhi");
        book.add_station("CNB", "Kanpur Central", "Kanpur");
        book.add_station("PRYJ", "Prayagraj Junction", "Prayagraj");
        let route = book
            .add_route("Delhi-Kolkata Main Line", &[("NDLS", 0, 0), ("CNB", 10, 440), ("PRYJ", 20, 630)])
            .unwrap();
        book.add_train("12301", "Rajdhani Express", 80, 2).unwrap();
        (book, route)
    }

    fn request(route_id: i64, day: u32) -> ScheduleRunRequest {
        ScheduleRunRequest {
            train_number: "12301".to_string(),
            route_id,
            date: date(day),
            start_time: NaiveTime::from_hms_opt(16, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_schedule_and_resolve() {
        let (mut book, route) = book();
        let run = book.schedule_run(&request(route.id, 14), date(10)).unwrap();

        let resolved = book.resolve_run(run.train_id, date(14)).unwrap();
        assert_eq!(resolved.total_seats(), 2);
        assert_eq!(resolved.route.resolve("CNB").unwrap(), 10);
        assert_eq!(resolved.seats[0].number, "1");

        assert!(matches!(
            book.resolve_run(run.train_id, date(15)),
            Err(CoreError::TrainNotScheduled { .. })
        ));
    }

    #[test]
    fn test_schedule_run_rejections() {
        let (mut book, route) = book();

        let mut unknown = request(route.id, 14);
        unknown.train_number = "99999".to_string();
        assert!(matches!(book.schedule_run(&unknown, date(10)), Err(CoreError::TrainNotFound(_))));

        assert!(matches!(book.schedule_run(&request(404, 14), date(10)), Err(CoreError::RouteNotFound(404))));
        assert!(matches!(book.schedule_run(&request(route.id, 9), date(10)), Err(CoreError::DateInPast(_))));

        book.schedule_run(&request(route.id, 14), date(10)).unwrap();
        assert!(matches!(
            book.schedule_run(&request(route.id, 14), date(10)),
            Err(CoreError::DuplicateSchedule { .. })
        ));
    }

    #[test]
    fn test_duplicate_train_number() {
        let (mut book, _) = book();
        assert!(matches!(book.add_train("12301", "Copy", 60, 1), Err(CoreError::DuplicateTrain(_))));
    }

    #[test]
    fn test_route_with_unknown_station() {
        let (mut book, _) = book();
        let result = book.add_route("Nowhere", &[("NDLS", 0, 0), ("XXX", 10, 5)]);
        assert!(matches!(result, Err(CoreError::InvalidRoute(_))));
    }

    #[test]
    fn test_timetable_arrivals() {
        let (mut book, route) = book();
        let run = book.schedule_run(&request(route.id, 14), date(10)).unwrap();

        let stops = book.timetable(run.train_id, date(14)).unwrap();
        assert_eq!(stops.len(), 3);
        assert_eq!(stops[0].arrival_time, NaiveTime::from_hms_opt(16, 30, 0).unwrap());
        // 440 km at 80 km/h is 5h30m.
        assert_eq!(stops[1].arrival_time, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        assert_eq!(stops[1].name, "Kanpur Central");
    }

    #[test]
    fn test_arrival_wraps_midnight_and_defaults_speed() {
        let start = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        assert_eq!(estimate_arrival(start, 180, 0), NaiveTime::from_hms_opt(1, 0, 0).unwrap());
    }
}
