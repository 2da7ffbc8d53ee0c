//! Demo corridor: Delhi to Kolkata and Delhi to Mumbai, three trains, two months of runs.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use seatline_core::CoreResult;
use tracing::info;

use crate::schedule::{ScheduleBook, ScheduleRunRequest};

const SEED_DAYS: i64 = 60;

pub fn demo_corridor(book: &mut ScheduleBook, today: NaiveDate) -> CoreResult<()> {
    for (code, name, city) in [
        ("NDLS", "New Delhi", "Delhi"),
        ("CNB", "Kanpur Central", "Kanpur"),
        ("PRYJ", "Prayagraj Junction", "Prayagraj"),
        ("PNBE", "Patna Junction", "Patna"),
        ("HWH", "Howrah Junction", "Kolkata"),
        ("BCT", "Mumbai Central", "Mumbai"),
        ("JP", "Jaipur", "Jaipur"),
    ] {
        book.add_station(code, name, city);
    }

    let east = book.add_route(
        "Delhi-Kolkata Main Line",
        &[("NDLS", 0, 0), ("CNB", 10, 440), ("PRYJ", 20, 630), ("PNBE", 30, 1000), ("HWH", 40, 1450)],
    )?;
    let west = book.add_route(
        "Delhi-Mumbai Capital Line",
        &[("NDLS", 0, 0), ("JP", 10, 300), ("BCT", 20, 1380)],
    )?;

    let rajdhani = book.add_train("12301", "Rajdhani Express", 80, 100)?;
    let tejas = book.add_train("12951", "Tejas Express", 90, 50)?;
    let garib_rath = book.add_train("12201", "Garib Rath", 60, 120)?;

    let mut scheduled = 0;
    for offset in 0..SEED_DAYS {
        let date = today + Duration::days(offset);
        let weekday = date.weekday();

        let mut plan = Vec::new();
        if matches!(weekday, Weekday::Mon | Weekday::Wed | Weekday::Fri) {
            plan.push((&rajdhani.number, east.id, hm(16, 30)));
        }
        if weekday != Weekday::Sun {
            plan.push((&tejas.number, west.id, hm(17, 0)));
        }
        if matches!(weekday, Weekday::Tue | Weekday::Thu) {
            plan.push((&garib_rath.number, east.id, hm(10, 0)));
        }

        for (train_number, route_id, start_time) in plan {
            book.schedule_run(
                &ScheduleRunRequest {
                    train_number: train_number.clone(),
                    route_id,
                    date,
                    start_time,
                },
                today,
            )?;
            scheduled += 1;
        }
    }

    info!(runs = scheduled, days = SEED_DAYS, "Demo corridor seeded");
    Ok(())
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
