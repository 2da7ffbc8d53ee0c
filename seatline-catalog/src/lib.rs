pub mod pricing;
pub mod inventory;
pub mod schedule;
pub mod seed;

pub use pricing::{Fare, FarePolicy};
pub use inventory::{Availability, InventoryIndex};
pub use schedule::{estimate_arrival, ScheduleBook, ScheduleRepository, ScheduleRunRequest, Station, StopTime, Train, TrainRun};
