use serde::{Deserialize, Serialize};
use seatline_core::SegmentInterval;

/// Price attached to a ticket at booking time, in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fare {
    pub amount_paise: i64,
    pub currency: String,
}

impl Fare {
    /// Major-unit amount for display (e.g. 500.0 for 50000 paise).
    pub fn major_units(&self) -> f64 {
        self.amount_paise as f64 / 100.0
    }
}

/// Flat fare: every journey costs the same regardless of distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarePolicy {
    pub fare_paise: i64,
    pub currency: String,
}

impl Default for FarePolicy {
    fn default() -> Self {
        Self {
            fare_paise: 50_000,
            currency: "INR".to_string(),
        }
    }
}

impl FarePolicy {
    pub fn new(fare_paise: i64, currency: impl Into<String>) -> Self {
        Self {
            fare_paise,
            currency: currency.into(),
        }
    }

    pub fn quote(&self, _interval: &SegmentInterval) -> Fare {
        Fare {
            amount_paise: self.fare_paise,
            currency: self.currency.clone(),
        }
    }
}
