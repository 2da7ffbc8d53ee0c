use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Rank of a station along a route. Only relative order matters; gaps are allowed.
pub type RoutePosition = i32;

/// A half-open span `[from, to)` of route positions.
///
/// The constructor is the only way in, so every value satisfies `from < to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "RawInterval")]
pub struct SegmentInterval {
    from: RoutePosition,
    to: RoutePosition,
}

#[derive(Serialize, Deserialize)]
struct RawInterval {
    from: RoutePosition,
    to: RoutePosition,
}

impl TryFrom<RawInterval> for SegmentInterval {
    type Error = CoreError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        SegmentInterval::new(raw.from, raw.to)
    }
}

impl From<SegmentInterval> for RawInterval {
    fn from(interval: SegmentInterval) -> Self {
        RawInterval { from: interval.from, to: interval.to }
    }
}

impl SegmentInterval {
    pub fn new(from: RoutePosition, to: RoutePosition) -> CoreResult<Self> {
        if from >= to {
            return Err(CoreError::InvalidDirection { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> RoutePosition {
        self.from
    }

    pub fn to(&self) -> RoutePosition {
        self.to
    }

    /// `[a,b)` and `[c,d)` collide iff `a < d && b > c`. Touching endpoints do not.
    pub fn overlaps(&self, other: &SegmentInterval) -> bool {
        self.from < other.to && self.to > other.from
    }
}

impl std::fmt::Display for SegmentInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    pub station_id: i64,
    pub code: String,
    pub position: RoutePosition,
    pub distance_from_start_km: i32,
}

/// An ordered sequence of stops. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub id: i64,
    pub name: String,
    pub distance_km: i32,
    stops: Vec<RouteStop>,
}

impl Route {
    /// Build a route, sorting stops by position.
    ///
    /// Duplicate positions or a station listed twice make the route unusable for
    /// interval arithmetic and are rejected.
    pub fn new(id: i64, name: impl Into<String>, distance_km: i32, mut stops: Vec<RouteStop>) -> CoreResult<Self> {
        stops.sort_by_key(|s| s.position);

        if stops
            .windows(2)
            .any(|pair| pair[0].position >= pair[1].position)
        {
            return Err(CoreError::InvalidRoute(format!(
                "route {} has stops sharing a position",
                id
            )));
        }

        let duplicate = {
            let mut seen = HashSet::new();
            stops
                .iter()
                .find(|s| !seen.insert(s.code.as_str()))
                .map(|s| s.code.clone())
        };
        if let Some(code) = duplicate {
            return Err(CoreError::InvalidRoute(format!(
                "station {} appears twice on route {}",
                code, id
            )));
        }

        Ok(Self {
            id,
            name: name.into(),
            distance_km,
            stops,
        })
    }

    pub fn stops(&self) -> &[RouteStop] {
        &self.stops
    }

    pub fn stop(&self, station_code: &str) -> Option<&RouteStop> {
        self.stops.iter().find(|s| s.code == station_code)
    }

    pub fn resolve(&self, station_code: &str) -> CoreResult<RoutePosition> {
        self.stop(station_code)
            .map(|s| s.position)
            .ok_or_else(|| CoreError::NotOnRoute(station_code.to_string()))
    }

    pub fn to_interval(&self, source: RoutePosition, dest: RoutePosition) -> CoreResult<SegmentInterval> {
        SegmentInterval::new(source, dest)
    }

    /// Resolve both station codes, then check direction.
    pub fn segment(&self, source_code: &str, dest_code: &str) -> CoreResult<SegmentInterval> {
        let source = self.resolve(source_code)?;
        let dest = self.resolve(dest_code)?;
        self.to_interval(source, dest)
    }
}
