use crate::sport_mapper::Sport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One parsed activity, identical in shape whatever format it came from.
///
/// Parsers build it incrementally and call [`ActivityDataContainer::finalize`] once before
/// handing it over; afterwards it is treated as immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityDataContainer {
    pub metadata: Metadata,
    pub activity: ActivityData,
    pub continuous: ContinuousData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rounds: Vec<Round>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pauses: Vec<Pause>,
}

impl ActivityDataContainer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Offset of the local start time from UTC, in minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone_offset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sport: Option<Sport>,
}

/// Scalar totals. Durations are seconds, distance is kilometers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityData {
    /// Moving time, paused spans excluded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// First to last timestamp, pauses included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_heart_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation_up: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation_down: Option<f64>,
}

/// Index-aligned time series. `None` means the source did not record that channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuousData {
    /// Seconds since start with paused spans removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<Vec<u32>>,
    /// Cumulative kilometers, non-decreasing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Vec<f64>>,
    /// Seconds per kilometer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pace: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cadence: Option<Vec<u32>>,
}

impl ContinuousData {
    pub fn len(&self) -> usize {
        self.time.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lengths of every present series, keyed by series name.
    pub fn series_lengths(&self) -> Vec<(&'static str, usize)> {
        let mut lengths = Vec::new();
        let mut push = |name, len: Option<usize>| {
            if let Some(len) = len {
                lengths.push((name, len));
            }
        };

        push("time", self.time.as_ref().map(Vec::len));
        push("distance", self.distance.as_ref().map(Vec::len));
        push("altitude", self.altitude.as_ref().map(Vec::len));
        push("heart_rate", self.heart_rate.as_ref().map(Vec::len));
        push("latitude", self.latitude.as_ref().map(Vec::len));
        push("longitude", self.longitude.as_ref().map(Vec::len));
        push("pace", self.pace.as_ref().map(Vec::len));
        push("power", self.power.as_ref().map(Vec::len));
        push("cadence", self.cadence.as_ref().map(Vec::len));

        lengths
    }
}

/// A lap as declared by the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub duration: f64,
    pub distance: f64,
}

/// A paused span: `time` is the moving-time offset at which it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pause {
    pub time: u32,
    pub duration: u32,
}
