use super::models::{ContinuousData, Pause};
use chrono::{DateTime, Utc};

/// One recorded point before alignment. Every channel except time may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    pub time: u32,
    /// Cumulative kilometers.
    pub distance: Option<f64>,
    pub altitude: Option<f64>,
    pub heart_rate: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub power: Option<u32>,
    pub cadence: Option<u32>,
}

impl Sample {
    pub fn at(time: u32) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Collects samples and produces index-aligned series.
///
/// A channel seen at least once becomes a present series with one value per sample; gaps are
/// carried forward for distance, altitude and position (leading gaps take the first known value)
/// and zero-filled for heart rate, power and cadence.
#[derive(Debug, Default)]
pub struct ContinuousDataBuilder {
    time: Vec<u32>,
    distance: Vec<Option<f64>>,
    altitude: Vec<Option<f64>>,
    heart_rate: Vec<Option<u32>>,
    latitude: Vec<Option<f64>>,
    longitude: Vec<Option<f64>>,
    power: Vec<Option<u32>>,
    cadence: Vec<Option<u32>>,
}

impl ContinuousDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.time.push(sample.time);
        self.distance.push(sample.distance);
        self.altitude.push(sample.altitude);
        self.heart_rate.push(sample.heart_rate);
        self.latitude.push(sample.latitude);
        self.longitude.push(sample.longitude);
        self.power.push(sample.power);
        self.cadence.push(sample.cadence);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn last_distance(&self) -> Option<f64> {
        self.distance.iter().rev().find_map(|d| *d)
    }

    pub fn finish(self) -> ContinuousData {
        if self.time.is_empty() {
            return ContinuousData::default();
        }

        ContinuousData {
            time: Some(self.time),
            distance: carry_forward(self.distance),
            altitude: carry_forward(self.altitude),
            heart_rate: zero_filled(self.heart_rate),
            latitude: carry_forward(self.latitude),
            longitude: carry_forward(self.longitude),
            pace: None,
            power: zero_filled(self.power),
            cadence: zero_filled(self.cadence),
        }
    }
}

fn carry_forward<T: Copy>(values: Vec<Option<T>>) -> Option<Vec<T>> {
    let first = values.iter().find_map(|v| *v)?;
    let mut last = first;

    Some(
        values
            .into_iter()
            .map(|v| {
                if let Some(v) = v {
                    last = v;
                }
                last
            })
            .collect(),
    )
}

fn zero_filled<T: Copy + Default>(values: Vec<Option<T>>) -> Option<Vec<T>> {
    if values.iter().all(Option::is_none) {
        return None;
    }

    Some(values.into_iter().map(Option::unwrap_or_default).collect())
}

/// Turns absolute timestamps into moving-time offsets.
///
/// After [`ActivityClock::mark_pause`] the gap up to the next tick is booked as a pause
/// instead of moving time, unless pause detection is disabled for the source.
#[derive(Debug)]
pub struct ActivityClock {
    detect_pauses: bool,
    start: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
    last_offset: u32,
    paused_seconds: i64,
    pause_pending: bool,
    pauses: Vec<Pause>,
}

impl ActivityClock {
    pub fn new(detect_pauses: bool) -> Self {
        Self {
            detect_pauses,
            start: None,
            last: None,
            last_offset: 0,
            paused_seconds: 0,
            pause_pending: false,
            pauses: Vec::new(),
        }
    }

    pub fn mark_pause(&mut self) {
        if self.detect_pauses && self.start.is_some() {
            self.pause_pending = true;
        }
    }

    /// Registers a timestamp and returns its moving-time offset.
    pub fn tick(&mut self, timestamp: DateTime<Utc>) -> u32 {
        let Some(start) = self.start else {
            self.start = Some(timestamp);
            self.last = Some(timestamp);
            return 0;
        };

        let last = self.last.unwrap_or(start);
        if timestamp < last {
            // out-of-order point: keep the previous offset
            return self.last_offset;
        }

        if self.pause_pending {
            let gap = (timestamp - last).num_seconds();
            if gap > 0 {
                self.paused_seconds += gap;
                self.pauses.push(Pause {
                    time: self.last_offset,
                    duration: gap as u32,
                });
            }
            self.pause_pending = false;
        }

        self.last = Some(timestamp);
        let offset = ((timestamp - start).num_seconds() - self.paused_seconds).max(0) as u32;
        self.last_offset = offset;
        offset
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// Seconds between the first and last registered timestamp.
    pub fn elapsed(&self) -> Option<f64> {
        match (self.start, self.last) {
            (Some(start), Some(last)) => Some((last - start).num_seconds() as f64),
            _ => None,
        }
    }

    pub fn into_pauses(self) -> Vec<Pause> {
        self.pauses
    }
}
