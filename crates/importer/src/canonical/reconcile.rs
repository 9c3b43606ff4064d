use super::models::ActivityDataContainer;
use crate::ImporterError;
use serde::{Deserialize, Serialize};

/// How a decreasing cumulative distance is repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceRepair {
    /// Hold the last good value until the source catches up again.
    #[default]
    ClampToPrevious,
    /// Ramp linearly from the last good value to the next sample that is not below it.
    Interpolate,
}

impl DistanceRepair {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClampToPrevious => "clamp",
            Self::Interpolate => "interpolate",
        }
    }
}

impl std::str::FromStr for DistanceRepair {
    type Err = ImporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "clamp" | "clamp_to_previous" => Ok(Self::ClampToPrevious),
            "interpolate" => Ok(Self::Interpolate),
            _ => Err(ImporterError::Configuration(format!(
                "Unknown distance repair policy: '{}'. Available: clamp, interpolate",
                s
            ))),
        }
    }
}

impl std::fmt::Display for DistanceRepair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Makes `distance` non-decreasing in place and returns how many samples were changed.
pub fn repair_distance(distance: &mut [f64], policy: DistanceRepair) -> usize {
    let mut repaired = 0;
    let mut i = 1;

    while i < distance.len() {
        let last_good = distance[i - 1];
        if distance[i] >= last_good {
            i += 1;
            continue;
        }

        let recovery = match policy {
            DistanceRepair::ClampToPrevious => None,
            DistanceRepair::Interpolate => (i + 1..distance.len()).find(|&j| distance[j] >= last_good),
        };

        match recovery {
            Some(j) => {
                let steps = (j - i + 1) as f64;
                let delta = distance[j] - last_good;
                for k in i..j {
                    distance[k] = last_good + delta * (k - i + 1) as f64 / steps;
                    repaired += 1;
                }
                i = j;
            }
            None => {
                distance[i] = last_good;
                repaired += 1;
                i += 1;
            }
        }
    }

    repaired
}

/// Pace in seconds per kilometer.
///
/// Samples between two distance changes take the pace of the segment ending at the next change;
/// samples after the last change keep the last pace.
pub fn derive_pace(time: &[u32], distance: &[f64]) -> Vec<u32> {
    let len = time.len().min(distance.len());
    let mut pace = vec![0; len];
    if len == 0 {
        return pace;
    }

    let mut anchor = 0;
    let mut last_pace = 0;
    for i in 1..len {
        let delta_distance = distance[i] - distance[anchor];
        if delta_distance <= 0.0 {
            continue;
        }

        let delta_time = time[i].saturating_sub(time[anchor]) as f64;
        last_pace = (delta_time / delta_distance).round() as u32;
        let from = if anchor == 0 { 0 } else { anchor + 1 };
        for value in &mut pace[from..=i] {
            *value = last_pace;
        }
        anchor = i;
    }

    for value in &mut pace[anchor + 1..] {
        *value = last_pace;
    }

    pace
}

/// Total ascent and descent in meters.
pub fn elevation_totals(altitude: &[f64]) -> (f64, f64) {
    altitude
        .windows(2)
        .fold((0.0, 0.0), |(up, down), pair| {
            let delta = pair[1] - pair[0];
            if delta > 0.0 {
                (up + delta, down)
            } else {
                (up, down - delta)
            }
        })
}

impl ActivityDataContainer {
    /// Applies distance repair, derives pace and fills scalar totals the source left out.
    /// Values set explicitly by the parser are kept.
    pub fn finalize(&mut self, repair: DistanceRepair) {
        let continuous = &mut self.continuous;

        if let Some(distance) = continuous.distance.as_mut() {
            let repaired = repair_distance(distance, repair);
            if repaired > 0 {
                tracing::debug!(repaired, policy = %repair, "Repaired decreasing distance samples");
            }
        }

        if continuous.pace.is_none() {
            if let (Some(time), Some(distance)) = (&continuous.time, &continuous.distance) {
                if distance.last().is_some_and(|d| *d > 0.0) {
                    continuous.pace = Some(derive_pace(time, distance));
                }
            }
        }

        let activity = &mut self.activity;
        let paused: f64 = self.pauses.iter().map(|p| f64::from(p.duration)).sum();

        if activity.duration.is_none() {
            activity.duration = continuous
                .time
                .as_ref()
                .and_then(|t| t.last())
                .map(|t| f64::from(*t));
        }

        if activity.elapsed_time.is_none() {
            activity.elapsed_time = activity.duration.map(|d| d + paused);
        }

        if let (Some(elapsed), Some(duration)) = (activity.elapsed_time, activity.duration) {
            if elapsed < duration {
                activity.elapsed_time = Some(duration);
            }
        }

        if activity.distance.is_none() {
            activity.distance = continuous.distance.as_ref().and_then(|d| d.last().copied());
        }

        if let Some(heart_rate) = &continuous.heart_rate {
            let recorded: Vec<u32> = heart_rate.iter().copied().filter(|hr| *hr > 0).collect();
            if !recorded.is_empty() {
                if activity.avg_heart_rate.is_none() {
                    let sum: u64 = recorded.iter().map(|hr| u64::from(*hr)).sum();
                    activity.avg_heart_rate =
                        Some((sum as f64 / recorded.len() as f64).round() as u32);
                }
                if activity.max_heart_rate.is_none() {
                    activity.max_heart_rate = recorded.iter().max().copied();
                }
            }
        }

        if let Some(altitude) = &continuous.altitude {
            let (up, down) = elevation_totals(altitude);
            activity.elevation_up.get_or_insert(up.round());
            activity.elevation_down.get_or_insert(down.round());
        }
    }
}
