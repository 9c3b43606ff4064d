use super::models::ActivityDataContainer;
use crate::{ImporterError, Result};
use tracing::warn;

pub struct ActivityValidator;

impl ActivityValidator {
    pub fn validate(container: &ActivityDataContainer) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        let continuous = &container.continuous;
        let activity = &container.activity;

        let expected_len = continuous.len();
        for (name, len) in continuous.series_lengths() {
            if len != expected_len {
                report.errors.push(format!(
                    "Series '{}' has {} samples, time series has {}",
                    name, len, expected_len
                ));
            }
        }

        if let Some(distance) = &continuous.distance {
            if let Some(index) = distance.windows(2).position(|pair| pair[1] < pair[0]) {
                report.errors.push(format!(
                    "Distance decreases at sample {}: {} -> {}",
                    index + 1,
                    distance[index],
                    distance[index + 1]
                ));
            }
        }

        if let Some(time) = &continuous.time {
            if time.windows(2).any(|pair| pair[1] < pair[0]) {
                report
                    .errors
                    .push("Time series is not in chronological order".to_string());
            }
        }

        if let (Some(elapsed), Some(duration)) = (activity.elapsed_time, activity.duration) {
            if elapsed < duration {
                report.errors.push(format!(
                    "Elapsed time {}s is shorter than moving time {}s",
                    elapsed, duration
                ));
            }
        }

        if activity.duration.is_some_and(|d| d < 0.0) {
            report.errors.push("Duration must not be negative".to_string());
        }
        if activity.distance.is_some_and(|d| d < 0.0) {
            report.errors.push("Distance must not be negative".to_string());
        }

        if container.metadata.timestamp.is_none() {
            report
                .warnings
                .push("Activity has no start timestamp".to_string());
        }
        if container.metadata.sport.is_none() {
            report
                .warnings
                .push("Sport could not be detected".to_string());
        }
        if activity.duration.is_none_or(|d| d == 0.0) {
            report
                .warnings
                .push("Activity has no recorded duration".to_string());
        }

        if !report.errors.is_empty() {
            Err(ImporterError::Validation(format!(
                "Validation failed with {} error(s): {}",
                report.errors.len(),
                report.errors.join("; ")
            )))
        } else {
            Ok(report)
        }
    }
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
    }
}
