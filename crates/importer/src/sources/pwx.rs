use super::xml::{self, XmlElement};
use super::{parse_timestamp, timezone_offset};
use crate::canonical::{ActivityDataContainer, ContinuousDataBuilder, Round, Sample};
use crate::sport_mapper::{CommonSportMapper, SportMapper};
use crate::traits::{FileContentAwareParser, FormatParser, ParseOutcome, ParserOptions};
use crate::{ImporterError, Result};

/// TrainingPeaks PWX. Each `workout` element becomes one activity.
pub struct PwxParser {
    options: ParserOptions,
    outcome: ParseOutcome,
}

impl PwxParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            outcome: ParseOutcome::default(),
        }
    }

    fn read(&self, content: &[u8]) -> Result<Vec<ActivityDataContainer>> {
        let root = xml::parse_document(content)?;
        if root.name != "pwx" {
            return Err(ImporterError::parse(format!(
                "Unsupported XML schema: expected pwx, found <{}>",
                root.name
            )));
        }

        Ok(root
            .children("workout")
            .map(|workout| self.read_workout(workout))
            .collect())
    }

    fn read_workout(&self, workout: &XmlElement) -> ActivityDataContainer {
        let mut container = ActivityDataContainer::new();
        let metadata = &mut container.metadata;

        if let Some(start) = workout.text_of(&["time"]) {
            metadata.timestamp = parse_timestamp(start);
            metadata.timezone_offset = timezone_offset(start);
        }
        metadata.sport = workout
            .text_of(&["sportType"])
            .and_then(|sport| CommonSportMapper.map_sport(sport));

        if let Some(device) = workout.child("device") {
            let make = device.text_of(&["make"]);
            let model = device.text_of(&["model"]);
            metadata.creator = model.or(make).map(str::to_string);
            metadata.creator_details = match (make, model) {
                (Some(make), Some(model)) => Some(format!("{} {}", make, model)),
                (make, model) => model.or(make).map(str::to_string),
            };
        }

        if let Some(summary) = workout.child("summarydata") {
            let activity = &mut container.activity;
            activity.elapsed_time = summary.parse_at(&["duration"]);
            activity.duration = summary
                .parse_at::<f64>(&["durationstopped"])
                .zip(activity.elapsed_time)
                .map(|(stopped, elapsed)| elapsed - stopped);
            activity.distance = summary.parse_at::<f64>(&["dist"]).map(|m| m / 1000.0);
            if let Some(hr) = summary.child("hr") {
                activity.avg_heart_rate = hr.attr_parse::<f64>("avg").map(|v| v.round() as u32);
                activity.max_heart_rate = hr.attr_parse::<f64>("max").map(|v| v.round() as u32);
            }
            if let Some(alt) = summary.child("alt") {
                activity.elevation_up = alt.attr_parse("gain");
                activity.elevation_down = alt.attr_parse("loss");
            }
        }

        container.rounds = workout
            .children("segment")
            .filter_map(|segment| segment.child("summarydata"))
            .map(|summary| Round {
                duration: summary.parse_at(&["duration"]).unwrap_or(0.0),
                distance: summary.parse_at::<f64>(&["dist"]).unwrap_or(0.0) / 1000.0,
            })
            .collect();

        let mut builder = ContinuousDataBuilder::new();
        let mut last_offset = 0;
        for sample in workout.children("sample") {
            let Some(offset) = sample.parse_at::<f64>(&["timeoffset"]) else {
                continue;
            };
            last_offset = last_offset.max(offset.round().max(0.0) as u32);

            builder.push(Sample {
                distance: sample.parse_at::<f64>(&["dist"]).map(|m| m / 1000.0),
                altitude: sample.parse_at(&["alt"]),
                heart_rate: rounded(sample, "hr"),
                latitude: sample.parse_at(&["lat"]),
                longitude: sample.parse_at(&["lon"]),
                power: rounded(sample, "pwr"),
                cadence: rounded(sample, "cad"),
                ..Sample::at(last_offset)
            });
        }

        container.continuous = builder.finish();
        container.finalize(self.options.distance_repair);
        container
    }
}

fn rounded(sample: &XmlElement, name: &str) -> Option<u32> {
    sample
        .parse_at::<f64>(&[name])
        .map(|value| value.round().max(0.0) as u32)
}

impl FormatParser for PwxParser {
    fn format_name(&self) -> &'static str {
        "PWX"
    }

    fn outcome(&self) -> &ParseOutcome {
        &self.outcome
    }

    fn into_outcome(self: Box<Self>) -> ParseOutcome {
        self.outcome
    }
}

impl FileContentAwareParser for PwxParser {
    fn parse_content(&mut self, content: &[u8]) {
        let result = self.read(content);
        self.outcome.record(result);
    }
}
