use super::xml::{self, XmlElement};
use crate::canonical::{ActivityDataContainer, ContinuousDataBuilder, Pause, Round, Sample};
use crate::sport_mapper::{CommonSportMapper, SportMapper};
use crate::traits::{FileContentAwareParser, FormatParser, ParseOutcome, ParserOptions};
use crate::{ImporterError, Result};
use chrono::{DateTime, Utc};

/// Sigma Data Center log. Entry times are already moving time, in hundredths of a second.
pub struct SlfParser {
    options: ParserOptions,
    outcome: ParseOutcome,
}

impl SlfParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            outcome: ParseOutcome::default(),
        }
    }

    fn read(&self, content: &[u8]) -> Result<Vec<ActivityDataContainer>> {
        let root = xml::parse_document(content)?;
        if root.name != "Activity" || root.child("GeneralInformation").is_none() {
            return Err(ImporterError::parse(format!(
                "Unsupported XML schema: expected Sigma Activity, found <{}>",
                root.name
            )));
        }

        let mut container = ActivityDataContainer::new();
        self.read_general_information(&root, &mut container);

        let mut builder = ContinuousDataBuilder::new();
        if let Some(entries) = root.child("Entries") {
            let mut last_time = 0;
            for entry in entries.children("Entry") {
                let Some(time) = entry.attr_parse::<f64>("trainingTimeAbsolute") else {
                    continue;
                };
                last_time = last_time.max((time / 100.0).round().max(0.0) as u32);

                builder.push(Sample {
                    distance: entry
                        .attr_parse::<f64>("distanceAbsolute")
                        .map(|m| m / 1000.0),
                    altitude: entry.attr_parse::<f64>("altitude").map(|mm| mm / 1000.0),
                    heart_rate: positive(entry, "heartrate"),
                    latitude: coordinate(entry, "latitude"),
                    longitude: coordinate(entry, "longitude"),
                    power: positive(entry, "power"),
                    cadence: positive(entry, "cadence"),
                    ..Sample::at(last_time)
                });
            }
        }

        if let Some(markers) = root.child("Markers") {
            for marker in markers.children("Marker") {
                let time = hundredths(marker, "timeAbsolute").unwrap_or(0.0);
                match marker.attr("type") {
                    Some("l") => container.rounds.push(Round {
                        duration: hundredths(marker, "time").unwrap_or(0.0),
                        distance: marker.attr_parse::<f64>("distance").unwrap_or(0.0) / 1000.0,
                    }),
                    Some("p") if self.options.detect_pauses => {
                        if let Some(duration) = hundredths(marker, "duration") {
                            container.pauses.push(Pause {
                                time: time.round() as u32,
                                duration: duration.round() as u32,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        container.continuous = builder.finish();
        container.finalize(self.options.distance_repair);

        Ok(vec![container])
    }

    fn read_general_information(&self, root: &XmlElement, container: &mut ActivityDataContainer) {
        let Some(info) = root.child("GeneralInformation") else {
            return;
        };

        if let Some(start) = info.text_of(&["startDate"]) {
            if let Some(parsed) = parse_sigma_date(start) {
                container.metadata.timestamp = Some(parsed.with_timezone(&Utc));
                container.metadata.timezone_offset = Some(parsed.offset().local_minus_utc() / 60);
            }
        }

        container.metadata.sport = info
            .text_of(&["sport"])
            .or_else(|| root.child("Computer").and_then(|c| c.attr("activityType")))
            .and_then(|sport| CommonSportMapper.map_sport(sport));

        if let Some(computer) = root.child("Computer") {
            if let Some(unit) = computer.attr("unit") {
                container.metadata.creator = Some(unit.to_string());
                container.metadata.creator_details = Some(match computer.attr("serial") {
                    Some(serial) => format!("{} ({})", unit, serial),
                    None => unit.to_string(),
                });
            }
        }

        let activity = &mut container.activity;
        activity.duration = info
            .parse_at::<f64>(&["trainingTime"])
            .map(|t| t / 100.0)
            .filter(|t| *t > 0.0);
        activity.distance = info
            .parse_at::<f64>(&["distance"])
            .map(|m| m / 1000.0)
            .filter(|d| *d > 0.0);
        activity.calories = info.parse_at(&["calories"]);
        activity.avg_heart_rate = info.parse_at(&["averageHeartrate"]).filter(|hr| *hr > 0);
        activity.max_heart_rate = info.parse_at(&["maximumHeartrate"]).filter(|hr| *hr > 0);
        activity.elevation_up = info
            .parse_at::<f64>(&["altitudeDifferencesUphill"])
            .map(|mm| mm / 1000.0);
        activity.elevation_down = info
            .parse_at::<f64>(&["altitudeDifferencesDownhill"])
            .map(|mm| mm / 1000.0);
    }
}

/// Sigma writes dates like `Thu Jul 4 08:23:12 GMT+0200 2013`.
fn parse_sigma_date(value: &str) -> Option<DateTime<chrono::FixedOffset>> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    DateTime::parse_from_str(&normalized, "%a %b %d %H:%M:%S GMT%z %Y").ok()
}

fn hundredths(element: &XmlElement, name: &str) -> Option<f64> {
    element.attr_parse::<f64>(name).map(|v| v / 100.0)
}

fn positive(element: &XmlElement, name: &str) -> Option<u32> {
    element
        .attr_parse::<f64>(name)
        .filter(|v| *v > 0.0)
        .map(|v| v.round() as u32)
}

/// Devices without a fix write 0 for both coordinates.
fn coordinate(element: &XmlElement, name: &str) -> Option<f64> {
    element.attr_parse::<f64>(name).filter(|v| *v != 0.0)
}

impl FormatParser for SlfParser {
    fn format_name(&self) -> &'static str {
        "SLF"
    }

    fn outcome(&self) -> &ParseOutcome {
        &self.outcome
    }

    fn into_outcome(self: Box<Self>) -> ParseOutcome {
        self.outcome
    }
}

impl FileContentAwareParser for SlfParser {
    fn parse_content(&mut self, content: &[u8]) {
        let result = self.read(content);
        self.outcome.record(result);
    }
}
