use super::xml::{self, XmlElement};
use super::{parse_timestamp, timezone_offset};
use crate::canonical::{ActivityDataContainer, ContinuousDataBuilder, Pause, Sample};
use crate::sport_mapper::{CommonSportMapper, SportMapper};
use crate::traits::{FileContentAwareParser, FormatParser, ParseOutcome, ParserOptions};
use crate::{ImporterError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// SportTracks logbook, both the classic format and the camelCase SportTracks 3 export.
/// A logbook holds many activities; they are returned oldest first.
pub struct LogbookParser {
    options: ParserOptions,
    outcome: ParseOutcome,
}

impl LogbookParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            outcome: ParseOutcome::default(),
        }
    }

    fn read(&self, content: &[u8]) -> Result<Vec<ActivityDataContainer>> {
        let root = xml::parse_document(content)?;
        if root.name != "Logbook" {
            return Err(ImporterError::parse(format!(
                "Unsupported XML schema: expected Logbook, found <{}>",
                root.name
            )));
        }

        let Some(activities) = root.child("Activities") else {
            return Ok(Vec::new());
        };

        let categories = category_names(&root);
        let containers = activities
            .children("Activity")
            .map(|activity| self.read_activity(activity, &categories))
            .collect();

        Ok(oldest_first(containers))
    }

    fn read_activity(
        &self,
        activity: &XmlElement,
        categories: &HashMap<&str, &str>,
    ) -> ActivityDataContainer {
        let mut container = ActivityDataContainer::new();
        let start = activity.attr("StartTime").and_then(parse_timestamp);

        container.metadata.timestamp = start;
        container.metadata.timezone_offset = activity.attr("StartTime").and_then(timezone_offset);
        container.metadata.activity_id = activity.attr("ReferenceId").map(str::to_string);
        container.metadata.sport = activity
            .attr("Category")
            .map(|category| categories.get(category).copied().unwrap_or(category))
            .or_else(|| activity.attr("CategoryName"))
            .or_else(|| activity.text_of(&["Category"]))
            .and_then(|category| CommonSportMapper.map_sport(category));
        container.metadata.creator = Some("SportTracks".to_string());

        let summary = &mut container.activity;
        summary.elapsed_time = activity.attr_parse::<f64>("TotalTime").filter(|t| *t > 0.0);
        summary.distance = activity
            .attr_parse::<f64>("TotalDistance")
            .filter(|d| *d > 0.0)
            .map(|m| m / 1000.0);
        summary.calories = activity.attr_parse::<f64>("TotalCalories").map(|c| c.round() as u32);
        summary.avg_heart_rate = activity
            .attr_parse::<f64>("AverageHeartRate")
            .map(|hr| hr.round() as u32);
        summary.max_heart_rate = activity
            .attr_parse::<f64>("MaximumHeartRate")
            .map(|hr| hr.round() as u32);

        if self.options.detect_pauses {
            if let (Some(start), Some(pauses)) = (start, activity.child("TimerPauses")) {
                container.pauses = absolute_pauses(pauses.children("TimerPause"), start);
            }
        }

        let builder = match activity.child("Track") {
            Some(track) => track_samples(track, start, &container.pauses),
            None => ContinuousDataBuilder::new(),
        };

        let paused: f64 = container.pauses.iter().map(|p| f64::from(p.duration)).sum();
        container.activity.duration = container
            .activity
            .elapsed_time
            .map(|elapsed| (elapsed - paused).max(0.0));
        container.continuous = builder.finish();
        container.finalize(self.options.distance_repair);
        container
    }
}

/// SportTracks 3 stores the category as a reference into a category list.
fn category_names(root: &XmlElement) -> HashMap<&str, &str> {
    root.descendants("Category")
        .into_iter()
        .chain(root.descendants("ActivityCategory"))
        .filter_map(|category| Some((category.attr("ReferenceId")?, category.attr("Name")?)))
        .collect()
}

/// Undated activities go last, stable among themselves.
pub(super) fn oldest_first(mut containers: Vec<ActivityDataContainer>) -> Vec<ActivityDataContainer> {
    containers.sort_by_key(|c| (c.metadata.timestamp.is_none(), c.metadata.timestamp));
    containers
}

/// `pt` elements of a SportTracks track. `tm` counts elapsed seconds from the track start,
/// which may lie after the activity start.
pub(super) fn track_samples(
    track: &XmlElement,
    activity_start: Option<DateTime<Utc>>,
    pauses: &[Pause],
) -> ContinuousDataBuilder {
    let base = match (track.attr("StartTime").and_then(parse_timestamp), activity_start) {
        (Some(track_start), Some(start)) => (track_start - start).num_seconds().max(0) as f64,
        _ => 0.0,
    };

    let mut builder = ContinuousDataBuilder::new();
    let mut last_time = 0;
    for point in track.children("pt") {
        let Some(offset) = point.attr_parse::<f64>("tm") else {
            continue;
        };
        let moving = moving_offset((base + offset).max(0.0) as u32, pauses);
        last_time = last_time.max(moving);

        builder.push(Sample {
            distance: point.attr_parse::<f64>("dist").map(|m| m / 1000.0),
            altitude: point.attr_parse("ele"),
            heart_rate: point.attr_parse::<f64>("hr").map(|hr| hr.round() as u32),
            latitude: point.attr_parse("lat"),
            longitude: point.attr_parse("lon"),
            power: point.attr_parse::<f64>("power").map(|p| p.round() as u32),
            cadence: point.attr_parse::<f64>("cadence").map(|c| c.round() as u32),
            ..Sample::at(last_time)
        });
    }
    builder
}

/// Pauses as moving-time positions, from elements holding an absolute `StartTime`/`EndTime`.
pub(super) fn absolute_pauses<'a>(
    pauses: impl Iterator<Item = &'a XmlElement>,
    start: DateTime<Utc>,
) -> Vec<Pause> {
    let mut result: Vec<Pause> = Vec::new();
    let mut paused_before = 0;
    for pause in pauses {
        let (Some(from), Some(to)) = (
            pause.attr("StartTime").and_then(parse_timestamp),
            pause.attr("EndTime").and_then(parse_timestamp),
        ) else {
            continue;
        };

        let offset = (from - start).num_seconds();
        let duration = (to - from).num_seconds();
        if offset < 0 || duration <= 0 {
            continue;
        }

        result.push(Pause {
            time: (offset as u32).saturating_sub(paused_before),
            duration: duration as u32,
        });
        paused_before += duration as u32;
    }
    result
}

fn moving_offset(elapsed: u32, pauses: &[Pause]) -> u32 {
    let mut moving = elapsed;
    let mut paused = 0;
    for pause in pauses {
        let pause_start = pause.time + paused;
        if elapsed <= pause_start {
            break;
        }
        let inside = (elapsed - pause_start).min(pause.duration);
        moving -= inside;
        paused += pause.duration;
    }
    moving
}

impl FormatParser for LogbookParser {
    fn format_name(&self) -> &'static str {
        "Logbook"
    }

    fn outcome(&self) -> &ParseOutcome {
        &self.outcome
    }

    fn into_outcome(self: Box<Self>) -> ParseOutcome {
        self.outcome
    }
}

impl FileContentAwareParser for LogbookParser {
    fn parse_content(&mut self, content: &[u8]) {
        let result = self.read(content);
        self.outcome.record(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sport_mapper::Sport;
    use chrono::TimeZone;

    const LOGBOOK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Logbook xmlns="urn:uuid:D0EB2ED5-49B6-44e3-B13C-CF15BE7DD7DD">
  <Activities>
    <Activity StartTime="2013-07-05T17:00:00Z" TotalTime="600" TotalDistance="2000" TotalCalories="150" Category="Running">
      <Track StartTime="2013-07-05T17:00:00Z">
        <pt tm="0" lat="49.44" lon="7.76" ele="230" dist="0" hr="110"/>
        <pt tm="300" lat="49.45" lon="7.76" ele="235" dist="1000" hr="140"/>
        <pt tm="600" lat="49.46" lon="7.76" ele="232" dist="2000" hr="150"/>
      </Track>
    </Activity>
    <Activity StartTime="2013-07-04T06:00:00Z" TotalTime="400" TotalDistance="1000" Category="Cycling">
      <TimerPauses>
        <TimerPause StartTime="2013-07-04T06:01:40Z" EndTime="2013-07-04T06:03:20Z"/>
      </TimerPauses>
      <Track StartTime="2013-07-04T06:00:00Z">
        <pt tm="0" dist="0"/>
        <pt tm="100" dist="400"/>
        <pt tm="200" dist="400"/>
        <pt tm="400" dist="1000"/>
      </Track>
    </Activity>
  </Activities>
</Logbook>"#;

    fn parse(content: &str) -> LogbookParser {
        let mut parser = LogbookParser::new(ParserOptions::default());
        parser.parse_content(content.as_bytes());
        parser
    }

    #[test]
    fn test_activities_sorted_by_start() {
        let parser = parse(LOGBOOK);
        assert!(!parser.failed(), "{:?}", parser.errors());
        assert_eq!(parser.activity_count(), 2);

        let first = parser.activity_at(0).unwrap();
        let second = parser.activity_at(1).unwrap();
        assert_eq!(
            first.metadata.timestamp,
            Some(Utc.with_ymd_and_hms(2013, 7, 4, 6, 0, 0).unwrap())
        );
        assert_eq!(
            second.metadata.timestamp,
            Some(Utc.with_ymd_and_hms(2013, 7, 5, 17, 0, 0).unwrap())
        );
        assert_eq!(second.activity.distance, Some(2.0));
        assert_eq!(second.activity.calories, Some(150));
        assert_eq!(second.continuous.heart_rate, Some(vec![110, 140, 150]));
        assert_eq!(second.activity.duration, Some(600.0));
    }

    #[test]
    fn test_timer_pauses_are_removed_from_moving_time() {
        let parser = parse(LOGBOOK);
        let container = parser.activity_at(0).unwrap();

        assert_eq!(container.pauses, vec![Pause { time: 100, duration: 100 }]);
        assert_eq!(container.continuous.time, Some(vec![0, 100, 100, 300]));
        assert_eq!(container.activity.elapsed_time, Some(400.0));
        assert_eq!(container.activity.duration, Some(300.0));
    }

    #[test]
    fn test_moving_offset() {
        let pauses = [
            Pause { time: 10, duration: 5 },
            Pause { time: 20, duration: 10 },
        ];
        assert_eq!(moving_offset(5, &pauses), 5);
        assert_eq!(moving_offset(12, &pauses), 10);
        assert_eq!(moving_offset(17, &pauses), 12);
        assert_eq!(moving_offset(40, &pauses), 25);
    }

    #[test]
    fn test_sporttracks3_attributes_and_category_reference() {
        let content = r#"<?xml version="1.0" encoding="utf-8"?>
<Logbook xmlns="urn:uuid:D0EB2ED5-49B6-44e3-B13C-CF15BE7DD7DD">
  <ActivityCategories>
    <Category referenceId="c-17" name="Cycling"/>
  </ActivityCategories>
  <Activities>
    <Activity referenceId="a-1" startTime="2014-03-01T08:00:00+01:00" totalTime="300" totalDistance="1500" totalCalories="80" category="c-17">
      <Track startTime="2014-03-01T08:00:00+01:00">
        <pt tm="0" dist="0" hr="100"/>
        <pt tm="300" dist="1500" hr="140"/>
      </Track>
    </Activity>
  </Activities>
</Logbook>"#;

        let parser = parse(content);
        assert!(!parser.failed(), "{:?}", parser.errors());
        let container = parser.activity_at(0).unwrap();

        assert_eq!(container.metadata.sport, Some(Sport::Cycling));
        assert_eq!(container.metadata.activity_id.as_deref(), Some("a-1"));
        assert_eq!(container.metadata.timezone_offset, Some(60));
        assert_eq!(
            container.metadata.timestamp,
            Some(Utc.with_ymd_and_hms(2014, 3, 1, 7, 0, 0).unwrap())
        );
        assert_eq!(container.activity.distance, Some(1.5));
        assert_eq!(container.activity.calories, Some(80));
        assert_eq!(container.continuous.time, Some(vec![0, 300]));
        assert_eq!(container.continuous.heart_rate, Some(vec![100, 140]));
    }

    #[test]
    fn test_wrong_root() {
        assert!(parse("<pwx/>").failed());
    }
}
