use super::logbook::{absolute_pauses, oldest_first, track_samples};
use super::xml::{self, XmlElement};
use super::{parse_timestamp, timezone_offset};
use crate::canonical::{ActivityDataContainer, ContinuousDataBuilder, Round};
use crate::sport_mapper::{CommonSportMapper, SportMapper};
use crate::traits::{FileContentAwareParser, FormatParser, ParseOutcome, ParserOptions};
use crate::{ImporterError, Result};
use chrono::{DateTime, Utc};

/// SportTracks `.fitlog` workbook. Totals live in child elements rather than attributes, and
/// laps are listed next to the track.
pub struct FitlogParser {
    options: ParserOptions,
    outcome: ParseOutcome,
}

impl FitlogParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            outcome: ParseOutcome::default(),
        }
    }

    fn read(&self, content: &[u8]) -> Result<Vec<ActivityDataContainer>> {
        let root = xml::parse_document(content)?;
        if root.name != "FitnessWorkbook" {
            return Err(ImporterError::parse(format!(
                "Unsupported XML schema: expected FitnessWorkbook, found <{}>",
                root.name
            )));
        }

        let containers = root
            .descendants("Activity")
            .into_iter()
            .map(|activity| self.read_activity(activity))
            .collect();

        Ok(oldest_first(containers))
    }

    fn read_activity(&self, activity: &XmlElement) -> ActivityDataContainer {
        let mut container = ActivityDataContainer::new();
        let start = activity.attr("StartTime").and_then(parse_timestamp);

        container.metadata.timestamp = start;
        container.metadata.timezone_offset = activity.attr("StartTime").and_then(timezone_offset);
        container.metadata.activity_id = activity.attr("Id").map(str::to_string);
        container.metadata.sport = activity
            .child("Category")
            .and_then(|category| category.attr("Name"))
            .and_then(|name| CommonSportMapper.map_sport(name));
        container.metadata.creator = Some(
            activity
                .child("Metadata")
                .and_then(|metadata| metadata.attr("Source"))
                .unwrap_or("SportTracks")
                .to_string(),
        );

        let summary = &mut container.activity;
        summary.elapsed_time = activity
            .child("Duration")
            .and_then(|d| d.attr_parse::<f64>("TotalSeconds"))
            .filter(|t| *t > 0.0);
        summary.distance = activity
            .child("Distance")
            .and_then(|d| d.attr_parse::<f64>("TotalMeters"))
            .filter(|d| *d > 0.0)
            .map(|m| m / 1000.0);
        summary.calories = activity
            .child("Calories")
            .and_then(|c| c.attr_parse::<f64>("TotalCal"))
            .map(|c| c.round() as u32);

        if self.options.detect_pauses {
            if let (Some(start), Some(clock)) = (start, activity.child("TrackClock")) {
                container.pauses = absolute_pauses(clock.children("Pause"), start);
            }
        }

        let track = activity.child("Track");
        let builder = match track {
            Some(track) => track_samples(track, start, &container.pauses),
            None => ContinuousDataBuilder::new(),
        };

        if let (Some(start), Some(laps)) = (start, activity.child("Laps")) {
            let distances = track.map(|t| track_distances(t, start)).unwrap_or_default();
            container.rounds = laps
                .children("Lap")
                .filter_map(|lap| read_lap(lap, start, &distances))
                .collect();
        }

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

/// Lap distance comes from the lap itself, or from the track when the lap omits it.
fn read_lap(lap: &XmlElement, start: DateTime<Utc>, distances: &[(f64, f64)]) -> Option<Round> {
    let duration = lap.attr_parse::<f64>("DurationSeconds")?;
    let distance = match lap.child("Distance").and_then(|d| d.attr_parse::<f64>("TotalMeters")) {
        Some(meters) => meters / 1000.0,
        None => {
            let lap_start = lap.attr("StartTime").and_then(parse_timestamp)?;
            let from = (lap_start - start).num_seconds() as f64;
            (distance_at(distances, from + duration) - distance_at(distances, from)).max(0.0)
        }
    };

    Some(Round { duration, distance })
}

/// `(elapsed seconds since activity start, cumulative km)` for every track point with a distance.
fn track_distances(track: &XmlElement, start: DateTime<Utc>) -> Vec<(f64, f64)> {
    let base = track
        .attr("StartTime")
        .and_then(parse_timestamp)
        .map_or(0.0, |track_start| (track_start - start).num_seconds().max(0) as f64);

    track
        .children("pt")
        .filter_map(|point| {
            Some((
                base + point.attr_parse::<f64>("tm")?,
                point.attr_parse::<f64>("dist")? / 1000.0,
            ))
        })
        .collect()
}

fn distance_at(distances: &[(f64, f64)], elapsed: f64) -> f64 {
    distances
        .iter()
        .take_while(|(time, _)| *time <= elapsed)
        .last()
        .map_or(0.0, |(_, distance)| *distance)
}

impl FormatParser for FitlogParser {
    fn format_name(&self) -> &'static str {
        "Fitlog"
    }

    fn outcome(&self) -> &ParseOutcome {
        &self.outcome
    }

    fn into_outcome(self: Box<Self>) -> ParseOutcome {
        self.outcome
    }
}

impl FileContentAwareParser for FitlogParser {
    fn parse_content(&mut self, content: &[u8]) {
        let result = self.read(content);
        self.outcome.record(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::Pause;
    use crate::sport_mapper::Sport;
    use chrono::TimeZone;

    const FITLOG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<FitnessWorkbook xmlns="http://www.zonefivesoftware.com/xmlschemas/FitnessLogbook/v2">
  <AthleteLog>
    <Athlete Id="athlete-1" Name="Runner"/>
    <Activity StartTime="2012-06-10T07:00:00Z" Id="b9f1a2c4">
      <Metadata Source="Garmin Forerunner 305"/>
      <Duration TotalSeconds="500"/>
      <Distance TotalMeters="1200"/>
      <Calories TotalCal="95"/>
      <Category Id="c-1" Name="Running"/>
      <Laps>
        <Lap StartTime="2012-06-10T07:00:00Z" DurationSeconds="200">
          <Distance TotalMeters="600"/>
        </Lap>
        <Lap StartTime="2012-06-10T07:05:00Z" DurationSeconds="200"/>
      </Laps>
      <TrackClock>
        <Pause StartTime="2012-06-10T07:03:20Z" EndTime="2012-06-10T07:05:00Z"/>
      </TrackClock>
      <Track StartTime="2012-06-10T07:00:00Z">
        <pt tm="0" lat="49.44" lon="7.76" ele="230" dist="0" hr="110" cadence="80"/>
        <pt tm="200" lat="49.45" lon="7.76" ele="235" dist="600" hr="140" cadence="84"/>
        <pt tm="300" lat="49.45" lon="7.76" ele="235" dist="600" hr="120" cadence="0"/>
        <pt tm="500" lat="49.46" lon="7.76" ele="232" dist="1200" hr="150" cadence="86"/>
      </Track>
    </Activity>
    <Activity StartTime="2012-06-09T18:30:00+02:00" Id="a0c3">
      <Duration TotalSeconds="60"/>
      <Category Name="Cycling"/>
    </Activity>
  </AthleteLog>
</FitnessWorkbook>"#;

    fn parse(content: &str) -> FitlogParser {
        let mut parser = FitlogParser::new(ParserOptions::default());
        parser.parse_content(content.as_bytes());
        parser
    }

    #[test]
    fn test_activities_sorted_by_start() {
        let parser = parse(FITLOG);
        assert!(!parser.failed(), "{:?}", parser.errors());
        assert_eq!(parser.activity_count(), 2);

        let first = parser.activity_at(0).unwrap();
        assert_eq!(first.metadata.activity_id.as_deref(), Some("a0c3"));
        assert_eq!(first.metadata.sport, Some(Sport::Cycling));
        assert_eq!(first.metadata.timezone_offset, Some(120));
        assert_eq!(first.metadata.creator.as_deref(), Some("SportTracks"));
        assert_eq!(first.activity.elapsed_time, Some(60.0));
    }

    #[test]
    fn test_totals_track_and_pauses() {
        let parser = parse(FITLOG);
        let container = parser.activity_at(1).unwrap();

        assert_eq!(
            container.metadata.timestamp,
            Some(Utc.with_ymd_and_hms(2012, 6, 10, 7, 0, 0).unwrap())
        );
        assert_eq!(container.metadata.sport, Some(Sport::Running));
        assert_eq!(container.metadata.creator.as_deref(), Some("Garmin Forerunner 305"));
        assert_eq!(container.activity.distance, Some(1.2));
        assert_eq!(container.activity.calories, Some(95));
        assert_eq!(container.activity.elapsed_time, Some(500.0));
        assert_eq!(container.activity.duration, Some(400.0));

        assert_eq!(container.pauses, vec![Pause { time: 200, duration: 100 }]);
        assert_eq!(container.continuous.time, Some(vec![0, 200, 200, 400]));
        assert_eq!(container.continuous.heart_rate, Some(vec![110, 140, 120, 150]));
        assert_eq!(container.continuous.cadence, Some(vec![80, 84, 0, 86]));
    }

    #[test]
    fn test_lap_distance_falls_back_to_track() {
        let parser = parse(FITLOG);
        let container = parser.activity_at(1).unwrap();

        assert_eq!(
            container.rounds,
            vec![
                Round { duration: 200.0, distance: 0.6 },
                Round { duration: 200.0, distance: 0.6 },
            ]
        );
    }

    #[test]
    fn test_distance_at() {
        let distances = [(0.0, 0.0), (100.0, 0.4), (200.0, 0.9)];
        assert_eq!(distance_at(&distances, 50.0), 0.0);
        assert_eq!(distance_at(&distances, 100.0), 0.4);
        assert_eq!(distance_at(&distances, 500.0), 0.9);
    }

    #[test]
    fn test_wrong_root() {
        let parser = parse("<Logbook><Activities/></Logbook>");
        assert!(parser.failed());
        assert!(parser.errors()[0].contains("FitnessWorkbook"));
    }
}
