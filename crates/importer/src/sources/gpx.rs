use super::xml::{self, XmlElement};
use super::{haversine_km, parse_timestamp};
use crate::canonical::{ActivityClock, ActivityDataContainer, ContinuousDataBuilder, Sample};
use crate::sport_mapper::{CommonSportMapper, SportMapper};
use crate::traits::{FileContentAwareParser, FormatParser, ParseOutcome, ParserOptions};
use crate::{ImporterError, Result};

/// Extension element names per channel. Garmin writes `gpxtpx:hr`/`gpxtpx:cad` inside a
/// `TrackPointExtension`, other tools put plain `hr`/`power` directly below `extensions`.
const HEART_RATE_NAMES: &[&str] = &["hr", "heartrate"];
const CADENCE_NAMES: &[&str] = &["cad", "cadence", "RunCadence"];
const POWER_NAMES: &[&str] = &["power", "PowerInWatts", "Watts"];

/// GPS Exchange Format. All tracks of a file form one activity; a new segment or track
/// starts after a pause.
pub struct GpxParser {
    options: ParserOptions,
    outcome: ParseOutcome,
}

impl GpxParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            outcome: ParseOutcome::default(),
        }
    }

    fn read(&self, content: &[u8]) -> Result<Vec<ActivityDataContainer>> {
        let root = xml::parse_document(content)?;
        if root.name != "gpx" {
            return Err(ImporterError::parse(format!(
                "Unsupported XML schema: expected gpx, found <{}>",
                root.name
            )));
        }

        let tracks: Vec<&XmlElement> = root.children("trk").collect();
        if tracks
            .iter()
            .all(|t| t.children("trkseg").all(|s| s.child("trkpt").is_none()))
        {
            return Ok(Vec::new());
        }

        let mut container = ActivityDataContainer::new();
        let creator = root.attr("creator");
        if let Some(creator) = creator {
            container.metadata.creator = Some(creator.to_string());
            container.metadata.creator_details = Some(creator.to_string());
        }

        container.metadata.sport = tracks
            .iter()
            .find_map(|t| t.text_of(&["type"]))
            .and_then(|kind| CommonSportMapper.map_sport(kind));

        let mut clock = ActivityClock::new(self.options.detects_pauses_for(creator));
        let mut builder = ContinuousDataBuilder::new();
        let mut distance = 0.0;
        let mut last_position: Option<(f64, f64)> = None;
        let mut first_segment = true;

        for track in &tracks {
            for segment in track.children("trkseg") {
                if !first_segment {
                    clock.mark_pause();
                    // distance does not accumulate across a pause
                    last_position = None;
                }
                first_segment = false;

                for point in segment.children("trkpt") {
                    let Some(timestamp) = point.text_of(&["time"]).and_then(parse_timestamp)
                    else {
                        continue;
                    };
                    let (Some(lat), Some(lon)) =
                        (point.attr_parse::<f64>("lat"), point.attr_parse::<f64>("lon"))
                    else {
                        continue;
                    };

                    if let Some((last_lat, last_lon)) = last_position {
                        distance += haversine_km(last_lat, last_lon, lat, lon);
                    }
                    last_position = Some((lat, lon));

                    builder.push(Sample {
                        distance: Some(distance),
                        altitude: point.parse_at(&["ele"]),
                        latitude: Some(lat),
                        longitude: Some(lon),
                        heart_rate: extension_value(point, HEART_RATE_NAMES),
                        cadence: extension_value(point, CADENCE_NAMES),
                        power: extension_value(point, POWER_NAMES),
                        ..Sample::at(clock.tick(timestamp))
                    });
                }
            }
        }

        container.metadata.timestamp = clock.start();
        container.activity.elapsed_time = clock.elapsed().filter(|e| *e > 0.0);
        container.continuous = builder.finish();
        container.pauses = clock.into_pauses();
        container.finalize(self.options.distance_repair);

        Ok(vec![container])
    }
}

/// First positive value below the point's `extensions` under any of `names`, with or without
/// a namespace prefix.
fn extension_value(point: &XmlElement, names: &[&str]) -> Option<u32> {
    let extensions = point.child("extensions")?;
    names
        .iter()
        .find_map(|name| {
            extensions
                .descendants(name)
                .iter()
                .find_map(|e| e.text.trim().parse::<f64>().ok())
        })
        .filter(|value| *value > 0.0)
        .map(|value| value.round() as u32)
}

impl FormatParser for GpxParser {
    fn format_name(&self) -> &'static str {
        "GPX"
    }

    fn outcome(&self) -> &ParseOutcome {
        &self.outcome
    }

    fn into_outcome(self: Box<Self>) -> ParseOutcome {
        self.outcome
    }
}

impl FileContentAwareParser for GpxParser {
    fn parse_content(&mut self, content: &[u8]) {
        let result = self.read(content);
        self.outcome.record(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sport_mapper::Sport;
    use chrono::{TimeZone, Utc};

    fn document(segments: &[&[(&str, f64, f64, f64)]]) -> String {
        let segments: String = segments
            .iter()
            .map(|points| {
                let points: String = points
                    .iter()
                    .map(|(time, lat, lon, ele)| {
                        format!(
                            "<trkpt lat=\"{}\" lon=\"{}\"><ele>{}</ele><time>{}</time></trkpt>",
                            lat, lon, ele, time
                        )
                    })
                    .collect();
                format!("<trkseg>{}</trkseg>", points)
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Forerunner 245" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><name>Morning run</name><type>running</type>{}</trk>
</gpx>"#,
            segments
        )
    }

    fn parse(content: &str) -> GpxParser {
        let mut parser = GpxParser::new(ParserOptions::default());
        parser.parse_content(content.as_bytes());
        parser
    }

    #[test]
    fn test_empty_and_invalid_files_fail() {
        assert!(parse("").failed());
        assert!(parse("<gpx version=\"1.1\"><trk>").failed());
    }

    #[test]
    fn test_single_segment() {
        let content = document(&[&[
            ("2020-05-01T06:00:00Z", 49.0, 7.0, 200.0),
            ("2020-05-01T06:00:30Z", 49.001, 7.0, 204.0),
            ("2020-05-01T06:01:00Z", 49.002, 7.0, 202.0),
        ]]);

        let parser = parse(&content);
        assert!(!parser.failed(), "{:?}", parser.errors());
        assert_eq!(parser.activity_count(), 1);

        let container = parser.activity_at(0).unwrap();
        assert_eq!(
            container.metadata.timestamp,
            Some(Utc.with_ymd_and_hms(2020, 5, 1, 6, 0, 0).unwrap())
        );
        assert_eq!(container.metadata.sport, Some(Sport::Running));
        assert_eq!(container.metadata.creator.as_deref(), Some("Forerunner 245"));
        assert_eq!(container.continuous.time, Some(vec![0, 30, 60]));
        assert_eq!(container.activity.duration, Some(60.0));
        assert_eq!(container.activity.elevation_up, Some(4.0));
        assert_eq!(container.activity.elevation_down, Some(2.0));

        let distance = container.activity.distance.unwrap();
        assert!((distance - 0.2224).abs() < 0.001, "distance was {}", distance);
        assert!(container.continuous.pace.is_some());
        assert!(container.continuous.heart_rate.is_none());
    }

    #[test]
    fn test_segment_break_is_a_pause() {
        let content = document(&[
            &[
                ("2020-05-01T06:00:00Z", 49.0, 7.0, 200.0),
                ("2020-05-01T06:00:30Z", 49.001, 7.0, 200.0),
            ],
            &[
                ("2020-05-01T06:05:30Z", 49.01, 7.0, 200.0),
                ("2020-05-01T06:06:00Z", 49.011, 7.0, 200.0),
            ],
        ]);

        let container = parse(&content).activity_at(0).cloned().unwrap();
        assert_eq!(container.continuous.time, Some(vec![0, 30, 30, 60]));
        assert_eq!(container.pauses.len(), 1);
        assert_eq!(container.pauses[0].duration, 300);
        assert_eq!(container.activity.duration, Some(60.0));
        assert_eq!(container.activity.elapsed_time, Some(360.0));

        // the jump between segments is not counted
        let distance = container.activity.distance.unwrap();
        assert!(distance < 0.25, "distance was {}", distance);
    }

    #[test]
    fn test_extensions_with_and_without_namespace() {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Garmin Connect" xmlns="http://www.topografix.com/GPX/1/1"
     xmlns:gpxtpx="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
  <trk><type>cycling</type><trkseg>
    <trkpt lat="49.0" lon="7.0"><time>2020-05-01T06:00:00Z</time>
      <extensions><gpxtpx:TrackPointExtension><gpxtpx:hr>120</gpxtpx:hr><gpxtpx:cad>80</gpxtpx:cad></gpxtpx:TrackPointExtension><power>210</power></extensions>
    </trkpt>
    <trkpt lat="49.001" lon="7.0"><time>2020-05-01T06:00:10Z</time>
      <extensions><TrackPointExtension><hr>130</hr><cad>84</cad></TrackPointExtension><power>230</power></extensions>
    </trkpt>
    <trkpt lat="49.002" lon="7.0"><time>2020-05-01T06:00:20Z</time></trkpt>
  </trkseg></trk>
</gpx>"#;

        let parser = parse(content);
        assert!(!parser.failed(), "{:?}", parser.errors());
        let container = parser.activity_at(0).unwrap();

        assert_eq!(container.continuous.heart_rate, Some(vec![120, 130, 0]));
        assert_eq!(container.continuous.cadence, Some(vec![80, 84, 0]));
        assert_eq!(container.continuous.power, Some(vec![210, 230, 0]));
        assert_eq!(container.activity.avg_heart_rate, Some(125));
        assert_eq!(container.activity.max_heart_rate, Some(130));
        assert_eq!(container.metadata.sport, Some(Sport::Cycling));
    }

    #[test]
    fn test_wrong_root_fails() {
        assert!(parse("<TrainingCenterDatabase/>").failed());
    }

    #[test]
    fn test_waypoints_only_yields_no_activity() {
        let content = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="49.0" lon="7.0"><name>Start</name></wpt>
</gpx>"#;

        let parser = parse(content);
        assert!(!parser.failed());
        assert_eq!(parser.activity_count(), 0);
    }
}
