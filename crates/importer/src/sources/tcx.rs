use super::xml::{self, XmlElement};
use super::{parse_timestamp, timezone_offset};
use crate::canonical::{
    ActivityClock, ActivityDataContainer, ContinuousDataBuilder, Round, Sample,
};
use crate::sport_mapper::{CommonSportMapper, SportMapper};
use crate::traits::{FileContentAwareParser, FormatParser, ParseOutcome, ParserOptions};
use crate::{ImporterError, Result};
use tracing::debug;

/// Garmin Training Center XML. Handles plain activities as well as multisport sessions.
pub struct TcxParser {
    options: ParserOptions,
    outcome: ParseOutcome,
}

impl TcxParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            outcome: ParseOutcome::default(),
        }
    }

    fn read(&self, content: &[u8]) -> Result<Vec<ActivityDataContainer>> {
        let root = xml::parse_document(content)?;
        if root.name != "TrainingCenterDatabase" {
            return Err(ImporterError::parse(format!(
                "Unsupported XML schema: expected TrainingCenterDatabase, found <{}>",
                root.name
            )));
        }

        let author = root.text_of(&["Author", "Name"]);
        let Some(activities) = root.child("Activities") else {
            return Ok(Vec::new());
        };

        let mut nodes = Vec::new();
        for child in &activities.children {
            match child.name.as_str() {
                "Activity" => nodes.push(child),
                "MultiSportSession" => {
                    for part in &child.children {
                        if part.name == "FirstSport" || part.name == "NextSport" {
                            nodes.extend(part.children("Activity"));
                        }
                    }
                }
                _ => {}
            }
        }

        debug!("Found {} TCX activities", nodes.len());
        nodes
            .into_iter()
            .map(|activity| self.read_activity(activity, author))
            .collect()
    }

    fn read_activity(
        &self,
        activity: &XmlElement,
        author: Option<&str>,
    ) -> Result<ActivityDataContainer> {
        let mut container = ActivityDataContainer::new();
        let metadata = &mut container.metadata;

        let creator = activity.child("Creator");
        let creator_name = creator.and_then(|c| c.text_of(&["Name"])).or(author);
        if let Some(name) = creator_name {
            metadata.creator = Some(name.to_string());
            metadata.creator_details = Some(
                match creator.and_then(|c| c.text_of(&["ProductID"])) {
                    Some(product) => format!("{}-{}", name, product),
                    None => name.to_string(),
                },
            );
        }

        metadata.sport = activity
            .attr("Sport")
            .and_then(|sport| CommonSportMapper.map_sport(sport));

        if let Some(id) = activity.text_of(&["Id"]) {
            metadata.activity_id = Some(id.to_string());
            metadata.timestamp = parse_timestamp(id);
            metadata.timezone_offset = timezone_offset(id);
        }

        let mut clock = ActivityClock::new(self.options.detects_pauses_for(creator_name));
        let mut builder = ContinuousDataBuilder::new();
        let mut totals = LapTotals::default();

        for lap in activity.children("Lap") {
            totals.add(lap);
            if container.metadata.timestamp.is_none() {
                container.metadata.timestamp = lap.attr("StartTime").and_then(parse_timestamp);
            }

            for (index, track) in lap.children("Track").enumerate() {
                if index > 0 {
                    clock.mark_pause();
                }
                for point in track.children("Trackpoint") {
                    read_trackpoint(point, &mut clock, &mut builder);
                }
            }
        }

        if container.metadata.timestamp.is_none() {
            container.metadata.timestamp = clock.start();
        }

        let activity_data = &mut container.activity;
        if totals.time > 0.0 {
            activity_data.duration = Some(totals.time);
        }
        if totals.distance > 0.0 {
            activity_data.distance = Some(totals.distance / 1000.0);
        }
        if totals.calories > 0 {
            activity_data.calories = Some(totals.calories);
        }
        activity_data.elapsed_time = clock.elapsed().filter(|e| *e > 0.0);
        activity_data.avg_heart_rate = totals.avg_heart_rate();
        activity_data.max_heart_rate = totals.max_heart_rate;

        container.rounds = totals.rounds;
        container.continuous = builder.finish();
        container.pauses = clock.into_pauses();
        container.finalize(self.options.distance_repair);

        Ok(container)
    }
}

fn read_trackpoint(
    point: &XmlElement,
    clock: &mut ActivityClock,
    builder: &mut ContinuousDataBuilder,
) {
    let Some(timestamp) = point.text_of(&["Time"]).and_then(parse_timestamp) else {
        return;
    };

    // A point carrying nothing but its time marks the start or end of a pause.
    if point.children.iter().all(|c| c.name == "Time") {
        clock.mark_pause();
        return;
    }

    let mut sample = Sample::at(clock.tick(timestamp));
    sample.distance = point
        .parse_at::<f64>(&["DistanceMeters"])
        .map(|meters| meters / 1000.0);
    sample.altitude = point.parse_at(&["AltitudeMeters"]);
    sample.heart_rate = point
        .parse_at::<f64>(&["HeartRateBpm", "Value"])
        .map(|hr| hr.round() as u32);
    sample.latitude = point.parse_at(&["Position", "LatitudeDegrees"]);
    sample.longitude = point.parse_at(&["Position", "LongitudeDegrees"]);
    sample.cadence = point
        .parse_at(&["Cadence"])
        .or_else(|| point.parse_at(&["Extensions", "TPX", "RunCadence"]));
    sample.power = point
        .parse_at::<f64>(&["Extensions", "TPX", "Watts"])
        .map(|watts| watts.round() as u32);

    builder.push(sample);
}

#[derive(Default)]
struct LapTotals {
    time: f64,
    distance: f64,
    calories: u32,
    weighted_heart_rate: f64,
    heart_rate_time: f64,
    max_heart_rate: Option<u32>,
    rounds: Vec<Round>,
}

impl LapTotals {
    fn add(&mut self, lap: &XmlElement) {
        let time = lap.parse_at::<f64>(&["TotalTimeSeconds"]).unwrap_or(0.0);
        let distance = lap.parse_at::<f64>(&["DistanceMeters"]).unwrap_or(0.0);

        self.time += time;
        self.distance += distance;
        self.calories += lap.parse_at::<u32>(&["Calories"]).unwrap_or(0);

        if let Some(avg) = lap.parse_at::<f64>(&["AverageHeartRateBpm", "Value"]) {
            self.weighted_heart_rate += avg * time;
            self.heart_rate_time += time;
        }
        if let Some(max) = lap.parse_at::<u32>(&["MaximumHeartRateBpm", "Value"]) {
            self.max_heart_rate = Some(self.max_heart_rate.map_or(max, |m| m.max(max)));
        }

        if time > 0.0 || distance > 0.0 {
            self.rounds.push(Round {
                duration: time,
                distance: distance / 1000.0,
            });
        }
    }

    fn avg_heart_rate(&self) -> Option<u32> {
        (self.heart_rate_time > 0.0)
            .then(|| (self.weighted_heart_rate / self.heart_rate_time).round() as u32)
    }
}

impl FormatParser for TcxParser {
    fn format_name(&self) -> &'static str {
        "TCX"
    }

    fn outcome(&self) -> &ParseOutcome {
        &self.outcome
    }

    fn into_outcome(self: Box<Self>) -> ParseOutcome {
        self.outcome
    }
}

impl FileContentAwareParser for TcxParser {
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

    fn parse(content: &str) -> TcxParser {
        let mut parser = TcxParser::new(ParserOptions {
            spurious_pause_creators: vec!["runtastic".to_string()],
            ..ParserOptions::default()
        });
        parser.parse_content(content.as_bytes());
        parser
    }

    fn trackpoint(time: &str, meters: f64, hr: u32) -> String {
        format!(
            "<Trackpoint><Time>{}</Time>\
             <Position><LatitudeDegrees>49.44</LatitudeDegrees><LongitudeDegrees>7.76</LongitudeDegrees></Position>\
             <AltitudeMeters>230.5</AltitudeMeters><DistanceMeters>{}</DistanceMeters>\
             <HeartRateBpm><Value>{}</Value></HeartRateBpm></Trackpoint>",
            time, meters, hr
        )
    }

    fn document(activities: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2"
    xmlns:ns3="http://www.garmin.com/xmlschemas/ActivityExtension/v2">
  <Activities>{}</Activities>
</TrainingCenterDatabase>"#,
            activities
        )
    }

    fn activity(sport: &str, start: &str, laps: &str, creator: &str) -> String {
        format!(
            "<Activity Sport=\"{}\"><Id>{}</Id>{}<Creator><Name>{}</Name><ProductID>1018</ProductID></Creator></Activity>",
            sport, start, laps, creator
        )
    }

    fn lap(start: &str, seconds: f64, meters: f64, tracks: &[Vec<String>]) -> String {
        let tracks: String = tracks
            .iter()
            .map(|points| format!("<Track>{}</Track>", points.concat()))
            .collect();
        format!(
            "<Lap StartTime=\"{}\"><TotalTimeSeconds>{}</TotalTimeSeconds><DistanceMeters>{}</DistanceMeters>\
             <Calories>120</Calories>{}</Lap>",
            start, seconds, meters, tracks
        )
    }

    #[test]
    fn test_empty_string() {
        let parser = parse("");
        assert!(parser.failed());
        assert_eq!(parser.activity_count(), 0);
        assert!(!parser.errors().is_empty());
    }

    #[test]
    fn test_not_garmin() {
        let parser = parse("<any><xml><file></file></xml></any>");
        assert!(parser.failed());
        assert_eq!(parser.activity_count(), 0);
        assert!(parser.errors()[0].contains("TrainingCenterDatabase"));
    }

    #[test]
    fn test_malformed_xml() {
        let parser = parse("<TrainingCenterDatabase><Activities><Activity></Activities>");
        assert!(parser.failed());
        assert_eq!(parser.activity_count(), 0);
    }

    #[test]
    fn test_without_activities_is_empty_but_not_failed() {
        let parser = parse(&document(""));
        assert!(!parser.failed());
        assert_eq!(parser.activity_count(), 0);
    }

    #[test]
    fn test_general_file() {
        let points = vec![
            trackpoint("2013-04-18T16:00:00Z", 0.0, 120),
            trackpoint("2013-04-18T16:00:10Z", 30.0, 130),
            trackpoint("2013-04-18T16:00:20Z", 62.0, 140),
        ];
        let content = document(&activity(
            "Running",
            "2013-04-18T16:00:00Z",
            &lap("2013-04-18T16:00:00Z", 20.0, 62.0, &[points]),
            "Forerunner 310XT",
        ));

        let parser = parse(&content);
        assert!(!parser.failed(), "{:?}", parser.errors());
        assert!(!parser.has_multiple_activities());

        let container = parser.activity_at(0).unwrap();
        assert_eq!(container.metadata.sport, Some(Sport::Running));
        assert_eq!(
            container.metadata.timestamp,
            Some(Utc.with_ymd_and_hms(2013, 4, 18, 16, 0, 0).unwrap())
        );
        assert_eq!(
            container.metadata.creator_details.as_deref(),
            Some("Forerunner 310XT-1018")
        );
        assert_eq!(
            container.metadata.activity_id.as_deref(),
            Some("2013-04-18T16:00:00Z")
        );
        assert_eq!(container.activity.duration, Some(20.0));
        assert_eq!(container.activity.elapsed_time, Some(20.0));
        assert_eq!(container.activity.distance, Some(0.062));
        assert_eq!(container.activity.calories, Some(120));
        assert_eq!(container.activity.avg_heart_rate, Some(130));
        assert_eq!(container.activity.max_heart_rate, Some(140));

        let continuous = &container.continuous;
        assert_eq!(continuous.time, Some(vec![0, 10, 20]));
        assert_eq!(continuous.distance, Some(vec![0.0, 0.03, 0.062]));
        assert!(continuous.altitude.is_some());
        assert!(continuous.latitude.is_some());
        assert!(continuous.longitude.is_some());
        assert!(continuous.pace.is_some());
        assert!(continuous.power.is_none());
        for (name, len) in continuous.series_lengths() {
            assert_eq!(len, 3, "series {} is misaligned", name);
        }
    }

    #[test]
    fn test_multisport() {
        let first = activity(
            "Biking",
            "2013-04-18T16:14:21Z",
            &lap(
                "2013-04-18T16:14:21Z",
                494.0,
                2355.0,
                &[vec![
                    trackpoint("2013-04-18T16:14:21Z", 0.0, 110),
                    trackpoint("2013-04-18T16:22:35Z", 2355.0, 120),
                ]],
            ),
            "Forerunner 910XT",
        );
        let second = activity(
            "Running",
            "2013-04-18T16:24:12Z",
            &lap(
                "2013-04-18T16:24:12Z",
                3571.0,
                11460.0,
                &[vec![
                    trackpoint("2013-04-18T16:24:12Z", 0.0, 140),
                    trackpoint("2013-04-18T17:23:43Z", 11460.0, 150),
                ]],
            ),
            "Forerunner 910XT",
        );
        let third = activity(
            "Biking",
            "2013-04-18T17:35:46Z",
            &lap("2013-04-18T17:35:46Z", 420.0, 2355.0, &[]),
            "Forerunner 910XT",
        );
        let content = document(&format!(
            "<MultiSportSession><Id>2013-04-18T16:14:21Z</Id>\
             <FirstSport>{}</FirstSport><NextSport>{}</NextSport><NextSport>{}</NextSport>\
             </MultiSportSession>",
            first, second, third
        ));

        let parser = parse(&content);
        assert!(!parser.failed(), "{:?}", parser.errors());
        assert!(parser.has_multiple_activities());
        assert_eq!(parser.activity_count(), 3);

        let starts: Vec<_> = (0..3)
            .map(|i| parser.activity_at(i).unwrap().metadata.timestamp.unwrap())
            .collect();
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            starts[0],
            Utc.with_ymd_and_hms(2013, 4, 18, 16, 14, 21).unwrap()
        );

        let expected = [(494.0, 2.355), (3571.0, 11.46), (420.0, 2.355)];
        for (i, (duration, distance)) in expected.iter().enumerate() {
            let container = parser.activity_at(i).unwrap();
            assert_eq!(container.activity.duration, Some(*duration));
            assert!((container.activity.distance.unwrap() - distance).abs() < 0.001);
        }
        assert_eq!(
            parser.activity_at(1).unwrap().metadata.sport,
            Some(Sport::Running)
        );
    }

    #[test]
    fn test_pauses_between_tracks_and_empty_points() {
        let tracks = vec![
            vec![
                trackpoint("2013-04-18T16:00:00Z", 0.0, 120),
                trackpoint("2013-04-18T16:00:10Z", 30.0, 125),
            ],
            vec![
                trackpoint("2013-04-18T16:01:10Z", 35.0, 120),
                trackpoint("2013-04-18T16:01:20Z", 65.0, 130),
                "<Trackpoint><Time>2013-04-18T16:01:21Z</Time></Trackpoint>".to_string(),
                trackpoint("2013-04-18T16:02:20Z", 70.0, 110),
            ],
        ];
        let content = document(&activity(
            "Running",
            "2013-04-18T16:00:00Z",
            &lap("2013-04-18T16:00:00Z", 20.0, 70.0, &tracks),
            "Forerunner 310XT",
        ));

        let parser = parse(&content);
        let container = parser.activity_at(0).unwrap();
        assert_eq!(container.continuous.time, Some(vec![0, 10, 10, 20, 20]));
        assert_eq!(container.pauses.len(), 2);
        assert_eq!(container.activity.elapsed_time, Some(140.0));
        assert!(container.activity.elapsed_time >= container.activity.duration);
    }

    #[test]
    fn test_spurious_pause_creator_keeps_gaps() {
        let points = vec![
            trackpoint("2013-04-18T16:00:00Z", 0.0, 120),
            "<Trackpoint><Time>2013-04-18T16:00:05Z</Time></Trackpoint>".to_string(),
            trackpoint("2013-04-18T16:00:20Z", 52.0, 125),
        ];
        let content = document(&activity(
            "Running",
            "2013-04-18T16:00:00Z",
            &lap("2013-04-18T16:00:00Z", 0.0, 0.0, &[points]),
            "runtastic - makes sports funtastic",
        ));

        let parser = parse(&content);
        let container = parser.activity_at(0).unwrap();
        assert_eq!(container.continuous.time, Some(vec![0, 20]));
        assert!(container.pauses.is_empty());
        assert_eq!(container.activity.duration, Some(20.0));
    }

    #[test]
    fn test_missing_and_decreasing_distances_stay_monotonic() {
        let points = vec![
            trackpoint("2013-04-18T16:00:00Z", 0.0, 120),
            "<Trackpoint><Time>2013-04-18T16:00:05Z</Time><HeartRateBpm><Value>121</Value></HeartRateBpm></Trackpoint>"
                .to_string(),
            trackpoint("2013-04-18T16:00:10Z", 40.0, 122),
            trackpoint("2013-04-18T16:00:15Z", 35.0, 123),
            trackpoint("2013-04-18T16:00:20Z", 80.0, 124),
        ];
        let content = document(&activity(
            "Running",
            "2013-04-18T16:00:00Z",
            &lap("2013-04-18T16:00:00Z", 20.0, 80.0, &[points]),
            "Forerunner 310XT",
        ));

        let parser = parse(&content);
        let distance = parser
            .activity_at(0)
            .unwrap()
            .continuous
            .distance
            .clone()
            .unwrap();
        assert_eq!(distance.len(), 5);
        for i in 1..distance.len() {
            assert!(distance[i] >= distance[i - 1], "Distance is decreasing");
        }
    }

    #[test]
    fn test_watt_extension_with_and_without_namespace() {
        let watts = [0, 10, 20, 30, 41];
        let point = |i: usize, ext: &str| {
            format!(
                "<Trackpoint><Time>2013-04-18T16:00:{:02}Z</Time><DistanceMeters>{}</DistanceMeters>\
                 <Extensions>{}</Extensions></Trackpoint>",
                i,
                i * 5,
                ext
            )
        };
        let namespaced: Vec<String> = watts
            .iter()
            .enumerate()
            .map(|(i, w)| point(i, &format!("<ns3:TPX><ns3:Watts>{}</ns3:Watts></ns3:TPX>", w)))
            .collect();
        let plain: Vec<String> = watts
            .iter()
            .enumerate()
            .map(|(i, w)| point(i, &format!("<TPX><Watts>{}</Watts></TPX>", w)))
            .collect();

        let power_of = |points: Vec<String>| {
            let content = document(&activity(
                "Biking",
                "2013-04-18T16:00:00Z",
                &lap("2013-04-18T16:00:00Z", 4.0, 20.0, &[points]),
                "Edge 500",
            ));
            parse(&content).activity_at(0).unwrap().continuous.power.clone()
        };

        let expected = Some(watts.to_vec());
        assert_eq!(power_of(namespaced), expected);
        assert_eq!(power_of(plain), expected);
    }

    #[test]
    fn test_swim_file_without_trackpoint_times() {
        let content = document(&activity(
            "Other",
            "2012-04-13T11:51:59Z",
            "<Lap StartTime=\"2012-04-13T11:51:59Z\"><TotalTimeSeconds>2100</TotalTimeSeconds>\
             <DistanceMeters>1500</DistanceMeters><Track><Trackpoint><DistanceMeters>25</DistanceMeters></Trackpoint></Track></Lap>",
            "Forerunner 310XT",
        ));

        let parser = parse(&content);
        assert!(!parser.failed());
        let container = parser.activity_at(0).unwrap();
        assert_eq!(container.activity.duration, Some(2100.0));
        assert_eq!(container.activity.elapsed_time, Some(2100.0));
        assert_eq!(
            container.metadata.activity_id.as_deref(),
            Some("2012-04-13T11:51:59Z")
        );
        assert!(container.continuous.is_empty());
    }
}
