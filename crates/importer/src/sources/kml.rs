use super::xml::{self, XmlElement};
use super::{haversine_km, parse_timestamp};
use crate::canonical::{ActivityClock, ActivityDataContainer, ContinuousDataBuilder, Sample};
use crate::traits::{FileContentAwareParser, FormatParser, ParseOutcome, ParserOptions};
use crate::{ImporterError, Result};

/// Google Earth KML. Timed `gx:Track` elements give full series; a plain `LineString` only
/// yields the route distance.
pub struct KmlParser {
    options: ParserOptions,
    outcome: ParseOutcome,
}

impl KmlParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            outcome: ParseOutcome::default(),
        }
    }

    fn read(&self, content: &[u8]) -> Result<Vec<ActivityDataContainer>> {
        let root = xml::parse_document(content)?;
        if root.name != "kml" {
            return Err(ImporterError::parse(format!(
                "Unsupported XML schema: expected kml, found <{}>",
                root.name
            )));
        }

        let tracks = root.descendants("Track");
        if !tracks.is_empty() {
            return Ok(vec![self.read_tracks(&tracks)]);
        }

        let lines = root.descendants("LineString");
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let mut container = ActivityDataContainer::new();
        let distance: f64 = lines
            .iter()
            .filter_map(|line| line.text_of(&["coordinates"]))
            .map(|coordinates| path_length(&parse_coordinates(coordinates)))
            .sum();
        if distance > 0.0 {
            container.activity.distance = Some(distance);
        }
        container.finalize(self.options.distance_repair);

        Ok(vec![container])
    }

    fn read_tracks(&self, tracks: &[&XmlElement]) -> ActivityDataContainer {
        let mut container = ActivityDataContainer::new();
        let mut clock = ActivityClock::new(self.options.detect_pauses);
        let mut builder = ContinuousDataBuilder::new();
        let mut distance = 0.0;

        for (index, track) in tracks.iter().enumerate() {
            if index > 0 {
                clock.mark_pause();
            }

            let mut last_position: Option<(f64, f64)> = None;
            let whens = track.children("when");
            let coords = track.children("coord");
            for (when, coord) in whens.zip(coords) {
                let Some(timestamp) = parse_timestamp(&when.text) else {
                    continue;
                };
                let Some((lon, lat, alt)) = parse_point(&coord.text, ' ') else {
                    continue;
                };

                if let Some((last_lat, last_lon)) = last_position {
                    distance += haversine_km(last_lat, last_lon, lat, lon);
                }
                last_position = Some((lat, lon));

                builder.push(Sample {
                    distance: Some(distance),
                    altitude: alt,
                    latitude: Some(lat),
                    longitude: Some(lon),
                    ..Sample::at(clock.tick(timestamp))
                });
            }
        }

        container.metadata.timestamp = clock.start();
        container.activity.elapsed_time = clock.elapsed().filter(|e| *e > 0.0);
        container.continuous = builder.finish();
        container.pauses = clock.into_pauses();
        container.finalize(self.options.distance_repair);
        container
    }
}

/// `lon<sep>lat[<sep>alt]`
fn parse_point(value: &str, separator: char) -> Option<(f64, f64, Option<f64>)> {
    let mut parts = value
        .trim()
        .split(separator)
        .filter(|p| !p.is_empty())
        .map(|p| p.trim().parse::<f64>());

    let lon = parts.next()?.ok()?;
    let lat = parts.next()?.ok()?;
    let alt = parts.next().and_then(|a| a.ok());
    Some((lon, lat, alt))
}

/// LineString tuples are comma separated and split by whitespace.
fn parse_coordinates(value: &str) -> Vec<(f64, f64)> {
    value
        .split_whitespace()
        .filter_map(|tuple| parse_point(tuple, ','))
        .map(|(lon, lat, _)| (lat, lon))
        .collect()
}

fn path_length(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_km(pair[0].0, pair[0].1, pair[1].0, pair[1].1))
        .sum()
}

impl FormatParser for KmlParser {
    fn format_name(&self) -> &'static str {
        "KML"
    }

    fn outcome(&self) -> &ParseOutcome {
        &self.outcome
    }

    fn into_outcome(self: Box<Self>) -> ParseOutcome {
        self.outcome
    }
}

impl FileContentAwareParser for KmlParser {
    fn parse_content(&mut self, content: &[u8]) {
        let result = self.read(content);
        self.outcome.record(result);
    }
}
