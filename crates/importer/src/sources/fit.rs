use crate::canonical::{
    ActivityClock, ActivityDataContainer, ContinuousDataBuilder, Round, Sample,
};
use crate::sport_mapper::{CommonSportMapper, SportMapper};
use crate::traits::{FileNameAwareParser, FormatParser, ParseOutcome, ParserOptions};
use crate::{ImporterError, Result};
use chrono::{DateTime, Utc};
use fitparser::profile::MesgNum;
use fitparser::{FitDataRecord, Value};
use std::fs::File;
use std::path::Path;
use tracing::debug;

const SEMICIRCLES_TO_DEGREES: f64 = 180.0 / 2_147_483_648.0;

/// Garmin FIT. Binary, so the parser opens the file itself. Every session becomes one activity.
pub struct FitParser {
    options: ParserOptions,
    outcome: ParseOutcome,
}

impl FitParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            outcome: ParseOutcome::default(),
        }
    }

    fn read(&self, path: &Path) -> Result<Vec<ActivityDataContainer>> {
        let mut file = File::open(path)?;
        let records = fitparser::from_reader(&mut file)
            .map_err(|e| ImporterError::parse(format!("Invalid FIT file: {}", e)))?;

        let messages: Vec<FitMessage> = records
            .iter()
            .filter_map(FitMessage::from_record)
            .collect();
        debug!(
            "Decoded {} FIT records, {} relevant messages",
            records.len(),
            messages.len()
        );

        Ok(build_activities(&messages, &self.options))
    }
}

/// The parts of a FIT file the importer cares about, decoupled from the decoder.
#[derive(Debug, Clone, PartialEq)]
enum FitMessage {
    FileId(FitFileId),
    Record(FitPoint),
    TimerStop(DateTime<Utc>),
    Lap(FitLap),
    Session(FitSession),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FitFileId {
    manufacturer: Option<String>,
    product: Option<String>,
    serial_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FitPoint {
    timestamp: Option<DateTime<Utc>>,
    /// meters
    distance: Option<f64>,
    altitude: Option<f64>,
    heart_rate: Option<u32>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    power: Option<u32>,
    cadence: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FitLap {
    start_time: Option<DateTime<Utc>>,
    timer_time: Option<f64>,
    distance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FitSession {
    start_time: Option<DateTime<Utc>>,
    sport: Option<String>,
    timer_time: Option<f64>,
    elapsed_time: Option<f64>,
    distance: Option<f64>,
    calories: Option<u32>,
    avg_heart_rate: Option<u32>,
    max_heart_rate: Option<u32>,
    ascent: Option<f64>,
    descent: Option<f64>,
}

impl FitSession {
    /// `next_start` is exclusive, so a point on the boundary of two back-to-back sessions
    /// belongs to the later one only.
    fn contains(&self, timestamp: DateTime<Utc>, next_start: Option<DateTime<Utc>>) -> bool {
        if next_start.is_some_and(|next| timestamp >= next) {
            return false;
        }
        let Some(start) = self.start_time else {
            return true;
        };
        let end = self
            .elapsed_time
            .or(self.timer_time)
            .map(|seconds| start + chrono::Duration::milliseconds((seconds * 1000.0) as i64));

        timestamp >= start && end.is_none_or(|end| timestamp <= end)
    }
}

impl FitMessage {
    fn from_record(record: &FitDataRecord) -> Option<Self> {
        let fields: Vec<(&str, &Value)> = record
            .fields()
            .iter()
            .map(|field| (field.name(), field.value()))
            .collect();
        let get = |name: &str| fields.iter().find(|(n, _)| *n == name).map(|(_, v)| *v);
        let number = |name: &str| get(name).and_then(fit_value_to_f64);
        let count = |name: &str| number(name).map(|v| v.round().max(0.0) as u32);
        let text = |name: &str| get(name).and_then(fit_value_to_string);
        let time = |name: &str| get(name).and_then(fit_value_to_timestamp);

        match record.kind() {
            MesgNum::FileId => Some(Self::FileId(FitFileId {
                manufacturer: text("manufacturer"),
                product: text("garmin_product").or_else(|| text("product")),
                serial_number: text("serial_number"),
            })),
            MesgNum::Record => Some(Self::Record(FitPoint {
                timestamp: time("timestamp"),
                distance: number("distance"),
                altitude: number("enhanced_altitude").or_else(|| number("altitude")),
                heart_rate: count("heart_rate"),
                latitude: number("position_lat").map(|sc| sc * SEMICIRCLES_TO_DEGREES),
                longitude: number("position_long").map(|sc| sc * SEMICIRCLES_TO_DEGREES),
                power: count("power"),
                cadence: count("cadence"),
            })),
            MesgNum::Event => {
                let is_timer = text("event").as_deref() == Some("timer");
                let is_stop = text("event_type").is_some_and(|kind| kind.starts_with("stop"));
                match (is_timer && is_stop, time("timestamp")) {
                    (true, Some(timestamp)) => Some(Self::TimerStop(timestamp)),
                    _ => None,
                }
            }
            MesgNum::Lap => Some(Self::Lap(FitLap {
                start_time: time("start_time"),
                timer_time: number("total_timer_time"),
                distance: number("total_distance"),
            })),
            MesgNum::Session => Some(Self::Session(FitSession {
                start_time: time("start_time"),
                sport: text("sport"),
                timer_time: number("total_timer_time"),
                elapsed_time: number("total_elapsed_time"),
                distance: number("total_distance"),
                calories: count("total_calories"),
                avg_heart_rate: count("avg_heart_rate"),
                max_heart_rate: count("max_heart_rate"),
                ascent: number("total_ascent"),
                descent: number("total_descent"),
            })),
            _ => None,
        }
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Record(point) => point.timestamp,
            Self::TimerStop(timestamp) => Some(*timestamp),
            Self::Lap(lap) => lap.start_time,
            _ => None,
        }
    }
}

fn build_activities(
    messages: &[FitMessage],
    options: &ParserOptions,
) -> Vec<ActivityDataContainer> {
    let file_id = messages.iter().find_map(|m| match m {
        FitMessage::FileId(id) => Some(id),
        _ => None,
    });

    let mut sessions: Vec<&FitSession> = messages
        .iter()
        .filter_map(|m| match m {
            FitMessage::Session(session) => Some(session),
            _ => None,
        })
        .collect();
    sessions.sort_by_key(|s| s.start_time);

    let has_records = messages.iter().any(|m| matches!(m, FitMessage::Record(_)));
    if sessions.is_empty() {
        if !has_records {
            return Vec::new();
        }
        let fallback = FitSession::default();
        return vec![build_container(&fallback, messages, file_id, options)];
    }

    let next_starts = sessions
        .iter()
        .skip(1)
        .map(|s| s.start_time)
        .chain(std::iter::once(None));

    sessions
        .iter()
        .zip(next_starts)
        .map(|(session, next_start)| {
            let own: Vec<FitMessage> = messages
                .iter()
                .filter(|m| m.timestamp().is_some_and(|ts| session.contains(ts, next_start)))
                .cloned()
                .collect();
            build_container(session, &own, file_id, options)
        })
        .collect()
}

fn build_container(
    session: &FitSession,
    messages: &[FitMessage],
    file_id: Option<&FitFileId>,
    options: &ParserOptions,
) -> ActivityDataContainer {
    let mut container = ActivityDataContainer::new();

    let creator = file_id.and_then(|id| id.product.clone().or_else(|| id.manufacturer.clone()));
    if let Some(id) = file_id {
        let details: Vec<&str> = [&id.manufacturer, &id.product, &id.serial_number]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect();
        if !details.is_empty() {
            container.metadata.creator_details = Some(details.join(" "));
        }
    }

    let mut clock = ActivityClock::new(options.detects_pauses_for(creator.as_deref()));
    let mut builder = ContinuousDataBuilder::new();

    for message in messages {
        match message {
            FitMessage::Record(point) => {
                let Some(timestamp) = point.timestamp else {
                    continue;
                };
                builder.push(Sample {
                    distance: point.distance.map(|m| m / 1000.0),
                    altitude: point.altitude,
                    heart_rate: point.heart_rate,
                    latitude: point.latitude,
                    longitude: point.longitude,
                    power: point.power,
                    cadence: point.cadence,
                    ..Sample::at(clock.tick(timestamp))
                });
            }
            FitMessage::TimerStop(_) => clock.mark_pause(),
            FitMessage::Lap(lap) => {
                if lap.timer_time.is_some() || lap.distance.is_some() {
                    container.rounds.push(Round {
                        duration: lap.timer_time.unwrap_or(0.0),
                        distance: lap.distance.unwrap_or(0.0) / 1000.0,
                    });
                }
            }
            FitMessage::FileId(_) | FitMessage::Session(_) => {}
        }
    }

    let metadata = &mut container.metadata;
    metadata.creator = creator;
    metadata.timestamp = session.start_time.or(clock.start());
    metadata.sport = session
        .sport
        .as_deref()
        .and_then(|sport| CommonSportMapper.map_sport(sport));

    let activity = &mut container.activity;
    activity.duration = session.timer_time;
    activity.elapsed_time = session
        .elapsed_time
        .or_else(|| clock.elapsed().filter(|e| *e > 0.0));
    activity.distance = session.distance.map(|m| m / 1000.0);
    activity.calories = session.calories;
    activity.avg_heart_rate = session.avg_heart_rate.filter(|hr| *hr > 0);
    activity.max_heart_rate = session.max_heart_rate.filter(|hr| *hr > 0);
    activity.elevation_up = session.ascent;
    activity.elevation_down = session.descent;

    container.continuous = builder.finish();
    container.pauses = clock.into_pauses();
    container.finalize(options.distance_repair);
    container
}

fn fit_value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float32(v) => Some(f64::from(*v)),
        Value::Float64(v) => Some(*v),
        Value::SInt8(v) => Some(f64::from(*v)),
        Value::UInt8(v) | Value::UInt8z(v) | Value::Byte(v) | Value::Enum(v) => Some(f64::from(*v)),
        Value::SInt16(v) => Some(f64::from(*v)),
        Value::UInt16(v) | Value::UInt16z(v) => Some(f64::from(*v)),
        Value::SInt32(v) => Some(f64::from(*v)),
        Value::UInt32(v) | Value::UInt32z(v) => Some(f64::from(*v)),
        Value::SInt64(v) => Some(*v as f64),
        Value::UInt64(v) | Value::UInt64z(v) => Some(*v as f64),
        Value::Array(values) => values.iter().find_map(fit_value_to_f64),
        _ => None,
    }
}

fn fit_value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Timestamp(_) | Value::Array(_) | Value::Invalid => None,
        other => fit_value_to_f64(other).map(|v| v.to_string()),
    }
}

fn fit_value_to_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Timestamp(ts) => Some(ts.with_timezone(&Utc)),
        _ => None,
    }
}

impl FormatParser for FitParser {
    fn format_name(&self) -> &'static str {
        "FIT"
    }

    fn outcome(&self) -> &ParseOutcome {
        &self.outcome
    }

    fn into_outcome(self: Box<Self>) -> ParseOutcome {
        self.outcome
    }
}

impl FileNameAwareParser for FitParser {
    fn parse_file(&mut self, path: &Path) {
        let result = self.read(path);
        self.outcome.record(result);
    }
}
