mod fit;
mod fitlog;
mod gpx;
mod kml;
mod logbook;
mod pwx;
mod slf;
mod tcx;
pub mod xml;

pub use self::fit::FitParser;
pub use self::fitlog::FitlogParser;
pub use self::gpx::GpxParser;
pub use self::kml::KmlParser;
pub use self::logbook::LogbookParser;
pub use self::pwx::PwxParser;
pub use self::slf::SlfParser;
pub use self::tcx::TcxParser;

use chrono::{DateTime, NaiveDateTime, Utc};

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Accepts RFC 3339 and the zone-less variants vendors write; zone-less values are read as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Offset from UTC in minutes, when the raw value carries one.
pub(crate) fn timezone_offset(value: &str) -> Option<i32> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|parsed| parsed.offset().local_minus_utc() / 60)
}

/// Great-circle distance between two points in kilometers.
pub(crate) fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}
