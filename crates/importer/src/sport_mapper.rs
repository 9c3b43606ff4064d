use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Running,
    Cycling,
    Swimming,
    Walking,
    Hiking,
    Rowing,
    Other,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Cycling => "cycling",
            Self::Swimming => "swimming",
            Self::Walking => "walking",
            Self::Hiking => "hiking",
            Self::Rowing => "rowing",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Sport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub trait SportMapper {
    fn map_sport(&self, source_name: &str) -> Option<Sport>;
}

/// Names shared by most vendor formats (TCX `Sport`, GPX `type`, FIT `sport`, PWX `sportType`).
pub struct CommonSportMapper;

impl SportMapper for CommonSportMapper {
    fn map_sport(&self, name: &str) -> Option<Sport> {
        match name.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "running" | "run" | "trail_running" | "treadmill_running" | "jogging" => {
                Some(Sport::Running)
            }
            "biking" | "bike" | "cycling" | "cycle" | "road_biking" | "mountain_biking"
            | "indoor_cycling" | "mtb" => Some(Sport::Cycling),
            "swimming" | "swim" | "lap_swimming" | "open_water_swimming" => Some(Sport::Swimming),
            "walking" | "walk" => Some(Sport::Walking),
            "hiking" | "hike" => Some(Sport::Hiking),
            "rowing" | "row" => Some(Sport::Rowing),
            "other" | "generic" | "multisport" => Some(Sport::Other),
            _ => None,
        }
    }
}
