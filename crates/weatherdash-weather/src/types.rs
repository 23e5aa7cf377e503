use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use weatherdash_storage::{format_label, Coordinates};

/// Normalized weather condition, mapped from WMO codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Condition {
    Clear,
    Clouds,
    Fog,
    Drizzle,
    #[serde(rename = "Freezing Drizzle")]
    FreezingDrizzle,
    Rain,
    #[serde(rename = "Freezing Rain")]
    FreezingRain,
    Snow,
    #[serde(rename = "Snow Grains")]
    SnowGrains,
    Showers,
    #[serde(rename = "Snow Showers")]
    SnowShowers,
    Thunderstorm,
    #[default]
    Unknown,
}

impl Condition {
    /// Convert WMO weather code to a condition.
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i32) -> Self {
        match code {
            0 => Self::Clear,
            1..=3 => Self::Clouds,
            45 | 48 => Self::Fog,
            51 | 53 | 55 => Self::Drizzle,
            56 | 57 => Self::FreezingDrizzle,
            61 | 63 | 65 => Self::Rain,
            66 | 67 => Self::FreezingRain,
            71 | 73 | 75 => Self::Snow,
            77 => Self::SnowGrains,
            80..=82 => Self::Showers,
            85 | 86 => Self::SnowShowers,
            95 | 96 | 99 => Self::Thunderstorm,
            _ => Self::Unknown,
        }
    }

    /// Missing codes are `Unknown`
    pub fn from_code(code: Option<i32>) -> Self {
        code.map_or(Self::Unknown, Self::from_wmo_code)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Clouds => "Clouds",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::FreezingDrizzle => "Freezing Drizzle",
            Self::Rain => "Rain",
            Self::FreezingRain => "Freezing Rain",
            Self::Snow => "Snow",
            Self::SnowGrains => "Snow Grains",
            Self::Showers => "Showers",
            Self::SnowShowers => "Snow Showers",
            Self::Thunderstorm => "Thunderstorm",
            Self::Unknown => "Unknown",
        }
    }

    /// Background scene for this condition.
    ///
    /// Checked in priority order: thunder, snow, fog, rain, clouds.
    pub fn scene(&self, is_day: bool) -> Scene {
        match self {
            Self::Thunderstorm => Scene::Thunder,
            Self::Snow | Self::SnowGrains | Self::SnowShowers => Scene::Snow,
            Self::Fog => Scene::Fog,
            Self::Drizzle
            | Self::FreezingDrizzle
            | Self::Rain
            | Self::FreezingRain
            | Self::Showers => Scene::Rain,
            Self::Clouds => Scene::Cloudy,
            Self::Clear | Self::Unknown if is_day => Scene::ClearDay,
            Self::Clear | Self::Unknown => Scene::ClearNight,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decorative background scene id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scene {
    ClearDay,
    ClearNight,
    Cloudy,
    Rain,
    Snow,
    Fog,
    Thunder,
}

impl Scene {
    pub fn id(&self) -> &'static str {
        match self {
            Self::ClearDay => "clear-day",
            Self::ClearNight => "clear-night",
            Self::Cloudy => "cloudy",
            Self::Rain => "rain",
            Self::Snow => "snow",
            Self::Fog => "fog",
            Self::Thunder => "thunder",
        }
    }
}

/// Current conditions; temperatures in °F, wind in mph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    pub temp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feels_like: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    pub condition: Condition,
    pub is_day: bool,
}

/// One day of the daily series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temp_high: f64,
    pub temp_low: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precip_chance: Option<f64>,
    pub condition: Condition,
}

/// One point of the short-range hourly series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyPoint {
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precip_chance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind: Option<f64>,
}

/// A complete, normalized weather result for one place.
///
/// Never patched; a refetch produces a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub place_name: String,
    /// Rounded coordinates the snapshot was fetched for
    pub coords: Coordinates,
    /// Epoch milliseconds at fetch completion
    pub updated_at: i64,
    pub current: CurrentConditions,
    pub daily: Vec<DailyForecast>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly: Option<Vec<HourlyPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerts: Option<Vec<WeatherAlert>>,
}

impl WeatherSnapshot {
    pub fn scene(&self) -> Scene {
        self.current.condition.scene(self.current.is_day)
    }
}

/// Severity, ordered most to least urgent for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Severity {
    Extreme,
    Severe,
    Moderate,
    Minor,
    #[default]
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Extreme,
        Severity::Severe,
        Severity::Moderate,
        Severity::Minor,
        Severity::Unknown,
    ];

    /// Lower rank is shown first
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Unrecognized values coerce to `Unknown`
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("Extreme") => Self::Extreme,
            Some("Severe") => Self::Severe,
            Some("Moderate") => Self::Moderate,
            Some("Minor") => Self::Minor,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Urgency {
    Immediate,
    Expected,
    Future,
    Past,
    #[default]
    Unknown,
}

impl Urgency {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("Immediate") => Self::Immediate,
            Some("Expected") => Self::Expected,
            Some("Future") => Self::Future,
            Some("Past") => Self::Past,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Certainty {
    Observed,
    Likely,
    Possible,
    Unlikely,
    #[default]
    Unknown,
}

impl Certainty {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("Observed") => Self::Observed,
            Some("Likely") => Self::Likely,
            Some("Possible") => Self::Possible,
            Some("Unlikely") => Self::Unlikely,
            _ => Self::Unknown,
        }
    }
}

/// A severe-weather alert. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherAlert {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    pub urgency: Urgency,
    pub certainty: Certainty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl WeatherAlert {
    /// Expired iff `expires` is present and not after `now_ms`
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires.is_some_and(|expires| expires <= now_ms)
    }
}

/// A geocoding result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePlace {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub coords: Coordinates,
}

impl CandidatePlace {
    pub fn label(&self) -> String {
        format_place_name(self)
    }
}

/// `"Name, Region, Country"` with empty segments elided
pub fn format_place_name(place: &CandidatePlace) -> String {
    format_label(&place.name, place.region.as_deref(), place.country.as_deref())
}

/// Label used when no place name is known
pub fn coordinate_label(coords: Coordinates) -> String {
    format!("Lat {:.2}, Lon {:.2}", coords.lat, coords.lon)
}
