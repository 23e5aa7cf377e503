//! Forecast provider (Open-Meteo) and response normalization.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;
use weatherdash_core::WeatherConfig;
use weatherdash_storage::Coordinates;

use crate::error::{Result, WeatherError};
use crate::types::{
    coordinate_label, Condition, CurrentConditions, DailyForecast, HourlyPoint, WeatherSnapshot,
};

pub const HOURLY_POINTS: usize = 48;
pub const DAILY_POINTS: usize = 7;

const CURRENT_FIELDS: &str =
    "temperature_2m,apparent_temperature,relative_humidity_2m,wind_speed_10m,weather_code,is_day";
const HOURLY_FIELDS: &str = "temperature_2m,precipitation_probability,wind_speed_10m";
const DAILY_FIELDS: &str =
    "weather_code,temperature_2m_max,temperature_2m_min,precipitation_probability_max";

/// Build the HTTP client shared by one provider.
pub(crate) fn http_client(config: &WeatherConfig) -> Result<Arc<Client>> {
    let client = Client::builder()
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.as_str())
        .build()?;
    Ok(Arc::new(client))
}

pub(crate) fn endpoint(base: &str, path: &str) -> Result<Url> {
    let base = Url::parse(base).map_err(|e| WeatherError::Parse(format!("bad base URL {base}: {e}")))?;
    base.join(path)
        .map_err(|e| WeatherError::Parse(format!("bad endpoint {path}: {e}")))
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub utc_offset_seconds: i32,
    #[serde(default)]
    pub current: Option<CurrentBlock>,
    #[serde(default)]
    pub hourly: Option<HourlyBlock>,
    #[serde(default)]
    pub daily: Option<DailyBlock>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CurrentBlock {
    pub temperature_2m: Option<f64>,
    pub apparent_temperature: Option<f64>,
    pub relative_humidity_2m: Option<f64>,
    pub wind_speed_10m: Option<f64>,
    pub weather_code: Option<i32>,
    pub is_day: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HourlyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    pub wind_speed_10m: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DailyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub weather_code: Vec<Option<i32>>,
    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation_probability_max: Vec<Option<f64>>,
}

/// Value at `i`, treating short arrays and nulls alike
fn at<T: Copy>(values: &[Option<T>], i: usize) -> Option<T> {
    values.get(i).copied().flatten()
}

fn parse_local_time(raw: &str, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Turn one forecast response into a snapshot.
///
/// Missing temperatures become 0; optional fields stay absent. Series are
/// aligned on their `time` arrays and never assume equal lengths.
pub fn normalize_forecast(
    response: ForecastResponse,
    coords: Coordinates,
    label: Option<&str>,
    fetched_at_ms: i64,
) -> WeatherSnapshot {
    let current = response.current.unwrap_or_default();
    let current = CurrentConditions {
        temp: current.temperature_2m.unwrap_or(0.0),
        feels_like: current.apparent_temperature,
        wind: current.wind_speed_10m,
        humidity: current.relative_humidity_2m,
        condition: Condition::from_code(current.weather_code),
        is_day: current.is_day.map_or(true, |flag| flag != 0),
    };

    let daily = response
        .daily
        .map(|d| {
            d.time
                .iter()
                .enumerate()
                .take(DAILY_POINTS)
                .filter_map(|(i, day)| {
                    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
                    Some(DailyForecast {
                        date,
                        temp_high: at(&d.temperature_2m_max, i).unwrap_or(0.0),
                        temp_low: at(&d.temperature_2m_min, i).unwrap_or(0.0),
                        precip_chance: at(&d.precipitation_probability_max, i),
                        condition: Condition::from_code(at(&d.weather_code, i)),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let offset = FixedOffset::east_opt(response.utc_offset_seconds)
        .unwrap_or_else(|| Utc.fix());
    let hourly = response.hourly.map(|h| {
        h.time
            .iter()
            .enumerate()
            .take(HOURLY_POINTS)
            .filter_map(|(i, time)| {
                Some(HourlyPoint {
                    time: parse_local_time(time, &offset)?,
                    temp: at(&h.temperature_2m, i),
                    precip_chance: at(&h.precipitation_probability, i),
                    wind: at(&h.wind_speed_10m, i),
                })
            })
            .collect()
    });

    let place_name = match label.map(str::trim) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => coordinate_label(coords),
    };

    WeatherSnapshot {
        place_name,
        coords,
        updated_at: fetched_at_ms,
        current,
        daily,
        hourly,
        alerts: None,
    }
}

/// Open-Meteo forecast client
#[derive(Debug, Clone)]
pub struct ForecastProvider {
    endpoint: Url,
    client: Arc<Client>,
    precision: u32,
}

impl ForecastProvider {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint(&config.forecast_url, "v1/forecast")?,
            client: http_client(config)?,
            precision: config.coordinate_precision,
        })
    }

    /// Fetch current, 48-hour and 7-day data in °F / mph / inches.
    ///
    /// Never geocodes: `label` becomes the place name, or a coordinate label
    /// when absent.
    #[tracing::instrument(skip(self), fields(lat = coords.lat, lon = coords.lon))]
    pub async fn fetch_by_coords(
        &self,
        coords: Coordinates,
        label: Option<&str>,
    ) -> Result<WeatherSnapshot> {
        let coords = coords.rounded(self.precision);
        let query = [
            ("latitude", coords.lat.to_string()),
            ("longitude", coords.lon.to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("forecast_hours", HOURLY_POINTS.to_string()),
            ("daily", DAILY_FIELDS.to_string()),
            ("forecast_days", DAILY_POINTS.to_string()),
            ("temperature_unit", "fahrenheit".to_string()),
            ("wind_speed_unit", "mph".to_string()),
            ("precipitation_unit", "inch".to_string()),
            ("timezone", "auto".to_string()),
        ];

        tracing::debug!("Fetching forecast");
        let response = self.client.get(self.endpoint.clone()).query(&query).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Forecast request failed with {}", status);
            return Err(WeatherError::Http {
                status: status.as_u16(),
            });
        }

        let body: ForecastResponse = response.json().await?;
        let snapshot = normalize_forecast(body, coords, label, Utc::now().timestamp_millis());

        tracing::info!(
            "Fetched forecast for {} ({} days, {} hours)",
            snapshot.place_name,
            snapshot.daily.len(),
            snapshot.hourly.as_ref().map_or(0, Vec::len)
        );
        Ok(snapshot)
    }
}
