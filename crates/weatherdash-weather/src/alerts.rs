//! Severe-weather alerts from the National Weather Service.
//!
//! Alerts never block a forecast: every failure here yields an empty list.

use chrono::DateTime;
use reqwest::{header, Client};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;
use weatherdash_core::WeatherConfig;
use weatherdash_storage::Coordinates;

use crate::error::Result;
use crate::provider::{endpoint, http_client};
use crate::types::{Certainty, Severity, Urgency, WeatherAlert};

const DEFAULT_TITLE: &str = "Weather Alert";

#[derive(Debug, Default, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Option<Vec<Feature>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub properties: Option<AlertProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertProperties {
    pub event: Option<String>,
    pub severity: Option<String>,
    pub urgency: Option<String>,
    pub certainty: Option<String>,
    pub area_desc: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
    pub effective: Option<String>,
    pub expires: Option<String>,
    pub sender_name: Option<String>,
    pub web: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn epoch_ms(iso: Option<&str>) -> Option<i64> {
    DateTime::parse_from_rfc3339(iso?).ok().map(|t| t.timestamp_millis())
}

/// Normalize a feature collection for the point `coords`.
///
/// Features without an id get `"{lat},{lon}:{index}:{title}"` so list keys
/// stay stable.
pub fn normalize_alerts(collection: FeatureCollection, coords: Coordinates) -> Vec<WeatherAlert> {
    collection
        .features
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, feature)| {
            let p = feature.properties.unwrap_or_default();
            let title = p
                .event
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_TITLE)
                .to_string();
            let id = non_empty(feature.id)
                .unwrap_or_else(|| format!("{},{}:{}:{}", coords.lat, coords.lon, i, title));

            WeatherAlert {
                id,
                severity: Severity::parse(p.severity.as_deref()),
                urgency: Urgency::parse(p.urgency.as_deref()),
                certainty: Certainty::parse(p.certainty.as_deref()),
                effective: epoch_ms(p.effective.as_deref()),
                expires: epoch_ms(p.expires.as_deref()),
                area_desc: non_empty(p.area_desc),
                headline: non_empty(p.headline),
                description: non_empty(p.description),
                instruction: non_empty(p.instruction),
                sender: non_empty(p.sender_name),
                link: non_empty(p.web),
                title,
            }
        })
        .collect()
}

/// NWS active-alerts client
#[derive(Debug, Clone)]
pub struct AlertsProvider {
    endpoint: Url,
    client: Arc<Client>,
    precision: u32,
}

impl AlertsProvider {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint(&config.alerts_url, "alerts/active")?,
            client: http_client(config)?,
            precision: config.coordinate_precision,
        })
    }

    /// Active alerts for a point; empty on any failure.
    #[tracing::instrument(skip(self), fields(lat = coords.lat, lon = coords.lon))]
    pub async fn fetch_by_coords(&self, coords: Coordinates) -> Vec<WeatherAlert> {
        let coords = coords.rounded(self.precision);
        let point = format!("{},{}", coords.lat, coords.lon);

        let request = self
            .client
            .get(self.endpoint.clone())
            .query(&[("point", point.as_str())])
            .header(header::ACCEPT, "application/geo+json");

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Alerts request failed: {}", e);
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            tracing::debug!("Alerts returned status {}", response.status());
            return Vec::new();
        }

        let body: FeatureCollection = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("Alerts parse error: {}", e);
                return Vec::new();
            }
        };

        let alerts = normalize_alerts(body, coords);
        tracing::debug!("{} active alerts", alerts.len());
        alerts
    }
}
