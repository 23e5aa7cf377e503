//! Place resolution.
//!
//! Forward search uses the Open-Meteo geocoding API; reverse geocoding uses
//! Nominatim (OpenStreetMap). Both are free and need no API key.

use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;
use weatherdash_core::WeatherConfig;
use weatherdash_storage::Coordinates;

use crate::error::{Result, WeatherError};
use crate::provider::{endpoint, http_client};
use crate::types::CandidatePlace;

pub const MAX_SEARCH_RESULTS: usize = 8;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Option<Vec<SearchResult>>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
    /// State or region
    #[serde(default)]
    admin1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    state_district: Option<String>,
    state: Option<String>,
    county: Option<String>,
    country: Option<String>,
}

impl NominatimAddress {
    fn into_place(self, coords: Coordinates) -> Option<CandidatePlace> {
        let state = self.state.clone();
        let country = self.country.clone();

        // Prefer city > town > village > municipality for the primary name
        let name = self
            .city
            .or(self.town)
            .or(self.village)
            .or(self.municipality)
            .or(self.state_district)
            .or(self.county)
            .or(self.state)
            .or(self.country)
            .filter(|n| !n.trim().is_empty())?;

        let distinct = |part: Option<String>| part.filter(|p| !p.trim().is_empty() && *p != name);
        Some(CandidatePlace {
            region: distinct(state),
            country: distinct(country),
            name,
            coords,
        })
    }
}

/// Forward and reverse geocoding client
#[derive(Debug, Clone)]
pub struct Geocoder {
    search_endpoint: Url,
    reverse_endpoint: Url,
    client: Arc<Client>,
    precision: u32,
}

impl Geocoder {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        Ok(Self {
            search_endpoint: endpoint(&config.geocoding_url, "v1/search")?,
            reverse_endpoint: endpoint(&config.reverse_geocoding_url, "reverse")?,
            client: http_client(config)?,
            precision: config.coordinate_precision,
        })
    }

    /// Candidate places for `term`, at most `MAX_SEARCH_RESULTS`.
    ///
    /// Callers debounce and enforce a minimum length first.
    #[tracing::instrument(skip(self))]
    pub async fn search(&self, term: &str) -> Result<Vec<CandidatePlace>> {
        let count = MAX_SEARCH_RESULTS.to_string();
        let response = self
            .client
            .get(self.search_endpoint.clone())
            .query(&[
                ("name", term),
                ("count", count.as_str()),
                ("language", "en"),
                ("format", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Http {
                status: status.as_u16(),
            });
        }

        let body: SearchResponse = response.json().await?;
        let places: Vec<CandidatePlace> = body
            .results
            .unwrap_or_default()
            .into_iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|r| CandidatePlace {
                name: r.name,
                region: r.admin1.filter(|s| !s.is_empty()),
                country: r.country.filter(|s| !s.is_empty()),
                coords: Coordinates::new(r.latitude, r.longitude),
            })
            .collect();

        tracing::debug!("{} places match", places.len());
        Ok(places)
    }

    /// Place for `coords`, or `None` when the provider knows no named place.
    ///
    /// Transport and decode failures are errors so callers can tell "nowhere
    /// in particular" from "couldn't ask".
    #[tracing::instrument(skip(self), fields(lat = coords.lat, lon = coords.lon))]
    pub async fn reverse_geocode(&self, coords: Coordinates) -> Result<Option<CandidatePlace>> {
        let coords = coords.rounded(self.precision);
        let lat = coords.lat.to_string();
        let lon = coords.lon.to_string();

        let response = self
            .client
            .get(self.reverse_endpoint.clone())
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "json"),
                ("addressdetails", "1"),
                ("layer", "address"),
                ("zoom", "10"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Http {
                status: status.as_u16(),
            });
        }

        let body: NominatimResponse = response.json().await?;
        let place = body.address.and_then(|address| address.into_place(coords));
        match &place {
            Some(place) => tracing::info!("Reverse geocoded to: {}", place.label()),
            None => tracing::debug!("No named place at this point"),
        }
        Ok(place)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn address(json: serde_json::Value) -> NominatimAddress {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_city_preferred_with_state_and_country() {
        let place = address(serde_json::json!({
            "city": "Seattle",
            "county": "King County",
            "state": "Washington",
            "country": "United States"
        }))
        .into_place(Coordinates::new(47.6062, -122.3321))
        .unwrap();

        assert_eq!(place.label(), "Seattle, Washington, United States");
    }

    #[test]
    fn test_falls_back_through_address_levels() {
        let place = address(serde_json::json!({ "village": "Hallstatt", "country": "Austria" }))
            .into_place(Coordinates::new(47.56, 13.65))
            .unwrap();
        assert_eq!(place.name, "Hallstatt");
        assert_eq!(place.region, None);

        // A state-only address doesn't repeat itself
        let place = address(serde_json::json!({ "state": "Nevada" }))
            .into_place(Coordinates::new(38.5, -117.0))
            .unwrap();
        assert_eq!(place.label(), "Nevada");
    }

    #[test]
    fn test_empty_address_is_none() {
        let place = address(serde_json::json!({})).into_place(Coordinates::new(0.0, 0.0));
        assert!(place.is_none());
    }
}
