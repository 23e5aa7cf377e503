//! Persisted preference types.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::persisted::Validate;

/// A point on the map, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Round both components to `decimals` places.
    ///
    /// Fixes for the same spot differ past the 4th decimal; rounding keeps
    /// them on one cache key.
    pub fn rounded(&self, decimals: u32) -> Self {
        let factor = 10f64.powi(decimals.min(12) as i32);
        Self {
            lat: (self.lat * factor).round() / factor,
            lon: (self.lon * factor).round() / factor,
        }
    }
}

/// A bookmarked city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCity {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    /// Epoch milliseconds
    pub added_at: i64,
}

impl SavedCity {
    pub fn coords(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }

    /// `"Name, Region, Country"` with empty parts omitted
    pub fn label(&self) -> String {
        format_label(&self.name, self.region.as_deref(), Some(&self.country))
    }
}

/// Recent searches share the saved-city shape.
pub type RecentSearch = SavedCity;

/// A city about to be saved; `id` is derived when absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SavedCityInput {
    pub id: Option<String>,
    pub name: String,
    pub region: Option<String>,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

impl SavedCityInput {
    pub fn new(name: impl Into<String>, region: Option<&str>, country: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            region: region.map(str::to_string),
            country: country.into(),
            lat,
            lon,
        }
    }

    /// The explicit id, or the deterministic one
    pub fn resolved_id(&self) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => city_id(&self.name, self.region.as_deref(), &self.country, self.lat, self.lon),
        }
    }

    pub fn into_city(self, added_at: i64) -> SavedCity {
        let id = self.resolved_id();
        SavedCity {
            id,
            name: self.name,
            region: self.region.filter(|r| !r.is_empty()),
            country: self.country,
            lat: self.lat,
            lon: self.lon,
            added_at,
        }
    }
}

/// Deterministic slug for a place.
///
/// Coordinates are rounded to 3 decimals, so searching the same place twice
/// yields the same id.
pub fn city_id(name: &str, region: Option<&str>, country: &str, lat: f64, lon: f64) -> String {
    let base = format!(
        "{}-{}-{}-{:.3}-{:.3}",
        name,
        region.unwrap_or_default(),
        country,
        lat,
        lon
    )
    .to_lowercase();

    let mut slug = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Join name, region and country with `", "`, skipping empty parts.
pub fn format_label(name: &str, region: Option<&str>, country: Option<&str>) -> String {
    [Some(name), region, country]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The one location the app is currently showing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ActiveLocation {
    /// Static default city
    #[default]
    Fallback,
    /// Device position, resolved live
    Geo,
    /// Weak reference into saved cities
    City {
        #[serde(rename = "cityId")]
        city_id: String,
    },
    /// Self-contained ad-hoc pick
    Recent { coords: Coordinates, label: String },
}

impl ActiveLocation {
    /// Short label for the location source chip
    pub fn source_label(&self) -> &'static str {
        match self {
            ActiveLocation::Geo => "Current location",
            ActiveLocation::Recent { .. } => "Recent search",
            ActiveLocation::City { .. } => "Saved city",
            ActiveLocation::Fallback => "Fallback",
        }
    }
}

impl Validate for SavedCity {
    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("empty city id".into());
        }
        if self.name.trim().is_empty() {
            return Err(format!("city {} has no name", self.id));
        }
        if !self.coords().is_finite() {
            return Err(format!("city {} has non-finite coordinates", self.id));
        }
        Ok(())
    }
}

impl Validate for Vec<SavedCity> {
    fn validate(&self) -> Result<(), String> {
        let mut ids = HashSet::with_capacity(self.len());
        for city in self {
            city.validate()?;
            if !ids.insert(city.id.as_str()) {
                return Err(format!("duplicate city id {}", city.id));
            }
        }
        Ok(())
    }
}

impl Validate for ActiveLocation {
    fn validate(&self) -> Result<(), String> {
        match self {
            ActiveLocation::City { city_id } if city_id.trim().is_empty() => {
                Err("empty city reference".into())
            }
            ActiveLocation::Recent { coords, .. } if !coords.is_finite() => {
                Err("non-finite recent coordinates".into())
            }
            _ => Ok(()),
        }
    }
}
