//! Turning the active-location selection into coordinates and a label.

use weatherdash_core::LocationConfig;
use weatherdash_storage::{ActiveLocation, Coordinates, SavedCity};

use crate::location::GeoState;

pub const CURRENT_LOCATION_LABEL: &str = "Current location";
pub const LOCATING_LABEL: &str = "Current location (locating…)";

/// Static default city shown when nothing else resolves
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackLocation {
    pub coords: Coordinates,
    pub label: String,
}

impl Default for FallbackLocation {
    fn default() -> Self {
        Self {
            coords: Coordinates::new(39.0997, -94.5786),
            label: "Kansas City, MO, US".to_string(),
        }
    }
}

impl From<&LocationConfig> for FallbackLocation {
    fn from(config: &LocationConfig) -> Self {
        Self {
            coords: Coordinates::new(config.fallback_lat, config.fallback_lon),
            label: config.fallback_label.clone(),
        }
    }
}

/// Where resolved coordinates came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    Geo,
    City,
    Recent,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub coords: Coordinates,
    pub label: String,
    pub source: LocationSource,
    /// A device fix whose label should come from reverse geocoding
    pub needs_reverse_geocode: bool,
    /// Coordinates stand in for a location that isn't known yet
    pub is_placeholder: bool,
    /// Hint to show when geolocation failed
    pub geo_hint: Option<String>,
}

impl ResolvedLocation {
    fn fallback(fallback: &FallbackLocation) -> Self {
        Self {
            coords: fallback.coords,
            label: fallback.label.clone(),
            source: LocationSource::Fallback,
            needs_reverse_geocode: false,
            is_placeholder: false,
            geo_hint: None,
        }
    }
}

/// Resolve `active` against the saved cities and the live geolocation state.
///
/// Pure: the same inputs always give the same result. A `city` selection
/// whose id is gone resolves to the fallback.
pub fn resolve(
    active: &ActiveLocation,
    saved: &[SavedCity],
    geo: &GeoState,
    fallback: &FallbackLocation,
) -> ResolvedLocation {
    match active {
        ActiveLocation::Recent { coords, label } => ResolvedLocation {
            coords: *coords,
            label: label.clone(),
            source: LocationSource::Recent,
            needs_reverse_geocode: false,
            is_placeholder: false,
            geo_hint: None,
        },
        ActiveLocation::City { city_id } => match saved.iter().find(|c| &c.id == city_id) {
            Some(city) => ResolvedLocation {
                coords: city.coords(),
                label: city.label(),
                source: LocationSource::City,
                needs_reverse_geocode: false,
                is_placeholder: false,
                geo_hint: None,
            },
            None => {
                tracing::debug!("Saved city {} no longer exists; using fallback", city_id);
                ResolvedLocation::fallback(fallback)
            }
        },
        ActiveLocation::Geo => match geo.coords() {
            Some(coords) => ResolvedLocation {
                coords,
                label: CURRENT_LOCATION_LABEL.to_string(),
                source: LocationSource::Geo,
                needs_reverse_geocode: true,
                is_placeholder: false,
                geo_hint: None,
            },
            None => ResolvedLocation {
                coords: fallback.coords,
                label: LOCATING_LABEL.to_string(),
                source: LocationSource::Geo,
                needs_reverse_geocode: false,
                is_placeholder: true,
                geo_hint: geo.hint(),
            },
        },
        ActiveLocation::Fallback => ResolvedLocation::fallback(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weatherdash_core::LocationError;
    use weatherdash_storage::SavedCityInput;

    fn chicago() -> SavedCity {
        SavedCityInput::new("Chicago", Some("IL"), "US", 41.8781, -87.6298).into_city(1)
    }

    #[test]
    fn test_recent_uses_embedded_values() {
        let active = ActiveLocation::Recent {
            coords: Coordinates::new(40.7128, -74.006),
            label: "New York, NY, US".into(),
        };
        let resolved = resolve(&active, &[], &GeoState::Idle, &FallbackLocation::default());
        assert_eq!(resolved.coords, Coordinates::new(40.7128, -74.006));
        assert_eq!(resolved.label, "New York, NY, US");
        assert_eq!(resolved.source, LocationSource::Recent);
    }

    #[test]
    fn test_city_found() {
        let city = chicago();
        let active = ActiveLocation::City {
            city_id: city.id.clone(),
        };
        let resolved = resolve(&active, &[city], &GeoState::Idle, &FallbackLocation::default());
        assert_eq!(resolved.label, "Chicago, IL, US");
        assert_eq!(resolved.coords, Coordinates::new(41.8781, -87.6298));
        assert_eq!(resolved.source, LocationSource::City);
    }

    #[test]
    fn test_missing_city_resolves_to_fallback() {
        let active = ActiveLocation::City {
            city_id: "missing".into(),
        };
        let fallback = FallbackLocation::default();
        let resolved = resolve(&active, &[chicago()], &GeoState::Idle, &fallback);
        assert_eq!(resolved.coords, fallback.coords);
        assert_eq!(resolved.label, "Kansas City, MO, US");
        assert_eq!(resolved.source, LocationSource::Fallback);
    }

    #[test]
    fn test_geo_with_fix_wants_reverse_geocode() {
        let coords = Coordinates::new(47.6062, -122.3321);
        let resolved = resolve(
            &ActiveLocation::Geo,
            &[],
            &GeoState::Ready(coords),
            &FallbackLocation::default(),
        );
        assert_eq!(resolved.coords, coords);
        assert_eq!(resolved.label, CURRENT_LOCATION_LABEL);
        assert!(resolved.needs_reverse_geocode);
        assert!(!resolved.is_placeholder);
    }

    #[test]
    fn test_geo_without_fix_uses_fallback_coords_and_placeholder_label() {
        let fallback = FallbackLocation::default();
        for state in [GeoState::Idle, GeoState::Loading] {
            let resolved = resolve(&ActiveLocation::Geo, &[], &state, &fallback);
            assert_eq!(resolved.coords, fallback.coords);
            assert_eq!(resolved.label, LOCATING_LABEL);
            assert!(resolved.is_placeholder);
            assert_eq!(resolved.geo_hint, None);
        }

        let denied = GeoState::Error(LocationError::PermissionDenied);
        let resolved = resolve(&ActiveLocation::Geo, &[], &denied, &fallback);
        assert_eq!(resolved.label, LOCATING_LABEL);
        assert_eq!(
            resolved.geo_hint.as_deref(),
            Some("Location permission denied. Search for a city instead.")
        );
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let active = ActiveLocation::Geo;
        let geo = GeoState::Error(LocationError::Timeout);
        let fallback = FallbackLocation::default();
        assert_eq!(
            resolve(&active, &[], &geo, &fallback),
            resolve(&active, &[], &geo, &fallback)
        );
    }
}
