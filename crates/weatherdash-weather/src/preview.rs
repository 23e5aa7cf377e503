//! Read-only projections over whatever the caches hold.
//!
//! Computed on demand from every location fetched this session, not only the
//! active one.

use std::collections::{HashMap, HashSet};

use crate::query::{keys, QueryClient};
use crate::types::{Condition, WeatherAlert, WeatherSnapshot};

const SPARKLINE_DAYS: usize = 7;

/// Picker preview for one place; every field is `None` until something
/// for that place has been fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preview {
    pub temp: Option<f64>,
    pub condition: Option<Condition>,
    pub is_day: Option<bool>,
    pub alerts_count: Option<usize>,
    pub updated_at: Option<i64>,
    pub daily_highs: Option<Vec<f64>>,
    pub daily_lows: Option<Vec<f64>>,
}

impl Preview {
    pub fn is_placeholder(&self) -> bool {
        self.updated_at.is_none()
    }
}

fn active_ids<'a>(
    alerts: impl IntoIterator<Item = &'a WeatherAlert>,
    now_ms: i64,
    ids: &mut HashSet<String>,
) {
    for alert in alerts {
        if !alert.is_expired(now_ms) {
            ids.insert(alert.id.clone());
        }
    }
}

/// Distinct non-expired alerts across every cached snapshot and alert list.
pub fn active_alert_count(queries: &QueryClient, now_ms: i64) -> usize {
    let mut ids = HashSet::new();
    for (_, snapshot) in queries.weather.scan(&keys::weather()) {
        active_ids(snapshot.alerts.iter().flatten(), now_ms, &mut ids);
    }
    for (_, alerts) in queries.alerts.scan(&keys::alerts()) {
        active_ids(alerts.iter(), now_ms, &mut ids);
    }
    ids.len()
}

fn alerts_for_snapshot(queries: &QueryClient, snapshot: &WeatherSnapshot, now_ms: i64) -> usize {
    let mut ids = HashSet::new();
    active_ids(snapshot.alerts.iter().flatten(), now_ms, &mut ids);
    if let Some(alerts) = queries.alerts.peek(&keys::alerts_at(snapshot.coords)) {
        active_ids(alerts.iter(), now_ms, &mut ids);
    }
    ids.len()
}

fn series(values: impl Iterator<Item = f64>) -> Option<Vec<f64>> {
    let values: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    (!values.is_empty()).then_some(values)
}

fn build_preview(queries: &QueryClient, snapshot: &WeatherSnapshot, now_ms: i64) -> Preview {
    let days = || snapshot.daily.iter().take(SPARKLINE_DAYS);
    Preview {
        temp: Some(snapshot.current.temp),
        condition: Some(snapshot.current.condition),
        is_day: Some(snapshot.current.is_day),
        alerts_count: Some(alerts_for_snapshot(queries, snapshot, now_ms)),
        updated_at: Some(snapshot.updated_at),
        daily_highs: series(days().map(|d| d.temp_high)),
        daily_lows: series(days().map(|d| d.temp_low)),
    }
}

/// Previews keyed by place name, each from that place's newest snapshot.
pub fn previews(queries: &QueryClient, now_ms: i64) -> HashMap<String, Preview> {
    let mut newest: HashMap<String, std::sync::Arc<WeatherSnapshot>> = HashMap::new();
    for (_, snapshot) in queries.weather.scan(&keys::weather()) {
        let keep = newest
            .get(&snapshot.place_name)
            .map_or(true, |current| snapshot.updated_at > current.updated_at);
        if keep {
            newest.insert(snapshot.place_name.clone(), snapshot);
        }
    }

    newest
        .into_iter()
        .map(|(name, snapshot)| (name, build_preview(queries, &snapshot, now_ms)))
        .collect()
}

/// Preview for `label`, or an all-`None` preview if nothing is cached.
pub fn preview_for_label(queries: &QueryClient, label: &str, now_ms: i64) -> Preview {
    queries
        .weather
        .scan(&keys::weather())
        .into_iter()
        .map(|(_, snapshot)| snapshot)
        .filter(|snapshot| snapshot.place_name == label)
        .max_by_key(|snapshot| snapshot.updated_at)
        .map(|snapshot| build_preview(queries, &snapshot, now_ms))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::types::{Certainty, CurrentConditions, DailyForecast, Severity, Urgency};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use weatherdash_storage::Coordinates;

    const NOW: i64 = 1_760_000_000_000;

    fn alert(id: &str, expires: Option<i64>) -> WeatherAlert {
        WeatherAlert {
            id: id.into(),
            title: "Heat Advisory".into(),
            severity: Severity::Moderate,
            urgency: Urgency::Expected,
            certainty: Certainty::Likely,
            area_desc: None,
            headline: None,
            description: None,
            instruction: None,
            effective: None,
            expires,
            sender: None,
            link: None,
        }
    }

    fn snapshot(place: &str, coords: Coordinates, updated_at: i64, temp: f64) -> WeatherSnapshot {
        let start = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        WeatherSnapshot {
            place_name: place.into(),
            coords,
            updated_at,
            current: CurrentConditions {
                temp,
                feels_like: None,
                wind: None,
                humidity: None,
                condition: Condition::Clear,
                is_day: true,
            },
            daily: (0..9)
                .map(|i| DailyForecast {
                    date: start + chrono::Days::new(i),
                    temp_high: 70.0 + i as f64,
                    temp_low: 50.0 + i as f64,
                    precip_chance: None,
                    condition: Condition::Clear,
                })
                .collect(),
            hourly: None,
            alerts: None,
        }
    }

    fn kc() -> Coordinates {
        Coordinates::new(39.0997, -94.5786)
    }

    #[tokio::test]
    async fn test_alert_count_spans_all_cached_locations() {
        let queries = QueryClient::new();
        let mut with_alerts = snapshot("A", kc(), 1, 60.0);
        with_alerts.alerts = Some(vec![alert("a1", None), alert("a2", Some(NOW - 1))]);
        queries
            .weather
            .set(keys::weather_coords(kc(), "A"), Arc::new(with_alerts));

        let other = Coordinates::new(41.8781, -87.6298);
        queries.alerts.set(
            keys::alerts_at(other),
            Arc::new(vec![alert("b1", Some(NOW + 60_000)), alert("a1", None)]),
        );

        // a1 is counted once, a2 is expired
        assert_eq!(active_alert_count(&queries, NOW), 2);
    }

    #[tokio::test]
    async fn test_preview_uses_newest_snapshot_for_label() {
        let queries = QueryClient::new();
        queries
            .weather
            .set(keys::weather_coords(kc(), "KC"), Arc::new(snapshot("KC", kc(), 10, 61.0)));
        queries
            .weather
            .set(keys::weather_coords(kc(), "Kansas City"), Arc::new(snapshot("KC", kc(), 20, 65.0)));
        queries
            .alerts
            .set(keys::alerts_at(kc()), Arc::new(vec![alert("x", None)]));

        let preview = preview_for_label(&queries, "KC", NOW);
        assert_eq!(preview.temp, Some(65.0));
        assert_eq!(preview.updated_at, Some(20));
        assert_eq!(preview.alerts_count, Some(1));
        assert_eq!(preview.daily_highs.as_ref().map(Vec::len), Some(7));
        assert_eq!(preview.daily_lows.as_ref().and_then(|l| l.first().copied()), Some(50.0));

        let all = previews(&queries, NOW);
        assert_eq!(all.len(), 1);
        assert_eq!(all["KC"].temp, Some(65.0));
    }

    #[tokio::test]
    async fn test_unknown_label_is_placeholder() {
        let queries = QueryClient::new();
        let preview = preview_for_label(&queries, "Nowhere", NOW);
        assert!(preview.is_placeholder());
        assert_eq!(preview, Preview::default());
    }
}
