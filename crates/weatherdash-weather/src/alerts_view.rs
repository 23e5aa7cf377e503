//! Alert list filtering, ordering and display helpers.

use std::cmp::Ordering;

use crate::types::{Severity, WeatherAlert};

/// Alerts-page filter state.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertFilter {
    /// Case-insensitive text match; blank matches everything
    pub term: String,
    /// `None` shows all severities
    pub severity: Option<Severity>,
    pub hide_expired: bool,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            term: String::new(),
            severity: None,
            hide_expired: true,
        }
    }
}

impl AlertFilter {
    pub fn matches(&self, alert: &WeatherAlert, now_ms: i64) -> bool {
        if self.hide_expired && alert.is_expired(now_ms) {
            return false;
        }
        if self.severity.is_some_and(|severity| severity != alert.severity) {
            return false;
        }

        let term = self.term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        [
            Some(alert.title.as_str()),
            alert.headline.as_deref(),
            alert.area_desc.as_deref(),
            alert.description.as_deref(),
            alert.instruction.as_deref(),
            alert.sender.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&term))
    }

    /// Matching alerts, most severe first, then soonest to expire.
    pub fn apply(&self, alerts: &[WeatherAlert], now_ms: i64) -> Vec<WeatherAlert> {
        let mut visible: Vec<WeatherAlert> = alerts
            .iter()
            .filter(|alert| self.matches(alert, now_ms))
            .cloned()
            .collect();
        sort_alerts(&mut visible);
        visible
    }
}

/// Severity rank, then earliest expiry; alerts without an expiry go last.
pub fn sort_alerts(alerts: &mut [WeatherAlert]) {
    alerts.sort_by(|a, b| {
        a.severity.rank().cmp(&b.severity.rank()).then_with(|| match (a.expires, b.expires) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
    });
}

/// Per-severity tallies over the alerts a filter would show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityCounts {
    pub extreme: usize,
    pub severe: usize,
    pub moderate: usize,
    pub minor: usize,
    pub unknown: usize,
}

impl SeverityCounts {
    /// Count alerts, skipping expired ones when `hide_expired` is set.
    pub fn tally(alerts: &[WeatherAlert], hide_expired: bool, now_ms: i64) -> Self {
        let mut counts = Self::default();
        for alert in alerts {
            if hide_expired && alert.is_expired(now_ms) {
                continue;
            }
            match alert.severity {
                Severity::Extreme => counts.extreme += 1,
                Severity::Severe => counts.severe += 1,
                Severity::Moderate => counts.moderate += 1,
                Severity::Minor => counts.minor += 1,
                Severity::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Extreme => self.extreme,
            Severity::Severe => self.severe,
            Severity::Moderate => self.moderate,
            Severity::Minor => self.minor,
            Severity::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> usize {
        self.extreme + self.severe + self.moderate + self.minor + self.unknown
    }
}

/// `"Expired"`, `"45m"` or `"2h 5m"` until `expires_ms`; `None` without an expiry.
pub fn time_until(expires_ms: Option<i64>, now_ms: i64) -> Option<String> {
    let remaining = expires_ms? - now_ms;
    if remaining <= 0 {
        return Some("Expired".to_string());
    }

    let total_minutes = (remaining as f64 / 60_000.0).round() as i64;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    Some(if hours == 0 {
        format!("{minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    })
}

/// Trim and squeeze runs of three or more newlines down to a blank line.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for c in text.trim().chars() {
        if c == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(c);
            }
        } else {
            newlines = 0;
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Certainty, Urgency};

    const NOW: i64 = 1_760_000_000_000;

    fn alert(id: &str, severity: Severity, expires: Option<i64>) -> WeatherAlert {
        WeatherAlert {
            id: id.into(),
            title: format!("{id} title"),
            severity,
            urgency: Urgency::Unknown,
            certainty: Certainty::Unknown,
            area_desc: Some("Jackson County".into()),
            headline: None,
            description: None,
            instruction: None,
            effective: None,
            expires,
            sender: None,
            link: None,
        }
    }

    fn ids(alerts: &[WeatherAlert]) -> Vec<&str> {
        alerts.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_sort_by_severity_then_expiry() {
        let mut alerts = vec![
            alert("minor", Severity::Minor, Some(NOW + 10)),
            alert("severe-late", Severity::Severe, None),
            alert("extreme", Severity::Extreme, Some(NOW + 50)),
            alert("severe-soon", Severity::Severe, Some(NOW + 5)),
        ];
        sort_alerts(&mut alerts);
        assert_eq!(ids(&alerts), vec!["extreme", "severe-soon", "severe-late", "minor"]);
    }

    #[test]
    fn test_filter_hides_expired_and_matches_term() {
        let alerts = vec![
            alert("flood", Severity::Moderate, Some(NOW + 60_000)),
            alert("old", Severity::Severe, Some(NOW - 1000)),
        ];

        let filter = AlertFilter::default();
        assert_eq!(ids(&filter.apply(&alerts, NOW)), vec!["flood"]);

        let show_all = AlertFilter {
            hide_expired: false,
            ..AlertFilter::default()
        };
        assert_eq!(show_all.apply(&alerts, NOW).len(), 2);

        let by_area = AlertFilter {
            term: "  JACKSON ".into(),
            hide_expired: false,
            ..AlertFilter::default()
        };
        assert_eq!(by_area.apply(&alerts, NOW).len(), 2);

        let by_title = AlertFilter {
            term: "flood".into(),
            ..AlertFilter::default()
        };
        assert_eq!(ids(&by_title.apply(&alerts, NOW)), vec!["flood"]);

        let by_severity = AlertFilter {
            severity: Some(Severity::Severe),
            hide_expired: false,
            ..AlertFilter::default()
        };
        assert_eq!(ids(&by_severity.apply(&alerts, NOW)), vec!["old"]);
    }

    #[test]
    fn test_counts() {
        let alerts = vec![
            alert("a", Severity::Severe, None),
            alert("b", Severity::Severe, Some(NOW - 1)),
            alert("c", Severity::Unknown, None),
        ];
        let counts = SeverityCounts::tally(&alerts, true, NOW);
        assert_eq!(counts.get(Severity::Severe), 1);
        assert_eq!(counts.unknown, 1);
        assert_eq!(counts.total(), 2);
        assert_eq!(SeverityCounts::tally(&alerts, false, NOW).total(), 3);
    }

    #[test]
    fn test_time_until() {
        assert_eq!(time_until(None, NOW), None);
        assert_eq!(time_until(Some(NOW), NOW).as_deref(), Some("Expired"));
        assert_eq!(time_until(Some(NOW + 45 * 60_000), NOW).as_deref(), Some("45m"));
        assert_eq!(time_until(Some(NOW + 125 * 60_000), NOW).as_deref(), Some("2h 5m"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("\n a\n\n\n\nb\n\nc \n"), "a\n\nb\n\nc");
    }
}
