//! City search input handling and pick/save helpers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use weatherdash_storage::{
    ActiveLocationStore, RecentSearches, SaveOutcome, SavedCities, SavedCityInput, StorageResult,
};

use crate::types::CandidatePlace;

pub const MIN_TERM_CHARS: usize = 2;
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(250);

/// Trimmed, whitespace-collapsed term, or `None` if too short to search.
pub fn normalize_term(raw: &str) -> Option<String> {
    let term = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (term.chars().count() >= MIN_TERM_CHARS).then_some(term)
}

/// Lets only the last of a burst of calls through.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    latest: AtomicU64,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(SEARCH_DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            latest: AtomicU64::new(0),
        }
    }

    /// Wait out the quiet period.
    ///
    /// Returns `false` if another call arrived meanwhile.
    pub async fn settle(&self) -> bool {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        self.latest.load(Ordering::SeqCst) == ticket
    }
}

impl From<&CandidatePlace> for SavedCityInput {
    fn from(place: &CandidatePlace) -> Self {
        SavedCityInput {
            id: None,
            name: place.name.clone(),
            region: place.region.clone().filter(|r| !r.is_empty()),
            country: place.country.clone().unwrap_or_default(),
            lat: place.coords.lat,
            lon: place.coords.lon,
        }
    }
}

/// Bookmark a search result; an already-saved place is reported, not duplicated.
pub fn save_place(place: &CandidatePlace, saved: &SavedCities) -> StorageResult<SaveOutcome> {
    saved.add(SavedCityInput::from(place))
}

/// Show a search result without saving it, and remember it as recent.
pub fn pick_place(
    place: &CandidatePlace,
    recent: &RecentSearches,
    active: &ActiveLocationStore,
) -> StorageResult<()> {
    recent.add(SavedCityInput::from(place))?;
    active.set_recent(place.coords, place.label())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::sync::Arc;
    use weatherdash_storage::{ActiveLocation, Coordinates, MemoryStore, Storage};

    fn springfield() -> CandidatePlace {
        CandidatePlace {
            name: "Springfield".into(),
            region: Some("Illinois".into()),
            country: Some("United States".into()),
            coords: Coordinates::new(39.8017, -89.6437),
        }
    }

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term("  new   york "), Some("new york".to_string()));
        assert_eq!(normalize_term(" a "), None);
        assert_eq!(normalize_term(""), None);
        assert_eq!(normalize_term("NY"), Some("NY".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_lets_last_call_through() {
        let debouncer = Debouncer::default();
        let (first, second) = tokio::join!(debouncer.settle(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            debouncer.settle().await
        });
        assert!(!first);
        assert!(second);

        assert!(debouncer.settle().await);
    }

    #[test]
    fn test_candidate_to_saved_city_has_deterministic_id() {
        let a = SavedCityInput::from(&springfield()).resolved_id();
        let b = SavedCityInput::from(&springfield()).resolved_id();
        assert_eq!(a, b);
        assert_eq!(a, "springfield-illinois-united-states-39-802-89-644");
    }

    #[test]
    fn test_save_then_save_again_reports_existing() {
        let saved = SavedCities::new(Storage::new(Arc::new(MemoryStore::new())));
        assert!(save_place(&springfield(), &saved).unwrap().was_added());
        let again = save_place(&springfield(), &saved).unwrap();
        assert!(!again.was_added());
        assert_eq!(saved.list().len(), 1);
    }

    #[test]
    fn test_pick_records_recent_and_activates() {
        let storage = Storage::new(Arc::new(MemoryStore::new()));
        let recent = RecentSearches::new(storage.clone());
        let active = ActiveLocationStore::new(storage);

        pick_place(&springfield(), &recent, &active).unwrap();

        assert_eq!(recent.list()[0].name, "Springfield");
        assert_eq!(
            active.get(),
            ActiveLocation::Recent {
                coords: Coordinates::new(39.8017, -89.6437),
                label: "Springfield, Illinois, United States".into(),
            }
        );
    }
}
