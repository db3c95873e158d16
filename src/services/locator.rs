use geo::{HaversineDestination, Point};
use serde_json::Value;
use std::sync::Arc;

use crate::config::{MatchingSettings, RuntimeMode};
use crate::error::MatchingError;
use crate::models::{EntityProfile, EntityType, GeoPoint, MatchableEntity, MatchingRequest};
use crate::services::resolver::entity_from_record;
use crate::services::store::{CandidateQuery, GeoSearch, RecordStore};

/// Category assigned to synthetic candidates when the request names none
const SYNTHETIC_CATEGORY: &str = "sports";

/// Tunables of the candidate search
#[derive(Debug, Clone)]
pub struct LocatorOptions {
    pub mode: RuntimeMode,
    pub default_radius_meters: f64,
    pub candidate_limit: usize,
    pub synthetic_candidates: usize,
    pub default_location: GeoPoint,
}

impl From<&MatchingSettings> for LocatorOptions {
    fn from(settings: &MatchingSettings) -> Self {
        Self {
            mode: settings.environment,
            default_radius_meters: settings.default_radius_meters,
            candidate_limit: settings.candidate_limit,
            synthetic_candidates: settings.synthetic_candidates,
            default_location: settings.default_point(),
        }
    }
}

/// Finds candidate entities for a matching request
///
/// Stages:
/// 1. Radius search when the request carries a location
/// 2. Bounded unfiltered scan of the target table
/// 3. Synthetic candidates around the search center (development only)
pub struct CandidateLocator {
    store: Arc<dyn RecordStore>,
    search: Arc<dyn GeoSearch>,
    options: LocatorOptions,
}

impl CandidateLocator {
    pub fn new(store: Arc<dyn RecordStore>, search: Arc<dyn GeoSearch>, options: LocatorOptions) -> Self {
        Self {
            store,
            search,
            options,
        }
    }

    pub async fn locate(&self, request: &MatchingRequest) -> Result<Vec<MatchableEntity>, MatchingError> {
        let fallback = self.options.mode.allows_fallback();

        if let Some(center) = request.filters.location {
            let query = CandidateQuery {
                requester_id: request.requester_id.clone(),
                requester_type: request.requester_type,
                target_type: request.target_type,
                center,
                radius_meters: request.filters.radius.unwrap_or(self.options.default_radius_meters),
                categories: request.filters.categories.clone().unwrap_or_default(),
                negative_filter: request.settings.enable_negative_filter,
                limit: self.options.candidate_limit,
            };

            match self.search.search_nearby(&query).await {
                Ok(records) => {
                    let found = to_entities(records, request.target_type);
                    if !found.is_empty() {
                        tracing::debug!("Radius search found {} candidates for request {}", found.len(), request.id);
                        return Ok(found);
                    }
                    tracing::debug!("Radius search found no candidates for request {}", request.id);
                }
                Err(e) if !fallback => return Err(MatchingError::UpstreamSearch(e.to_string())),
                Err(e) => {
                    tracing::warn!("Radius search failed for request {}: {}", request.id, e);
                }
            }
        }

        match self
            .store
            .scan_entities(request.target_type, self.options.candidate_limit)
            .await
        {
            Ok(records) => {
                let found = to_entities(records, request.target_type);
                if !found.is_empty() {
                    tracing::debug!("Scan of {} found {} candidates", request.target_type.table(), found.len());
                    return Ok(found);
                }
                if !fallback {
                    return Ok(found);
                }
            }
            Err(e) if !fallback => return Err(e.into()),
            Err(e) => {
                tracing::warn!("Scan of {} failed: {}", request.target_type.table(), e);
            }
        }

        tracing::warn!(
            "No {} candidates available, generating {} synthetic candidates",
            request.target_type.as_str(),
            self.options.synthetic_candidates
        );
        Ok(self.synthetic_candidates(request))
    }

    /// Deterministic candidates spread around the search center within the radius
    fn synthetic_candidates(&self, request: &MatchingRequest) -> Vec<MatchableEntity> {
        let center = request.filters.location.unwrap_or(self.options.default_location);
        let origin = Point::new(center.lng(), center.lat());
        let radius = request.filters.radius.unwrap_or(self.options.default_radius_meters);
        let count = self.options.synthetic_candidates;

        let categories = match request.filters.categories.as_deref() {
            Some(wanted) if !wanted.is_empty() => wanted.to_vec(),
            _ => vec![SYNTHETIC_CATEGORY.to_string()],
        };

        (0..count)
            .map(|i| {
                let bearing = i as f64 * 360.0 / count as f64;
                let meters = radius * (i + 1) as f64 / (count + 1) as f64;
                let spot = origin.haversine_destination(bearing, meters);
                let label = format!("Candidate {}", i + 1);

                MatchableEntity {
                    id: format!("candidate-{}", i),
                    entity_type: request.target_type,
                    profile: EntityProfile {
                        location: Some(GeoPoint::new(spot.y(), spot.x())),
                        categories: Some(categories.clone()),
                        average_rating: Some(3.0 + i as f64 * 0.4),
                        display_name: Some(label.clone()),
                        name: Some(label),
                        ..EntityProfile::default()
                    },
                }
            })
            .collect()
    }
}

fn to_entities(records: Vec<Value>, entity_type: EntityType) -> Vec<MatchableEntity> {
    records
        .into_iter()
        .filter_map(|record| match entity_from_record(record, entity_type) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!("Skipping unreadable {} record: {}", entity_type.as_str(), e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distance::distance_between;
    use crate::models::{MatchingFilters, RequestStatus, StrategyKind, StrategySettings};
    use crate::services::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    struct FailingSearch;

    #[async_trait]
    impl GeoSearch for FailingSearch {
        async fn search_nearby(&self, _query: &CandidateQuery) -> Result<Vec<Value>, StoreError> {
            Err(StoreError::Unavailable("search offline".to_string()))
        }
    }

    struct UnreadableSearch;

    #[async_trait]
    impl GeoSearch for UnreadableSearch {
        async fn search_nearby(&self, _query: &CandidateQuery) -> Result<Vec<Value>, StoreError> {
            Ok(vec![json!({ "name": "no id" }), json!("not an object")])
        }
    }

    fn options(mode: RuntimeMode) -> LocatorOptions {
        LocatorOptions {
            mode,
            default_radius_meters: 5_000.0,
            candidate_limit: 50,
            synthetic_candidates: 5,
            default_location: GeoPoint::new(37.5665, 126.9780),
        }
    }

    fn request(location: Option<GeoPoint>, categories: Option<Vec<String>>) -> MatchingRequest {
        MatchingRequest {
            id: Uuid::new_v4(),
            requester_id: "u1".to_string(),
            requester_type: EntityType::User,
            target_type: EntityType::User,
            strategy: StrategyKind::Hybrid,
            filters: MatchingFilters {
                location,
                radius: None,
                categories,
            },
            settings: StrategySettings::default(),
            status: RequestStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn locator(store: Arc<MemoryStore>, mode: RuntimeMode) -> CandidateLocator {
        CandidateLocator::new(store.clone(), store, options(mode))
    }

    #[tokio::test]
    async fn test_radius_search_is_used_when_location_given() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_entity(EntityType::User, json!({ "id": "near", "location": [37.5670, 126.9785] }))
            .await
            .unwrap();
        store
            .insert_entity(EntityType::User, json!({ "id": "far", "location": [35.1796, 129.0756] }))
            .await
            .unwrap();

        let found = locator(store, RuntimeMode::Production)
            .locate(&request(Some(GeoPoint::new(37.5665, 126.9780)), None))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "near");
        assert!(found[0].profile.distance.is_some());
    }

    #[tokio::test]
    async fn test_empty_search_falls_back_to_scan() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_entity(EntityType::User, json!({ "id": "far", "location": [35.1796, 129.0756] }))
            .await
            .unwrap();

        let found = locator(store, RuntimeMode::Production)
            .locate(&request(Some(GeoPoint::new(37.5665, 126.9780)), None))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "far");
        assert!(found[0].profile.distance.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_search_hits_fall_back_to_scan() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_entity(EntityType::User, json!({ "id": "scanned", "location": [37.5670, 126.9785] }))
            .await
            .unwrap();
        let locator = CandidateLocator::new(store, Arc::new(UnreadableSearch), options(RuntimeMode::Production));

        let found = locator
            .locate(&request(Some(GeoPoint::new(37.5665, 126.9780)), None))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "scanned");
    }

    #[tokio::test]
    async fn test_search_error_propagates_in_production() {
        let store = Arc::new(MemoryStore::new());
        let locator = CandidateLocator::new(store, Arc::new(FailingSearch), options(RuntimeMode::Production));

        let result = locator
            .locate(&request(Some(GeoPoint::new(37.5665, 126.9780)), None))
            .await;
        assert!(matches!(result, Err(MatchingError::UpstreamSearch(_))));
    }

    #[tokio::test]
    async fn test_production_never_synthesizes() {
        let store = Arc::new(MemoryStore::new());
        let found = locator(store, RuntimeMode::Production)
            .locate(&request(None, None))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_development_synthesizes_nearby_candidates() {
        let store = Arc::new(MemoryStore::new());
        let locator = CandidateLocator::new(store, Arc::new(FailingSearch), options(RuntimeMode::Development));
        let center = GeoPoint::new(37.5665, 126.9780);

        let found = locator
            .locate(&request(Some(center), Some(vec!["tennis".to_string()])))
            .await
            .unwrap();

        assert_eq!(found.len(), 5);
        for candidate in &found {
            let location = candidate.profile.location.unwrap();
            assert!(distance_between(center, location) <= 5.0);
            assert_eq!(candidate.profile.categories(), ["tennis".to_string()]);
        }
        assert_eq!(found[0].profile.label(), Some("Candidate 1"));
    }

    #[tokio::test]
    async fn test_synthetic_candidates_default_to_sports() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let found = locator(store, RuntimeMode::Development)
            .locate(&request(None, None))
            .await
            .unwrap();

        assert_eq!(found.len(), 5);
        assert!(found.iter().all(|c| c.profile.categories() == [SYNTHETIC_CATEGORY.to_string()]));
    }
}
