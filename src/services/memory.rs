use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::distance::{calculate_bounding_box, distance_between, is_within_bounding_box};
use crate::models::{EntityType, GeoPoint, Match, MatchStatus, MatchingRequest, RequestStatus};
use crate::services::store::{CandidateQuery, GeoSearch, RecordStore, StoreError};

#[derive(Default)]
struct MemoryState {
    requests: HashMap<Uuid, MatchingRequest>,
    matches: HashMap<Uuid, Match>,
    entities: HashMap<EntityType, BTreeMap<String, Value>>,
}

/// In-process record store
///
/// Backs development runs without a database and the test suites. Entity
/// records are kept as JSON in the same shape the database returns them.
/// `set_offline(true)` makes every call fail with `StoreError::Unavailable`.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going away (or coming back)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    /// Add or replace an entity record; the record must carry a string `id`
    pub async fn insert_entity(&self, entity_type: EntityType, record: Value) -> Result<(), StoreError> {
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::InvalidRecord("entity record without an id".to_string()))?;

        let mut state = self.state.write().await;
        state.entities.entry(entity_type).or_default().insert(id, record);
        Ok(())
    }

    /// Look up a single match by id
    pub async fn get_match(&self, id: Uuid) -> Option<Match> {
        self.state.read().await.matches.get(&id).cloned()
    }

    /// Insert a match as-is, bypassing the proposal pipeline
    pub async fn put_match(&self, record: Match) {
        self.state.write().await.matches.insert(record.id, record);
    }
}

fn has_any_category(record: &Value, wanted: &[String]) -> bool {
    record
        .get("categories")
        .and_then(Value::as_array)
        .map(|stored| {
            stored
                .iter()
                .filter_map(Value::as_str)
                .any(|category| wanted.iter().any(|w| w == category))
        })
        .unwrap_or(false)
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_request(&self, request: &MatchingRequest) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.state.write().await.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<MatchingRequest>, StoreError> {
        self.ensure_online()?;
        Ok(self.state.read().await.requests.get(&id).cloned())
    }

    async fn update_request_status(&self, id: Uuid, status: RequestStatus) -> Result<(), StoreError> {
        self.ensure_online()?;
        if let Some(request) = self.state.write().await.requests.get_mut(&id) {
            request.status = status;
        }
        Ok(())
    }

    async fn insert_matches(&self, matches: &[Match]) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        for record in matches {
            state.matches.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn matches_for_request(&self, request_id: Uuid) -> Result<Vec<Match>, StoreError> {
        self.ensure_online()?;
        let state = self.state.read().await;
        let mut found: Vec<Match> = state
            .matches
            .values()
            .filter(|m| m.request_id == request_id)
            .cloned()
            .collect();

        found.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(found)
    }

    async fn transition_match(
        &self,
        id: Uuid,
        status: MatchStatus,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Match>, StoreError> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        let Some(record) = state.matches.get_mut(&id) else {
            return Ok(None);
        };

        if record.status == MatchStatus::Proposed {
            record.status = status;
            record.resolved_by = Some(actor_id.to_string());
            record.resolved_at = Some(at);
        }

        Ok(Some(record.clone()))
    }

    async fn expire_stale_matches(&self, now: DateTime<Utc>) -> Result<Vec<Match>, StoreError> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        let mut expired = Vec::new();

        for record in state.matches.values_mut() {
            if record.is_expired_at(now) {
                record.status = MatchStatus::Expired;
                expired.push(record.clone());
            }
        }

        Ok(expired)
    }

    async fn fetch_entity(&self, id: &str, entity_type: EntityType) -> Result<Option<Value>, StoreError> {
        self.ensure_online()?;
        let state = self.state.read().await;
        Ok(state.entities.get(&entity_type).and_then(|table| table.get(id)).cloned())
    }

    async fn scan_entities(&self, entity_type: EntityType, limit: usize) -> Result<Vec<Value>, StoreError> {
        self.ensure_online()?;
        let state = self.state.read().await;
        Ok(state
            .entities
            .get(&entity_type)
            .map(|table| table.values().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(!self.offline.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl GeoSearch for MemoryStore {
    async fn search_nearby(&self, query: &CandidateQuery) -> Result<Vec<Value>, StoreError> {
        self.ensure_online()?;
        let state = self.state.read().await;

        let Some(table) = state.entities.get(&query.target_type) else {
            return Ok(Vec::new());
        };

        let rejected: HashSet<&str> = if query.negative_filter {
            state
                .matches
                .values()
                .filter(|m| {
                    m.status == MatchStatus::Rejected
                        && m.entity_a.id == query.requester_id
                        && m.entity_a.entity_type == query.requester_type
                        && m.entity_b.entity_type == query.target_type
                })
                .map(|m| m.entity_b.id.as_str())
                .collect()
        } else {
            HashSet::new()
        };

        let bbox = calculate_bounding_box(query.center.lat(), query.center.lng(), query.radius_meters / 1000.0);
        let is_requester = |id: &str| query.target_type == query.requester_type && id == query.requester_id;

        let mut found: Vec<(f64, Value)> = table
            .iter()
            .filter(|(id, _)| !is_requester(id) && !rejected.contains(id.as_str()))
            .filter_map(|(_, record)| {
                let point = record.get("location").and_then(GeoPoint::from_stored)?;
                if !is_within_bounding_box(point, &bbox) {
                    return None;
                }

                let meters = distance_between(query.center, point) * 1000.0;
                if meters > query.radius_meters {
                    return None;
                }

                if !query.categories.is_empty() && !has_any_category(record, &query.categories) {
                    return None;
                }

                let mut hit = record.clone();
                hit.as_object_mut()?.insert("distance".to_string(), Value::from(meters));
                Some((meters, hit))
            })
            .collect();

        found.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        found.truncate(query.limit);

        Ok(found.into_iter().map(|(_, record)| record).collect())
    }
}
