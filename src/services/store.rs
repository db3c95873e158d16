//! Contracts consumed from the record store and the geospatial search capability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{EntityType, GeoPoint, Match, MatchStatus, MatchingRequest, RequestStatus};

/// Errors that can occur when talking to the record store or the search capability
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Parameters of a radius search for candidates
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub requester_id: String,
    pub requester_type: EntityType,
    pub target_type: EntityType,
    pub center: GeoPoint,
    pub radius_meters: f64,
    pub categories: Vec<String>,
    /// Exclude candidates this requester previously rejected
    pub negative_filter: bool,
    pub limit: usize,
}

/// Create/read/update access to requests, matches and entity records
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_request(&self, request: &MatchingRequest) -> Result<(), StoreError>;

    async fn get_request(&self, id: Uuid) -> Result<Option<MatchingRequest>, StoreError>;

    async fn update_request_status(&self, id: Uuid, status: RequestStatus) -> Result<(), StoreError>;

    async fn insert_matches(&self, matches: &[Match]) -> Result<(), StoreError>;

    /// Matches of a request ordered by score, highest first
    async fn matches_for_request(&self, request_id: Uuid) -> Result<Vec<Match>, StoreError>;

    /// Move a proposed match to `status`, recording the actor.
    ///
    /// Matches that already left `proposed` are returned unchanged.
    /// Returns `None` when the match does not exist.
    async fn transition_match(
        &self,
        id: Uuid,
        status: MatchStatus,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Match>, StoreError>;

    /// Expire every proposed match whose deadline is before `now`, returning the expired rows
    async fn expire_stale_matches(&self, now: DateTime<Utc>) -> Result<Vec<Match>, StoreError>;

    /// Raw entity record, location still in its stored representation
    async fn fetch_entity(&self, id: &str, entity_type: EntityType) -> Result<Option<Value>, StoreError>;

    /// Bounded, unfiltered scan of an entity table
    async fn scan_entities(&self, entity_type: EntityType, limit: usize) -> Result<Vec<Value>, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError>;
}

/// Radius search over entity records
///
/// Returned records carry `distance` (meters from the query center).
#[async_trait]
pub trait GeoSearch: Send + Sync {
    async fn search_nearby(&self, query: &CandidateQuery) -> Result<Vec<Value>, StoreError>;
}
