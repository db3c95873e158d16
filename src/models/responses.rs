use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::models::domain::{
    EntityType, GeoPoint, Match, MatchMetadata, MatchStatus, MatchableEntity, RequestStatus,
};

/// Display details for one side of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPreview {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

impl EntityPreview {
    pub fn from_entity(entity: &MatchableEntity) -> Self {
        Self {
            id: entity.id.clone(),
            entity_type: entity.entity_type,
            name: entity.profile.label().map(str::to_string),
            avatar_url: entity.profile.avatar_url.clone(),
            location: entity.profile.location,
        }
    }
}

/// A match enriched with both entities' display details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResultView {
    pub id: Uuid,
    pub entity_a: EntityPreview,
    pub entity_b: EntityPreview,
    pub score: f64,
    pub status: MatchStatus,
    pub metadata: MatchMetadata,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MatchResultView {
    pub fn new(record: Match, entity_a: EntityPreview, entity_b: EntityPreview) -> Self {
        Self {
            id: record.id,
            entity_a,
            entity_b,
            score: record.score,
            status: record.status,
            metadata: record.metadata,
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}

/// Response for the results polling endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingResults {
    pub status: RequestStatus,
    pub results: Vec<MatchResultView>,
}

impl MatchingResults {
    /// A status with no results yet
    pub fn pending(status: RequestStatus) -> Self {
        Self {
            status,
            results: Vec::new(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
