use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Tolerance used when checking that the strategy weights sum to 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

/// Kind of entity that can request or receive a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    User,
    Team,
}

impl EntityType {
    /// Record store table holding entities of this type
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::User => "users",
            EntityType::Team => "teams",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Team => "team",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(EntityType::User),
            "team" => Some(EntityType::Team),
            _ => None,
        }
    }
}

/// Scoring algorithm requested by the client
///
/// `Skill` is reserved and resolves to the distance strategy at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Distance,
    Preference,
    Skill,
    #[default]
    Hybrid,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Distance => "distance",
            StrategyKind::Preference => "preference",
            StrategyKind::Skill => "skill",
            StrategyKind::Hybrid => "hybrid",
        }
    }

    /// Parse a stored strategy identifier.
    ///
    /// Unknown identifiers map to `Distance`, mirroring the dispatch fallback.
    pub fn from_identifier(value: &str) -> Self {
        match value {
            "distance" => StrategyKind::Distance,
            "preference" => StrategyKind::Preference,
            "skill" => StrategyKind::Skill,
            "hybrid" => StrategyKind::Hybrid,
            other => {
                tracing::debug!("Unknown strategy identifier '{}', using distance", other);
                StrategyKind::Distance
            }
        }
    }
}

/// Lifecycle of a matching request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Active,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Active => "active",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(RequestStatus::Active),
            "completed" => Some(RequestStatus::Completed),
            "failed" => Some(RequestStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Active)
    }
}

/// Lifecycle of a single proposed match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Proposed,
    Accepted,
    Rejected,
    Expired,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Proposed => "proposed",
            MatchStatus::Accepted => "accepted",
            MatchStatus::Rejected => "rejected",
            MatchStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "proposed" => Some(MatchStatus::Proposed),
            "accepted" => Some(MatchStatus::Accepted),
            "rejected" => Some(MatchStatus::Rejected),
            "expired" => Some(MatchStatus::Expired),
            _ => None,
        }
    }
}

/// Canonical `[latitude, longitude]` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint(pub f64, pub f64);

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self(lat, lng)
    }

    pub fn lat(&self) -> f64 {
        self.0
    }

    pub fn lng(&self) -> f64 {
        self.1
    }

    /// Normalize a stored location into `[lat, lng]`.
    ///
    /// Accepts a GeoJSON point (`{"type": "Point", "coordinates": [lng, lat]}`)
    /// or a plain `[lat, lng]` array. Anything else yields `None`.
    pub fn from_stored(value: &Value) -> Option<Self> {
        if let Some(coordinates) = value.get("coordinates").and_then(Value::as_array) {
            return match coordinates.as_slice() {
                [lng, lat, ..] => Some(Self(lat.as_f64()?, lng.as_f64()?)),
                _ => None,
            };
        }

        match value.as_array().map(Vec::as_slice) {
            Some([lat, lng]) => Some(Self(lat.as_f64()?, lng.as_f64()?)),
            _ => None,
        }
    }
}

/// Loosely-typed attribute bag attached to every matchable entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityProfile {
    /// Canonical location, filled in by the entity resolver
    #[serde(skip)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    /// Reputation on a 0-10 scale
    #[serde(default, rename = "averageRating", alias = "average_rating")]
    pub average_rating: Option<f64>,
    /// Distance from the requester in meters, precomputed by the candidate search
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub category_match_score: Option<f64>,
    #[serde(default)]
    pub common_categories: Option<Vec<String>>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl EntityProfile {
    /// Category tags, empty when none are stored
    pub fn categories(&self) -> &[String] {
        self.categories.as_deref().unwrap_or(&[])
    }

    /// Best available display name
    pub fn label(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .or(self.username.as_deref())
    }
}

/// A requester or candidate taking part in matching
#[derive(Debug, Clone)]
pub struct MatchableEntity {
    pub id: String,
    pub entity_type: EntityType,
    pub profile: EntityProfile,
}

impl MatchableEntity {
    pub fn reference(&self) -> EntityRef {
        EntityRef {
            id: self.id.clone(),
            entity_type: self.entity_type,
        }
    }

    pub fn is_same(&self, other: &MatchableEntity) -> bool {
        self.id == other.id && self.entity_type == other.entity_type
    }
}

/// Identity of one side of a match
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

/// Search filters supplied with a matching request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct MatchingFilters {
    #[serde(default)]
    pub location: Option<GeoPoint>,
    /// Search radius in meters
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub radius: Option<f64>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

/// Per-request tuning of the scoring strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
#[validate(schema(function = "validate_weight_sum", skip_on_field_errors = false))]
pub struct StrategySettings {
    pub use_distance: bool,
    pub use_preference: bool,
    #[validate(range(min = 0.0, max = 1.0))]
    pub distance_weight: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub preference_weight: f64,
    pub enable_explanation: bool,
    pub enable_negative_filter: bool,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            use_distance: true,
            use_preference: true,
            distance_weight: 0.7,
            preference_weight: 0.3,
            enable_explanation: true,
            enable_negative_filter: true,
        }
    }
}

impl StrategySettings {
    /// Weights applied by the hybrid strategy; a disabled component weighs 0.
    pub fn effective_weights(&self) -> (f64, f64) {
        let distance = if self.use_distance { self.distance_weight } else { 0.0 };
        let preference = if self.use_preference { self.preference_weight } else { 0.0 };
        (distance, preference)
    }
}

fn validate_weight_sum(settings: &StrategySettings) -> Result<(), ValidationError> {
    if settings.use_distance && settings.use_preference {
        let sum = settings.distance_weight + settings.preference_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            let mut error = ValidationError::new("weight_sum");
            error.message = Some("distanceWeight and preferenceWeight must sum up to 1.0".into());
            return Err(error);
        }
    }
    Ok(())
}

/// A submitted matching request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingRequest {
    pub id: Uuid,
    pub requester_id: String,
    pub requester_type: EntityType,
    pub target_type: EntityType,
    pub strategy: StrategyKind,
    pub filters: MatchingFilters,
    pub settings: StrategySettings,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Rationale attached to a match by the scoring strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference_match: Option<f64>,
}

/// Ranked strategy output before it is bound to a request
#[derive(Debug, Clone)]
pub struct ProposedMatch {
    pub entity_a: EntityRef,
    pub entity_b: EntityRef,
    pub score: f64,
    pub metadata: MatchMetadata,
}

/// A persisted match between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: Uuid,
    pub request_id: Uuid,
    pub entity_a: EntityRef,
    pub entity_b: EntityRef,
    pub score: f64,
    pub status: MatchStatus,
    pub metadata: MatchMetadata,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Match {
    /// Bind a strategy proposal to its request
    pub fn from_proposal(
        request_id: Uuid,
        proposal: ProposedMatch,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            entity_a: proposal.entity_a,
            entity_b: proposal.entity_b,
            score: proposal.score.clamp(0.0, 100.0),
            status: MatchStatus::Proposed,
            metadata: proposal.metadata,
            resolved_by: None,
            resolved_at: None,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// Stand-in returned when accept/reject targets an unknown match id
    pub fn placeholder(id: Uuid, status: MatchStatus, actor_id: &str, at: DateTime<Utc>) -> Self {
        let unknown = EntityRef {
            id: String::new(),
            entity_type: EntityType::User,
        };
        Self {
            id,
            request_id: Uuid::nil(),
            entity_a: unknown.clone(),
            entity_b: unknown,
            score: 0.0,
            status,
            metadata: MatchMetadata::default(),
            resolved_by: Some(actor_id.to_string()),
            resolved_at: Some(at),
            created_at: at,
            expires_at: at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == MatchStatus::Proposed && self.expires_at < now
    }
}
