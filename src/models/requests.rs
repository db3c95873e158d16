use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::models::domain::{EntityType, MatchingFilters, StrategyKind, StrategySettings};

/// Request to start matching for a requester
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchingRequest {
    /// Filled from the authenticated actor when omitted
    #[validate(length(min = 1))]
    #[serde(default, alias = "requester_id")]
    pub requester_id: Option<String>,
    #[serde(alias = "requester_type")]
    pub requester_type: EntityType,
    #[serde(alias = "target_type")]
    pub target_type: EntityType,
    #[serde(default)]
    pub strategy: Option<StrategyKind>,
    #[validate(nested)]
    #[serde(default)]
    pub filters: MatchingFilters,
    #[serde(default)]
    pub settings: Option<StrategySettings>,
}

impl CreateMatchingRequest {
    /// Settings with defaults applied
    pub fn effective_settings(&self) -> StrategySettings {
        self.settings.unwrap_or_default()
    }
}

/// Body of the accept/reject endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchActionRequest {
    #[serde(default, rename = "actorId", alias = "actor_id")]
    pub actor_id: Option<String>,
}
