// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    EntityProfile, EntityRef, EntityType, GeoPoint, Match, MatchMetadata, MatchStatus,
    MatchableEntity, MatchingFilters, MatchingRequest, ProposedMatch, RequestStatus, StrategyKind,
    StrategySettings,
};
pub use requests::{CreateMatchingRequest, MatchActionRequest};
pub use responses::{EntityPreview, ErrorResponse, HealthResponse, MatchResultView, MatchingResults};
