//! Matching Core - matching orchestration and scoring engine
//!
//! Pairs users and teams by proximity, shared interests or a weighted blend
//! of both. Requests are accepted synchronously and processed on a bounded
//! background pool; proposed matches expire unless accepted or rejected.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{Matcher, ScoringStrategy, distance::{haversine_distance, calculate_bounding_box}};
pub use error::MatchingError;
pub use models::{CreateMatchingRequest, Match, MatchableEntity, MatchingRequest, MatchingResults, StrategyKind, StrategySettings};
