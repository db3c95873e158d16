// Core algorithm exports
pub mod distance;
pub mod matcher;
pub mod scoring;
pub mod strategy;
pub mod sweeper;

pub use distance::{calculate_bounding_box, distance_between, haversine_distance, is_within_bounding_box};
pub use matcher::{Matcher, MatcherOptions};
pub use scoring::{calculate_distance_score, calculate_preference_score};
pub use strategy::{DistanceStrategy, HybridStrategy, PreferenceStrategy, ScoringStrategy};
pub use sweeper::{start_scheduler, ExpirySweeper};
