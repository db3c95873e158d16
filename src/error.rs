use std::time::Duration;
use thiserror::Error;

use crate::services::StoreError;

/// Errors surfaced by the matching orchestrator
#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Candidate search failed: {0}")]
    UpstreamSearch(String),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Processing exceeded its {0:?} deadline")]
    Timeout(Duration),
}

impl From<validator::ValidationErrors> for MatchingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        MatchingError::Validation(errors.to_string())
    }
}
