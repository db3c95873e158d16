//! Periodic expiry of stale proposed matches.
//!
//! ```text
//! Scheduler (hourly)
//!     └─► ExpirySweeper::run_once(now)
//!             ├─► proposed + expires_at < now → expired
//!             └─► drop cached results of every touched request
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::error::MatchingError;
use crate::services::{CacheKey, CacheManager, RecordStore};

pub struct ExpirySweeper {
    store: Arc<dyn RecordStore>,
    cache: Arc<CacheManager>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<CacheManager>) -> Self {
        Self { store, cache }
    }

    /// Expire every proposed match past its deadline; returns how many were expired
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize, MatchingError> {
        let expired = self.store.expire_stale_matches(now).await?;

        let requests: HashSet<Uuid> = expired.iter().map(|m| m.request_id).collect();
        for request_id in requests {
            if let Err(e) = self.cache.delete(&CacheKey::results(request_id)).await {
                tracing::warn!("Failed to invalidate results of request {}: {}", request_id, e);
            }
        }

        if expired.is_empty() {
            tracing::debug!("No stale matches to expire");
        } else {
            tracing::info!("Expired {} stale matches", expired.len());
        }

        Ok(expired.len())
    }
}

/// Start the sweeper on a cron schedule (six fields, seconds first)
pub async fn start_scheduler(
    sweeper: Arc<ExpirySweeper>,
    schedule: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let sweeper = sweeper.clone();
        Box::pin(async move {
            if let Err(e) = sweeper.run_once(Utc::now()).await {
                tracing::error!("Match expiry sweep failed: {}", e);
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!("Match expiry sweeper scheduled ({})", schedule);
    Ok(scheduler)
}
