use chrono::Utc;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;
use validator::Validate;

use crate::config::{MatchingSettings, RuntimeMode};
use crate::error::MatchingError;
use crate::models::{
    CreateMatchingRequest, EntityPreview, EntityRef, Match, MatchResultView, MatchStatus,
    MatchableEntity, MatchingRequest, MatchingResults, RequestStatus,
};
use crate::services::{
    CacheKey, CacheManager, CandidateLocator, EntityResolver, GeoSearch, LocatorOptions, RecordStore,
};

/// Orchestrator tunables
#[derive(Debug, Clone)]
pub struct MatcherOptions {
    pub mode: RuntimeMode,
    /// Lifetime of a proposed match before the sweeper expires it
    pub match_ttl: chrono::Duration,
    /// Deadline for one background processing run
    pub processing_timeout: Duration,
    pub max_concurrent_jobs: usize,
}

impl From<&MatchingSettings> for MatcherOptions {
    fn from(settings: &MatchingSettings) -> Self {
        Self {
            mode: settings.environment,
            match_ttl: settings.match_ttl(),
            processing_timeout: settings.processing_timeout(),
            max_concurrent_jobs: settings.max_concurrent_jobs.max(1),
        }
    }
}

/// How a processing run ended without error
enum PipelineOutcome {
    Matched(usize),
    /// The request had already reached a terminal status and was left alone
    AlreadyFinished(RequestStatus),
}

/// Matching orchestrator
///
/// # Pipeline Stages
/// 1. Accept and persist the request (synchronous)
/// 2. Resolve the requester and locate candidates concurrently
/// 3. Score and rank with the requested strategy
/// 4. Persist proposed matches and mark the request completed
///
/// Stages 2-4 run on a detached task bounded by a job semaphore and a deadline.
#[derive(Clone)]
pub struct Matcher {
    store: Arc<dyn RecordStore>,
    resolver: Arc<EntityResolver>,
    locator: Arc<CandidateLocator>,
    cache: Arc<CacheManager>,
    options: MatcherOptions,
    jobs: Arc<Semaphore>,
}

impl Matcher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        search: Arc<dyn GeoSearch>,
        cache: Arc<CacheManager>,
        settings: &MatchingSettings,
    ) -> Self {
        let resolver = EntityResolver::new(store.clone(), settings.environment, settings.default_point());
        let locator = CandidateLocator::new(store.clone(), search, LocatorOptions::from(settings));
        let options = MatcherOptions::from(settings);

        Self {
            store,
            resolver: Arc::new(resolver),
            locator: Arc::new(locator),
            cache,
            jobs: Arc::new(Semaphore::new(options.max_concurrent_jobs)),
            options,
        }
    }

    /// Accept a matching request and schedule its processing
    ///
    /// `actor_id` stands in for a missing `requesterId`.
    pub async fn create_request(
        &self,
        payload: CreateMatchingRequest,
        actor_id: Option<&str>,
    ) -> Result<MatchingRequest, MatchingError> {
        payload.validate()?;
        let settings = payload.effective_settings();
        settings.validate()?;

        let requester_id = payload
            .requester_id
            .clone()
            .or_else(|| actor_id.map(str::to_string))
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| MatchingError::Validation("requesterId is required".to_string()))?;

        let request = MatchingRequest {
            id: Uuid::new_v4(),
            requester_id,
            requester_type: payload.requester_type,
            target_type: payload.target_type,
            strategy: payload.strategy.unwrap_or_default(),
            filters: payload.filters,
            settings,
            status: RequestStatus::Active,
            created_at: Utc::now(),
        };

        match self.store.insert_request(&request).await {
            Ok(()) => {
                tracing::info!(
                    "Created matching request {} for {} {}",
                    request.id,
                    request.requester_type.as_str(),
                    request.requester_id
                );
                self.spawn_processing(request.id, None);
            }
            Err(e) if self.options.mode.allows_fallback() => {
                tracing::warn!(
                    "Failed to persist matching request {}: {}, processing from memory",
                    request.id,
                    e
                );
                self.spawn_processing(request.id, Some(request.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(request)
    }

    fn spawn_processing(&self, request_id: Uuid, held: Option<MatchingRequest>) {
        let matcher = self.clone();
        tokio::spawn(async move {
            let Ok(_permit) = matcher.jobs.clone().acquire_owned().await else {
                tracing::warn!("Job pool closed, dropping matching request {}", request_id);
                return;
            };
            matcher.process_request(request_id, held).await;
        });
    }

    /// Run the matching pipeline for a request and record its final status
    ///
    /// Failures are logged and recorded as `failed`; they are never retried.
    /// A request that already completed or failed is not processed again.
    pub async fn process_request(&self, request_id: Uuid, held: Option<MatchingRequest>) -> RequestStatus {
        let deadline = self.options.processing_timeout;
        let outcome = tokio::time::timeout(deadline, self.run_pipeline(request_id, held))
            .await
            .unwrap_or(Err(MatchingError::Timeout(deadline)));

        let status = match outcome {
            Ok(PipelineOutcome::AlreadyFinished(status)) => {
                tracing::debug!("Matching request {} is already {}, skipping", request_id, status.as_str());
                return status;
            }
            Ok(PipelineOutcome::Matched(count)) => {
                tracing::info!("Matching request {} completed with {} matches", request_id, count);
                RequestStatus::Completed
            }
            Err(e) => {
                tracing::error!("Matching request {} failed: {}", request_id, e);
                RequestStatus::Failed
            }
        };

        if let Err(e) = self.store.update_request_status(request_id, status).await {
            tracing::warn!("Failed to record status of matching request {}: {}", request_id, e);
        }

        status
    }

    async fn run_pipeline(
        &self,
        request_id: Uuid,
        held: Option<MatchingRequest>,
    ) -> Result<PipelineOutcome, MatchingError> {
        let request = match held {
            Some(request) => request,
            None => self
                .store
                .get_request(request_id)
                .await?
                .ok_or_else(|| MatchingError::NotFound(format!("matching request {}", request_id)))?,
        };

        if request.status.is_terminal() {
            return Ok(PipelineOutcome::AlreadyFinished(request.status));
        }

        let (requester, candidates) = tokio::try_join!(
            self.resolver.resolve(&request.requester_id, request.requester_type),
            self.locator.locate(&request),
        )?;

        let candidates: Vec<MatchableEntity> = candidates
            .into_iter()
            .filter(|candidate| !candidate.is_same(&requester))
            .collect();

        let strategy = request.strategy.resolve();
        tracing::debug!(
            "Scoring {} candidates for request {} with {} strategy",
            candidates.len(),
            request_id,
            strategy.kind().as_str()
        );

        let now = Utc::now();
        let matches: Vec<Match> = strategy
            .execute(&requester, &candidates, &request.settings)
            .into_iter()
            .map(|proposal| Match::from_proposal(request_id, proposal, now, self.options.match_ttl))
            .collect();

        match self.store.insert_matches(&matches).await {
            Ok(()) => {}
            Err(e) if self.options.mode.allows_fallback() => {
                tracing::warn!("Failed to persist matches for request {}: {}, caching results", request_id, e);
                let results = completed_results(&matches, &requester, &candidates);
                if let Err(e) = self.cache.set(&CacheKey::results(request_id), &results).await {
                    tracing::warn!("Failed to cache results for request {}: {}", request_id, e);
                }
            }
            Err(e) => return Err(e.into()),
        }

        Ok(PipelineOutcome::Matched(matches.len()))
    }

    /// Current status and enriched matches of a request
    pub async fn get_results(&self, request_id: Uuid) -> Result<MatchingResults, MatchingError> {
        let key = CacheKey::results(request_id);
        match self.cache.get::<MatchingResults>(&key).await {
            Ok(cached) => {
                tracing::debug!("Serving results for request {} from cache", request_id);
                return Ok(cached);
            }
            Err(e) if e.is_miss() => {}
            Err(e) => tracing::warn!("Cache read failed for {}: {}", key, e),
        }

        let lookup = match self.store.get_request(request_id).await {
            Ok(Some(request)) => self
                .store
                .matches_for_request(request_id)
                .await
                .map(|matches| (request, matches)),
            Ok(None) => return Err(MatchingError::NotFound(format!("matching request {}", request_id))),
            Err(e) => Err(e),
        };

        let (request, matches) = match lookup {
            Ok(found) => found,
            Err(e) if self.options.mode.allows_fallback() => {
                tracing::warn!("Failed to load results for request {}: {}", request_id, e);
                return Ok(MatchingResults::pending(RequestStatus::Active));
            }
            Err(e) => return Err(e.into()),
        };

        let results = MatchingResults {
            status: request.status,
            results: self.enrich(matches).await,
        };

        if request.status == RequestStatus::Completed {
            if let Err(e) = self.cache.set(&key, &results).await {
                tracing::warn!("Failed to cache results for request {}: {}", request_id, e);
            }
        }

        Ok(results)
    }

    async fn enrich(&self, matches: Vec<Match>) -> Vec<MatchResultView> {
        let refs: HashSet<EntityRef> = matches
            .iter()
            .flat_map(|m| [m.entity_a.clone(), m.entity_b.clone()])
            .collect();

        let previews: HashMap<EntityRef, EntityPreview> = join_all(refs.into_iter().map(|entity| async move {
            let preview = self.resolver.describe(&entity.id, entity.entity_type).await;
            (entity, preview)
        }))
        .await
        .into_iter()
        .collect();

        matches
            .into_iter()
            .map(|record| {
                let a = preview_of(&previews, &record.entity_a);
                let b = preview_of(&previews, &record.entity_b);
                MatchResultView::new(record, a, b)
            })
            .collect()
    }

    pub async fn accept_match(&self, match_id: Uuid, actor_id: &str) -> Result<Match, MatchingError> {
        self.resolve_match(match_id, MatchStatus::Accepted, actor_id).await
    }

    pub async fn reject_match(&self, match_id: Uuid, actor_id: &str) -> Result<Match, MatchingError> {
        self.resolve_match(match_id, MatchStatus::Rejected, actor_id).await
    }

    async fn resolve_match(
        &self,
        match_id: Uuid,
        status: MatchStatus,
        actor_id: &str,
    ) -> Result<Match, MatchingError> {
        if actor_id.trim().is_empty() {
            return Err(MatchingError::Validation("actorId is required".to_string()));
        }

        let now = Utc::now();
        let fallback = self.options.mode.allows_fallback();

        match self.store.transition_match(match_id, status, actor_id, now).await {
            Ok(Some(record)) => {
                if record.status != status {
                    tracing::debug!(
                        "Match {} is already {}, ignoring {}",
                        match_id,
                        record.status.as_str(),
                        status.as_str()
                    );
                } else {
                    tracing::info!("Match {} {} by {}", match_id, status.as_str(), actor_id);
                }
                self.invalidate_results(record.request_id).await;
                Ok(record)
            }
            Ok(None) if fallback => {
                tracing::warn!("Match {} not found, returning placeholder", match_id);
                Ok(Match::placeholder(match_id, status, actor_id, now))
            }
            Ok(None) => Err(MatchingError::NotFound(format!("match {}", match_id))),
            Err(e) if fallback => {
                tracing::warn!("Failed to update match {}: {}, returning placeholder", match_id, e);
                Ok(Match::placeholder(match_id, status, actor_id, now))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn invalidate_results(&self, request_id: Uuid) {
        if let Err(e) = self.cache.delete(&CacheKey::results(request_id)).await {
            tracing::warn!("Failed to invalidate results of request {}: {}", request_id, e);
        }
    }

    pub async fn health_check(&self) -> bool {
        match self.store.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                tracing::warn!("Record store health check failed: {}", e);
                false
            }
        }
    }
}

fn preview_of(previews: &HashMap<EntityRef, EntityPreview>, entity: &EntityRef) -> EntityPreview {
    previews.get(entity).cloned().unwrap_or_else(|| EntityPreview {
        id: entity.id.clone(),
        entity_type: entity.entity_type,
        name: None,
        avatar_url: None,
        location: None,
    })
}

/// Results built from in-memory entities when matches could not be stored
fn completed_results(
    matches: &[Match],
    requester: &MatchableEntity,
    candidates: &[MatchableEntity],
) -> MatchingResults {
    let requester_preview = EntityPreview::from_entity(requester);
    let by_id: HashMap<&str, &MatchableEntity> = candidates.iter().map(|c| (c.id.as_str(), c)).collect();

    let results = matches
        .iter()
        .map(|record| {
            let candidate = match by_id.get(record.entity_b.id.as_str()) {
                Some(entity) => EntityPreview::from_entity(entity),
                None => preview_of(&HashMap::new(), &record.entity_b),
            };
            MatchResultView::new(record.clone(), requester_preview.clone(), candidate)
        })
        .collect();

    MatchingResults {
        status: RequestStatus::Completed,
        results,
    }
}
