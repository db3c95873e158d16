use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{
    EntityRef, EntityType, Match, MatchMetadata, MatchStatus, MatchingFilters, MatchingRequest,
    RequestStatus, StrategyKind, StrategySettings,
};
use crate::services::store::{CandidateQuery, GeoSearch, RecordStore, StoreError};

/// PostgreSQL/PostGIS backed record store
///
/// Holds matching requests and matches, reads user and team records, and
/// exposes the `get_candidates_v2` radius search shipped in the migrations.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }
}

fn parse_entity_type(value: &str) -> Result<EntityType, StoreError> {
    EntityType::parse(value).ok_or_else(|| StoreError::InvalidRecord(format!("unknown entity type '{}'", value)))
}

fn request_from_row(row: &PgRow) -> Result<MatchingRequest, StoreError> {
    let requester_type: String = row.try_get("requester_type")?;
    let target_type: String = row.try_get("target_type")?;
    let strategy: String = row.try_get("strategy")?;
    let status: String = row.try_get("status")?;
    let filters: Json<MatchingFilters> = row.try_get("filters")?;
    let settings: Json<StrategySettings> = row.try_get("settings")?;

    Ok(MatchingRequest {
        id: row.try_get("id")?,
        requester_id: row.try_get("requester_id")?,
        requester_type: parse_entity_type(&requester_type)?,
        target_type: parse_entity_type(&target_type)?,
        strategy: StrategyKind::from_identifier(&strategy),
        filters: filters.0,
        settings: settings.0,
        status: RequestStatus::parse(&status)
            .ok_or_else(|| StoreError::InvalidRecord(format!("unknown request status '{}'", status)))?,
        created_at: row.try_get("created_at")?,
    })
}

fn match_from_row(row: &PgRow) -> Result<Match, StoreError> {
    let entity_a_type: String = row.try_get("entity_a_type")?;
    let entity_b_type: String = row.try_get("entity_b_type")?;
    let status: String = row.try_get("status")?;
    let metadata: Option<Json<MatchMetadata>> = row.try_get("metadata")?;

    Ok(Match {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        entity_a: EntityRef {
            id: row.try_get("entity_a_id")?,
            entity_type: parse_entity_type(&entity_a_type)?,
        },
        entity_b: EntityRef {
            id: row.try_get("entity_b_id")?,
            entity_type: parse_entity_type(&entity_b_type)?,
        },
        score: row.try_get("score")?,
        status: MatchStatus::parse(&status)
            .ok_or_else(|| StoreError::InvalidRecord(format!("unknown match status '{}'", status)))?,
        metadata: metadata.map(|m| m.0).unwrap_or_default(),
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: row.try_get("resolved_at")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

/// Entity row as JSON with its location rendered as GeoJSON
fn entity_select(entity_type: EntityType) -> String {
    format!(
        r#"
            SELECT (to_jsonb(e) - 'location')
                || jsonb_build_object('location', ST_AsGeoJSON(e.location)::jsonb) AS record
            FROM {} e
        "#,
        entity_type.table()
    )
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn insert_request(&self, request: &MatchingRequest) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO matching_requests
                (id, requester_id, requester_type, target_type, strategy, filters, settings, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#;

        sqlx::query(query)
            .bind(request.id)
            .bind(&request.requester_id)
            .bind(request.requester_type.as_str())
            .bind(request.target_type.as_str())
            .bind(request.strategy.as_str())
            .bind(Json(&request.filters))
            .bind(Json(&request.settings))
            .bind(request.status.as_str())
            .bind(request.created_at)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Stored matching request {}", request.id);
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<MatchingRequest>, StoreError> {
        let row = sqlx::query("SELECT * FROM matching_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn update_request_status(&self, id: Uuid, status: RequestStatus) -> Result<(), StoreError> {
        let query = r#"
            UPDATE matching_requests
            SET status = $2, updated_at = NOW()
            WHERE id = $1
        "#;

        sqlx::query(query)
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_matches(&self, matches: &[Match]) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO matches
                (id, request_id, entity_a_id, entity_a_type, entity_b_id, entity_b_type,
                 score, status, metadata, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#;

        let mut tx = self.pool.begin().await?;
        for record in matches {
            sqlx::query(query)
                .bind(record.id)
                .bind(record.request_id)
                .bind(&record.entity_a.id)
                .bind(record.entity_a.entity_type.as_str())
                .bind(&record.entity_b.id)
                .bind(record.entity_b.entity_type.as_str())
                .bind(record.score)
                .bind(record.status.as_str())
                .bind(Json(&record.metadata))
                .bind(record.created_at)
                .bind(record.expires_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!("Stored {} matches", matches.len());
        Ok(())
    }

    async fn matches_for_request(&self, request_id: Uuid) -> Result<Vec<Match>, StoreError> {
        let query = r#"
            SELECT *
            FROM matches
            WHERE request_id = $1
            ORDER BY score DESC
        "#;

        let rows = sqlx::query(query).bind(request_id).fetch_all(&self.pool).await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn transition_match(
        &self,
        id: Uuid,
        status: MatchStatus,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Match>, StoreError> {
        let query = r#"
            UPDATE matches
            SET status = $2, resolved_by = $3, resolved_at = $4, updated_at = NOW()
            WHERE id = $1 AND status = 'proposed'
            RETURNING *
        "#;

        let updated = sqlx::query(query)
            .bind(id)
            .bind(status.as_str())
            .bind(actor_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = updated {
            return match_from_row(&row).map(Some);
        }

        let current = sqlx::query("SELECT * FROM matches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        current.as_ref().map(match_from_row).transpose()
    }

    async fn expire_stale_matches(&self, now: DateTime<Utc>) -> Result<Vec<Match>, StoreError> {
        let query = r#"
            UPDATE matches
            SET status = 'expired', updated_at = NOW()
            WHERE status = 'proposed' AND expires_at < $1
            RETURNING *
        "#;

        let rows = sqlx::query(query).bind(now).fetch_all(&self.pool).await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn fetch_entity(&self, id: &str, entity_type: EntityType) -> Result<Option<Value>, StoreError> {
        let query = format!("{} WHERE e.id = $1", entity_select(entity_type));

        let record = sqlx::query_scalar::<_, Value>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn scan_entities(&self, entity_type: EntityType, limit: usize) -> Result<Vec<Value>, StoreError> {
        let query = format!("{} ORDER BY e.id LIMIT $1", entity_select(entity_type));

        let records = sqlx::query_scalar::<_, Value>(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

#[async_trait]
impl GeoSearch for PostgresStore {
    async fn search_nearby(&self, query: &CandidateQuery) -> Result<Vec<Value>, StoreError> {
        let sql = "SELECT * FROM get_candidates_v2($1, $2, $3, $4, $5, $6, $7, $8, $9)";

        let records = sqlx::query_scalar::<_, Value>(sql)
            .bind(&query.requester_id)
            .bind(query.requester_type.as_str())
            .bind(query.target_type.as_str())
            .bind(query.center.lat())
            .bind(query.center.lng())
            .bind(query.radius_meters)
            .bind(&query.categories)
            .bind(query.negative_filter)
            .bind(query.limit as i32)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(
            "Radius search around ({}, {}) within {}m returned {} candidates",
            query.center.lat(),
            query.center.lng(),
            query.radius_meters,
            records.len()
        );

        Ok(records)
    }
}
