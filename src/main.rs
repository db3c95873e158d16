use actix_cors::Cors;
use actix_web::{web, App, HttpServer, HttpResponse, middleware, error, http::StatusCode};
use matching_core::config::{LoggingSettings, Settings};
use matching_core::core::{start_scheduler, ExpirySweeper, Matcher};
use matching_core::routes::{self, AppState};
use matching_core::services::{CacheManager, GeoSearch, MemoryStore, PostgresStore, RecordStore};
use std::sync::Arc;
use tracing::{info, warn, error};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

/// Install the global subscriber; `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match logging.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "compact" => subscriber.compact().init(),
        _ => subscriber.json().init(),
    }
}

fn io_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::load().map_err(|e| io_error("Configuration error", e))?;

    init_tracing(&settings.logging);

    info!("Starting matching service...");
    info!("Configuration loaded ({:?} mode)", settings.matching.environment);

    let fallback = settings.matching.environment.allows_fallback();

    // Record store: PostgreSQL, or the in-process store outside production
    let postgres = match &settings.database.url {
        Some(url) => match PostgresStore::from_settings(
            url,
            settings.database.max_connections,
            settings.database.min_connections,
            settings.database.acquire_timeout_secs,
            settings.database.idle_timeout_secs,
        )
        .await
        {
            Ok(store) => Some(Arc::new(store)),
            Err(e) if fallback => {
                warn!("Failed to connect to PostgreSQL ({}), using in-memory store", e);
                None
            }
            Err(e) => {
                error!("Failed to connect to PostgreSQL: {}", e);
                return Err(io_error("PostgreSQL connection error", e));
            }
        },
        None if fallback => {
            warn!("No database configured, using in-memory store");
            None
        }
        None => return Err(io_error("Configuration error", "database.url is required in production")),
    };

    let (store, search): (Arc<dyn RecordStore>, Arc<dyn GeoSearch>) = match postgres {
        Some(pg) => {
            info!("PostgreSQL store initialized");
            let store: Arc<dyn RecordStore> = pg.clone();
            let search: Arc<dyn GeoSearch> = pg;
            (store, search)
        }
        None => {
            let memory = Arc::new(MemoryStore::new());
            let store: Arc<dyn RecordStore> = memory.clone();
            let search: Arc<dyn GeoSearch> = memory;
            (store, search)
        }
    };

    // Cache: Redis-backed when reachable, in-process otherwise
    let cache_ttl = settings.cache.ttl_secs;
    let l1_cache_size = settings.cache.l1_cache_size;

    let cache = match &settings.cache.redis_url {
        Some(url) => match CacheManager::new(url, l1_cache_size, cache_ttl).await {
            Ok(c) => {
                info!("Cache manager initialized (L1: {} entries, TTL: {}s)", l1_cache_size, cache_ttl);
                c
            }
            Err(e) => {
                warn!("Failed to connect to Redis ({}), caching in-process only", e);
                CacheManager::local(l1_cache_size, cache_ttl)
            }
        },
        None => {
            info!("No Redis configured, caching in-process only (TTL: {}s)", cache_ttl);
            CacheManager::local(l1_cache_size, cache_ttl)
        }
    };
    let cache = Arc::new(cache);

    let matcher = Matcher::new(store.clone(), search, cache.clone(), &settings.matching);

    info!(
        "Matcher initialized (max {} concurrent jobs, {}s deadline)",
        settings.matching.max_concurrent_jobs, settings.matching.processing_timeout_secs
    );

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = if settings.sweeper.enabled {
        let sweeper = Arc::new(ExpirySweeper::new(store, cache));
        match start_scheduler(sweeper, &settings.sweeper.schedule).await {
            Ok(scheduler) => Some(scheduler),
            Err(e) => {
                error!("Failed to start expiry sweeper: {}", e);
                return Err(io_error("Scheduler error", e));
            }
        }
    } else {
        info!("Expiry sweeper disabled");
        None
    };

    // Build application state
    let app_state = AppState { matcher };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
