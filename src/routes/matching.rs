use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use uuid::Uuid;

use crate::core::Matcher;
use crate::error::MatchingError;
use crate::models::{CreateMatchingRequest, ErrorResponse, HealthResponse, MatchActionRequest};

/// Header carrying the authenticated actor
pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub matcher: Matcher,
}

/// Configure all matching routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/matching/request", web::post().to(create_request))
        .route("/matching/results/{request_id}", web::get().to(get_results))
        .route("/matching/{match_id}/accept", web::post().to(accept_match))
        .route("/matching/{match_id}/reject", web::post().to(reject_match));
}

fn actor_from_header(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn bad_request(error: &str, message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: error.to_string(),
        message,
        status_code: 400,
    })
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, HttpResponse> {
    Uuid::parse_str(raw).map_err(|_| bad_request("Invalid identifier", format!("'{}' is not a valid {}", raw, what)))
}

/// Map orchestrator errors onto HTTP responses
fn error_response(err: MatchingError) -> HttpResponse {
    let (status, error) = match &err {
        MatchingError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
        MatchingError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
        MatchingError::UpstreamSearch(_) => (StatusCode::BAD_GATEWAY, "Candidate search failed"),
        MatchingError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "Processing timed out"),
        MatchingError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "Record store unavailable"),
    };

    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }

    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message: err.to_string(),
        status_code: status.as_u16(),
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let status = if state.matcher.health_check().await { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Create a matching request
///
/// POST /api/v1/matching/request
///
/// Request body:
/// ```json
/// {
///   "requesterId": "string",
///   "requesterType": "user",
///   "targetType": "team",
///   "strategy": "hybrid",
///   "filters": { "location": [37.5665, 126.978], "radius": 5000, "categories": ["sports"] },
///   "settings": { "distanceWeight": 0.7, "preferenceWeight": 0.3 }
/// }
/// ```
async fn create_request(
    state: web::Data<AppState>,
    body: web::Json<CreateMatchingRequest>,
    http_req: HttpRequest,
) -> impl Responder {
    let actor = actor_from_header(&http_req);

    match state.matcher.create_request(body.into_inner(), actor.as_deref()).await {
        Ok(request) => HttpResponse::Created().json(request),
        Err(e) => error_response(e),
    }
}

/// Poll the results of a matching request
///
/// GET /api/v1/matching/results/{request_id}
async fn get_results(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let request_id = match parse_id(&path, "request id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.matcher.get_results(request_id).await {
        Ok(results) => HttpResponse::Ok().json(results),
        Err(e) => error_response(e),
    }
}

async fn accept_match(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<MatchActionRequest>>,
    http_req: HttpRequest,
) -> impl Responder {
    resolve_match(state, path, body, http_req, true).await
}

async fn reject_match(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<MatchActionRequest>>,
    http_req: HttpRequest,
) -> impl Responder {
    resolve_match(state, path, body, http_req, false).await
}

async fn resolve_match(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<MatchActionRequest>>,
    http_req: HttpRequest,
    accept: bool,
) -> HttpResponse {
    let match_id = match parse_id(&path, "match id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    let actor = body
        .and_then(|b| b.into_inner().actor_id)
        .filter(|id| !id.trim().is_empty())
        .or_else(|| actor_from_header(&http_req));

    let Some(actor) = actor else {
        return bad_request(
            "Validation failed",
            format!("actorId is required in the body or the {} header", ACTOR_HEADER),
        );
    };

    let outcome = if accept {
        state.matcher.accept_match(match_id, &actor).await
    } else {
        state.matcher.reject_match(match_id, &actor).await
    };

    match outcome {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(e) => error_response(e),
    }
}
