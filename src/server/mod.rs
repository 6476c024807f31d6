//! HTTP server module.
//!
//! This module exposes the query resolver over a small JSON API. It handles
//! request parsing, maps resolver errors to status codes, and formats
//! responses. All search logic lives in [`crate::query`].
//!
//! # Routes
//!
//! | Method | Path               | Operation                           |
//! |--------|--------------------|-------------------------------------|
//! | GET    | `/health`          | liveness                            |
//! | POST   | `/search`          | [`QueryResolver::search`]           |
//! | POST   | `/search/semantic` | [`QueryResolver::semantic_search`]  |
//! | POST   | `/search/hybrid`   | [`QueryResolver::hybrid_search`]    |
//! | GET    | `/papers/{id}`     | [`QueryResolver::get_by_identifier`] |

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{ApiSettings, DEFAULT_RELEVANCE_THRESHOLD, DEFAULT_SEARCH_LIMIT};
use crate::models::{MetadataFilterSet, Paper, PaperRecord};
use crate::query::{QueryError, QueryResolver, Resolution};
use crate::tier::TierKind;

/// Errors that can occur while serving a request.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid request parameters or body
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Search execution failed
    #[error("Search failed: {0}")]
    SearchError(String),

    /// Bind or listen failure at startup
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

impl From<QueryError> for ServerError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidQuery(message) => ServerError::InvalidRequest(message),
            e @ QueryError::NotFound(_) => ServerError::NotFound(e.to_string()),
            QueryError::ResolutionFailed(message) => ServerError::SearchError(message),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::InvalidRequest(rejection.body_text())
    }
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::SearchError(_) | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Request payload for `POST /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,

    /// Number of results to return (default: 10)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Request payload for `POST /search/semantic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,

    /// Minimum relevance score (default: 0.7)
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

/// Request payload for `POST /search/hybrid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridSearchRequest {
    pub query: String,

    #[serde(default)]
    pub metadata_filters: Option<MetadataFilterSet>,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_threshold() -> f32 {
    DEFAULT_RELEVANCE_THRESHOLD
}

/// A paper as returned to clients.
///
/// `relevance_score` is absent for point lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperDto {
    pub entry_id: String,
    pub title: String,
    pub summary: String,
    pub authors: String,

    /// ISO-8601 date (`YYYY-MM-DD`)
    pub published_date: Option<String>,
    pub pdf_url: Option<String>,
    pub categories: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

impl From<Paper> for PaperDto {
    fn from(paper: Paper) -> Self {
        Self {
            entry_id: paper.entry_id,
            title: paper.title,
            summary: paper.summary,
            authors: paper.authors,
            published_date: paper.published_date.map(|d| d.format("%Y-%m-%d").to_string()),
            pdf_url: paper.pdf_url,
            categories: paper.categories,
            relevance_score: None,
        }
    }
}

impl From<PaperRecord> for PaperDto {
    fn from(record: PaperRecord) -> Self {
        let score = record.relevance_score;
        Self {
            relevance_score: Some(score),
            ..PaperDto::from(record.paper)
        }
    }
}

/// Response payload for all search routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The original query text
    pub query: String,

    /// Results in the answering tier's order
    pub results: Vec<PaperDto>,

    pub total_results: usize,

    /// Tier that produced `results`
    pub source_tier: TierKind,

    /// True when the results are synthetic placeholders
    pub degraded: bool,
}

impl SearchResponse {
    fn new(query: String, resolution: Resolution) -> Self {
        let degraded = resolution.is_synthetic();
        let source_tier = resolution.tier;
        let results: Vec<PaperDto> = resolution.records.into_iter().map(PaperDto::from).collect();
        Self {
            query,
            total_results: results.len(),
            results,
            source_tier,
            degraded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

type AppState = Arc<QueryResolver>;

/// Build the application router around a shared resolver.
pub fn router(resolver: Arc<QueryResolver>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/search/semantic", post(semantic_search))
        .route("/search/hybrid", post(hybrid_search))
        .route("/papers/{entry_id}", get(get_paper))
        .layer(TraceLayer::new_for_http())
        .with_state(resolver)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Academic paper search API is running".to_string(),
    })
}

async fn search(
    State(resolver): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> ServerResult<Json<SearchResponse>> {
    let Json(request) = body?;
    let resolution = resolver.search(&request.query, request.limit).await?;
    Ok(Json(SearchResponse::new(request.query, resolution)))
}

async fn semantic_search(
    State(resolver): State<AppState>,
    body: Result<Json<SemanticSearchRequest>, JsonRejection>,
) -> ServerResult<Json<SearchResponse>> {
    let Json(request) = body?;
    let resolution = resolver
        .semantic_search(&request.query, request.threshold)
        .await?;
    Ok(Json(SearchResponse::new(request.query, resolution)))
}

async fn hybrid_search(
    State(resolver): State<AppState>,
    body: Result<Json<HybridSearchRequest>, JsonRejection>,
) -> ServerResult<Json<SearchResponse>> {
    let Json(request) = body?;
    let resolution = resolver
        .hybrid_search(&request.query, request.metadata_filters, request.limit)
        .await?;
    Ok(Json(SearchResponse::new(request.query, resolution)))
}

async fn get_paper(
    State(resolver): State<AppState>,
    Path(entry_id): Path<String>,
) -> ServerResult<Json<PaperDto>> {
    let paper = resolver.get_by_identifier(&entry_id).await?;
    Ok(Json(PaperDto::from(paper)))
}

/// Open the listener for `settings`. The host may be an address or a name.
pub async fn bind(settings: &ApiSettings) -> ServerResult<TcpListener> {
    let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    Ok(listener)
}

/// Bind to `settings` and serve until Ctrl+C or SIGTERM.
pub async fn serve(settings: &ApiSettings, resolver: Arc<QueryResolver>) -> ServerResult<()> {
    let listener = bind(settings).await?;
    let app = router(resolver);

    info!("Paper search API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Paper search API shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relevance::LEXICAL_MATCH_RELEVANCE;
    use chrono::NaiveDate;

    fn paper() -> Paper {
        Paper {
            entry_id: "2101.00001".to_string(),
            title: "Attention".to_string(),
            summary: "Abstract".to_string(),
            authors: "Alice Smith".to_string(),
            published_date: NaiveDate::from_ymd_opt(2021, 1, 4),
            pdf_url: None,
            categories: "cs.LG".to_string(),
        }
    }

    #[test]
    fn test_request_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"query": "q"}"#).unwrap();
        assert_eq!(req.limit, 10);

        let req: SemanticSearchRequest = serde_json::from_str(r#"{"query": "q"}"#).unwrap();
        assert_eq!(req.threshold, 0.7);

        let req: HybridSearchRequest =
            serde_json::from_str(r#"{"query": "q", "metadata_filters": {"year": 2020}}"#).unwrap();
        assert_eq!(req.metadata_filters.unwrap().min_year, Some(2020));
    }

    #[test]
    fn test_dto_conversion() {
        let dto = PaperDto::from(paper());
        assert_eq!(dto.published_date.as_deref(), Some("2021-01-04"));
        assert!(dto.relevance_score.is_none());
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("relevance_score").is_none());

        let dto = PaperDto::from(PaperRecord::new(paper(), LEXICAL_MATCH_RELEVANCE));
        assert_eq!(dto.relevance_score, Some(LEXICAL_MATCH_RELEVANCE));
    }

    #[test]
    fn test_response_marks_degraded() {
        let resolution = Resolution {
            tier: TierKind::Synthetic,
            records: vec![PaperRecord::new(paper(), 0.95)],
        };
        let response = SearchResponse::new("q".to_string(), resolution);
        assert!(response.degraded);
        assert_eq!(response.total_results, 1);
        assert_eq!(response.source_tier, TierKind::Synthetic);
    }

    #[tokio::test]
    async fn test_bind_resolves_host_names() {
        let settings = ApiSettings {
            host: "localhost".to_string(),
            port: 0,
        };
        let listener = bind(&settings).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());

        let settings = ApiSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        assert!(bind(&settings).await.is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_io_error() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let settings = ApiSettings {
            host: "127.0.0.1".to_string(),
            port: taken.local_addr().unwrap().port(),
        };
        let err = bind(&settings).await.unwrap_err();
        assert!(matches!(err, ServerError::Io(_)));
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (QueryError::InvalidQuery("bad".into()), StatusCode::BAD_REQUEST),
            (QueryError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (QueryError::ResolutionFailed("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).into_response().status(), status);
        }
    }
}
