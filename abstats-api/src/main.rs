//! abstats API Server
//!
//! Event ingestion and on-demand A/B analysis over HTTP. Every analysis
//! endpoint recomputes from the stored events of one experiment.
//!
//! # Usage
//!
//! ```bash
//! # Start the API server (default 127.0.0.1:8000, ~/.abstats/events.db)
//! abstats-api
//!
//! # Custom database and origin allow-list
//! abstats-api --db ./events.db --allowed-origins http://localhost:8080,http://localhost:1313
//! ```
//!
//! # Endpoints
//!
//! - `GET /api/health` - Health check
//! - `POST /api/track` - Record one event
//! - `GET /api/stats` - Full experiment report
//! - `GET /api/user_percentile` - Percentile rank of a completion time
//! - `GET /api/funnel_chart` - Funnel chart data
//! - `GET /api/time_distribution` - Completion-time samples per variant
//! - `GET /api/comparison_charts` - Success-rate and average-time bar data

use abstats_engine::analysis::{ExperimentAnalyzer, Report};
use abstats_engine::dataset::parse_timestamp;
use abstats_engine::errors::{AnalysisError, AnalysisResult};
use abstats_engine::store::{RawEvent, SqliteEventStore, TrackRequest};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
struct AppState {
    store: Arc<SqliteEventStore>,
}

impl AppState {
    fn new(store: SqliteEventStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Run one analysis on the blocking pool and fold data conditions into a report
    async fn analyze<T, F>(&self, experiment_id: String, run: F) -> Result<Json<Report<T>>, ApiError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(&ExperimentAnalyzer<'_>) -> AnalysisResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || {
            let analyzer = ExperimentAnalyzer::new(&*store, experiment_id);
            run(&analyzer)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Analysis task failed: {e}")))?;

        Ok(Json(Report::from_result(result)?))
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    database: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct ExperimentQuery {
    experiment_id: Option<String>,
}

impl ExperimentQuery {
    fn require(self) -> Result<String, ApiError> {
        require_experiment_id(self.experiment_id)
    }
}

#[derive(Debug, Deserialize)]
struct PercentileQuery {
    experiment_id: Option<String>,
    user_time: Option<f64>,
    variant: Option<String>,
}

#[derive(Debug, Serialize)]
struct TrackResponse {
    data: Vec<RawEvent>,
}

#[derive(Debug, Serialize)]
struct ChartResponse<T> {
    chart: T,
}

fn require_experiment_id(experiment_id: Option<String>) -> Result<String, ApiError> {
    match experiment_id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(ApiError::BadRequest("experiment_id is required".to_string())),
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError::Internal(err.message)
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                warn!("Request failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: state.store.path().display().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn track_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Report<TrackResponse>>, ApiError> {
    let request = match parse_track_request(&body) {
        Ok(request) => request,
        Err(message) => return Ok(Json(Report::Error { message })),
    };

    let store = Arc::clone(&state.store);
    let stored = tokio::task::spawn_blocking(move || store.record_event(&request))
        .await
        .map_err(|e| ApiError::Internal(format!("Insert task failed: {e}")))?
        .map_err(|e| ApiError::Internal(format!("Failed to record event: {e:#}")))?;

    info!(
        "Tracked {} event for experiment {}",
        stored.action_type.as_deref().unwrap_or("unknown"),
        stored.experiment_id
    );

    Ok(Json(Report::Success(TrackResponse { data: vec![stored] })))
}

fn parse_track_request(body: &[u8]) -> Result<TrackRequest, String> {
    let value: Value = serde_json::from_slice(body).map_err(|e| format!("Invalid JSON body: {e}"))?;
    if !value.is_object() {
        return Err("Request body must be a JSON object".to_string());
    }
    let request: TrackRequest =
        serde_json::from_value(value).map_err(|e| format!("Invalid event: {e}"))?;
    if request
        .experiment_id
        .as_deref()
        .map_or(true, |id| id.trim().is_empty())
    {
        return Err("experiment_id is required".to_string());
    }
    if let Some(ts) = request.timestamp.as_deref() {
        if parse_timestamp(ts).is_none() {
            return Err(format!("Unparsable timestamp '{ts}'"));
        }
    }
    Ok(request)
}

async fn get_stats(
    State(state): State<AppState>,
    Query(params): Query<ExperimentQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let experiment_id = params.require()?;
    state.analyze(experiment_id, |analyzer| analyzer.analyze()).await
}

async fn get_user_percentile(
    State(state): State<AppState>,
    Query(params): Query<PercentileQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let experiment_id = require_experiment_id(params.experiment_id)?;
    let user_time = params
        .user_time
        .ok_or_else(|| ApiError::BadRequest("user_time is required".to_string()))?;
    let variant = params
        .variant
        .ok_or_else(|| ApiError::BadRequest("variant is required".to_string()))?;

    state
        .analyze(experiment_id, move |analyzer| {
            analyzer.user_percentile(user_time, &variant)
        })
        .await
}

async fn get_funnel_chart(
    State(state): State<AppState>,
    Query(params): Query<ExperimentQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let experiment_id = params.require()?;
    state
        .analyze(experiment_id, |analyzer| {
            analyzer.funnel_chart().map(|chart| ChartResponse { chart })
        })
        .await
}

async fn get_time_distribution(
    State(state): State<AppState>,
    Query(params): Query<ExperimentQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let experiment_id = params.require()?;
    state
        .analyze(experiment_id, |analyzer| {
            analyzer.time_distribution().map(|chart| ChartResponse { chart })
        })
        .await
}

async fn get_comparison_charts(
    State(state): State<AppState>,
    Query(params): Query<ExperimentQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let experiment_id = params.require()?;
    state
        .analyze(experiment_id, |analyzer| analyzer.comparison_charts())
        .await
}

// ============================================================================
// Router Setup
// ============================================================================

/// Any origin when the allow-list is empty
fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return Ok(cors.allow_origin(Any));
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            origin
                .trim()
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid allowed origin '{origin}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(cors.allow_origin(AllowOrigin::list(origins)))
}

fn create_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/track", post(track_event))
        .route("/api/stats", get(get_stats))
        .route("/api/user_percentile", get(get_user_percentile))
        .route("/api/funnel_chart", get(get_funnel_chart))
        .route("/api/time_distribution", get(get_time_distribution))
        .route("/api/comparison_charts", get(get_comparison_charts))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "abstats-api")]
#[command(about = "A/B experiment statistics API server", long_about = None)]
struct Args {
    /// Event database (defaults to ~/.abstats/events.db)
    #[arg(long, env = "ABSTATS_DB")]
    db: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "ABSTATS_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "ABSTATS_PORT", default_value_t = 8000)]
    port: u16,

    /// Comma-separated CORS origins; any origin when empty
    #[arg(long, env = "ABSTATS_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let db_path = match args.db {
        Some(path) => path,
        None => abstats_engine::default_db_path()?,
    };
    let store = SqliteEventStore::new(&db_path)
        .with_context(|| format!("Failed to open event database {}", db_path.display()))?;

    let app = create_router(AppState::new(store), cors_layer(&args.allowed_origins)?);

    let addr = SocketAddr::new(args.host, args.port);
    info!(
        "Starting abstats API server on http://{} with database {}",
        addr,
        db_path.display()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
