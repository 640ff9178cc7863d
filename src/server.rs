//! JSON HTTP API over the resolution engine.
//!
//! Each endpoint maps onto one engine operation and returns its
//! [`Lookup`] as `{ "status": "ok" | "no_data", "results": [...] }`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/makes` | All canonical makes |
//! | `GET`  | `/makes/{make_id}/models` | Models of a make that have data |
//! | `GET`  | `/makes/{make_id}/models/{model_id}/years` | Years, newest first |
//! | `GET`  | `/makes/{make_id}/models/{model_id}/years/{year}/parts` | Selectable parts |
//! | `GET`  | `/resolve?year=&make_id=&model_id=&part_id=` | Interchange numbers |
//! | `GET`  | `/makes/{make_id}/tree` | Bulk years + parts for every model |
//!
//! Path and query values are parsed leniently: a value that isn't a number
//! is answered with `no_data`, never a 400. Only infrastructure failures
//! produce an error body:
//!
//! ```json
//! { "error": { "code": "timeout", "message": "get_model timed out after 5000 ms" } }
//! ```
//!
//! Error codes: `store_unavailable` (500), `timeout` (504), `cancelled` (503).
//!
//! # Caching
//!
//! Answers are memoized by the engine. A background task checks the
//! store's data version every `cache.reload_check_ms` and drops the caches
//! once a newer snapshot load or link pass is visible.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser-side picker
//! can call the API directly.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::engine::{parse_year, Engine};
use crate::error::EngineError;
use crate::models::{
    AvailablePart, InterchangeResult, Lookup, Make, ModelSummary, VehicleTree,
};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    engine: Engine,
}

impl AppState {
    /// An engine handle whose store calls stop once the returned guard is
    /// dropped, which happens when the client goes away mid-request.
    fn request_engine(&self) -> (Engine, DropGuard) {
        let token = CancellationToken::new();
        let engine = self.engine.with_cancellation(token.clone());
        (engine, token.drop_guard())
    }
}

/// Starts the HTTP server on `[server].bind` and serves until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = db::open_engine(config).await?;
    engine.refresh_if_stale().await?;
    let refresher = spawn_cache_refresh(
        engine.clone(),
        Duration::from_millis(config.cache.reload_check_ms),
    );
    let app = router(engine);

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Interchange API listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    let served = axum::serve(listener, app).await;
    refresher.abort();
    served?;
    Ok(())
}

/// Polls the store's data version and clears the engine caches whenever an
/// `ixr load` or `ixr link` finishes in another process.
pub fn spawn_cache_refresh(engine: Engine, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = engine.refresh_if_stale().await {
                tracing::warn!(error = %e, "data version check failed");
            }
        }
    })
}

/// Builds the router. Exposed so tests and embedders can serve any store.
pub fn router(engine: Engine) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/makes", get(handle_makes))
        .route("/makes/{make_id}/models", get(handle_models))
        .route("/makes/{make_id}/models/{model_id}/years", get(handle_years))
        .route(
            "/makes/{make_id}/models/{model_id}/years/{year}/parts",
            get(handle_parts),
        )
        .route("/makes/{make_id}/tree", get(handle_tree))
        .route("/resolve", get(handle_resolve))
        .layer(cors)
        .with_state(AppState { engine })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        tracing::warn!(error = %err, code = err.code(), "request failed");
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Picker endpoints ============

async fn handle_makes(State(state): State<AppState>) -> ApiResult<Lookup<Make>> {
    let (engine, _guard) = state.request_engine();
    Ok(Json(Lookup::from_vec(engine.list_makes().await?)))
}

async fn handle_models(
    State(state): State<AppState>,
    Path(make_id): Path<String>,
) -> ApiResult<Lookup<ModelSummary>> {
    let Some(make_id) = parse_id(&make_id) else {
        return Ok(Json(Lookup::NoData));
    };
    let (engine, _guard) = state.request_engine();
    Ok(Json(engine.list_models_for_make(make_id).await?))
}

async fn handle_years(
    State(state): State<AppState>,
    Path((make_id, model_id)): Path<(String, String)>,
) -> ApiResult<Lookup<i32>> {
    let (Some(make_id), Some(model_id)) = (parse_id(&make_id), parse_id(&model_id)) else {
        return Ok(Json(Lookup::NoData));
    };
    let (engine, _guard) = state.request_engine();
    Ok(Json(engine.available_years(make_id, model_id).await?))
}

async fn handle_parts(
    State(state): State<AppState>,
    Path((make_id, model_id, year)): Path<(String, String, String)>,
) -> ApiResult<Lookup<AvailablePart>> {
    let (Some(make_id), Some(model_id), Some(year)) =
        (parse_id(&make_id), parse_id(&model_id), parse_year(&year))
    else {
        return Ok(Json(Lookup::NoData));
    };
    let (engine, _guard) = state.request_engine();
    Ok(Json(engine.available_parts(make_id, model_id, year).await?))
}

async fn handle_resolve(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Lookup<InterchangeResult>> {
    let field = |name: &str| params.get(name).map(String::as_str).unwrap_or("");
    let (Some(year), Some(make_id), Some(model_id), Some(part_id)) = (
        parse_year(field("year")),
        parse_id(field("make_id")),
        parse_id(field("model_id")),
        parse_id(field("part_id")),
    ) else {
        return Ok(Json(Lookup::NoData));
    };
    let (engine, _guard) = state.request_engine();
    Ok(Json(engine.resolve(year, make_id, model_id, part_id).await?))
}

// ============ GET /makes/{make_id}/tree ============

#[derive(Serialize)]
struct TreeResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tree: Option<VehicleTree>,
}

async fn handle_tree(
    State(state): State<AppState>,
    Path(make_id): Path<String>,
) -> ApiResult<TreeResponse> {
    let tree = match parse_id(&make_id) {
        Some(make_id) => {
            let (engine, _guard) = state.request_engine();
            engine.vehicle_tree(make_id).await?
        }
        None => None,
    };
    Ok(Json(TreeResponse {
        status: if tree.is_some() { "ok" } else { "no_data" },
        tree,
    }))
}
