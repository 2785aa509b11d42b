use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use fieldsync_core::models::SyncConflict;
use fieldsync_core::{BatchResult, ChangeRecord, CompositeSnapshot, EntityView, Scope};
use fieldsync_core::{SyncContext, SyncService};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{
    actor_fingerprint, EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot,
};

pub const ACTOR_HEADER: &str = "x-actor-id";
const DEFAULT_CONFLICT_LIMIT: usize = 50;
const MAX_CONFLICT_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    sync: SyncService,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> fieldsync_core::Result<Self> {
        let sync = SyncService::open_path(&config.database_path, config.busy_timeout)?;
        if sync.database().is_in_memory() {
            tracing::warn!("Sync store is in memory; records are lost on shutdown");
        }
        Ok(Self::new(config, sync))
    }

    pub fn new(config: Arc<AppConfig>, sync: SyncService) -> Self {
        Self {
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(config.as_ref())),
            sync,
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let sync_routes = Router::new()
        .route("/sync/pull", post(pull))
        .route("/sync/livestock", post(pull_livestock))
        .route("/sync/push", post(push))
        .route("/sync/conflicts", get(list_conflicts))
        .route_layer(middleware::from_fn(resolve_actor));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", sync_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot(),
    })
}

/// Turn the optional actor header into an explicit sync context
async fn resolve_actor(mut request: Request, next: Next) -> Result<Response, AppError> {
    let ctx = actor_from_headers(request.headers())?;
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

fn actor_from_headers(headers: &HeaderMap) -> Result<SyncContext, AppError> {
    let Some(value) = headers.get(ACTOR_HEADER) else {
        return Ok(SyncContext::anonymous());
    };
    let actor = value
        .to_str()
        .map_err(|_| AppError::bad_request("X-Actor-Id must be visible ASCII"))?
        .trim();
    if actor.is_empty() {
        return Ok(SyncContext::anonymous());
    }
    if actor.len() > 128 {
        return Err(AppError::bad_request("X-Actor-Id must be at most 128 bytes"));
    }
    Ok(SyncContext::for_actor(actor))
}

fn rate_limit_key(ctx: &SyncContext) -> &str {
    ctx.actor.as_deref().unwrap_or("anonymous")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    #[serde(default)]
    farm_uuids: Vec<Uuid>,
    #[serde(default)]
    livestock_uuids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LivestockRequest {
    #[serde(default)]
    farm_uuids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct ConflictsQuery {
    limit: Option<usize>,
}

fn ensure_scope_size(state: &AppState, count: usize) -> Result<(), AppError> {
    let max = state.config.max_scope_uuids;
    if count > max {
        return Err(AppError::bad_request(format!(
            "scope lists {count} identifiers; the limit is {max}"
        )));
    }
    Ok(())
}

async fn pull(
    State(state): State<AppState>,
    Extension(ctx): Extension<SyncContext>,
    Json(request): Json<PullRequest>,
) -> Result<Json<CompositeSnapshot>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Pull, rate_limit_key(&ctx))
        .await?;
    ensure_scope_size(
        &state,
        request.farm_uuids.len() + request.livestock_uuids.len(),
    )?;

    let scope = Scope::resolve(request.farm_uuids, request.livestock_uuids);
    let snapshot = state.sync.pull(&scope).await;
    tracing::info!(
        endpoint = "sync_pull",
        actor = actor_fingerprint(rate_limit_key(&ctx)),
        farms = scope.farm_uuids().len(),
        livestock = scope.livestock_uuids().len(),
        rows = snapshot.row_count(),
        failed = snapshot.failed_kinds().len(),
        "Served pull"
    );
    Ok(Json(snapshot))
}

async fn pull_livestock(
    State(state): State<AppState>,
    Extension(ctx): Extension<SyncContext>,
    Json(request): Json<LivestockRequest>,
) -> Result<Json<Vec<EntityView>>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Pull, rate_limit_key(&ctx))
        .await?;
    ensure_scope_size(&state, request.farm_uuids.len())?;

    let rows = state.sync.pull_livestock(request.farm_uuids).await?;
    Ok(Json(rows))
}

async fn push(
    State(state): State<AppState>,
    Extension(ctx): Extension<SyncContext>,
    Json(changes): Json<Vec<ChangeRecord>>,
) -> Result<Json<BatchResult>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Push, rate_limit_key(&ctx))
        .await?;
    let max = state.config.max_push_batch;
    if changes.len() > max {
        return Err(AppError::bad_request(format!(
            "push batch holds {} changes; the limit is {max}",
            changes.len()
        )));
    }

    Ok(Json(state.sync.push(&ctx, changes).await))
}

async fn list_conflicts(
    State(state): State<AppState>,
    Query(query): Query<ConflictsQuery>,
) -> Result<Json<Vec<SyncConflict>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_CONFLICT_LIMIT)
        .clamp(1, MAX_CONFLICT_LIMIT);
    Ok(Json(state.sync.list_conflicts(limit).await?))
}
