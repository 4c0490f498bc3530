//! HTTP gateway: a thin adapter from requests to [`Router`] calls.
//!
//! Routes:
//!
//! - `POST /?url=<url>`: store the URL, keyed by itself
//! - `GET /{partition_key}`: look up a stored URL
//! - `POST /records/{key}`: store the raw request body under `key`
//! - `GET /records/{partition_key}`: fetch a raw record body
//! - `GET /health`: liveness and ring summary
//!
//! Partition keys are standard base64 and may contain `/` or `+`. Clients
//! must percent-encode them in the path (`/` as `%2F`); an unencoded `/`
//! splits the segment and no route matches.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use shardgate_router::{ReadOutcome, Router};
use shardgate_types::{PartitionKey, ShardId};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::error::ApiError;

/// Header naming the shard that served a raw record.
const SHARD_HEADER: &str = "x-shard-id";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
}

/// Build the axum application.
pub fn app(router: Arc<Router>) -> axum::Router {
    axum::Router::new()
        .route("/", post(write_url))
        .route("/health", get(health))
        .route("/records/{key}", post(write_record).get(read_record))
        .route("/{partition_key}", get(read_url))
        .with_state(AppState { router })
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app: axum::Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

// -----------------------------------------------------------------------
// URL shortener routes
// -----------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct UrlParams {
    url: Option<String>,
}

/// Response body for URL writes and reads.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct UrlResponse {
    pub partition_key: PartitionKey,
    pub url: String,
    pub shard: ShardId,
}

async fn write_url(
    State(state): State<AppState>,
    Query(params): Query<UrlParams>,
) -> Result<Json<UrlResponse>, ApiError> {
    let url = params
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing `url` query parameter".into()))?;

    let receipt = state.router.write(&url, url.clone().into_bytes()).await?;
    info!(
        shard_id = %receipt.shard_id,
        partition_key = %receipt.partition_key,
        "stored url"
    );

    Ok(Json(UrlResponse {
        partition_key: receipt.partition_key,
        url,
        shard: receipt.shard_id,
    }))
}

async fn read_url(
    State(state): State<AppState>,
    Path(partition_key): Path<String>,
) -> Result<Json<UrlResponse>, ApiError> {
    let partition_key = PartitionKey::new(partition_key);
    match state.router.read_located(&partition_key).await? {
        (shard, ReadOutcome::Found(record)) => Ok(Json(UrlResponse {
            partition_key,
            url: record.entity_key,
            shard,
        })),
        (_, ReadOutcome::NotFound) => Err(ApiError::NotFound(partition_key.to_string())),
    }
}

// -----------------------------------------------------------------------
// Raw record routes
// -----------------------------------------------------------------------

/// Response body for raw record writes.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WriteResponse {
    pub partition_key: PartitionKey,
    pub shard: ShardId,
}

async fn write_record(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    let size = body.len();
    let receipt = state.router.write(&key, body).await?;
    debug!(
        shard_id = %receipt.shard_id,
        partition_key = %receipt.partition_key,
        size,
        "stored record"
    );

    Ok((
        StatusCode::CREATED,
        Json(WriteResponse {
            partition_key: receipt.partition_key,
            shard: receipt.shard_id,
        }),
    ))
}

async fn read_record(
    State(state): State<AppState>,
    Path(partition_key): Path<String>,
) -> Result<Response, ApiError> {
    let partition_key = PartitionKey::new(partition_key);
    match state.router.read_located(&partition_key).await? {
        (shard, ReadOutcome::Found(record)) => {
            let mut response = record.value.into_response();
            if let Ok(value) = HeaderValue::from_str(shard.as_str()) {
                response.headers_mut().insert(SHARD_HEADER, value);
            }
            Ok(response)
        }
        (_, ReadOutcome::NotFound) => Err(ApiError::NotFound(partition_key.to_string())),
    }
}

// -----------------------------------------------------------------------
// Health
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct HealthResponse {
    pub status: String,
    pub shards: Vec<ShardId>,
    pub vnodes: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let ring = state.router.ring().snapshot();
    let status = if state.router.pool().is_closed() {
        "closing"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status: status.to_string(),
        shards: ring.shard_ids(),
        vnodes: ring.vnode_count(),
    })
}
