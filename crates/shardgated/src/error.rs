//! HTTP error responses for the gateway.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use shardgate_pool::PoolError;
use shardgate_ring::RingError;
use shardgate_router::RouterError;
use shardgate_types::ShardId;

/// Errors returned by gateway handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Nothing stored under the requested partition key.
    #[error("no record for partition key {0}")]
    NotFound(String),

    /// The router failed the request.
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// JSON error body.
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    shard: Option<&'a ShardId>,
}

impl ApiError {
    /// Map to an HTTP status code. Every error kind has one.
    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Router(e) => match e {
                RouterError::Ring(RingError::EmptyRing) => StatusCode::SERVICE_UNAVAILABLE,
                RouterError::Ring(_) => StatusCode::INTERNAL_SERVER_ERROR,
                RouterError::ShardUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                RouterError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                RouterError::StorageWrite { .. } | RouterError::StorageRead { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                RouterError::Pool(PoolError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
                RouterError::Pool(_) | RouterError::InvalidConfig(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Short machine-readable error code.
    pub(crate) fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BadRequest",
            Self::NotFound(_) => "NotFound",
            Self::Router(e) => match e {
                RouterError::Ring(_) => "RingError",
                RouterError::ShardUnavailable { .. } => "ShardUnavailable",
                RouterError::Timeout { .. } => "Timeout",
                RouterError::StorageWrite { .. } => "StorageWrite",
                RouterError::StorageRead { .. } => "StorageRead",
                RouterError::Pool(PoolError::Closed) => "ShuttingDown",
                RouterError::Pool(_) => "PoolError",
                RouterError::InvalidConfig(_) => "InvalidConfig",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let shard = match &self {
            Self::Router(e) => e.shard_id(),
            _ => None,
        };
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            shard,
        };
        (status, Json(body)).into_response()
    }
}
