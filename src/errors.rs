//! Error taxonomy (§7). Kinds that are recoverable become an `AppError`
//! variant returned to the caller; kinds that are "contained" (per-source
//! fetch failures, signature failures) never reach this type — they're
//! swallowed inside the fetch/aggregator loops and logged there instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream provider error: {0}")]
    UpstreamError(String),

    #[error("rate limit wait cancelled: {0}")]
    RateLimitCancelled(String),

    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error("operator {operator} is not assigned to task {task_id}")]
    UnassignedOperator { operator: String, task_id: String },

    #[error("operator {operator} already submitted a response for task {task_id}")]
    DuplicateResponse { operator: String, task_id: String },

    #[error("insufficient operator responses for task {0}")]
    InsufficientResponses(String),

    #[error("insufficient observation quorum for task {0}")]
    InsufficientQuorum(String),

    #[error("claim {0} is outside its policy period")]
    OutOfPolicyPeriod(String),

    #[error("task {0} not found")]
    NotFound(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamError(_) | AppError::RateLimitCancelled(_) => StatusCode::BAD_GATEWAY,
            AppError::DuplicateTaskId(_) => StatusCode::CONFLICT,
            AppError::UnassignedOperator { .. } | AppError::DuplicateResponse { .. } => {
                StatusCode::CONFLICT
            }
            AppError::InsufficientResponses(_) | AppError::InsufficientQuorum(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::OutOfPolicyPeriod(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{}", self);
        }
        (
            status,
            axum::Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
