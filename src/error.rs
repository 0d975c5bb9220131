// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Remote service down or unreachable after the gateway's bounded retries.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A create/update whose outcome is unknown. Resolve by re-listing, never by re-creating.
    #[error("Ambiguous write: {0}")]
    AmbiguousWrite(String),

    /// Caller data-integrity error (duplicate key, deleting an absent plan).
    #[error("Plan integrity error: {0}")]
    PlanIntegrity(String),

    #[error("Partial reconciliation failure: {failed} of {total} operations failed")]
    PartialReconciliation { failed: usize, total: usize },

    #[error("Garmin API error: {0}")]
    GarminApi(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether re-issuing the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamUnavailable(_) | AppError::PartialReconciliation { .. }
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::UpstreamUnavailable(msg) => {
                tracing::warn!(error = %msg, "Upstream unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "upstream_unavailable",
                    Some(msg.clone()),
                )
            }
            AppError::AmbiguousWrite(msg) => {
                (StatusCode::BAD_GATEWAY, "ambiguous_write", Some(msg.clone()))
            }
            AppError::PlanIntegrity(msg) => {
                (StatusCode::CONFLICT, "plan_integrity", Some(msg.clone()))
            }
            AppError::PartialReconciliation { .. } => (
                StatusCode::MULTI_STATUS,
                "partial_reconciliation",
                Some(self.to_string()),
            ),
            AppError::GarminApi(msg) => {
                (StatusCode::BAD_GATEWAY, "garmin_error", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
