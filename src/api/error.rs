//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::blob_store::BlobError;
use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::export::ExportError;
use crate::pipeline::blueprint::AnalyzeError;
use crate::pipeline::practice::SessionError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// Body of a 422 after a failed ingest. The admin sees the reason verbatim.
#[derive(Debug, Serialize)]
pub struct IngestFailureBody {
    pub paper_id: Uuid,
    pub status: &'static str,
    pub reason: String,
    pub error: ErrorDetail,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Upload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("{message}")]
    Conflict { code: &'static str, message: String },
    #[error("{message}")]
    Unprocessable { code: &'static str, message: String },
    #[error("Ingestion of {paper_id} failed: {reason}")]
    IngestFailed { paper_id: Uuid, reason: String },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::PayloadTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!("Upload exceeds the {limit} byte limit"),
            ),
            ApiError::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            ApiError::Unprocessable { code, message } => {
                (StatusCode::UNPROCESSABLE_ENTITY, code, message)
            }
            ApiError::IngestFailed { paper_id, reason } => {
                let body = IngestFailureBody {
                    paper_id,
                    status: "FAILED",
                    error: ErrorDetail {
                        code: "INGEST_FAILED",
                        message: reason.clone(),
                    },
                    reason,
                };
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                ApiError::NotFound(format!("{entity_type} {id}"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {err}"))
    }
}

impl From<AnalyzeError> for ApiError {
    fn from(err: AnalyzeError) -> Self {
        match err {
            AnalyzeError::InsufficientHistory { .. } => ApiError::Unprocessable {
                code: "INSUFFICIENT_HISTORY",
                message: err.to_string(),
            },
            AnalyzeError::NoRecurringStructure => ApiError::Unprocessable {
                code: "NO_RECURRING_STRUCTURE",
                message: err.to_string(),
            },
            AnalyzeError::Database(e) => e.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadyActive(_) => ApiError::Conflict {
                code: "SESSION_ACTIVE",
                message: err.to_string(),
            },
            SessionError::Expired => ApiError::Conflict {
                code: "SESSION_EXPIRED",
                message: err.to_string(),
            },
            SessionError::Closed => ApiError::Conflict {
                code: "SESSION_CLOSED",
                message: err.to_string(),
            },
            SessionError::NotFound(detail) => ApiError::NotFound(detail),
            SessionError::UnknownQuestion(_) | SessionError::InvalidRequest(_) => {
                ApiError::BadRequest(err.to_string())
            }
            SessionError::Database(e) => e.into(),
        }
    }
}

/// Parse a path id, rejecting malformed values with 400.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid {what} id: {raw}")))
}
