use axum::{
    response::{IntoResponse, Response, Json},
    http::StatusCode,
};
use serde_json::json;
use crate::errors::{
    AppError,
    StoreError,
    worker::WorkerError,
};

// The IntoResponse trait implementation converts AppError into a well-formed HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::Upload(_) => StatusCode::BAD_REQUEST,
            AppError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Store(err) => store_status(err),
            AppError::Worker(err) => worker_status(err),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::ConstraintViolation(_) => StatusCode::CONFLICT,
        StoreError::TransactionFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Redis(_) | StoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn worker_status(err: &WorkerError) -> StatusCode {
    match err {
        WorkerError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        WorkerError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
