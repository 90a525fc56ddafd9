//! JSON error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::common::DepositdError;
use crate::directory::DirectoryError;
use crate::processor::ProcessorError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// Handler error; the HTTP status is derived from the error code
#[derive(Debug)]
pub struct ApiError(pub DepositdError);

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self(DepositdError::validation(msg))
    }

    pub fn status(&self) -> StatusCode {
        match self.0.error_code() {
            "VALIDATION_ERROR" | "UNSUPPORTED_CURRENCY" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "DUPLICATE" => StatusCode::CONFLICT,
            "CHAIN_ERROR" => StatusCode::BAD_GATEWAY,
            _ if self.0.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, status = status.as_u16(), "Request failed");
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.error_code(),
        };
        (status, Json(body)).into_response()
    }
}

// Chain failures during address generation surface as 502, not 503
impl From<DirectoryError> for ApiError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::Chain(chain) => Self(DepositdError::Chain(chain)),
            other => Self(DepositdError::Directory(other)),
        }
    }
}

impl From<ProcessorError> for ApiError {
    fn from(e: ProcessorError) -> Self {
        match e {
            ProcessorError::Storage(s) => Self(DepositdError::Storage(s)),
            ProcessorError::Directory(d) => d.into(),
        }
    }
}
