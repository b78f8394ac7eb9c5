use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::CuratorError;

/// Body of every error answer: `{exception, status: "ERROR"}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub exception: String,
    pub status: &'static str,
}

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_ACCEPTABLE, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CuratorError> for ApiError {
    fn from(err: CuratorError) -> Self {
        let status = match &err {
            CuratorError::PlanNotFound(_) | CuratorError::NotFound(_) => StatusCode::NOT_FOUND,
            CuratorError::Validation(_) | CuratorError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            CuratorError::AlreadyFinalizing(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                exception: self.message,
                status: "ERROR",
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
