use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::errors::Error;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Busy,
    Unprocessable(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Busy => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let (error_kind, message) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg),
            ApiError::Busy => ("busy", Error::Busy.to_string()),
            ApiError::Unprocessable(msg) => ("unprocessable", msg),
            ApiError::BadGateway(msg) => ("store_error", msg),
            ApiError::Internal(msg) => ("internal_error", msg),
        };

        (status, Json(ErrorBody { error: error_kind, message })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Config(msg) => ApiError::BadRequest(msg),
            Error::Busy => ApiError::Busy,
            err @ (Error::DialectMismatch { .. }
            | Error::Decode { .. }
            | Error::CycleDetected { .. }) => ApiError::Unprocessable(err.to_string()),
            err @ Error::Store { .. } => ApiError::BadGateway(err.to_string()),
            err @ (Error::Io(_) | Error::Serialization(_) | Error::Internal(_)) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}
