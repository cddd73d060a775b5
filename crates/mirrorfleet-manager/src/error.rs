use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Error surface of the coordinator API.
///
/// Every variant renders as `{"error": "<message>"}` with the matching
/// status code.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("invalid command")]
    NotAcceptable,

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            ApiError::Kube(_) | ApiError::Upstream(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!("request failed: {self}");
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// `{"message": "<text>"}` helper for info responses.
pub fn info_body(msg: impl Into<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": msg.into() }))
}
