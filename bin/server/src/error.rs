use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error kinds (spec §7): `InvalidRequest` (400), `NotFound` (404),
/// `Conflict` (409, the transition gate), `Internal` (500 — store
/// errors, installer crashes, auth failures).
#[derive(Debug)]
pub enum ApiError {
  InvalidRequest(String),
  NotFound(String),
  Conflict(String),
  Internal(anyhow::Error),
}

impl ApiError {
  fn status_and_message(&self) -> (StatusCode, String) {
    match self {
      ApiError::InvalidRequest(msg) => {
        (StatusCode::BAD_REQUEST, msg.clone())
      }
      ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
      ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
      ApiError::Internal(err) => {
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
      }
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    if let ApiError::Internal(err) = &self {
      tracing::error!("request failed | {err:#}");
    }
    let (status, message) = self.status_and_message();
    let body = Json(json!({
      "ErrorResponse": {
        "statuscode": status.as_u16(),
        "status": status.canonical_reason().unwrap_or("Error"),
        "error": message,
      }
    }));
    (status, body).into_response()
  }
}

impl From<anyhow::Error> for ApiError {
  fn from(err: anyhow::Error) -> Self {
    ApiError::Internal(err)
  }
}

impl From<store::StoreError> for ApiError {
  fn from(err: store::StoreError) -> Self {
    match err {
      store::StoreError::NotFound => {
        ApiError::NotFound("resource not found".to_string())
      }
      other => ApiError::Internal(other.into()),
    }
  }
}
