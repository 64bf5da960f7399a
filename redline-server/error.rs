use axum::{
  Json,
  http::StatusCode,
  response::{
    IntoResponse,
    Response,
  },
};
use redline_core::protocol::ConflictBody;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("document not found")]
  NotFound,
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("revision conflict")]
  Conflict(ConflictBody),
}

impl From<StoreError> for ApiError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::NotFound => ApiError::NotFound,
      StoreError::MissingBaseRevision | StoreError::UnexpectedBaseRevision => {
        ApiError::BadRequest(err.to_string())
      },
      StoreError::Conflict {
        submitted,
        current,
        snapshot,
      } => ApiError::Conflict(ConflictBody {
        error:    "revision_conflict".to_string(),
        message:  format!("submitted revision {submitted}, current is {current}"),
        revision: current,
        snapshot: *snapshot,
      }),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::NotFound => {
        let body = Json(json!({ "error": "not_found" }));
        (StatusCode::NOT_FOUND, body).into_response()
      },
      ApiError::BadRequest(message) => {
        let body = Json(json!({ "error": "bad_request", "message": message }));
        (StatusCode::BAD_REQUEST, body).into_response()
      },
      ApiError::Conflict(body) => (StatusCode::CONFLICT, Json(body)).into_response(),
    }
  }
}
