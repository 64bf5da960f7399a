use axum::{
  Json,
  extract::{
    Path,
    State,
  },
  http::StatusCode,
};
use redline_core::protocol::{
  CreateRequest,
  DocumentSnapshot,
  UpdateRequest,
};
use tracing::info;

use crate::{
  AppState,
  error::ApiError,
};

pub async fn create_document(
  State(state): State<AppState>,
  Json(request): Json<CreateRequest>,
) -> Result<(StatusCode, Json<DocumentSnapshot>), ApiError> {
  let snapshot = state.store.create(request.content);
  info!(id = %snapshot.id, "document created");
  Ok((StatusCode::CREATED, Json(snapshot)))
}

pub async fn list_documents(State(state): State<AppState>) -> Json<Vec<DocumentSnapshot>> {
  Json(state.store.list())
}

pub async fn get_document(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Json<DocumentSnapshot>, ApiError> {
  Ok(Json(state.store.get(&id)?))
}

pub async fn update_document(
  State(state): State<AppState>,
  Path(id): Path<String>,
  Json(request): Json<UpdateRequest>,
) -> Result<Json<DocumentSnapshot>, ApiError> {
  Ok(Json(state.store.update(&id, request)?))
}

pub async fn delete_document(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  state.store.delete(&id)?;
  info!(%id, "document deleted");
  Ok(StatusCode::NO_CONTENT)
}
