//! HTTP surface for the document store: CRUD over JSON snapshots, with
//! revision-checked draft writes handled in [`store`].

use std::sync::Arc;

use axum::{
  Router,
  routing::get,
};
use tower_http::{
  cors::CorsLayer,
  trace::TraceLayer,
};

pub mod error;
pub mod handlers;
pub mod store;

pub use error::ApiError;
pub use store::{
  Store,
  StoreError,
};

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<Store>,
}

pub fn create_app(state: AppState) -> Router {
  Router::new()
    .route(
      "/api/documents",
      get(handlers::list_documents).post(handlers::create_document),
    )
    .route(
      "/api/documents/:id",
      get(handlers::get_document)
        .put(handlers::update_document)
        .delete(handlers::delete_document),
    )
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}
