//! Headless document server entrypoint.

use std::{
  net::SocketAddr,
  sync::Arc,
};

use redline_server::{
  AppState,
  Store,
  create_app,
};
use tracing_subscriber::{
  layer::SubscriberExt,
  util::SubscriberInitExt,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "redline_server=info,tower_http=warn".into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let port = std::env::var("PORT")
    .ok()
    .and_then(|port| port.parse().ok())
    .unwrap_or(7700u16);

  let state = AppState {
    store: Arc::new(Store::new()),
  };
  let app = create_app(state);

  let addr = SocketAddr::from(([127, 0, 0, 1], port));
  tracing::info!("listening on http://{addr}");

  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  Ok(())
}

async fn shutdown_signal() {
  if let Err(err) = tokio::signal::ctrl_c().await {
    tracing::error!("failed to install ctrl-c handler: {err}");
  }
}
