//! Example consumer: a separate Rust project that uses trellis-sdk as a
//! dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`

use std::sync::Arc;
use tokio::net::TcpListener;
use trellis_sdk::{
    common_routes_with_ready, entity_routes, logging, AppState, ConnectionConfig,
    ConnectionRegistry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    logging::init("trellis_sdk=info,example_consumer=info");

    let config = ConnectionConfig::from_env()?;
    let registry = ConnectionRegistry::connect(&[config]).await?;
    let state = AppState::new(Arc::new(registry));

    let app = common_routes_with_ready(state.clone()).nest("/api", entity_routes(state));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
