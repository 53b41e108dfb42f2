//! Hubbub Server - development relay
//!
//! Speaks the realtime protocol the client expects: token-gated
//! authentication, room membership, typing/recording relay, and HTTP
//! endpoints for publishing events into rooms.

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ServerConfig;
pub use state::AppState;

/// Build the router over `state`.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health))
        // Publishing
        .route("/api/events", post(routes::events::publish_to_all))
        .route("/api/rooms/{room}/events", post(routes::events::publish_to_room))
        // WebSocket
        .route("/api/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on an already bound listener until the process exits.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}
