use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::agent::Agent;

use super::SessionStore;
use super::handlers;

/// State shared across all routes.
#[derive(Clone)]
pub struct ServerState {
    pub agent: Arc<Agent>,
    pub sessions: Arc<SessionStore>,
}

pub fn build(agent: Arc<Agent>) -> Router {
    let state = ServerState {
        agent,
        sessions: Arc::new(SessionStore::new()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/run", post(handlers::run))
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}
