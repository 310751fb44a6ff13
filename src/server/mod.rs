pub mod handlers;
pub mod routes;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::agent::{Agent, Session};
use crate::error::{AgentError, Result};

/// In-memory sessions keyed by (user_id, session_id).
///
/// Each session sits behind its own lock so requests for different sessions
/// run concurrently while requests for the same session queue up.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<(String, String), Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session, creating it on first use.
    pub async fn get_or_create(
        &self,
        agent: &Arc<Agent>,
        user_id: &str,
        session_id: &str,
    ) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry((user_id.to_string(), session_id.to_string()))
            .or_insert_with(|| {
                debug!(user_id, session_id, "creating session");
                Arc::new(Mutex::new(agent.session(format!("{user_id}/{session_id}"))))
            })
            .clone()
    }
}

pub async fn serve(
    agent: Arc<Agent>,
    bind: &str,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = routes::build(agent);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| AgentError::Server(format!("failed to bind {bind}: {e}")))?;

    info!(bind = %bind, "server listening (HTTP)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .map_err(|e| AgentError::Server(format!("server error: {e}")))?;

    Ok(())
}
