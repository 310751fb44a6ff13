use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::routes::ServerState;

const DEFAULT_USER_ID: &str = "local-user";
const DEFAULT_SESSION_ID: &str = "local-session";

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub query: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub tools: usize,
}

pub async fn run(
    State(state): State<ServerState>,
    Json(body): Json<RunRequest>,
) -> Result<Json<RunResponse>, (StatusCode, Json<ErrorResponse>)> {
    let query = body.query.trim();
    if query.is_empty() {
        return Ok(Json(RunResponse {
            response: "Empty query.".to_string(),
        }));
    }

    let user_id = body.user_id.as_deref().unwrap_or(DEFAULT_USER_ID);
    let session_id = body.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID);
    info!(user_id, session_id, query_len = query.len(), "run request");

    let session = state
        .sessions
        .get_or_create(&state.agent, user_id, session_id)
        .await;
    let mut session = session.lock().await;

    let outcome = session.submit(query).await;
    debug!(
        user_id,
        session_id,
        history_len = session.history().len(),
        "session updated"
    );

    match outcome {
        Ok(outcome) if outcome.reply.trim().is_empty() => Ok(Json(RunResponse {
            response: "No final response captured.".to_string(),
        })),
        Ok(outcome) => Ok(Json(RunResponse {
            response: outcome.reply,
        })),
        Err(e) => {
            error!(user_id, session_id, err = %e, "run failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        tools: state.agent.tools.len(),
    })
}
