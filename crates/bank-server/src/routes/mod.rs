//! Route wiring: exactly the endpoints named in the external-interfaces
//! design, nothing more.

pub mod agent;
pub mod chat;
pub mod status;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/chat/{session_id}/messages",
            post(chat::post_message).get(chat::list_messages).delete(chat::delete_session),
        )
        .route("/chat/{session_id}/events/sse", get(chat::messages_sse))
        .route("/agent/{session_id}/prompt", post(agent::prompt))
        .route("/agent/{session_id}/steer", post(agent::steer))
        .route("/agent/{session_id}/abort", post(agent::abort))
        .route("/agent/{session_id}/history", get(agent::history))
        .route("/agent/{session_id}/events/{run_id}/sse", get(agent::run_sse))
        .route("/api/status", get(status::status))
        .route("/manifest.json", get(status::manifest))
        .with_state(state)
}
