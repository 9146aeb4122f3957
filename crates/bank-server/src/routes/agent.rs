//! `/agent/{session_id}/...` — prompt/steer/abort control and the per-run
//! event stream.

use axum::extract::{Path, State};
use axum::response::sse::{KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::event_stream::EventRow;
use crate::sse::{run_stream, with_client_guard};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PromptInput {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct PromptOutput {
    pub run_id: String,
}

pub async fn prompt(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(input): Json<PromptInput>,
) -> ApiResult<Json<PromptOutput>> {
    if input.text.trim().is_empty() {
        return Err(ApiError::Validation("text must not be empty".into()));
    }
    let run_id = state.agents.prompt(&session_id, &input.text);
    Ok(Json(PromptOutput { run_id }))
}

pub async fn steer(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(input): Json<PromptInput>,
) -> ApiResult<()> {
    state.agents.steer(&session_id, &input.text).map_err(ApiError::NotFound)
}

pub async fn abort(State(state): State<AppState>, Path(session_id): Path<String>) -> ApiResult<()> {
    state.agents.abort(&session_id).map_err(ApiError::NotFound)
}

pub async fn history(State(state): State<AppState>, Path(session_id): Path<String>) -> Json<Vec<EventRow>> {
    Json(state.agents.load_history(&session_id))
}

pub async fn run_sse(
    State(state): State<AppState>,
    Path((session_id, run_id)): Path<(String, String)>,
) -> Sse<impl futures_util::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>> {
    let guard = state.track_client();
    let stream = run_stream(state.events.clone(), session_id, run_id);
    Sse::new(with_client_guard(stream, guard)).keep_alive(KeepAlive::default())
}
