//! `/chat/{session_id}/...` — message transport and its event stream.

use axum::extract::{Path, Query, State};
use axum::response::sse::{KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::sse::{session_stream, with_client_guard};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PostMessageInput {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct PostMessageOutput {
    pub id: String,
    pub seq: u64,
    pub session_id: String,
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(input): Json<PostMessageInput>,
) -> ApiResult<Json<PostMessageOutput>> {
    if input.content.trim().is_empty() {
        return Err(ApiError::Validation("content must not be empty".into()));
    }
    state.events.ensure_session(&session_id);
    let row = state.events.append(
        &session_id,
        "message",
        serde_json::json!({ "role": "user", "text": input.content }),
        None,
    );
    Ok(Json(PostMessageOutput {
        id: row.id,
        seq: row.seq,
        session_id,
    }))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Vec<crate::event_stream::EventRow>> {
    Json(state.events.query(
        &session_id,
        &crate::event_stream::QueryFilter {
            types: Some(vec!["message".into()]),
            ..Default::default()
        },
    ))
}

pub async fn delete_session(State(state): State<AppState>, Path(session_id): Path<String>) -> ApiResult<()> {
    if state.events.delete_session(&session_id) {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("session {session_id} not found")))
    }
}

#[derive(Debug, Deserialize)]
pub struct SseQuery {
    #[serde(rename = "afterSeq")]
    pub after_seq: Option<u64>,
}

pub async fn messages_sse(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<SseQuery>,
) -> Sse<impl futures_util::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>> {
    let guard = state.track_client();
    let stream = session_stream(state.events.clone(), session_id, query.after_seq);
    Sse::new(with_client_guard(stream, guard)).keep_alive(KeepAlive::default())
}
