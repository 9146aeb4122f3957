//! `/api/status` and `/manifest.json`.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub connected_clients: usize,
}

pub async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        connected_clients: state.connected_clients(),
    })
}

pub async fn manifest() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "bank-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
