//! Document / Chunk — optional origin metadata for a retain call.
//!
//! A document owns many chunks; each chunk may be referenced by many memory
//! units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub bank_id: String,
    pub title: Option<String>,
    pub source_uri: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub bank_id: String,
    pub ordinal: u32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
