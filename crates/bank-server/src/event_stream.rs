//! Durable per-session event log.
//!
//! A keyed append-only log, one `tokio::sync::broadcast` channel per
//! session for live fan-out. Appends are totally ordered by a monotonic
//! per-session sequence number; `subscribe_to_session` listeners observe
//! exactly that order. Grounded in the tagged-enum event shape of
//! `dashboard/events.rs`'s `VestigeEvent` (`#[serde(tag = "type", content =
//! "data")]`) and the broadcast-channel wiring of `dashboard/websocket.rs`.

use std::collections::HashMap;
use std::sync::Mutex;

use bank_core::IdGenerator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of each session's live fan-out channel. Slow subscribers drop
/// the oldest buffered event rather than block an appender.
const BROADCAST_CAPACITY: usize = 256;

/// One persisted row in a session's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub id: String,
    pub seq: u64,
    pub session_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub run_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A known agent-run event kind, mapped to a persisted `event_type` by
/// [`EventStream::append_agent_run_event`]. Kinds outside this set are
/// still published live to run subscribers but are not assigned a
/// dedicated persisted type — they persist under `"agent_event"`.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    MessageDelta(serde_json::Value),
    ToolCall(serde_json::Value),
    ToolResult(serde_json::Value),
    Completed(serde_json::Value),
    Error(serde_json::Value),
    Other(String, serde_json::Value),
}

impl AgentEvent {
    fn persisted_type(&self) -> &'static str {
        match self {
            AgentEvent::MessageDelta(_) => "message_delta",
            AgentEvent::ToolCall(_) => "tool_call",
            AgentEvent::ToolResult(_) => "tool_result",
            AgentEvent::Completed(_) => "completed",
            AgentEvent::Error(_) => "error",
            AgentEvent::Other(..) => "agent_event",
        }
    }

    fn into_payload(self) -> serde_json::Value {
        match self {
            AgentEvent::MessageDelta(v)
            | AgentEvent::ToolCall(v)
            | AgentEvent::ToolResult(v)
            | AgentEvent::Completed(v)
            | AgentEvent::Error(v) => v,
            AgentEvent::Other(_, v) => v,
        }
    }
}

struct SessionLog {
    rows: Vec<EventRow>,
    next_seq: u64,
    tx: broadcast::Sender<EventRow>,
    closed_runs: Vec<String>,
}

impl SessionLog {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            rows: Vec::new(),
            next_seq: 1,
            tx,
            closed_runs: Vec::new(),
        }
    }
}

/// Filter applied by [`EventStream::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub after_seq: Option<u64>,
    pub run_id: Option<String>,
    pub types: Option<Vec<String>>,
    pub limit: Option<usize>,
}

pub struct EventStream {
    sessions: Mutex<HashMap<String, SessionLog>>,
    ids: IdGenerator,
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStream {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ids: IdGenerator::new(),
        }
    }

    pub fn ensure_session(&self, session_id: &str) {
        self.sessions
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_insert_with(SessionLog::new);
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(session_id)
    }

    /// Cascade-deletes a session's rows and drops its broadcast channel,
    /// disconnecting every active subscriber.
    pub fn delete_session(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().remove(session_id).is_some()
    }

    pub fn append(
        &self,
        session_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        run_id: Option<String>,
    ) -> EventRow {
        let mut sessions = self.sessions.lock().unwrap();
        let log = sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionLog::new);
        let row = EventRow {
            id: self.ids.next_string(),
            seq: log.next_seq,
            session_id: session_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            run_id,
            created_at: Utc::now(),
        };
        log.next_seq += 1;
        log.rows.push(row.clone());
        // No subscribers is not an error; the row is still durable.
        let _ = log.tx.send(row.clone());
        row
    }

    pub fn query(&self, session_id: &str, filter: &QueryFilter) -> Vec<EventRow> {
        let sessions = self.sessions.lock().unwrap();
        let Some(log) = sessions.get(session_id) else {
            return Vec::new();
        };
        let mut rows: Vec<EventRow> = log
            .rows
            .iter()
            .filter(|r| filter.after_seq.is_none_or(|after| r.seq > after))
            .filter(|r| filter.run_id.is_none() || r.run_id == filter.run_id)
            .filter(|r| filter.types.as_ref().is_none_or(|types| types.contains(&r.event_type)))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        rows
    }

    /// Subscribes to every future append on `session_id`. Returns `None`
    /// if the session does not exist. Dropping the receiver unsubscribes.
    pub fn subscribe_to_session(&self, session_id: &str) -> Option<broadcast::Receiver<EventRow>> {
        let mut sessions = self.sessions.lock().unwrap();
        let log = sessions.entry(session_id.to_string()).or_insert_with(SessionLog::new);
        Some(log.tx.subscribe())
    }

    pub fn append_agent_run_event(&self, session_id: &str, run_id: &str, event: AgentEvent) -> EventRow {
        let event_type = event.persisted_type().to_string();
        self.append(session_id, &event_type, event.into_payload(), Some(run_id.to_string()))
    }

    /// Appends a `run_closed` row and marks the run closed so
    /// `/agent/{session}/events/{run_id}/sse` subscribers see the
    /// terminal sentinel.
    pub fn close_agent_run(&self, session_id: &str, run_id: &str) -> EventRow {
        let row = self.append(
            session_id,
            "run_closed",
            serde_json::json!({ "runId": run_id }),
            Some(run_id.to_string()),
        );
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(log) = sessions.get_mut(session_id) {
            log.closed_runs.push(run_id.to_string());
        }
        row
    }

    pub fn is_run_closed(&self, session_id: &str, run_id: &str) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .is_some_and(|log| log.closed_runs.iter().any(|r| r == run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_are_sequenced_per_session() {
        let stream = EventStream::new();
        let a = stream.append("s1", "message", serde_json::json!({"text": "hi"}), None);
        let b = stream.append("s1", "message", serde_json::json!({"text": "there"}), None);
        assert_eq!(a.seq, 1);
        assert_eq!(b.seq, 2);
    }

    #[test]
    fn query_filters_by_after_seq_and_type() {
        let stream = EventStream::new();
        stream.append("s1", "message", serde_json::json!({}), None);
        stream.append("s1", "tool_call", serde_json::json!({}), Some("run1".into()));
        let rows = stream.query(
            "s1",
            &QueryFilter {
                after_seq: Some(0),
                types: Some(vec!["tool_call".into()]),
                ..Default::default()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "tool_call");
    }

    #[test]
    fn delete_session_cascades() {
        let stream = EventStream::new();
        stream.append("s1", "message", serde_json::json!({}), None);
        assert!(stream.delete_session("s1"));
        assert!(stream.query("s1", &QueryFilter::default()).is_empty());
        assert!(!stream.has_session("s1"));
    }

    #[test]
    fn close_agent_run_marks_closed() {
        let stream = EventStream::new();
        stream.append("s1", "message", serde_json::json!({}), None);
        assert!(!stream.is_run_closed("s1", "run1"));
        stream.close_agent_run("s1", "run1");
        assert!(stream.is_run_closed("s1", "run1"));
    }

    #[tokio::test]
    async fn subscribers_observe_appends_in_order() {
        let stream = EventStream::new();
        stream.ensure_session("s1");
        let mut rx = stream.subscribe_to_session("s1").unwrap();
        stream.append("s1", "message", serde_json::json!({"n": 1}), None);
        stream.append("s1", "message", serde_json::json!({"n": 2}), None);
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
    }
}
