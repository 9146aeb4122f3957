//! Agent control surface.
//!
//! Binds a chat session to one live agent run. Real LLM tool-loop
//! orchestration is out of scope here; [`Agent`] is the seam a caller
//! supplies a real implementation through. [`StubAgent`] is the default:
//! it records the prompt and immediately emits a synthetic completion so
//! the HTTP surface and event stream are exercisable end to end without
//! a real model behind them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bank_core::{IdGenerator, Storage};

use crate::event_stream::{AgentEvent, EventStream, QueryFilter};

/// A live conversational agent bound to one session.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Runs one turn for `prompt`, publishing events through `events` as
    /// `run_id` progresses. Must call `events.close_agent_run` when done,
    /// on error, or on cooperative cancellation. `storage` gives a real
    /// implementation access to the bank a session is bound to (retain
    /// observations, recall context, trigger consolidation); the stub
    /// below ignores it.
    async fn run(&self, session_id: String, run_id: String, prompt: String, events: Arc<EventStream>, storage: Arc<Storage>);
}

/// Records the prompt and synthesizes one completion event. Never calls
/// out to a model or touches storage.
#[derive(Debug, Default)]
pub struct StubAgent;

#[async_trait]
impl Agent for StubAgent {
    async fn run(&self, session_id: String, run_id: String, prompt: String, events: Arc<EventStream>, _storage: Arc<Storage>) {
        events.append_agent_run_event(
            &session_id,
            &run_id,
            AgentEvent::Completed(serde_json::json!({
                "text": format!("acknowledged: {prompt}"),
            })),
        );
        events.close_agent_run(&session_id, &run_id);
    }
}

#[derive(Default)]
struct SessionState {
    active_run_id: Option<String>,
}

/// Tracks one [`SessionState`] per chat session and dispatches prompts to
/// the configured [`Agent`].
pub struct AgentManager {
    agent: Arc<dyn Agent>,
    events: Arc<EventStream>,
    storage: Arc<Storage>,
    sessions: Mutex<HashMap<String, SessionState>>,
    ids: IdGenerator,
}

impl AgentManager {
    pub fn new(agent: Arc<dyn Agent>, events: Arc<EventStream>, storage: Arc<Storage>) -> Self {
        Self {
            agent,
            events,
            storage,
            sessions: Mutex::new(HashMap::new()),
            ids: IdGenerator::new(),
        }
    }

    pub fn get_or_create(&self, session_id: &str) {
        self.events.ensure_session(session_id);
        self.sessions
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default();
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(session_id)
    }

    /// Evicting a session whose run is still streaming is deferred; the
    /// caller should retry once the run closes.
    pub fn evict(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(state) = sessions.get(session_id) else {
            return true;
        };
        if let Some(run_id) = &state.active_run_id {
            if !self.events.is_run_closed(session_id, run_id) {
                return false;
            }
        }
        sessions.remove(session_id);
        true
    }

    /// Persists the user message, starts a run, and returns its id.
    /// Events stream back through the event stream as the agent runs.
    pub fn prompt(&self, session_id: &str, text: &str) -> String {
        self.get_or_create(session_id);
        self.events.append(
            session_id,
            "message",
            serde_json::json!({ "role": "user", "text": text }),
            None,
        );
        let run_id = self.ids.next_string();
        {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.entry(session_id.to_string()).or_default().active_run_id = Some(run_id.clone());
        }
        let agent = self.agent.clone();
        let events = self.events.clone();
        let storage = self.storage.clone();
        let session_id = session_id.to_string();
        let spawned_run_id = run_id.clone();
        let prompt = text.to_string();
        tokio::spawn(async move {
            agent.run(session_id, spawned_run_id, prompt, events, storage).await;
        });
        run_id
    }

    /// Appends a steering message to the active run. Errs if no agent
    /// exists for the session.
    pub fn steer(&self, session_id: &str, text: &str) -> Result<(), String> {
        if !self.has_session(session_id) {
            return Err(format!("no agent for session {session_id}"));
        }
        self.events.append(
            session_id,
            "message",
            serde_json::json!({ "role": "user", "text": text, "steer": true }),
            self.sessions.lock().unwrap().get(session_id).and_then(|s| s.active_run_id.clone()),
        );
        Ok(())
    }

    /// Closes the active run. Errs if no agent exists for the session.
    pub fn abort(&self, session_id: &str) -> Result<(), String> {
        let run_id = {
            let sessions = self.sessions.lock().unwrap();
            let state = sessions.get(session_id).ok_or_else(|| format!("no agent for session {session_id}"))?;
            state.active_run_id.clone()
        };
        if let Some(run_id) = run_id {
            self.events.close_agent_run(session_id, &run_id);
        }
        Ok(())
    }

    pub fn load_history(&self, session_id: &str) -> Vec<crate::event_stream::EventRow> {
        self.events.query(
            session_id,
            &QueryFilter {
                types: Some(vec!["message".into()]),
                ..Default::default()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prompt_runs_stub_agent_to_completion() {
        let events = Arc::new(EventStream::new());
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let manager = AgentManager::new(Arc::new(StubAgent), events.clone(), storage);
        let run_id = manager.prompt("s1", "hello");

        for _ in 0..50 {
            if events.is_run_closed("s1", &run_id) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(events.is_run_closed("s1", &run_id));

        let history = manager.load_history("s1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].payload["text"], "hello");
    }

    #[test]
    fn steer_and_abort_error_without_a_session() {
        let events = Arc::new(EventStream::new());
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let manager = AgentManager::new(Arc::new(StubAgent), events, storage);
        assert!(manager.steer("missing", "x").is_err());
        assert!(manager.abort("missing").is_err());
    }
}
