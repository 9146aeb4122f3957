//! Shared application state, handed to every axum handler via `State`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::agent::AgentManager;
use crate::event_stream::EventStream;

/// Cloned cheaply per request: every field is already `Arc`-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub events: Arc<EventStream>,
    pub agents: Arc<AgentManager>,
    connected_clients: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(events: Arc<EventStream>, agents: Arc<AgentManager>) -> Self {
        Self {
            events,
            agents,
            connected_clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connected_clients(&self) -> usize {
        self.connected_clients.load(Ordering::Relaxed)
    }

    /// RAII guard: increments on creation, decrements on drop. Held for
    /// the lifetime of one SSE connection.
    pub fn track_client(&self) -> ClientGuard {
        self.connected_clients.fetch_add(1, Ordering::Relaxed);
        ClientGuard {
            counter: self.connected_clients.clone(),
        }
    }
}

pub struct ClientGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
