//! Shared SSE stream construction for the chat and agent-run endpoints.
//!
//! Each endpoint forwards a snapshot of existing rows, then live appends,
//! then periodic keepalives, into an `mpsc` channel drained by
//! `axum::response::Sse` — a broadcast receiver merged with a keepalive
//! interval into one snapshot/live/keepalive feed.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::Event;
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use crate::event_stream::{EventRow, EventStream, QueryFilter};
use crate::state::ClientGuard;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const CHANNEL_CAPACITY: usize = 64;

fn snapshot_event(rows: &[EventRow]) -> Event {
    Event::default().event("snapshot").json_data(rows).expect("EventRow is always serializable")
}

fn append_event(row: &EventRow) -> Event {
    Event::default().event("append").json_data(row).expect("EventRow is always serializable")
}

/// Full session stream: `/chat/{session_id}/events/sse?afterSeq=N`.
/// Never terminates on its own; ends when the client disconnects.
pub fn session_stream(
    events: Arc<EventStream>,
    session_id: String,
    after_seq: Option<u64>,
) -> ReceiverStream<Result<Event, Infallible>> {
    let (tx, rx) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);

    let snapshot = events.query(&session_id, &QueryFilter { after_seq, ..Default::default() });
    let Some(mut live) = events.subscribe_to_session(&session_id) else {
        return ReceiverStream::new(rx);
    };

    tokio::spawn(async move {
        if tx.send(Ok(snapshot_event(&snapshot))).await.is_err() {
            return;
        }
        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        keepalive.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                row = live.recv() => {
                    match row {
                        Ok(row) => {
                            if tx.send(Ok(append_event(&row))).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
                _ = keepalive.tick() => {
                    let ping = Event::default().event("keepalive").data("");
                    if tx.send(Ok(ping)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    ReceiverStream::new(rx)
}

/// Wraps `stream` so `guard` (and the connected-client count it tracks)
/// stays alive for exactly the stream's lifetime, dropping when the
/// client disconnects and the response body is torn down.
pub fn with_client_guard<S>(stream: S, guard: ClientGuard) -> impl Stream<Item = S::Item>
where
    S: Stream,
{
    futures_util::stream::unfold((stream, guard), |(mut stream, guard)| async move {
        stream.next().await.map(|item| (item, (stream, guard)))
    })
}

/// Per-run stream: `/agent/{session_id}/events/{run_id}/sse`. Terminates
/// after emitting the `closed` sentinel.
pub fn run_stream(
    events: Arc<EventStream>,
    session_id: String,
    run_id: String,
) -> ReceiverStream<Result<Event, Infallible>> {
    let (tx, rx) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);

    let snapshot = events.query(
        &session_id,
        &QueryFilter {
            run_id: Some(run_id.clone()),
            ..Default::default()
        },
    );
    let already_closed = snapshot.iter().any(|r| r.event_type == "run_closed");
    let Some(mut live) = events.subscribe_to_session(&session_id) else {
        return ReceiverStream::new(rx);
    };

    tokio::spawn(async move {
        if tx.send(Ok(snapshot_event(&snapshot))).await.is_err() {
            return;
        }
        if already_closed {
            let _ = tx.send(Ok(Event::default().event("closed").data(""))).await;
            return;
        }
        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        keepalive.tick().await;
        loop {
            tokio::select! {
                row = live.recv() => {
                    match row {
                        Ok(row) if row.run_id.as_deref() == Some(run_id.as_str()) => {
                            let is_closed = row.event_type == "run_closed";
                            let event = if is_closed {
                                Event::default().event("closed").data("")
                            } else {
                                append_event(&row)
                            };
                            if tx.send(Ok(event)).await.is_err() || is_closed {
                                break;
                            }
                        }
                        Ok(_) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
                _ = keepalive.tick() => {
                    let ping = Event::default().event("keepalive").data("");
                    if tx.send(Ok(ping)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    ReceiverStream::new(rx)
}
