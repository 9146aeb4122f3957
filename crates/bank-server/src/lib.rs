//! Thin HTTP/SSE collaborator adapter over `bank-core`.
//!
//! Owns no memory semantics of its own: chat transport, agent control,
//! and the durable event stream described in the external-interfaces
//! design. Retain/recall/consolidation logic lives entirely in
//! `bank-core`; a real `Agent` implementation is the seam where the two
//! meet.

pub mod agent;
pub mod error;
pub mod event_stream;
pub mod routes;
pub mod sse;
pub mod state;
