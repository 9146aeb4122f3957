//! Memory module — the central entity and its supporting types.

mod node;

pub use node::{FactType, HistoryEntry, MemoryUnit, TagsMatch};
