//! Storage Module
//!
//! SQLite-based storage layer: const-array migrations, FTS5 full-text
//! search with query sanitization, and a reader/writer connection split
//! shared by every domain module.

mod migrations;
mod sqlite;

pub use migrations::{apply_migrations, Migration, MIGRATIONS};
pub use sqlite::{MemoryUnitFilter, Result, Storage, StorageError};
