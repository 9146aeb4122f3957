//! Database migrations
//!
//! Schema for the whole bank memory engine, applied once at
//! `Storage::new` against `schema_version`: an append-only const array of
//! `(version, description, up_sql)` triples, each a single idempotent
//! batch of `CREATE TABLE IF NOT EXISTS` / `CREATE TRIGGER IF NOT EXISTS`
//! statements.

use rusqlite::{Connection, Result as SqlResult};

/// A single schema migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial schema: banks, memory units, entities, links, FTS5",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "mental models, directives, documents/chunks, async operations, visual memories",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "visual memory access history",
        up: MIGRATION_V3_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS banks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    config TEXT NOT NULL DEFAULT '{}',
    skepticism INTEGER NOT NULL DEFAULT 3,
    literalism INTEGER NOT NULL DEFAULT 3,
    empathy INTEGER NOT NULL DEFAULT 3,
    mission TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_units (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    fact_type TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    valid_from INTEGER,
    valid_to INTEGER,
    mentioned_at INTEGER,
    occurred_start INTEGER,
    occurred_end INTEGER,
    event_date INTEGER,
    document_id TEXT,
    chunk_id TEXT,
    source_text TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    proof_count INTEGER NOT NULL DEFAULT 1,
    source_memory_ids TEXT NOT NULL DEFAULT '[]',
    history TEXT NOT NULL DEFAULT '[]',
    consolidated_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memory_units_bank ON memory_units(bank_id);
CREATE INDEX IF NOT EXISTS idx_memory_units_fact_type ON memory_units(bank_id, fact_type);
CREATE INDEX IF NOT EXISTS idx_memory_units_consolidated ON memory_units(bank_id, consolidated_at);
CREATE INDEX IF NOT EXISTS idx_memory_units_event_date ON memory_units(bank_id, event_date);

CREATE VIRTUAL TABLE IF NOT EXISTS memory_units_fts USING fts5(
    id,
    bank_id,
    content,
    content='memory_units',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memory_units_ai AFTER INSERT ON memory_units BEGIN
    INSERT INTO memory_units_fts(rowid, id, bank_id, content)
    VALUES (NEW.rowid, NEW.id, NEW.bank_id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS memory_units_ad AFTER DELETE ON memory_units BEGIN
    INSERT INTO memory_units_fts(memory_units_fts, rowid, id, bank_id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.bank_id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS memory_units_au AFTER UPDATE ON memory_units BEGIN
    INSERT INTO memory_units_fts(memory_units_fts, rowid, id, bank_id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.bank_id, OLD.content);
    INSERT INTO memory_units_fts(rowid, id, bank_id, content)
    VALUES (NEW.rowid, NEW.id, NEW.bank_id, NEW.content);
END;

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    description TEXT,
    mention_count INTEGER NOT NULL DEFAULT 1,
    first_seen INTEGER NOT NULL,
    last_updated INTEGER NOT NULL,
    metadata TEXT,
    UNIQUE(bank_id, name COLLATE NOCASE)
);

CREATE INDEX IF NOT EXISTS idx_entities_bank ON entities(bank_id);

CREATE TABLE IF NOT EXISTS memory_entity_junction (
    memory_id TEXT NOT NULL REFERENCES memory_units(id) ON DELETE CASCADE,
    entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    PRIMARY KEY (memory_id, entity_id)
);

CREATE INDEX IF NOT EXISTS idx_junction_entity ON memory_entity_junction(entity_id);

CREATE TABLE IF NOT EXISTS memory_links (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    source_id TEXT NOT NULL REFERENCES memory_units(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memory_units(id) ON DELETE CASCADE,
    link_type TEXT NOT NULL,
    weight REAL NOT NULL,
    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_links_source ON memory_links(source_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON memory_links(target_id);
CREATE INDEX IF NOT EXISTS idx_links_bank ON memory_links(bank_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS mental_models (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    source_query TEXT NOT NULL,
    content TEXT,
    source_memory_ids TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    auto_refresh INTEGER NOT NULL DEFAULT 1,
    last_refreshed_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mental_models_bank ON mental_models(bank_id);

CREATE TABLE IF NOT EXISTS directives (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    body TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_directives_bank ON directives(bank_id, active);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    title TEXT,
    source_uri TEXT,
    metadata TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    ordinal INTEGER NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

CREATE TABLE IF NOT EXISTS async_operations (
    operation_id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    operation_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    result_metadata TEXT,
    error_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_async_ops_bank ON async_operations(bank_id, status);

CREATE TABLE IF NOT EXISTS visual_memories (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
    source_id TEXT,
    description TEXT NOT NULL,
    scope_profile TEXT,
    scope_project TEXT,
    scope_session TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_visual_memories_bank ON visual_memories(bank_id);

CREATE VIRTUAL TABLE IF NOT EXISTS visual_memories_fts USING fts5(
    id,
    bank_id,
    description,
    content='visual_memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS visual_memories_ai AFTER INSERT ON visual_memories BEGIN
    INSERT INTO visual_memories_fts(rowid, id, bank_id, description)
    VALUES (NEW.rowid, NEW.id, NEW.bank_id, NEW.description);
END;

CREATE TRIGGER IF NOT EXISTS visual_memories_ad AFTER DELETE ON visual_memories BEGIN
    INSERT INTO visual_memories_fts(visual_memories_fts, rowid, id, bank_id, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.bank_id, OLD.description);
END;

CREATE TRIGGER IF NOT EXISTS visual_memories_au AFTER UPDATE ON visual_memories BEGIN
    INSERT INTO visual_memories_fts(visual_memories_fts, rowid, id, bank_id, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.bank_id, OLD.description);
    INSERT INTO visual_memories_fts(rowid, id, bank_id, description)
    VALUES (NEW.rowid, NEW.id, NEW.bank_id, NEW.description);
END;
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS visual_memory_accesses (
    id TEXT PRIMARY KEY,
    visual_memory_id TEXT NOT NULL REFERENCES visual_memories(id) ON DELETE CASCADE,
    accessed_at INTEGER NOT NULL,
    query TEXT
);

CREATE INDEX IF NOT EXISTS idx_visual_memory_accesses_memory ON visual_memory_accesses(visual_memory_id, accessed_at);
"#;

/// Apply every migration with a version greater than the database's
/// current `schema_version`, in ascending order.
pub fn apply_migrations(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            rusqlite::params![migration.version],
        )?;
        tracing::info!(version = migration.version, description = migration.description, "applied migration");
    }

    Ok(())
}
