//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the frontier database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl sessions
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    termination_reason TEXT
);

-- One row per normalized URL; id is the discovery sequence
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    status TEXT NOT NULL,
    depth INTEGER NOT NULL,
    priority INTEGER NOT NULL,
    parent_url TEXT,
    discovered_at TEXT NOT NULL,
    last_attempt_at TEXT,
    eligible_at INTEGER NOT NULL DEFAULT 0,
    retry_count INTEGER NOT NULL DEFAULT 0,
    lease INTEGER,
    needs_render INTEGER NOT NULL DEFAULT 0,
    http_status INTEGER,
    content_hash TEXT,
    content_type TEXT,
    title TEXT,
    language TEXT,
    failure_reason TEXT,
    final_url TEXT,
    finished_at TEXT,
    fetch_ms INTEGER,
    body_bytes INTEGER
);

CREATE INDEX IF NOT EXISTS idx_urls_claim ON urls(status, priority, id);
CREATE INDEX IF NOT EXISTS idx_urls_domain ON urls(domain);

-- Track link relationships, including out-of-scope targets
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_url TEXT NOT NULL,
    to_url TEXT NOT NULL,
    in_scope INTEGER NOT NULL,
    UNIQUE(from_url, to_url)
);

CREATE INDEX IF NOT EXISTS idx_links_from ON links(from_url);

-- Durable counters (claim leases)
CREATE TABLE IF NOT EXISTS frontier_meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

INSERT OR IGNORE INTO frontier_meta (key, value) VALUES ('lease', 0);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
