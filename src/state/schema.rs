//! Database schema definitions and migrations.

use rusqlite::Connection;

use super::error::StateError;

/// Current schema version. Increment when making schema changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Schema DDL for version 1. One table per record kind.
const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_tasks (
    source_id INTEGER PRIMARY KEY,
    source_title TEXT NOT NULL,
    destination_id INTEGER,
    strategy TEXT NOT NULL DEFAULT 'unknown',
    last_position INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS download_tasks (
    source_id INTEGER PRIMARY KEY,
    source_title TEXT NOT NULL,
    last_position INTEGER NOT NULL DEFAULT 0,
    total_items INTEGER NOT NULL DEFAULT 0,
    completed_items INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS pipeline_tasks (
    project_path TEXT PRIMARY KEY,
    project_name TEXT NOT NULL,
    destination_id INTEGER,
    current_step TEXT NOT NULL DEFAULT '',
    last_artifact TEXT,
    is_archived INTEGER NOT NULL DEFAULT 0,
    is_reported INTEGER NOT NULL DEFAULT 0,
    is_transform_authorized INTEGER NOT NULL DEFAULT 0,
    is_transformed INTEGER NOT NULL DEFAULT 0,
    is_finalized INTEGER NOT NULL DEFAULT 0,
    is_annotated INTEGER NOT NULL DEFAULT 0,
    is_publish_authorized INTEGER NOT NULL DEFAULT 0,
    is_published INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// Get the current schema version from the database.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StateError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StateError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Initialize or migrate the database schema.
///
/// Idempotent: runs on every process start against new and existing files.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StateError> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StateError::UnsupportedSchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    if current_version < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA_V1)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        tracing::debug!("Initialized checkpoint schema at version {}", SCHEMA_VERSION);
    }

    Ok(())
}
