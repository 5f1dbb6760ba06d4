//! SQL DDL for the base soundbase tables.
//!
//! Defines `sounds`, `actions`, `users`, `voice_activity`, `sound_lists`,
//! `sound_list_items`, `keywords` and `schema_meta`. Guild scoping and the
//! uniqueness constraints arrive through [`super::migrations`]. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// Version-1 schema. Later versions are reached by migration only.
const SCHEMA_SQL: &str = r#"
-- Media entities
CREATE TABLE IF NOT EXISTS sounds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    originalfilename TEXT NOT NULL,
    filename TEXT NOT NULL,
    favorite INTEGER NOT NULL DEFAULT 0,
    blacklist INTEGER NOT NULL DEFAULT 0,
    slap INTEGER NOT NULL DEFAULT 0,
    is_elevenlabs INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sounds_filename ON sounds(filename);
CREATE INDEX IF NOT EXISTS idx_sounds_original ON sounds(originalfilename);

-- Append-only event log
CREATE TABLE IF NOT EXISTS actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    action TEXT NOT NULL,
    target TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_actions_action ON actions(action);
CREATE INDEX IF NOT EXISTS idx_actions_timestamp ON actions(timestamp);
CREATE INDEX IF NOT EXISTS idx_actions_target ON actions(target);
CREATE INDEX IF NOT EXISTS idx_actions_username ON actions(username);

-- Event-trigger sounds (join/leave jingles per user)
CREATE TABLE IF NOT EXISTS users (
    id TEXT NOT NULL,
    event TEXT NOT NULL,
    sound TEXT NOT NULL
);

-- Voice channel sessions
CREATE TABLE IF NOT EXISTS voice_activity (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    join_time TEXT NOT NULL,
    leave_time TEXT
);

CREATE INDEX IF NOT EXISTS idx_voice_user_channel ON voice_activity(username, channel_id);
CREATE INDEX IF NOT EXISTS idx_voice_join ON voice_activity(join_time);

-- Curated sound lists
CREATE TABLE IF NOT EXISTS sound_lists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    list_name TEXT NOT NULL,
    creator TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sound_list_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    list_id INTEGER NOT NULL REFERENCES sound_lists(id) ON DELETE CASCADE,
    sound_filename TEXT NOT NULL,
    added_at TEXT NOT NULL,
    UNIQUE(list_id, sound_filename)
);

-- Trigger words
CREATE TABLE IF NOT EXISTS keywords (
    keyword TEXT PRIMARY KEY,
    action_type TEXT NOT NULL,
    action_value TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all base tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
