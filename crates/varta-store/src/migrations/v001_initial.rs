//! v001 -- Initial schema creation.
//!
//! Creates the four collections: `messages`, `rooms`, `clans` and `settings`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages (keyed by message id)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id        TEXT PRIMARY KEY NOT NULL,
    room_id   TEXT NOT NULL,
    timestamp INTEGER NOT NULL,             -- sender clock, epoch millis
    doc       TEXT NOT NULL                 -- whole record, JSON
);

CREATE INDEX IF NOT EXISTS idx_messages_room_ts
    ON messages(room_id, timestamp ASC);

-- ----------------------------------------------------------------
-- Rooms (keyed by room id; rowid keeps insertion order)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS rooms (
    id  TEXT PRIMARY KEY NOT NULL,
    doc TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Clans (keyed by clan id)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS clans (
    id  TEXT PRIMARY KEY NOT NULL,
    doc TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Settings (keyed by setting name)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL                     -- JSON
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
