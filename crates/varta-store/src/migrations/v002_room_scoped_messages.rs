//! v002 -- Message ids are unique per room; rooms remember their join password.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages (keyed by room id + message id)
-- ----------------------------------------------------------------
CREATE TABLE messages_v2 (
    id        TEXT NOT NULL,
    room_id   TEXT NOT NULL,
    timestamp INTEGER NOT NULL,             -- sender clock, epoch millis
    doc       TEXT NOT NULL,                -- whole record, JSON
    PRIMARY KEY (room_id, id)
);

INSERT INTO messages_v2 (id, room_id, timestamp, doc)
    SELECT id, room_id, timestamp, doc FROM messages;

DROP TABLE messages;
ALTER TABLE messages_v2 RENAME TO messages;

CREATE INDEX IF NOT EXISTS idx_messages_room_ts
    ON messages(room_id, timestamp ASC);

-- ----------------------------------------------------------------
-- Rooms: password of a protected join, NULL for public rooms
-- ----------------------------------------------------------------
ALTER TABLE rooms ADD COLUMN password TEXT;
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(UP_SQL)?;
    tx.commit()
}
