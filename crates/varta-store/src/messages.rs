//! The `messages` collection.

use rusqlite::params;
use varta_shared::types::Message;

use crate::database::{decode_doc, Database};
use crate::error::Result;

impl Database {
    /// Store a message unless the room already holds one with the same id.
    ///
    /// Returns `true` if the message was new. Message ids are advisory, so
    /// the first copy to arrive wins and later copies are ignored. The same
    /// id in another room is a different message.
    pub fn insert_message(&self, message: &Message) -> Result<bool> {
        let doc = serde_json::to_string(message)?;
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO messages (id, room_id, timestamp, doc)
             VALUES (?1, ?2, ?3, ?4)",
            params![message.id, message.room_id, message.timestamp, doc],
        )?;
        Ok(affected > 0)
    }

    /// All messages of a room, oldest first. Ties on the timestamp are broken
    /// by id so replay order is stable.
    pub fn get_messages_for_room(&self, room_id: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT doc FROM messages
             WHERE room_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![room_id], |row| {
            let doc: String = row.get(0)?;
            decode_doc::<Message>(0, &doc)
        })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Delete one message of a room. Returns `true` if it existed.
    pub fn delete_message(&self, room_id: &str, id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE room_id = ?1 AND id = ?2",
            params![room_id, id],
        )?;
        Ok(affected > 0)
    }

    /// Purge a room's history. Returns the number of messages removed.
    pub fn delete_messages_for_room(&self, room_id: &str) -> Result<usize> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE room_id = ?1", params![room_id])?;
        Ok(affected)
    }
}
