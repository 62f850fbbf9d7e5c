//! The `rooms` collection.

use rusqlite::{params, OptionalExtension};
use varta_shared::types::Room;

use crate::database::{decode_doc, Database};
use crate::error::Result;

impl Database {
    /// Insert or overwrite a room. Overwriting keeps the room's original
    /// position in [`Database::list_rooms`].
    pub fn upsert_room(&self, room: &Room) -> Result<()> {
        let doc = serde_json::to_string(room)?;
        self.conn().execute(
            "INSERT INTO rooms (id, doc) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET doc = excluded.doc",
            params![room.id, doc],
        )?;
        Ok(())
    }

    pub fn get_room(&self, id: &str) -> Result<Option<Room>> {
        let room = self
            .conn()
            .query_row("SELECT doc FROM rooms WHERE id = ?1", params![id], |row| {
                let doc: String = row.get(0)?;
                decode_doc::<Room>(0, &doc)
            })
            .optional()?;
        Ok(room)
    }

    pub fn has_room(&self, id: &str) -> Result<bool> {
        Ok(self.get_room(id)?.is_some())
    }

    /// All rooms in insertion order.
    pub fn list_rooms(&self) -> Result<Vec<Room>> {
        let mut stmt = self.conn().prepare("SELECT doc FROM rooms ORDER BY rowid ASC")?;
        let rows = stmt.query_map([], |row| {
            let doc: String = row.get(0)?;
            decode_doc::<Room>(0, &doc)
        })?;

        let mut rooms = Vec::new();
        for row in rows {
            rooms.push(row?);
        }
        Ok(rooms)
    }

    /// Remember the password a room was joined with; `None` marks it public.
    pub fn set_room_password(&self, id: &str, password: Option<&str>) -> Result<()> {
        self.conn().execute(
            "UPDATE rooms SET password = ?2 WHERE id = ?1",
            params![id, password],
        )?;
        Ok(())
    }

    pub fn room_password(&self, id: &str) -> Result<Option<String>> {
        let password = self
            .conn()
            .query_row("SELECT password FROM rooms WHERE id = ?1", params![id], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(password.flatten())
    }

    /// Delete a room record. Returns `true` if a row was deleted.
    pub fn delete_room(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM rooms WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use varta_shared::types::RoomKind;

    use super::*;

    fn group(id: &str, name: &str) -> Room {
        Room {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            kind: RoomKind::Group,
            members: vec!["uid_a".into()],
            icon: None,
        }
    }

    #[test]
    fn upsert_is_last_write_wins_and_keeps_order() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_room(&group("group_1", "first")).unwrap();
        db.upsert_room(&group("group_2", "second")).unwrap();
        db.upsert_room(&group("group_1", "renamed")).unwrap();

        let rooms = db.list_rooms().unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].id, "group_1");
        assert_eq!(rooms[0].name, "renamed");
        assert_eq!(rooms[1].id, "group_2");
    }

    #[test]
    fn delete_room_removes_record() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_room(&group("group_1", "first")).unwrap();
        assert!(db.has_room("group_1").unwrap());
        assert!(db.delete_room("group_1").unwrap());
        assert!(db.get_room("group_1").unwrap().is_none());
        assert!(!db.delete_room("group_1").unwrap());
    }

    #[test]
    fn password_survives_upsert_and_goes_with_the_room() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_room(&group("group_1", "vault")).unwrap();
        assert_eq!(db.room_password("group_1").unwrap(), None);

        db.set_room_password("group_1", Some("hunter2")).unwrap();
        db.upsert_room(&group("group_1", "vault renamed")).unwrap();
        assert_eq!(db.room_password("group_1").unwrap().as_deref(), Some("hunter2"));

        db.set_room_password("group_1", None).unwrap();
        assert_eq!(db.room_password("group_1").unwrap(), None);

        db.set_room_password("group_1", Some("hunter2")).unwrap();
        db.delete_room("group_1").unwrap();
        db.upsert_room(&group("group_1", "vault")).unwrap();
        assert_eq!(db.room_password("group_1").unwrap(), None);
    }
}
