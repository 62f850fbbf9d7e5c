//! The `settings` collection: named JSON values.

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::database::{decode_doc, Database};
use crate::error::Result;

impl Database {
    pub fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn().execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, json],
        )?;
        Ok(())
    }

    pub fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| {
                    let json: String = row.get(0)?;
                    decode_doc::<T>(0, &json)
                },
            )
            .optional()?;
        Ok(value)
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_setting::<String>("ui.theme").unwrap(), None);

        db.put_setting("ui.theme", &"midnight").unwrap();
        db.put_setting("ui.theme", &"aurora").unwrap();
        assert_eq!(
            db.get_setting::<String>("ui.theme").unwrap().as_deref(),
            Some("aurora")
        );

        assert!(db.remove_setting("ui.theme").unwrap());
        assert_eq!(db.get_setting::<String>("ui.theme").unwrap(), None);
    }

    #[test]
    fn settings_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.put_setting("answer", &42u32).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.get_setting::<u32>("answer").unwrap(), Some(42));
    }
}
