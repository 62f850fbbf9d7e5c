use rusqlite::params;
use varta_shared::types::Clan;

use crate::database::{decode_doc, Database};
use crate::error::Result;

impl Database {
    pub fn upsert_clan(&self, clan: &Clan) -> Result<()> {
        let doc = serde_json::to_string(clan)?;
        self.conn().execute(
            "INSERT INTO clans (id, doc) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET doc = excluded.doc",
            params![clan.id, doc],
        )?;
        Ok(())
    }

    pub fn list_clans(&self) -> Result<Vec<Clan>> {
        let mut stmt = self.conn().prepare("SELECT doc FROM clans ORDER BY rowid ASC")?;
        let rows = stmt.query_map([], |row| {
            let doc: String = row.get(0)?;
            decode_doc::<Clan>(0, &doc)
        })?;

        let mut clans = Vec::new();
        for row in rows {
            clans.push(row?);
        }
        Ok(clans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clan_upsert_and_list() {
        let db = Database::open_in_memory().unwrap();
        let clan = Clan {
            id: "cid_void".into(),
            name: "The Void Runners".into(),
            tag: "VOID".into(),
            leader_id: "uid_9".into(),
            members_count: 156,
            level: 45,
            banner: "https://picsum.photos/seed/void/800/200".into(),
        };
        db.upsert_clan(&clan).unwrap();
        assert_eq!(db.list_clans().unwrap(), vec![clan]);
    }
}
