//! Static, built-in directory of well-known identities and public rooms.
//!
//! Lookups here are exact-id matches and never touch the network.

use crate::identity::Identity;
use crate::types::{Room, RoomKind};

#[derive(Debug, Clone)]
pub struct Directory {
    users: Vec<Identity>,
    rooms: Vec<Room>,
}

impl Directory {
    /// The directory shipped with the client.
    pub fn builtin() -> Self {
        let users = vec![
            Identity::listed("uid_ghost", "Ghost Protocol", "https://api.dicebear.com/7.x/bottts/svg?seed=Ghost"),
            Identity::listed("uid_sarah", "Sarah Connor", "https://api.dicebear.com/7.x/avataaars/svg?seed=Sarah"),
            Identity::listed("uid_neo", "Thomas Anderson", "https://api.dicebear.com/7.x/pixel-art/svg?seed=Neo"),
            Identity::listed("uid_trinity", "Trinity", "https://api.dicebear.com/7.x/pixel-art/svg?seed=Trinity"),
            Identity::listed("uid_morpheus", "Morpheus", "https://api.dicebear.com/7.x/pixel-art/svg?seed=Morpheus"),
        ];

        let rooms = vec![
            public_room("gid_pubg_pro", "PUBG Pro League", "Competitive squad for chicken dinners.", "🍗"),
            public_room("gid_cod_war", "COD Warzone", "Daily deployments and tactical comms.", "🔫"),
            public_room("gid_tech_insiders", "Tech Insiders", "Leaks and hardware discussion.", "💻"),
            public_room("gid_crypto_pulse", "Crypto Pulse", "Market trends and analysis.", "📈"),
            public_room("gid_global_pubg", "PUBG Global", "Battle Royale chatter and squad finding.", "🔥"),
            public_room("gid_global_tech", "Future Tech", "Latest in AI, hardware, and space.", "🚀"),
            public_room("gid_global_music", "Lo-fi Beats", "Chilled music sharing and discussion.", "🎵"),
        ];

        Self { users, rooms }
    }

    pub fn user(&self, id: &str) -> Option<&Identity> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }
}

fn public_room(id: &str, name: &str, description: &str, icon: &str) -> Room {
    Room {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        kind: RoomKind::Global,
        members: Vec::new(),
        icon: Some(icon.to_string()),
    }
}
