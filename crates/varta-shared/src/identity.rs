use serde::{Deserialize, Serialize};

use crate::ids::new_user_id;
use crate::types::PresenceStatus;

/// A user as other peers see it.
///
/// `id` is the stable identifier generated at login and persisted with the
/// session. The relay connection id is not part of the identity; it changes
/// on every reconnect and travels separately (see `Signal::Presence`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub status: PresenceStatus,
    #[serde(default)]
    pub bio: String,
}

impl Identity {
    /// Create a fresh identity with a newly generated stable id.
    pub fn generate(name: &str, avatar: &str, position: &str) -> Self {
        Self {
            id: new_user_id(),
            name: name.to_string(),
            avatar: avatar.to_string(),
            position: position.to_string(),
            status: PresenceStatus::Online,
            bio: format!("VartaSphere {} operational.", position.to_uppercase()),
        }
    }

    /// Directory entries only carry id, name and avatar.
    pub fn listed(id: &str, name: &str, avatar: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            avatar: avatar.to_string(),
            position: String::new(),
            status: PresenceStatus::Offline,
            bio: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_assigns_stable_prefix() {
        let a = Identity::generate("Nexus", "https://a", "scout");
        let b = Identity::generate("Nexus", "https://a", "scout");
        assert!(a.id.starts_with("uid_"));
        assert_ne!(a.id, b.id);
        assert_eq!(a.bio, "VartaSphere SCOUT operational.");
    }

    #[test]
    fn test_serde_roundtrip_with_defaults() {
        let json = r#"{"id":"uid_ghost","name":"Ghost"}"#;
        let id: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(id.status, PresenceStatus::Online);
        assert!(id.avatar.is_empty());
    }
}
