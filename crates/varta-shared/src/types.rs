use serde::{Deserialize, Serialize};

use crate::constants::{CLAN_PREFIX, DM_PREFIX, GLOBAL_PREFIX, GROUP_PREFIX, SIGNALING_ROOM};
use crate::error::ProtocolError;

/// Kind of a room. Every kind owns one id prefix, so the id alone tells the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Dm,
    Group,
    Global,
    Clan,
}

impl RoomKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            RoomKind::Dm => DM_PREFIX,
            RoomKind::Group => GROUP_PREFIX,
            RoomKind::Global => GLOBAL_PREFIX,
            RoomKind::Clan => CLAN_PREFIX,
        }
    }

    /// Classify a room id by its prefix.
    pub fn from_id(id: &str) -> Option<Self> {
        [RoomKind::Dm, RoomKind::Group, RoomKind::Global, RoomKind::Clan]
            .into_iter()
            .find(|kind| id.starts_with(kind.prefix()))
    }
}

impl std::fmt::Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoomKind::Dm => "dm",
            RoomKind::Group => "group",
            RoomKind::Global => "global",
            RoomKind::Clan => "clan",
        };
        f.write_str(name)
    }
}

/// Join visibility announced to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
}

impl Visibility {
    /// A password makes a join protected.
    pub fn for_password(password: Option<&str>) -> Self {
        if password.is_some() {
            Visibility::Protected
        } else {
            Visibility::Public
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    Online,
    Offline,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
    File,
}

/// Relay link state as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Disconnected,
}

/// A chat room (DM, group, global hub or clan channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    /// Ordered set of identity ids.
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Room {
    /// Direct-message room between two identities. Both sides compute the same id.
    pub fn direct(self_id: &str, peer_id: &str, peer_name: &str, peer_avatar: Option<String>) -> Self {
        let mut members = vec![self_id.to_string()];
        if peer_id != self_id {
            members.push(peer_id.to_string());
        }
        Self {
            id: dm_room_id(self_id, peer_id),
            name: peer_name.to_string(),
            description: "Verified P2P Link.".to_string(),
            kind: RoomKind::Dm,
            members,
            icon: peer_avatar,
        }
    }

    /// Check that the id prefix agrees with the declared kind.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.id == SIGNALING_ROOM {
            return Err(ProtocolError::ReservedRoom);
        }
        match RoomKind::from_id(&self.id) {
            Some(kind) if kind == self.kind => Ok(()),
            Some(_) => Err(ProtocolError::PrefixMismatch {
                id: self.id.clone(),
                kind: self.kind.to_string(),
            }),
            None => Err(ProtocolError::UnknownRoomPrefix(self.id.clone())),
        }
    }

    /// Prefix a bare id with the room kind's prefix (legacy ids without one).
    pub fn normalized(mut self) -> Self {
        if RoomKind::from_id(&self.id).is_none() {
            self.id = format!("{}{}", self.kind.prefix(), self.id);
        }
        self
    }

    /// Members other than `self_id`, in membership order.
    pub fn peers_of<'a>(&'a self, self_id: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.members.iter().filter(move |m| m.as_str() != self_id)
    }
}

/// Deterministic DM room id: the two ids sorted lexicographically.
pub fn dm_room_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{DM_PREFIX}{lo}_{hi}")
}

/// A chat message. `timestamp` is the sender's clock in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    pub content: String,
    pub timestamp: i64,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_flagged: Option<bool>,
}

/// Ephemeral pointer position; last value wins per `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub user_id: String,
    pub user_name: String,
    pub x: f64,
    pub y: f64,
    pub room_id: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clan {
    pub id: String,
    pub name: String,
    pub tag: String,
    pub leader_id: String,
    pub members_count: u32,
    pub level: u32,
    pub banner: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dm_room_id_is_symmetric() {
        assert_eq!(dm_room_id("uid_b", "uid_a"), dm_room_id("uid_a", "uid_b"));
        assert_eq!(dm_room_id("uid_b", "uid_a"), "dm_uid_a_uid_b");
    }

    #[test]
    fn test_kind_from_prefix() {
        assert_eq!(RoomKind::from_id("dm_a_b"), Some(RoomKind::Dm));
        assert_eq!(RoomKind::from_id("group_x1"), Some(RoomKind::Group));
        assert_eq!(RoomKind::from_id("gid_global_tech"), Some(RoomKind::Global));
        assert_eq!(RoomKind::from_id("cid_void"), Some(RoomKind::Clan));
        assert_eq!(RoomKind::from_id("lobby"), None);
    }

    #[test]
    fn test_validate_rejects_mismatch() {
        let mut room = Room::direct("uid_a", "uid_b", "B", None);
        assert!(room.validate().is_ok());

        room.kind = RoomKind::Group;
        assert!(matches!(
            room.validate(),
            Err(ProtocolError::PrefixMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_signaling_room() {
        let room = Room {
            id: SIGNALING_ROOM.to_string(),
            name: "signal".into(),
            description: String::new(),
            kind: RoomKind::Global,
            members: vec![],
            icon: None,
        };
        assert!(matches!(room.validate(), Err(ProtocolError::ReservedRoom)));
    }

    #[test]
    fn test_normalized_adds_prefix() {
        let room = Room {
            id: "pubg".into(),
            name: "PUBG".into(),
            description: String::new(),
            kind: RoomKind::Global,
            members: vec![],
            icon: None,
        }
        .normalized();
        assert_eq!(room.id, "gid_pubg");
        assert_eq!(room.clone().normalized().id, "gid_pubg");
    }

    #[test]
    fn test_message_wire_names() {
        let msg = Message {
            id: "msg_1_abcd".into(),
            room_id: "group_x".into(),
            sender_id: "uid_a".into(),
            sender_name: "A".into(),
            sender_avatar: None,
            content: "hi".into(),
            timestamp: 1,
            kind: MessageKind::Text,
            media_url: None,
            is_flagged: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["roomId"], "group_x");
        assert_eq!(json["senderId"], "uid_a");
        assert_eq!(json["type"], "text");
        assert!(json.get("mediaUrl").is_none());
    }
}
