use serde::{Deserialize, Serialize};

use crate::constants::{MAX_FRAME_SIZE, SIGNALING_ROOM};
use crate::error::ProtocolError;
use crate::identity::Identity;
use crate::types::{Cursor, Message, Room, Visibility};

/// Control messages carried on the signaling room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    /// "Who is `target_id`?"
    #[serde(rename_all = "camelCase")]
    Ping { target_id: String, sender_id: String },

    /// Answer to a PING, addressed back to its sender.
    #[serde(rename_all = "camelCase")]
    Pong {
        target_id: String,
        identity: Identity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection_id: Option<String>,
    },

    /// Ask `target_id` to join `room` on its own.
    #[serde(rename_all = "camelCase")]
    Invite {
        room_id: String,
        target_id: String,
        room: Room,
    },

    /// Stable id to current relay connection id, announced on every connect.
    #[serde(rename_all = "camelCase")]
    Presence {
        stable_id: String,
        connection_id: String,
    },
}

/// A signal plus the routing metadata every relayed frame carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    pub sender_id: String,
    pub timestamp: i64,
    pub signal: Signal,
}

/// Everything that travels through `send_message`: user chat or control traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    Chat(Message),
    Signal(SignalEnvelope),
}

impl Envelope {
    /// Room the relay routes this envelope to.
    pub fn room_id(&self) -> &str {
        match self {
            Envelope::Chat(msg) => &msg.room_id,
            Envelope::Signal(_) => SIGNALING_ROOM,
        }
    }

    /// Signals go everywhere; chat goes to its room group only.
    pub fn is_global(&self) -> bool {
        self.room_id() == SIGNALING_ROOM
    }

    pub fn sender_id(&self) -> &str {
        match self {
            Envelope::Chat(msg) => &msg.sender_id,
            Envelope::Signal(env) => &env.sender_id,
        }
    }

    /// Chat must never ride the signaling room.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Envelope::Chat(msg) if msg.room_id == SIGNALING_ROOM => Err(ProtocolError::ReservedRoom),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: String,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Frames sent by clients to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinRoom(JoinRequest),
    LeaveRoom { id: String },
    SendMessage(Envelope),
    Typing(Cursor),
}

/// Frames sent by the relay to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    Welcome { connection_id: String },
    RoomJoined { id: String },
    Message(Envelope),
    Typing(Cursor),
}

fn check_size(text: &str) -> Result<(), ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encode, rejecting frames the relay would refuse to read.
    pub fn to_checked_json(&self) -> Result<String, ProtocolError> {
        let text = self.to_json()?;
        check_size(&text)?;
        Ok(text)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        check_size(text)?;
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerFrame {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        check_size(text)?;
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageKind, RoomKind};

    fn chat(room: &str) -> Message {
        Message {
            id: "msg_1_aaaa".into(),
            room_id: room.into(),
            sender_id: "uid_a".into(),
            sender_name: "A".into(),
            sender_avatar: None,
            content: "hello".into(),
            timestamp: 1_700_000_000_000,
            kind: MessageKind::Text,
            media_url: None,
            is_flagged: None,
        }
    }

    #[test]
    fn test_join_frame_shape() {
        let frame = ClientFrame::JoinRoom(JoinRequest {
            id: "group_x".into(),
            visibility: Visibility::Public,
            password: None,
        });
        let json: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "join_room");
        assert_eq!(json["data"]["id"], "group_x");
        assert_eq!(json["data"]["visibility"], "public");
        assert!(json["data"].get("password").is_none());
    }

    #[test]
    fn test_ping_signal_shape() {
        let env = Envelope::Signal(SignalEnvelope {
            sender_id: "uid_a".into(),
            timestamp: 5,
            signal: Signal::Ping {
                target_id: "uid_b".into(),
                sender_id: "uid_a".into(),
            },
        });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["kind"], "signal");
        assert_eq!(json["signal"]["type"], "PING");
        assert_eq!(json["signal"]["targetId"], "uid_b");
        assert_eq!(env.room_id(), SIGNALING_ROOM);
        assert!(env.is_global());
    }

    #[test]
    fn test_invite_decodes_once() {
        let room = Room::direct("uid_a", "uid_b", "B", None);
        let frame = ServerFrame::Message(Envelope::Signal(SignalEnvelope {
            sender_id: "uid_a".into(),
            timestamp: 9,
            signal: Signal::Invite {
                room_id: room.id.clone(),
                target_id: "uid_b".into(),
                room: room.clone(),
            },
        }));

        let decoded = ServerFrame::from_json(&frame.to_json().unwrap()).unwrap();
        match decoded {
            ServerFrame::Message(Envelope::Signal(env)) => {
                match env.signal {
                    Signal::Invite { target_id, room: r, .. } => {
                        assert_eq!(target_id, "uid_b");
                        assert_eq!(r.kind, RoomKind::Dm);
                    }
                    other => panic!("unexpected signal {other:?}"),
                }
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_chat_routes_to_room() {
        let env = Envelope::Chat(chat("group_x"));
        assert_eq!(env.room_id(), "group_x");
        assert!(!env.is_global());
        assert!(env.validate().is_ok());
        assert!(Envelope::Chat(chat(SIGNALING_ROOM)).validate().is_err());
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(ServerFrame::from_json("{\"event\":\"message\",\"data\":{\"kind\":\"nope\"}}").is_err());
        assert!(ClientFrame::from_json("not json").is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let big = "x".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(
            ClientFrame::from_json(&big),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_oversized_outgoing_frame_rejected() {
        let mut msg = chat("group_x");
        msg.sender_avatar = Some(format!("data:image/png;base64,{}", "A".repeat(MAX_FRAME_SIZE)));
        let frame = ClientFrame::SendMessage(Envelope::Chat(msg));
        assert!(matches!(
            frame.to_checked_json(),
            Err(ProtocolError::FrameTooLarge { max: MAX_FRAME_SIZE, .. })
        ));
        assert!(ClientFrame::SendMessage(Envelope::Chat(chat("group_x")))
            .to_checked_json()
            .is_ok());
    }
}
