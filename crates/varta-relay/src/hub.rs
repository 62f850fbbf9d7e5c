//! Connection registry and room fan-out.
//!
//! The relay owns no entities: it only remembers which connections are in
//! which room groups, and forgets a connection's groups when it drops.
//! Frames are serialized once and queued per connection; a connection whose
//! queue is full simply misses the frame.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use varta_shared::constants::SIGNALING_ROOM;
use varta_shared::protocol::{ClientFrame, ServerFrame};

#[derive(Default)]
struct HubState {
    connections: HashMap<String, mpsc::Sender<String>>,
    groups: HashMap<String, HashSet<String>>,
}

#[derive(Clone)]
pub struct RelayHub {
    state: Arc<RwLock<HubState>>,
    channel_capacity: usize,
}

impl RelayHub {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(HubState::default())),
            channel_capacity,
        }
    }

    /// Register a new connection. Returns its id and the queue of encoded
    /// frames to write to the socket.
    pub async fn register(&self) -> (String, mpsc::Receiver<String>) {
        let id = Uuid::new_v4().simple().to_string();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let total = {
            let mut state = self.state.write().await;
            state.connections.insert(id.clone(), tx);
            state.connections.len()
        };
        info!(connection = %id, total, "Connection registered");
        (id, rx)
    }

    /// Drop a connection and remove it from every group.
    pub async fn unregister(&self, id: &str) {
        let mut state = self.state.write().await;
        state.connections.remove(id);
        state.groups.retain(|_, members| {
            members.remove(id);
            !members.is_empty()
        });
        info!(connection = %id, total = state.connections.len(), "Connection closed");
    }

    pub async fn join(&self, id: &str, room_id: &str) -> bool {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(id) {
            return false;
        }
        let members = state.groups.entry(room_id.to_string()).or_default();
        let added = members.insert(id.to_string());
        debug!(connection = %id, room = %room_id, members = members.len(), "Joined room");
        added
    }

    pub async fn leave(&self, id: &str, room_id: &str) {
        let mut state = self.state.write().await;
        if let Some(members) = state.groups.get_mut(room_id) {
            members.remove(id);
            if members.is_empty() {
                state.groups.remove(room_id);
            }
        }
        debug!(connection = %id, room = %room_id, "Left room");
    }

    /// Apply one client frame from connection `id`.
    pub async fn handle_frame(&self, id: &str, frame: ClientFrame) {
        match frame {
            ClientFrame::JoinRoom(request) => {
                if request.password.is_some() {
                    debug!(connection = %id, room = %request.id, "Protected join, password not checked");
                }
                self.join(id, &request.id).await;
                self.send_to(id, &ServerFrame::RoomJoined { id: request.id })
                    .await;
            }
            ClientFrame::LeaveRoom { id: room_id } => {
                self.leave(id, &room_id).await;
            }
            ClientFrame::SendMessage(envelope) => {
                let room_id = envelope.room_id().to_string();
                debug!(
                    connection = %id,
                    origin = %envelope.sender_id(),
                    room = %room_id,
                    "Transmission"
                );
                let frame = ServerFrame::Message(envelope);
                if room_id == SIGNALING_ROOM {
                    self.broadcast_all(&frame).await;
                } else {
                    self.send_to_room(&room_id, &frame, None).await;
                }
            }
            ClientFrame::Typing(cursor) => {
                let room_id = cursor.room_id.clone();
                self.send_to_room(&room_id, &ServerFrame::Typing(cursor), Some(id))
                    .await;
            }
        }
    }

    pub async fn send_to(&self, id: &str, frame: &ServerFrame) {
        let Some(text) = encode(frame) else { return };
        let state = self.state.read().await;
        if let Some(tx) = state.connections.get(id) {
            deliver(id, tx, text);
        }
    }

    /// Every connection, in or out of any group.
    pub async fn broadcast_all(&self, frame: &ServerFrame) {
        let Some(text) = encode(frame) else { return };
        let state = self.state.read().await;
        for (id, tx) in &state.connections {
            deliver(id, tx, text.clone());
        }
    }

    /// Members of `room_id`, optionally skipping one connection.
    pub async fn send_to_room(&self, room_id: &str, frame: &ServerFrame, except: Option<&str>) {
        let Some(text) = encode(frame) else { return };
        let state = self.state.read().await;
        let Some(members) = state.groups.get(room_id) else {
            debug!(room = %room_id, "No members, frame dropped");
            return;
        };
        for id in members {
            if Some(id.as_str()) == except {
                continue;
            }
            if let Some(tx) = state.connections.get(id) {
                deliver(id, tx, text.clone());
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn room_count(&self) -> usize {
        self.state.read().await.groups.len()
    }

    pub async fn members_of(&self, room_id: &str) -> usize {
        self.state
            .read()
            .await
            .groups
            .get(room_id)
            .map_or(0, HashSet::len)
    }
}

fn encode(frame: &ServerFrame) -> Option<String> {
    match frame.to_json() {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "Failed to encode server frame");
            None
        }
    }
}

fn deliver(id: &str, tx: &mpsc::Sender<String>, text: String) {
    if tx.try_send(text).is_err() {
        debug!(connection = %id, "Dropping frame for slow connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use varta_shared::protocol::{Envelope, JoinRequest, Signal, SignalEnvelope};
    use varta_shared::types::{Cursor, Message, MessageKind, Visibility};

    fn join(room: &str) -> ClientFrame {
        ClientFrame::JoinRoom(JoinRequest {
            id: room.to_string(),
            visibility: Visibility::Public,
            password: None,
        })
    }

    fn chat(room: &str) -> ClientFrame {
        ClientFrame::SendMessage(Envelope::Chat(Message {
            id: "msg_1_aaaa".into(),
            room_id: room.into(),
            sender_id: "uid_a".into(),
            sender_name: "A".into(),
            sender_avatar: None,
            content: "hi".into(),
            timestamp: 1,
            kind: MessageKind::Text,
            media_url: None,
            is_flagged: None,
        }))
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(text) = rx.try_recv() {
            frames.push(ServerFrame::from_json(&text).unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn test_join_is_acknowledged() {
        let hub = RelayHub::new(16);
        let (a, mut a_rx) = hub.register().await;
        hub.handle_frame(&a, join("group_x")).await;

        assert_eq!(
            drain(&mut a_rx),
            vec![ServerFrame::RoomJoined { id: "group_x".into() }]
        );
        assert_eq!(hub.members_of("group_x").await, 1);
    }

    #[tokio::test]
    async fn test_room_message_reaches_only_members() {
        let hub = RelayHub::new(16);
        let (a, mut a_rx) = hub.register().await;
        let (b, mut b_rx) = hub.register().await;
        let (_c, mut c_rx) = hub.register().await;
        hub.handle_frame(&a, join("group_x")).await;
        hub.handle_frame(&b, join("group_x")).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        hub.handle_frame(&a, chat("group_x")).await;

        assert_eq!(drain(&mut a_rx).len(), 1);
        assert!(matches!(drain(&mut b_rx).as_slice(), [ServerFrame::Message(Envelope::Chat(_))]));
        assert!(drain(&mut c_rx).is_empty());
    }

    #[tokio::test]
    async fn test_signaling_reaches_everyone() {
        let hub = RelayHub::new(16);
        let (a, _a_rx) = hub.register().await;
        let (_b, mut b_rx) = hub.register().await;

        let ping = ClientFrame::SendMessage(Envelope::Signal(SignalEnvelope {
            sender_id: "uid_a".into(),
            timestamp: 1,
            signal: Signal::Ping {
                target_id: "uid_b".into(),
                sender_id: "uid_a".into(),
            },
        }));
        hub.handle_frame(&a, ping).await;

        // b never joined the signaling room.
        assert_eq!(drain(&mut b_rx).len(), 1);
    }

    #[tokio::test]
    async fn test_typing_skips_sender() {
        let hub = RelayHub::new(16);
        let (a, mut a_rx) = hub.register().await;
        let (b, mut b_rx) = hub.register().await;
        hub.handle_frame(&a, join("group_x")).await;
        hub.handle_frame(&b, join("group_x")).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        let cursor = Cursor {
            user_id: "uid_a".into(),
            user_name: "A".into(),
            x: 1.0,
            y: 1.0,
            room_id: "group_x".into(),
            color: "#fff".into(),
        };
        hub.handle_frame(&a, ClientFrame::Typing(cursor)).await;

        assert!(drain(&mut a_rx).is_empty());
        assert!(matches!(drain(&mut b_rx).as_slice(), [ServerFrame::Typing(_)]));
    }

    #[tokio::test]
    async fn test_unregister_forgets_groups() {
        let hub = RelayHub::new(16);
        let (a, _a_rx) = hub.register().await;
        hub.handle_frame(&a, join("group_x")).await;
        assert_eq!(hub.room_count().await, 1);

        hub.unregister(&a).await;
        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let hub = RelayHub::new(16);
        let (a, _a_rx) = hub.register().await;
        let (b, mut b_rx) = hub.register().await;
        hub.handle_frame(&b, join("group_x")).await;
        hub.handle_frame(&b, ClientFrame::LeaveRoom { id: "group_x".into() }).await;
        drain(&mut b_rx);

        hub.handle_frame(&a, chat("group_x")).await;
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let hub = RelayHub::new(1);
        let (a, mut a_rx) = hub.register().await;
        hub.handle_frame(&a, join("group_x")).await;
        hub.handle_frame(&a, chat("group_x")).await;
        hub.handle_frame(&a, chat("group_x")).await;
        assert_eq!(drain(&mut a_rx).len(), 1);
    }
}
