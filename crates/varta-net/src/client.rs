//! Handle to the relay link plus the command/notification types that cross
//! the task boundary.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use varta_shared::constants::{
    DEFAULT_RELAY_PORT, RECONNECT_INITIAL_MS, RECONNECT_MAX_MS, RELAY_WS_PATH,
};
use varta_shared::protocol::{ClientFrame, Envelope, JoinRequest};
use varta_shared::types::{Cursor, Visibility};

use crate::error::NetError;
use crate::membership::Membership;

/// Commands sent *into* the link task.
#[derive(Debug)]
pub enum RelayCommand {
    /// Write a frame to the relay socket. Dropped while disconnected.
    Frame(ClientFrame),
    /// Close the socket and stop reconnecting.
    Shutdown,
}

/// Notifications sent *from* the link task to the application.
#[derive(Debug, Clone)]
pub enum RelayNotification {
    /// Handshake finished and rooms were re-requested.
    Connected { connection_id: String },
    /// Socket closed; a reconnect is scheduled.
    Disconnected,
    /// The relay acknowledged a join.
    RoomJoined { room_id: String },
    Message { room_id: String, envelope: Envelope },
    Cursor { room_id: String, cursor: Cursor },
}

/// Configuration for spawning the relay link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// WebSocket URL of the relay, e.g. `ws://127.0.0.1:3000/ws`.
    pub url: String,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    /// Upper bound for dial plus `welcome` handshake.
    pub connect_timeout: Duration,
    pub channel_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:{DEFAULT_RELAY_PORT}{RELAY_WS_PATH}"),
            reconnect_initial: Duration::from_millis(RECONNECT_INITIAL_MS),
            reconnect_max: Duration::from_millis(RECONNECT_MAX_MS),
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 256,
        }
    }
}

/// State shared between the handle and the link task. One lock covers both
/// fields so "is this room new?" and "are we connected?" are answered together.
#[derive(Debug, Default)]
pub(crate) struct LinkState {
    pub membership: Membership,
    pub connection_id: Option<String>,
}

impl LinkState {
    /// Record the new connection id and return the joins to replay.
    pub(crate) fn on_connected(&mut self, connection_id: String) -> Vec<JoinRequest> {
        self.connection_id = Some(connection_id);
        self.membership.resync()
    }

    pub(crate) fn on_disconnected(&mut self) {
        self.connection_id = None;
        self.membership.on_disconnect();
    }
}

/// Cloneable handle to the relay link.
#[derive(Debug, Clone)]
pub struct RelayClient {
    cmd_tx: mpsc::Sender<RelayCommand>,
    state: Arc<Mutex<LinkState>>,
}

impl RelayClient {
    pub(crate) fn new(cmd_tx: mpsc::Sender<RelayCommand>, state: Arc<Mutex<LinkState>>) -> Self {
        Self { cmd_tx, state }
    }

    pub(crate) fn lock_state(state: &Mutex<LinkState>) -> MutexGuard<'_, LinkState> {
        state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, LinkState> {
        Self::lock_state(&self.state)
    }

    /// Request membership of `room_id`. A no-op if the room is already
    /// pending or active. While disconnected the request is only recorded and
    /// goes out with the next reconnect.
    pub async fn join(
        &self,
        room_id: &str,
        visibility: Visibility,
        password: Option<String>,
    ) -> Result<(), NetError> {
        let request = JoinRequest {
            id: room_id.to_string(),
            visibility,
            password,
        };
        let send_now = {
            let mut state = self.state();
            let is_new = state.membership.request(request.clone());
            is_new && state.connection_id.is_some()
        };
        if send_now {
            self.push(ClientFrame::JoinRoom(request)).await?;
        }
        Ok(())
    }

    pub async fn leave(&self, room_id: &str) -> Result<(), NetError> {
        let send_now = {
            let mut state = self.state();
            let known = state.membership.forget(room_id);
            known && state.connection_id.is_some()
        };
        if send_now {
            self.push(ClientFrame::LeaveRoom {
                id: room_id.to_string(),
            })
            .await?;
        }
        Ok(())
    }

    /// Send an envelope to `room_id`, joining first if the room is not active.
    /// Envelopes that would exceed the relay's frame cap are rejected here
    /// with [`ProtocolError::FrameTooLarge`] instead of costing the link.
    ///
    /// [`ProtocolError::FrameTooLarge`]: varta_shared::ProtocolError::FrameTooLarge
    pub async fn send(&self, room_id: &str, envelope: Envelope) -> Result<(), NetError> {
        envelope.validate()?;
        let global = envelope.is_global();
        let frame = checked(ClientFrame::SendMessage(envelope))?;
        if !global && !self.is_active(room_id) {
            debug!(room = %room_id, "Send to inactive room, joining first");
            self.join(room_id, Visibility::Public, None).await?;
        }
        self.enqueue(frame).await
    }

    /// Fan a cursor position out to the room. Never stored, never joins.
    pub async fn broadcast_ephemeral(&self, room_id: &str, mut cursor: Cursor) -> Result<(), NetError> {
        cursor.room_id = room_id.to_string();
        self.push(ClientFrame::Typing(cursor)).await
    }

    pub fn is_connected(&self) -> bool {
        self.state().connection_id.is_some()
    }

    /// Connection id assigned by the relay for the current connection.
    pub fn self_id(&self) -> Option<String> {
        self.state().connection_id.clone()
    }

    pub fn is_active(&self, room_id: &str) -> bool {
        self.state().membership.is_active(room_id)
    }

    pub fn is_pending(&self, room_id: &str) -> bool {
        self.state().membership.is_pending(room_id)
    }

    pub async fn shutdown(&self) -> Result<(), NetError> {
        self.cmd_tx
            .send(RelayCommand::Shutdown)
            .await
            .map_err(|_| NetError::ChannelClosed)
    }

    async fn push(&self, frame: ClientFrame) -> Result<(), NetError> {
        let frame = checked(frame)?;
        self.enqueue(frame).await
    }

    async fn enqueue(&self, frame: ClientFrame) -> Result<(), NetError> {
        self.cmd_tx
            .send(RelayCommand::Frame(frame))
            .await
            .map_err(|_| NetError::ChannelClosed)
    }
}

fn checked(frame: ClientFrame) -> Result<ClientFrame, NetError> {
    frame.to_checked_json()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use varta_shared::constants::{MAX_FRAME_SIZE, SIGNALING_ROOM};
    use varta_shared::protocol::{Signal, SignalEnvelope};
    use varta_shared::ProtocolError;
    use varta_shared::types::{Message, MessageKind};

    fn handle(connected: bool) -> (RelayClient, mpsc::Receiver<RelayCommand>, Arc<Mutex<LinkState>>) {
        let (tx, rx) = mpsc::channel(16);
        let state = Arc::new(Mutex::new(LinkState::default()));
        if connected {
            state.lock().unwrap().connection_id = Some("conn-1".into());
        }
        (RelayClient::new(tx, state.clone()), rx, state)
    }

    fn chat(room: &str) -> Envelope {
        Envelope::Chat(Message {
            id: "msg_1_abcd".into(),
            room_id: room.into(),
            sender_id: "uid_a".into(),
            sender_name: "A".into(),
            sender_avatar: None,
            content: "hi".into(),
            timestamp: 1,
            kind: MessageKind::Text,
            media_url: None,
            is_flagged: None,
        })
    }

    #[tokio::test]
    async fn test_join_twice_sends_one_frame() {
        let (client, mut rx, _) = handle(true);
        client.join("group_a", Visibility::Public, None).await.unwrap();
        client.join("group_a", Visibility::Public, None).await.unwrap();

        assert!(matches!(
            rx.try_recv(),
            Ok(RelayCommand::Frame(ClientFrame::JoinRoom(JoinRequest { ref id, .. }))) if id == "group_a"
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_while_disconnected_is_only_recorded() {
        let (client, mut rx, _) = handle(false);
        client.join("group_a", Visibility::Public, None).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert!(client.is_pending("group_a"));
        assert!(!client.is_connected());
        assert_eq!(client.self_id(), None);
    }

    #[tokio::test]
    async fn test_send_to_inactive_room_joins_first() {
        let (client, mut rx, _) = handle(true);
        client.send("group_a", chat("group_a")).await.unwrap();

        assert!(matches!(rx.try_recv(), Ok(RelayCommand::Frame(ClientFrame::JoinRoom(_)))));
        assert!(matches!(rx.try_recv(), Ok(RelayCommand::Frame(ClientFrame::SendMessage(_)))));
    }

    #[tokio::test]
    async fn test_send_to_active_room_skips_join() {
        let (client, mut rx, state) = handle(true);
        client.join("group_a", Visibility::Public, None).await.unwrap();
        let _ = rx.try_recv();
        state.lock().unwrap().membership.acknowledge("group_a");

        client.send("group_a", chat("group_a")).await.unwrap();
        assert!(matches!(rx.try_recv(), Ok(RelayCommand::Frame(ClientFrame::SendMessage(_)))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_signal_send_never_joins() {
        let (client, mut rx, _) = handle(true);
        let env = Envelope::Signal(SignalEnvelope {
            sender_id: "uid_a".into(),
            timestamp: 1,
            signal: Signal::Ping {
                target_id: "uid_b".into(),
                sender_id: "uid_a".into(),
            },
        });
        client.send(SIGNALING_ROOM, env).await.unwrap();
        assert!(matches!(rx.try_recv(), Ok(RelayCommand::Frame(ClientFrame::SendMessage(_)))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chat_to_signaling_room_rejected() {
        let (client, mut rx, _) = handle(true);
        let err = client.send(SIGNALING_ROOM, chat(SIGNALING_ROOM)).await.unwrap_err();
        assert!(matches!(err, NetError::Protocol(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_envelope_rejected_before_join() {
        let (client, mut rx, _) = handle(true);
        let mut env = chat("group_a");
        if let Envelope::Chat(msg) = &mut env {
            msg.sender_avatar = Some(format!("data:image/png;base64,{}", "A".repeat(MAX_FRAME_SIZE)));
        }

        let err = client.send("group_a", env).await.unwrap_err();
        assert!(matches!(err, NetError::Protocol(ProtocolError::FrameTooLarge { .. })));
        assert!(rx.try_recv().is_err());
        assert!(!client.is_pending("group_a"));

        // The link is untouched; ordinary traffic still goes out.
        client.send("group_a", chat("group_a")).await.unwrap();
        assert!(matches!(rx.try_recv(), Ok(RelayCommand::Frame(ClientFrame::JoinRoom(_)))));
        assert!(matches!(rx.try_recv(), Ok(RelayCommand::Frame(ClientFrame::SendMessage(_)))));
    }

    #[tokio::test]
    async fn test_cursor_is_stamped_with_room() {
        let (client, mut rx, _) = handle(true);
        let cursor = Cursor {
            user_id: "uid_a".into(),
            user_name: "A".into(),
            x: 1.0,
            y: 2.0,
            room_id: String::new(),
            color: "#fff".into(),
        };
        client.broadcast_ephemeral("group_a", cursor).await.unwrap();
        match rx.try_recv() {
            Ok(RelayCommand::Frame(ClientFrame::Typing(c))) => assert_eq!(c.room_id, "group_a"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_leave_unknown_room_sends_nothing() {
        let (client, mut rx, _) = handle(true);
        client.leave("group_zzz").await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_channel_is_an_error() {
        let (client, rx, _) = handle(true);
        drop(rx);
        let err = client.join("group_a", Visibility::Public, None).await.unwrap_err();
        assert!(matches!(err, NetError::ChannelClosed));
    }
}
