//! Room history: send, receive, load and purge messages.

use tracing::{debug, info};

use varta_net::RelayClient;
use varta_shared::constants::SIGNALING_ROOM;
use varta_shared::identity::Identity;
use varta_shared::ids::{new_message_id, now_millis};
use varta_shared::protocol::Envelope;
use varta_shared::types::{Cursor, Message, MessageKind};
use varta_shared::ProtocolError;

use crate::bus::{BusEvent, EventBus};
use crate::error::Result;
use crate::store::StoreHandle;

#[derive(Clone)]
pub struct MessagingService {
    store: StoreHandle,
    relay: RelayClient,
    bus: EventBus,
}

impl MessagingService {
    pub fn new(store: StoreHandle, relay: RelayClient, bus: EventBus) -> Self {
        Self { store, relay, bus }
    }

    /// Build a message from `sender` with a fresh id and the local clock.
    pub fn compose(sender: &Identity, room_id: &str, content: &str, kind: MessageKind) -> Message {
        let timestamp = now_millis();
        Message {
            id: new_message_id(timestamp),
            room_id: room_id.to_string(),
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            sender_avatar: (!sender.avatar.is_empty()).then(|| sender.avatar.clone()),
            content: content.to_string(),
            timestamp,
            kind,
            media_url: None,
            is_flagged: None,
        }
    }

    /// Persist, hand to the relay, then announce locally. Delivery is
    /// best-effort: `MessageSent` means the relay link accepted the frame.
    pub async fn send_message(&self, message: Message) -> Result<()> {
        if message.room_id == SIGNALING_ROOM {
            return Err(ProtocolError::ReservedRoom.into());
        }

        self.store.with(|db| db.insert_message(&message))?;

        debug!(room = %message.room_id, id = %message.id, "Sending message");
        self.relay
            .send(&message.room_id, Envelope::Chat(message.clone()))
            .await?;
        self.bus.emit(BusEvent::MessageSent(message), true);
        Ok(())
    }

    /// Store and announce a message that arrived from the relay.
    /// Returns `false` for ids already stored (echoes, duplicate deliveries).
    pub fn handle_incoming(&self, message: Message) -> Result<bool> {
        if message.room_id == SIGNALING_ROOM {
            debug!(id = %message.id, "Chat on signaling room ignored");
            return Ok(false);
        }
        if !self.store.with(|db| db.insert_message(&message))? {
            debug!(id = %message.id, "Duplicate message dropped");
            return Ok(false);
        }
        self.bus.emit(BusEvent::MessageReceived(message), false);
        Ok(true)
    }

    /// Full history of `room_id`, oldest first.
    pub fn load_history(&self, room_id: &str) -> Result<Vec<Message>> {
        self.store.with(|db| db.get_messages_for_room(room_id))
    }

    pub fn delete_history(&self, room_id: &str) -> Result<usize> {
        let purged = self.store.with(|db| db.delete_messages_for_room(room_id))?;
        info!(room = %room_id, purged, "History cleared");
        self.bus.emit(
            BusEvent::HistoryCleared {
                room_id: room_id.to_string(),
            },
            true,
        );
        Ok(purged)
    }

    pub fn delete_message(&self, room_id: &str, id: &str) -> Result<bool> {
        let deleted = self.store.with(|db| db.delete_message(room_id, id))?;
        if deleted {
            self.bus.emit(
                BusEvent::MessageDeleted {
                    room_id: room_id.to_string(),
                    id: id.to_string(),
                },
                true,
            );
        }
        Ok(deleted)
    }

    /// Share a pointer position with the room. Nothing is stored.
    pub async fn send_cursor(&self, room_id: &str, cursor: Cursor) -> Result<()> {
        self.relay.broadcast_ephemeral(room_id, cursor).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventKind;
    use crate::error::ClientError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use varta_net::test_support::LoopbackLink;
    use varta_shared::protocol::ClientFrame;
    use varta_store::Database;

    fn service() -> (MessagingService, LoopbackLink, EventBus) {
        let link = LoopbackLink::new();
        link.connect("conn-a");
        let store = StoreHandle::new();
        store.open(Database::open_in_memory().unwrap());
        let bus = EventBus::new();
        (MessagingService::new(store, link.client(), bus.clone()), link, bus)
    }

    fn message(id: &str, room: &str, ts: i64) -> Message {
        Message {
            id: id.to_string(),
            room_id: room.to_string(),
            sender_id: "uid_bob000000".into(),
            sender_name: "Bob".into(),
            sender_avatar: None,
            content: format!("content {id}"),
            timestamp: ts,
            kind: MessageKind::Text,
            media_url: None,
            is_flagged: None,
        }
    }

    #[tokio::test]
    async fn test_send_persists_emits_and_relays() {
        let (svc, mut link, bus) = service();
        let sent = Arc::new(AtomicUsize::new(0));
        let s = sent.clone();
        let _sub = bus.on(EventKind::MessageSent, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        let me = Identity::listed("uid_alice0000", "Alice", "");
        let msg = MessagingService::compose(&me, "group_a", "hello", MessageKind::Text);
        assert!(msg.id.starts_with("msg_"));
        assert!(msg.sender_avatar.is_none());
        svc.send_message(msg.clone()).await.unwrap();

        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert_eq!(svc.load_history("group_a").unwrap(), vec![msg.clone()]);
        let frames = link.drain_frames();
        assert!(matches!(
            frames.last(),
            Some(ClientFrame::SendMessage(Envelope::Chat(m))) if m.id == msg.id
        ));
    }

    #[tokio::test]
    async fn test_rejected_send_is_stored_but_not_announced() {
        let (svc, mut link, bus) = service();
        let (_sub, mut sent) = bus.channel(EventKind::MessageSent);

        let mut msg = message("msg_1_aaaa", "group_a", 1);
        msg.sender_avatar = Some(format!(
            "data:image/png;base64,{}",
            "A".repeat(varta_shared::constants::MAX_FRAME_SIZE)
        ));
        let err = svc.send_message(msg).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Net(varta_net::NetError::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));

        assert!(sent.try_recv().is_err());
        assert!(link.drain_frames().is_empty());
        assert_eq!(svc.load_history("group_a").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_to_signaling_room_rejected() {
        let (svc, _link, _bus) = service();
        let err = svc
            .send_message(message("msg_1_aaaa", SIGNALING_ROOM, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::ReservedRoom)));
    }

    #[test]
    fn test_history_sorted_and_deduplicated() {
        let (svc, _link, bus) = service();
        let (_sub, mut received) = bus.channel(EventKind::MessageReceived);

        for (id, ts) in [("msg_3_cccc", 30), ("msg_1_aaaa", 10), ("msg_2_bbbb", 20)] {
            assert!(svc.handle_incoming(message(id, "group_a", ts)).unwrap());
        }
        // Same ids observed again.
        assert!(!svc.handle_incoming(message("msg_1_aaaa", "group_a", 10)).unwrap());
        assert!(!svc.handle_incoming(message("msg_2_bbbb", "group_a", 20)).unwrap());
        svc.handle_incoming(message("msg_9_zzzz", "group_b", 5)).unwrap();

        let ids: Vec<_> = svc
            .load_history("group_a")
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["msg_1_aaaa", "msg_2_bbbb", "msg_3_cccc"]);

        let mut count = 0;
        while received.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[test]
    fn test_own_echo_is_not_received_twice() {
        let (svc, _link, _bus) = service();
        let msg = message("msg_1_aaaa", "group_a", 1);
        svc.store.with(|db| db.insert_message(&msg)).unwrap();
        assert!(!svc.handle_incoming(msg).unwrap());
    }

    #[test]
    fn test_delete_history_leaves_other_rooms() {
        let (svc, _link, _bus) = service();
        svc.handle_incoming(message("msg_1_aaaa", "group_a", 1)).unwrap();
        svc.handle_incoming(message("msg_2_bbbb", "group_a", 2)).unwrap();
        svc.handle_incoming(message("msg_3_cccc", "group_b", 3)).unwrap();

        assert_eq!(svc.delete_history("group_a").unwrap(), 2);
        assert!(svc.load_history("group_a").unwrap().is_empty());
        assert_eq!(svc.load_history("group_b").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_single_message() {
        let (svc, _link, _bus) = service();
        svc.handle_incoming(message("msg_1_aaaa", "group_a", 1)).unwrap();
        assert!(!svc.delete_message("group_b", "msg_1_aaaa").unwrap());
        assert!(svc.delete_message("group_a", "msg_1_aaaa").unwrap());
        assert!(!svc.delete_message("group_a", "msg_1_aaaa").unwrap());
        assert!(svc.load_history("group_a").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_not_persisted() {
        let (svc, mut link, _bus) = service();
        let cursor = Cursor {
            user_id: "uid_alice0000".into(),
            user_name: "Alice".into(),
            x: 0.5,
            y: 0.25,
            room_id: String::new(),
            color: "#0ff".into(),
        };
        svc.send_cursor("group_a", cursor).await.unwrap();
        assert!(matches!(
            link.drain_frames().as_slice(),
            [ClientFrame::Typing(c)] if c.room_id == "group_a"
        ));
        assert!(svc.load_history("group_a").unwrap().is_empty());
    }
}
