//! Room and community lifecycle: join, create, leave, delete, invites, clans.

use tracing::{debug, info, warn};

use varta_net::{NetError, RelayClient};
use varta_shared::constants::{CLAN_PREFIX, SIGNALING_ROOM};
use varta_shared::identity::Identity;
use varta_shared::ids::{new_group_id, now_millis};
use varta_shared::protocol::{Envelope, Signal, SignalEnvelope};
use varta_shared::types::{Clan, Room, RoomKind, Visibility};
use varta_shared::ProtocolError;

use crate::bus::{BusEvent, EventBus};
use crate::error::{ClientError, Result};
use crate::session::CurrentIdentity;
use crate::store::StoreHandle;

#[derive(Clone)]
pub struct RoomService {
    store: StoreHandle,
    relay: RelayClient,
    bus: EventBus,
    current: CurrentIdentity,
}

impl RoomService {
    pub fn new(store: StoreHandle, relay: RelayClient, bus: EventBus, current: CurrentIdentity) -> Self {
        Self {
            store,
            relay,
            bus,
            current,
        }
    }

    /// Persist `room`, join its relay channel and announce it. For DM rooms,
    /// `signal_recipient` also sends an INVITE to every other member.
    pub async fn join_room(&self, room: Room, signal_recipient: bool) -> Result<Room> {
        let room = self.enter(room, None).await?;
        if signal_recipient && room.kind == RoomKind::Dm {
            self.invite_members(&room).await?;
        }
        Ok(room)
    }

    /// Join with a password; the relay sees a protected join. The password
    /// is kept with the room so restored memberships stay protected.
    pub async fn join_protected(&self, room: Room, password: &str) -> Result<Room> {
        self.enter(room, Some(password.to_string())).await
    }

    pub async fn create_group(&self, name: &str, description: &str, creator_id: &str) -> Result<Room> {
        let room = Room {
            id: new_group_id(),
            name: name.to_string(),
            description: description.to_string(),
            kind: RoomKind::Group,
            members: vec![creator_id.to_string()],
            icon: None,
        };
        info!(room = %room.id, name, "Creating group");
        self.join_room(room, false).await
    }

    /// Open the DM room with `peer` and invite them into it.
    pub async fn start_dm(&self, self_id: &str, peer: &Identity) -> Result<Room> {
        let avatar = (!peer.avatar.is_empty()).then(|| peer.avatar.clone());
        let room = Room::direct(self_id, &peer.id, &peer.name, avatar);
        self.join_room(room, true).await
    }

    /// Leave the relay channel. The record and its history stay.
    pub async fn leave_room(&self, room_id: &str) -> Result<()> {
        self.relay.leave(room_id).await?;
        info!(room = %room_id, "Room left");
        self.bus.emit(
            BusEvent::RoomLeft {
                room_id: room_id.to_string(),
            },
            true,
        );
        Ok(())
    }

    /// Remove the room and its history locally. Other members are not told.
    pub async fn delete_room(&self, room_id: &str) -> Result<bool> {
        let existed = self.store.with(|db| db.delete_room(room_id))?;
        let purged = self.store.with(|db| db.delete_messages_for_room(room_id))?;
        self.relay.leave(room_id).await?;
        info!(room = %room_id, existed, purged, "Room deleted");
        self.bus.emit(
            BusEvent::RoomDeleted {
                room_id: room_id.to_string(),
            },
            true,
        );
        Ok(existed)
    }

    /// Persisted rooms in the order they were first joined.
    pub fn get_joined_rooms(&self) -> Result<Vec<Room>> {
        self.store.with(|db| db.list_rooms())
    }

    pub fn get_room(&self, room_id: &str) -> Result<Option<Room>> {
        self.store.with(|db| db.get_room(room_id))
    }

    pub fn get_clans(&self) -> Result<Vec<Clan>> {
        self.store.with(|db| db.list_clans())
    }

    pub fn save_clan(&self, clan: &Clan) -> Result<()> {
        if !clan.id.starts_with(CLAN_PREFIX) {
            return Err(ProtocolError::PrefixMismatch {
                id: clan.id.clone(),
                kind: RoomKind::Clan.to_string(),
            }
            .into());
        }
        self.store.with(|db| db.upsert_clan(clan))
    }

    /// Request relay membership for every persisted room, with the password
    /// it was joined with. Returns how many.
    pub async fn restore_memberships(&self) -> Result<usize> {
        let rooms = self.get_joined_rooms()?;
        for room in &rooms {
            let password = self.store.with(|db| db.room_password(&room.id))?;
            let visibility = Visibility::for_password(password.as_deref());
            self.relay.join(&room.id, visibility, password).await?;
        }
        debug!(count = rooms.len(), "Room memberships restored");
        Ok(rooms.len())
    }

    /// Passive invite listener. Returns whether a new room was adopted.
    pub async fn handle_signal(&self, envelope: &SignalEnvelope) -> Result<bool> {
        let Signal::Invite {
            room_id,
            target_id,
            room,
        } = &envelope.signal
        else {
            return Ok(false);
        };
        if !self.current.is(target_id) {
            return Ok(false);
        }

        let room = room.clone().normalized();
        if room.id != *room_id {
            warn!(room = %room.id, claimed = %room_id, "Invite room id mismatch, dropped");
            return Ok(false);
        }
        if let Err(e) = room.validate() {
            warn!(room = %room.id, error = %e, "Invalid invited room, dropped");
            return Ok(false);
        }
        if self.store.with(|db| db.has_room(&room.id))? {
            debug!(room = %room.id, "Invite for known room ignored");
            return Ok(false);
        }

        info!(room = %room.id, from = %envelope.sender_id, "Invite accepted");
        let room = self.enter(room, None).await?;
        self.bus.emit(
            BusEvent::InviteReceived {
                room,
                from: envelope.sender_id.clone(),
            },
            false,
        );
        Ok(true)
    }

    async fn enter(&self, room: Room, password: Option<String>) -> Result<Room> {
        let room = room.normalized();
        room.validate()?;

        self.store.with(|db| {
            db.upsert_room(&room)?;
            db.set_room_password(&room.id, password.as_deref())
        })?;
        let visibility = Visibility::for_password(password.as_deref());
        self.relay.join(&room.id, visibility, password).await?;

        info!(room = %room.id, kind = %room.kind, "Room joined");
        self.bus.emit(BusEvent::RoomJoined(room.clone()), true);
        Ok(room)
    }

    async fn invite_members(&self, room: &Room) -> Result<()> {
        let self_id = self.current.id().ok_or(ClientError::NoSession)?;
        for peer in room.peers_of(&self_id) {
            debug!(room = %room.id, peer = %peer, "Sending INVITE");
            match self.send_invite(&self_id, peer, room.clone()).await {
                Err(NetError::Protocol(ProtocolError::FrameTooLarge { size, .. })) => {
                    // Inline icons can outgrow a frame; the peer can live without it.
                    warn!(room = %room.id, size, "INVITE too large, sending without icon");
                    let mut bare = room.clone();
                    bare.icon = None;
                    self.send_invite(&self_id, peer, bare).await?;
                }
                other => other?,
            }
        }
        Ok(())
    }

    async fn send_invite(&self, self_id: &str, peer: &str, room: Room) -> std::result::Result<(), NetError> {
        let invite = Envelope::Signal(SignalEnvelope {
            sender_id: self_id.to_string(),
            timestamp: now_millis(),
            signal: Signal::Invite {
                room_id: room.id.clone(),
                target_id: peer.to_string(),
                room,
            },
        });
        self.relay.send(SIGNALING_ROOM, invite).await
    }
}
