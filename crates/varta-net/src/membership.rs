//! Room membership bookkeeping for the relay link.
//!
//! A room is *pending* from the moment a join is requested until the relay
//! acknowledges it with `room_joined`, then *active*. Every known room is
//! re-requested after a reconnect, because the relay forgets groups when a
//! connection drops.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use varta_shared::constants::SIGNALING_ROOM;
use varta_shared::protocol::JoinRequest;

#[derive(Debug, Default)]
pub struct Membership {
    requests: HashMap<String, JoinRequest>,
    active: HashSet<String>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a join request. Returns `false` when the room is already
    /// pending or active, in which case no frame should be sent.
    pub fn request(&mut self, request: JoinRequest) -> bool {
        if request.id == SIGNALING_ROOM || self.requests.contains_key(&request.id) {
            return false;
        }
        debug!(room = %request.id, "Room join pending");
        self.requests.insert(request.id.clone(), request);
        true
    }

    /// Mark a room active after the relay acknowledged it.
    /// Acks for rooms we never asked for (or have since left) are ignored.
    pub fn acknowledge(&mut self, room_id: &str) -> bool {
        if !self.requests.contains_key(room_id) {
            return false;
        }
        self.active.insert(room_id.to_string())
    }

    /// Drop a room entirely. Returns whether it was known.
    pub fn forget(&mut self, room_id: &str) -> bool {
        self.active.remove(room_id);
        self.requests.remove(room_id).is_some()
    }

    /// The relay dropped our groups: every active room becomes pending again.
    pub fn on_disconnect(&mut self) {
        self.active.clear();
    }

    /// Join requests to replay after a (re)connect, ordered by room id.
    pub fn resync(&self) -> Vec<JoinRequest> {
        let mut requests: Vec<JoinRequest> = self.requests.values().cloned().collect();
        requests.sort_by(|a, b| a.id.cmp(&b.id));
        requests
    }

    pub fn is_active(&self, room_id: &str) -> bool {
        self.active.contains(room_id)
    }

    pub fn is_pending(&self, room_id: &str) -> bool {
        self.requests.contains_key(room_id) && !self.active.contains(room_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
