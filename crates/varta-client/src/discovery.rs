//! Identity resolution over the signaling room.
//!
//! `resolve_identity` checks the static directory first, then broadcasts a
//! PING and waits for the matching PONG. Each call registers its own pending
//! entry under a fresh token and removes it on every exit path, so concurrent
//! lookups never see each other's answers or timers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use varta_net::{NetError, RelayClient};
use varta_shared::constants::SIGNALING_ROOM;
use varta_shared::directory::Directory;
use varta_shared::identity::Identity;
use varta_shared::ids::now_millis;
use varta_shared::protocol::{Envelope, Signal, SignalEnvelope};
use varta_shared::types::{Room, RoomKind};
use varta_shared::ProtocolError;

use crate::bus::{BusEvent, EventBus};
use crate::error::{ClientError, Result};
use crate::session::CurrentIdentity;

/// Outcome of a lookup. `verified` is only set for directory entries;
/// anything learned from the network is self-asserted by the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIdentity {
    pub identity: Identity,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

struct PendingLookup {
    query: String,
    reply: oneshot::Sender<ResolvedIdentity>,
}

#[derive(Default)]
struct DiscoveryState {
    pending: HashMap<u64, PendingLookup>,
    /// stable id -> last known relay connection id
    presence: HashMap<String, String>,
}

#[derive(Clone)]
pub struct Discovery {
    relay: RelayClient,
    directory: Arc<Directory>,
    current: CurrentIdentity,
    bus: EventBus,
    timeout: Duration,
    next_token: Arc<AtomicU64>,
    state: Arc<Mutex<DiscoveryState>>,
}

impl Discovery {
    pub fn new(
        relay: RelayClient,
        directory: Arc<Directory>,
        current: CurrentIdentity,
        bus: EventBus,
        timeout: Duration,
    ) -> Self {
        Self {
            relay,
            directory,
            current,
            bus,
            timeout,
            next_token: Arc::new(AtomicU64::new(1)),
            state: Arc::new(Mutex::new(DiscoveryState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, DiscoveryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve `query` (a stable id) to a live identity.
    /// `Ok(None)` means nobody answered within the timeout.
    pub async fn resolve_identity(&self, query: &str) -> Result<Option<ResolvedIdentity>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        if let Some(identity) = self.directory.user(query) {
            debug!(query, "Identity found in directory");
            let resolved = ResolvedIdentity {
                identity: identity.clone(),
                verified: true,
                connection_id: None,
            };
            self.bus
                .emit(BusEvent::IdentityResolved(resolved.clone()), false);
            return Ok(Some(resolved));
        }

        let self_id = self.current.id().ok_or(ClientError::NoSession)?;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (reply, answer) = oneshot::channel();
        self.state().pending.insert(
            token,
            PendingLookup {
                query: query.to_string(),
                reply,
            },
        );

        let ping = signal(
            &self_id,
            Signal::Ping {
                target_id: query.to_string(),
                sender_id: self_id.clone(),
            },
        );
        if let Err(e) = self.relay.send(SIGNALING_ROOM, ping).await {
            self.state().pending.remove(&token);
            return Err(e.into());
        }
        debug!(query, token, "PING sent");

        let outcome = tokio::time::timeout(self.timeout, answer).await;
        self.state().pending.remove(&token);

        match outcome {
            Ok(Ok(resolved)) => {
                info!(query, connection_id = ?resolved.connection_id, "Identity resolved");
                self.bus
                    .emit(BusEvent::IdentityResolved(resolved.clone()), false);
                Ok(Some(resolved))
            }
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                debug!(query, timeout_ms = self.timeout.as_millis() as u64, "Identity lookup timed out");
                Ok(None)
            }
        }
    }

    /// Public group or global hub by id, from the directory.
    pub fn find_group(&self, gid: &str) -> Option<Room> {
        self.directory
            .room(gid.trim())
            .filter(|room| matches!(room.kind, RoomKind::Group | RoomKind::Global))
            .cloned()
    }

    /// Last relay connection id announced for `stable_id`.
    pub fn connection_of(&self, stable_id: &str) -> Option<String> {
        self.state().presence.get(stable_id).cloned()
    }

    /// Number of lookups currently waiting for a PONG.
    pub fn pending_lookups(&self) -> usize {
        self.state().pending.len()
    }

    /// Tell everyone which connection our stable id is on now.
    pub async fn announce_presence(&self) -> Result<()> {
        let (Some(stable_id), Some(connection_id)) = (self.current.id(), self.relay.self_id()) else {
            return Ok(());
        };
        debug!(stable_id = %stable_id, connection_id = %connection_id, "Announcing presence");
        let presence = signal(
            &stable_id,
            Signal::Presence {
                stable_id: stable_id.clone(),
                connection_id,
            },
        );
        self.relay.send(SIGNALING_ROOM, presence).await?;
        Ok(())
    }

    /// Handle PING, PONG and PRESENCE; other signals are ignored.
    pub async fn handle_signal(&self, envelope: &SignalEnvelope) -> Result<()> {
        match &envelope.signal {
            Signal::Ping {
                target_id,
                sender_id,
            } => {
                if !self.current.is(target_id) {
                    return Ok(());
                }
                let Some(identity) = self.current.get() else {
                    return Ok(());
                };
                debug!(from = %sender_id, "Answering PING");
                match self.send_pong(sender_id, identity.clone()).await {
                    Err(NetError::Protocol(ProtocolError::FrameTooLarge { size, .. })) => {
                        // Inline avatars can outgrow a frame; answer without one.
                        warn!(size, "PONG too large, answering without avatar");
                        let mut identity = identity;
                        identity.avatar.clear();
                        self.send_pong(sender_id, identity).await?;
                    }
                    other => other?,
                }
            }
            Signal::Pong {
                target_id,
                identity,
                connection_id,
            } => {
                if let Some(connection_id) = connection_id {
                    self.record_presence(&identity.id, connection_id);
                }
                if self.current.is(target_id) {
                    self.complete(identity, connection_id.clone());
                }
            }
            Signal::Presence {
                stable_id,
                connection_id,
            } => self.record_presence(stable_id, connection_id),
            Signal::Invite { .. } => {}
        }
        Ok(())
    }

    async fn send_pong(&self, target_id: &str, identity: Identity) -> std::result::Result<(), NetError> {
        let sender_id = identity.id.clone();
        let pong = signal(
            &sender_id,
            Signal::Pong {
                target_id: target_id.to_string(),
                identity,
                connection_id: self.relay.self_id(),
            },
        );
        self.relay.send(SIGNALING_ROOM, pong).await
    }

    fn record_presence(&self, stable_id: &str, connection_id: &str) {
        self.state()
            .presence
            .insert(stable_id.to_string(), connection_id.to_string());
    }

    /// Hand a PONG to every lookup waiting on that identity.
    fn complete(&self, identity: &Identity, connection_id: Option<String>) {
        let waiting: Vec<PendingLookup> = {
            let mut state = self.state();
            let tokens: Vec<u64> = state
                .pending
                .iter()
                .filter(|(_, lookup)| lookup.query == identity.id)
                .map(|(token, _)| *token)
                .collect();
            tokens
                .into_iter()
                .filter_map(|token| state.pending.remove(&token))
                .collect()
        };
        if waiting.is_empty() {
            debug!(id = %identity.id, "PONG with no matching lookup");
        }
        for lookup in waiting {
            let _ = lookup.reply.send(ResolvedIdentity {
                identity: identity.clone(),
                verified: false,
                connection_id: connection_id.clone(),
            });
        }
    }
}

fn signal(sender_id: &str, signal: Signal) -> Envelope {
    Envelope::Signal(SignalEnvelope {
        sender_id: sender_id.to_string(),
        timestamp: now_millis(),
        signal,
    })
}
