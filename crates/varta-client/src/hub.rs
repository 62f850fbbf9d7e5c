//! Composition root: builds every service around one store, one relay link
//! and one event bus, and routes relay notifications into them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use varta_net::{spawn_relay_client, RelayClient, RelayNotification};
use varta_shared::directory::Directory;
use varta_shared::identity::Identity;
use varta_shared::protocol::Envelope;
use varta_shared::types::ConnectionState;

use crate::bus::{BusEvent, EventBus};
use crate::config::ClientConfig;
use crate::discovery::Discovery;
use crate::error::Result;
use crate::messaging::MessagingService;
use crate::rooms::RoomService;
use crate::session::{CurrentIdentity, SessionService};
use crate::store::StoreHandle;
use crate::tabs::TabOrigin;

#[derive(Clone)]
pub struct ClientHub {
    pub bus: EventBus,
    pub store: StoreHandle,
    pub session: SessionService,
    pub discovery: Discovery,
    pub rooms: RoomService,
    pub messaging: MessagingService,
    relay: RelayClient,
}

impl ClientHub {
    /// Wire the services together. Nothing is opened or spawned.
    pub fn new(config: &ClientConfig, relay: RelayClient, bus: EventBus, directory: Directory) -> Self {
        let store = StoreHandle::new();
        let current = CurrentIdentity::default();

        Self {
            session: SessionService::new(store.clone(), current.clone(), bus.clone()),
            discovery: Discovery::new(
                relay.clone(),
                Arc::new(directory),
                current.clone(),
                bus.clone(),
                config.discovery_timeout,
            ),
            rooms: RoomService::new(store.clone(), relay.clone(), bus.clone(), current),
            messaging: MessagingService::new(store.clone(), relay.clone(), bus.clone()),
            bus,
            store,
            relay,
        }
    }

    /// Open the store, restore the session, connect to the relay and start
    /// routing its notifications. Pass a [`TabOrigin`] to replicate bus
    /// events to sibling tabs.
    pub async fn start(config: ClientConfig, tabs: Option<&TabOrigin>) -> Result<Self> {
        let bus = match tabs {
            Some(origin) => EventBus::with_tabs(origin),
            None => EventBus::new(),
        };
        let (relay, notifications) = spawn_relay_client(config.link_config());
        let hub = Self::new(&config, relay, bus, Directory::builtin());

        hub.store.open_path(config.db_path.as_deref())?;
        if let Some(identity) = hub.session.restore()? {
            debug!(id = %identity.id, "Resuming session");
        }
        let rooms = hub.rooms.restore_memberships().await?;

        info!(url = %config.relay_url, rooms, "Client hub started");
        hub.spawn_bridge(notifications);
        Ok(hub)
    }

    /// Start the session and tell the network where to find it.
    pub async fn login(&self, name: &str, avatar: &str, position: &str) -> Result<Identity> {
        let identity = self.session.login(name, avatar, position)?;
        self.discovery.announce_presence().await?;
        Ok(identity)
    }

    pub fn relay(&self) -> &RelayClient {
        &self.relay
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.relay.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Reconnecting
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.relay.shutdown().await?;
        self.bus
            .emit(BusEvent::ConnectionChanged(ConnectionState::Disconnected), false);
        Ok(())
    }

    /// Route one relay notification. Failures are logged, never propagated.
    pub async fn dispatch(&self, notification: RelayNotification) {
        match notification {
            RelayNotification::Connected { connection_id } => {
                info!(connection_id = %connection_id, "Relay link up");
                self.bus
                    .emit(BusEvent::ConnectionChanged(ConnectionState::Connected), false);
                if let Err(e) = self.discovery.announce_presence().await {
                    warn!(error = %e, "Failed to announce presence");
                }
            }

            RelayNotification::Disconnected => {
                self.bus
                    .emit(BusEvent::ConnectionChanged(ConnectionState::Reconnecting), false);
            }

            RelayNotification::RoomJoined { room_id } => {
                debug!(room = %room_id, "Relay confirmed membership");
            }

            RelayNotification::Message { room_id, envelope } => match envelope {
                Envelope::Chat(message) => {
                    if let Err(e) = self.messaging.handle_incoming(message) {
                        warn!(room = %room_id, error = %e, "Failed to store incoming message");
                    }
                }
                Envelope::Signal(signal) => {
                    if let Err(e) = self.discovery.handle_signal(&signal).await {
                        warn!(error = %e, "Failed to handle discovery signal");
                    }
                    if let Err(e) = self.rooms.handle_signal(&signal).await {
                        warn!(error = %e, "Failed to handle room signal");
                    }
                }
            },

            RelayNotification::Cursor { room_id, cursor } => {
                debug!(room = %room_id, user = %cursor.user_id, "Cursor moved");
                self.bus.emit(BusEvent::CursorMoved(cursor), false);
            }
        }
    }

    fn spawn_bridge(&self, mut notifications: mpsc::Receiver<RelayNotification>) {
        let hub = self.clone();
        tokio::spawn(async move {
            info!("Relay notification bridge started");
            while let Some(notification) = notifications.recv().await {
                hub.dispatch(notification).await;
            }
            warn!("Relay notification bridge ended");
        });
    }
}
