//! In-process publish/subscribe with optional cross-tab replication.
//!
//! Handlers are registered per [`EventKind`] and run synchronously inside
//! `emit`, in registration order. When the bus is attached to a
//! [`TabOrigin`], events emitted with `broadcast_across_tabs` are also posted
//! to the other tabs, which dispatch them locally without posting them again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use varta_shared::constants::TAB_CHANNEL_NAME;
use varta_shared::types::{ConnectionState, Cursor, Message, Room};
use varta_shared::identity::Identity;

use crate::discovery::ResolvedIdentity;
use crate::tabs::{TabChannel, TabOrigin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageReceived,
    MessageSent,
    MessageDeleted,
    HistoryCleared,
    RoomJoined,
    RoomLeft,
    RoomDeleted,
    InviteReceived,
    CursorMoved,
    IdentityResolved,
    ConnectionChanged,
    SessionChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusEvent {
    MessageReceived(Message),
    MessageSent(Message),
    #[serde(rename_all = "camelCase")]
    MessageDeleted { room_id: String, id: String },
    #[serde(rename_all = "camelCase")]
    HistoryCleared { room_id: String },
    RoomJoined(Room),
    #[serde(rename_all = "camelCase")]
    RoomLeft { room_id: String },
    #[serde(rename_all = "camelCase")]
    RoomDeleted { room_id: String },
    /// `from` is the inviter's stable id.
    InviteReceived { room: Room, from: String },
    CursorMoved(Cursor),
    IdentityResolved(ResolvedIdentity),
    ConnectionChanged(ConnectionState),
    SessionChanged(Option<Identity>),
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::MessageReceived(_) => EventKind::MessageReceived,
            BusEvent::MessageSent(_) => EventKind::MessageSent,
            BusEvent::MessageDeleted { .. } => EventKind::MessageDeleted,
            BusEvent::HistoryCleared { .. } => EventKind::HistoryCleared,
            BusEvent::RoomJoined(_) => EventKind::RoomJoined,
            BusEvent::RoomLeft { .. } => EventKind::RoomLeft,
            BusEvent::RoomDeleted { .. } => EventKind::RoomDeleted,
            BusEvent::InviteReceived { .. } => EventKind::InviteReceived,
            BusEvent::CursorMoved(_) => EventKind::CursorMoved,
            BusEvent::IdentityResolved(_) => EventKind::IdentityResolved,
            BusEvent::ConnectionChanged(_) => EventKind::ConnectionChanged,
            BusEvent::SessionChanged(_) => EventKind::SessionChanged,
        }
    }
}

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
}

struct BusInner {
    registry: Mutex<Registry>,
    tab: Option<TabChannel>,
    /// Dropped with the bus, which stops the tab listener.
    _listener_stop: Option<oneshot::Sender<()>>,
}

impl BusInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, event: &BusEvent) {
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Handler> = self
            .registry()
            .handlers
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(event);
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// A bus with no cross-tab replication.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::default()),
                tab: None,
                _listener_stop: None,
            }),
        }
    }

    /// A bus joined to the origin's well-known tab channel.
    /// Spawns the listener task, so it must be called inside a tokio runtime.
    pub fn with_tabs(origin: &TabOrigin) -> Self {
        let tab = origin.open(TAB_CHANNEL_NAME);
        let mut rx = tab.subscribe();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let inner = Arc::new(BusInner {
            registry: Mutex::new(Registry::default()),
            tab: Some(tab),
            _listener_stop: Some(stop_tx),
        });

        let weak: Weak<BusInner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = &mut stop_rx => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let Some(inner) = weak.upgrade() else { break };
                debug!(kind = ?event.kind(), "Event from another tab");
                inner.dispatch(&event);
            }
            debug!("Tab listener stopped");
        });

        Self { inner }
    }

    pub fn tab_id(&self) -> Option<&str> {
        self.inner.tab.as_ref().map(TabChannel::tab_id)
    }

    /// Register `handler` for `kind`. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
            armed: true,
        }
    }

    /// Forward every `kind` event into a channel, for async consumers.
    pub fn channel(&self, kind: EventKind) -> (Subscription, mpsc::UnboundedReceiver<BusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = self.on(kind, move |event| {
            let _ = tx.send(event.clone());
        });
        (sub, rx)
    }

    pub fn emit(&self, event: BusEvent, broadcast_across_tabs: bool) {
        self.inner.dispatch(&event);
        if broadcast_across_tabs {
            if let Some(tab) = &self.inner.tab {
                tab.post(&event);
            }
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .registry()
            .handlers
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one registered handler.
#[must_use = "dropping a Subscription removes its handler"]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
    armed: bool,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    /// Keep the handler for the lifetime of the bus.
    pub fn detach(mut self) {
        self.armed = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(inner) = self.bus.upgrade() {
            // Released after the lock: the handler may own another Subscription.
            let removed = {
                let mut registry = inner.registry();
                registry.handlers.get_mut(&self.kind).and_then(|list| {
                    list.iter()
                        .position(|(id, _)| *id == self.id)
                        .map(|pos| list.remove(pos))
                })
            };
            drop(removed);
        }
    }
}
