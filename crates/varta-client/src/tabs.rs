//! Same-origin tab channels.
//!
//! A [`TabOrigin`] stands for everything running under one origin: each tab
//! opens a named channel on it and sees what the other tabs post there.
//! Frames cross the boundary as JSON and carry the posting tab's id so a tab
//! can skip its own traffic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::BusEvent;

const TAB_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TabFrame {
    tab_id: String,
    payload: String,
}

#[derive(Clone, Default)]
pub struct TabOrigin {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<TabFrame>>>>,
}

impl TabOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `name` as a new tab. Every call gets a fresh tab id.
    pub fn open(&self, name: &str) -> TabChannel {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(TAB_CHANNEL_CAPACITY).0)
            .clone();
        let tab_id = Uuid::new_v4().to_string();
        debug!(channel = name, tab = %tab_id, "Tab channel opened");
        TabChannel { tab_id, tx }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self, name: &str) -> usize {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.get(name).map_or(0, broadcast::Sender::receiver_count)
    }
}

pub struct TabChannel {
    tab_id: String,
    tx: broadcast::Sender<TabFrame>,
}

impl TabChannel {
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn post(&self, event: &BusEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode tab frame");
                return;
            }
        };
        // No other tab listening is not an error.
        let _ = self.tx.send(TabFrame {
            tab_id: self.tab_id.clone(),
            payload,
        });
    }

    pub fn subscribe(&self) -> TabReceiver {
        TabReceiver {
            tab_id: self.tab_id.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

pub struct TabReceiver {
    tab_id: String,
    rx: broadcast::Receiver<TabFrame>,
}

impl TabReceiver {
    /// Next event posted by another tab. `None` once the origin is gone.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(frame) if frame.tab_id == self.tab_id => continue,
                Ok(frame) => match serde_json::from_str(&frame.payload) {
                    Ok(event) => return Some(event),
                    Err(e) => warn!(error = %e, from = %frame.tab_id, "Malformed tab frame dropped"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Tab channel lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_own_frames_are_skipped() {
        let origin = TabOrigin::new();
        let a = origin.open("mesh");
        let b = origin.open("mesh");
        let mut a_rx = a.subscribe();
        let mut b_rx = b.subscribe();

        a.post(&BusEvent::RoomLeft {
            room_id: "group_a".into(),
        });
        b.post(&BusEvent::RoomLeft {
            room_id: "group_b".into(),
        });

        assert!(matches!(b_rx.recv().await, Some(BusEvent::RoomLeft { room_id }) if room_id == "group_a"));
        assert!(matches!(a_rx.recv().await, Some(BusEvent::RoomLeft { room_id }) if room_id == "group_b"));
        assert_ne!(a.tab_id(), b.tab_id());
    }

    #[tokio::test]
    async fn test_channels_are_isolated_by_name() {
        let origin = TabOrigin::new();
        let a = origin.open("mesh");
        let other = origin.open("elsewhere");
        let mut rx = other.subscribe();

        a.post(&BusEvent::RoomLeft {
            room_id: "group_a".into(),
        });
        let got = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(got.is_err());
    }
}
