//! A relay link without a socket: the test drives connect, disconnect and
//! acks by hand and inspects the frames the handle would have written.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use varta_shared::protocol::{ClientFrame, JoinRequest};

use crate::client::{LinkState, RelayClient, RelayCommand};

pub struct LoopbackLink {
    client: RelayClient,
    commands: mpsc::Receiver<RelayCommand>,
    state: Arc<Mutex<LinkState>>,
}

impl LoopbackLink {
    pub fn new() -> Self {
        let (tx, commands) = mpsc::channel(1024);
        let state = Arc::new(Mutex::new(LinkState::default()));
        Self {
            client: RelayClient::new(tx, state.clone()),
            commands,
            state,
        }
    }

    pub fn client(&self) -> RelayClient {
        self.client.clone()
    }

    /// Simulate a completed handshake; returns the joins the link would replay.
    pub fn connect(&self, connection_id: &str) -> Vec<JoinRequest> {
        RelayClient::lock_state(&self.state).on_connected(connection_id.to_string())
    }

    pub fn disconnect(&self) {
        RelayClient::lock_state(&self.state).on_disconnected();
    }

    /// Simulate the relay's `room_joined` ack.
    pub fn acknowledge(&self, room_id: &str) -> bool {
        RelayClient::lock_state(&self.state).membership.acknowledge(room_id)
    }

    /// Frames written so far, oldest first.
    pub fn drain_frames(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        while let Ok(cmd) = self.commands.try_recv() {
            if let RelayCommand::Frame(frame) = cmd {
                frames.push(frame);
            }
        }
        frames
    }
}

impl Default for LoopbackLink {
    fn default() -> Self {
        Self::new()
    }
}
