//! The relay link task.
//!
//! Same shape as any long-lived network actor here: a spawned task owns the
//! socket, callers talk to it through a command channel and hear back on a
//! notification channel. The task reconnects forever with exponential
//! backoff until it is told to shut down or every handle is dropped.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use varta_shared::constants::SIGNALING_ROOM;
use varta_shared::protocol::{ClientFrame, JoinRequest, ServerFrame};
use varta_shared::types::Visibility;

use crate::backoff::Backoff;
use crate::client::{LinkConfig, LinkState, RelayClient, RelayCommand, RelayNotification};
use crate::error::NetError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, WsMessage>;

enum LinkExit {
    Closed,
    Shutdown,
}

/// Spawn the relay link in a background tokio task.
///
/// Returns the client handle and the notification receiver. The first
/// `Connected` notification arrives once the relay handshake completes.
pub fn spawn_relay_client(config: LinkConfig) -> (RelayClient, mpsc::Receiver<RelayNotification>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<RelayCommand>(config.channel_capacity);
    let (notif_tx, notif_rx) = mpsc::channel::<RelayNotification>(config.channel_capacity);
    let state = Arc::new(Mutex::new(LinkState::default()));

    let client = RelayClient::new(cmd_tx, state.clone());
    tokio::spawn(run_link(config, state, cmd_rx, notif_tx));

    (client, notif_rx)
}

async fn run_link(
    config: LinkConfig,
    state: Arc<Mutex<LinkState>>,
    mut cmd_rx: mpsc::Receiver<RelayCommand>,
    notif_tx: mpsc::Sender<RelayNotification>,
) {
    let mut backoff = Backoff::new(config.reconnect_initial, config.reconnect_max);

    loop {
        let attempt = match while_offline(connect(&config), &mut cmd_rx).await {
            Some(attempt) => attempt,
            None => break,
        };

        match attempt {
            Ok((ws, connection_id)) => {
                backoff.reset();
                info!(url = %config.url, connection_id = %connection_id, "Connected to relay");

                let exit = drive(ws, connection_id, &state, &mut cmd_rx, &notif_tx).await;
                RelayClient::lock_state(&state).on_disconnected();
                if let LinkExit::Shutdown = exit {
                    break;
                }
                info!(url = %config.url, "Relay connection lost");
                let notified = while_offline(notif_tx.send(RelayNotification::Disconnected), &mut cmd_rx).await;
                if notified.is_none() {
                    break;
                }
            }
            Err(e) => {
                warn!(url = %config.url, error = %e, "Relay connection failed");
            }
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Reconnecting to relay");
        if while_offline(tokio::time::sleep(delay), &mut cmd_rx).await.is_none() {
            break;
        }
    }

    RelayClient::lock_state(&state).on_disconnected();
    info!("Relay link terminated");
}

/// Await `fut` while discarding frames queued by callers. Returns `None`
/// if shutdown was requested in the meantime.
async fn while_offline<F: Future>(fut: F, cmd_rx: &mut mpsc::Receiver<RelayCommand>) -> Option<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return Some(out),
            cmd = cmd_rx.recv() => match cmd {
                Some(RelayCommand::Frame(frame)) => {
                    debug!(frame = ?frame, "Relay offline, frame dropped");
                }
                Some(RelayCommand::Shutdown) => {
                    info!("Relay link shutdown requested");
                    return None;
                }
                None => {
                    info!("Command channel closed, shutting down relay link");
                    return None;
                }
            },
        }
    }
}

/// Dial the relay and wait for its `welcome` frame.
async fn connect(config: &LinkConfig) -> Result<(WsStream, String), NetError> {
    let handshake = async {
        let (mut ws, _response) = connect_async(config.url.as_str()).await?;
        while let Some(msg) = ws.next().await {
            match msg? {
                WsMessage::Text(text) => match ServerFrame::from_json(&text)? {
                    ServerFrame::Welcome { connection_id } => return Ok((ws, connection_id)),
                    other => debug!(frame = ?other, "Frame before welcome ignored"),
                },
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
        Err::<(WsStream, String), NetError>(NetError::Handshake(
            "socket closed before welcome".to_string(),
        ))
    };

    tokio::time::timeout(config.connect_timeout, handshake)
        .await
        .map_err(|_| NetError::ConnectTimeout(config.url.clone()))?
}

/// Run one connected session until the socket closes or shutdown is requested.
async fn drive(
    ws: WsStream,
    connection_id: String,
    state: &Mutex<LinkState>,
    cmd_rx: &mut mpsc::Receiver<RelayCommand>,
    notif_tx: &mpsc::Sender<RelayNotification>,
) -> LinkExit {
    let (mut sink, mut stream) = ws.split();

    // Connection id goes in before the snapshot so a concurrent `join`
    // either lands in the replay or sends its own frame.
    let replay = RelayClient::lock_state(state).on_connected(connection_id.clone());

    let signaling = JoinRequest {
        id: SIGNALING_ROOM.to_string(),
        visibility: Visibility::Public,
        password: None,
    };
    let rejoined = replay.len();
    for request in std::iter::once(signaling).chain(replay) {
        if let Err(e) = write_frame(&mut sink, &ClientFrame::JoinRoom(request)).await {
            warn!(error = %e, "Failed to replay room joins");
            return LinkExit::Closed;
        }
    }
    debug!(rooms = rejoined, "Room joins replayed");

    if let Err(exit) = deliver(
        RelayNotification::Connected { connection_id },
        &mut sink,
        cmd_rx,
        notif_tx,
    )
    .await
    {
        return exit;
    }

    loop {
        let step = tokio::select! {
            // --- Outgoing frames ---
            cmd = cmd_rx.recv() => outgoing(cmd, &mut sink).await,

            // --- Incoming frames ---
            msg = stream.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => match decode_text(&text, state) {
                    Some(notification) => deliver(notification, &mut sink, cmd_rx, notif_tx).await,
                    None => Ok(()),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(frame = ?frame, "Relay sent close");
                    Err(LinkExit::Closed)
                }
                Some(Ok(_)) => Ok(()),
                Some(Err(e)) => {
                    warn!(error = %e, "Relay read failed");
                    Err(LinkExit::Closed)
                }
                None => Err(LinkExit::Closed),
            },
        };
        if let Err(exit) = step {
            return exit;
        }
    }
}

/// Write one queued command to the socket.
async fn outgoing(cmd: Option<RelayCommand>, sink: &mut WsSink) -> Result<(), LinkExit> {
    match cmd {
        Some(RelayCommand::Frame(frame)) => write_frame(sink, &frame).await.map_err(|e| {
            warn!(error = %e, "Relay write failed");
            LinkExit::Closed
        }),
        Some(RelayCommand::Shutdown) | None => {
            info!("Relay link shutdown requested");
            let _ = sink.send(WsMessage::Close(None)).await;
            Err(LinkExit::Shutdown)
        }
    }
}

/// Queue `notification` for the application. Outgoing frames keep flowing
/// while the notification queue is full, since the consumer may itself be
/// waiting to queue a frame.
async fn deliver(
    notification: RelayNotification,
    sink: &mut WsSink,
    cmd_rx: &mut mpsc::Receiver<RelayCommand>,
    notif_tx: &mpsc::Sender<RelayNotification>,
) -> Result<(), LinkExit> {
    loop {
        tokio::select! {
            permit = notif_tx.reserve() => {
                // A dropped receiver means nobody is listening any more.
                if let Ok(permit) = permit {
                    permit.send(notification);
                }
                return Ok(());
            }
            cmd = cmd_rx.recv() => outgoing(cmd, sink).await?,
        }
    }
}

async fn write_frame(sink: &mut WsSink, frame: &ClientFrame) -> Result<(), NetError> {
    let text = match frame.to_json() {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to encode client frame");
            return Ok(());
        }
    };
    sink.send(WsMessage::Text(text)).await?;
    Ok(())
}

/// Decode a relay frame into the notification it produces, if any.
fn decode_text(text: &str, state: &Mutex<LinkState>) -> Option<RelayNotification> {
    let frame = match ServerFrame::from_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, len = text.len(), "Malformed relay frame dropped");
            return None;
        }
    };

    let notification = match frame {
        ServerFrame::Welcome { connection_id } => {
            debug!(connection_id = %connection_id, "Relay reassigned connection id");
            RelayClient::lock_state(state).connection_id = Some(connection_id);
            return None;
        }
        ServerFrame::RoomJoined { id } => {
            if !RelayClient::lock_state(state).membership.acknowledge(&id) {
                return None;
            }
            debug!(room = %id, "Room join acknowledged");
            RelayNotification::RoomJoined { room_id: id }
        }
        ServerFrame::Message(envelope) => RelayNotification::Message {
            room_id: envelope.room_id().to_string(),
            envelope,
        },
        ServerFrame::Typing(cursor) => RelayNotification::Cursor {
            room_id: cursor.room_id.clone(),
            cursor,
        },
    };
    Some(notification)
}
