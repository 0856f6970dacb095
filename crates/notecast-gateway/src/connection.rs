use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use notecast_auth::{AuthError, AuthGate, Principal};
use notecast_types::events::{GatewayCommand, NoteEvent};

use crate::registry::{ConnectionHandle, RegistrationGuard, SessionRegistry};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long an unauthenticated socket may wait before sending `identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a socket whose token was already accepted by the gate during the
/// HTTP upgrade.
pub async fn handle_connection_authenticated(socket: WebSocket, registry: SessionRegistry, principal: Principal) {
    let (sender, receiver) = socket.split();
    run_session(sender, receiver, registry, principal).await;
}

/// Handle a socket opened without a token: the first text frame must be an
/// `identify` command, checked by the same gate as every REST request.
pub async fn handle_connection(socket: WebSocket, registry: SessionRegistry, gate: AuthGate) {
    let (mut sender, mut receiver) = socket.split();

    let principal = match wait_for_identify(&mut receiver, &gate).await {
        Ok(principal) => principal,
        Err(e) => {
            warn!("WebSocket client failed to identify: {}", e);
            reject(&mut sender, &e).await;
            return;
        }
    };

    run_session(sender, receiver, registry, principal).await;
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    gate: &AuthGate,
) -> Result<Principal, AuthError> {
    let token = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    return match serde_json::from_str::<GatewayCommand>(&text) {
                        Ok(GatewayCommand::Identify { token }) => Some(token),
                        Err(_) => None,
                    };
                }
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    })
    .await
    .ok()
    .flatten();

    gate.authenticate(token.as_deref()).await
}

/// Tell the client why it was refused, then close.
async fn reject(sender: &mut SplitSink<WebSocket, Message>, error: &AuthError) {
    let message = if error.is_rejection() {
        error.to_string()
    } else {
        "Something went wrong".to_string()
    };

    if let Ok(text) = serde_json::to_string(&NoteEvent::Rejected { message }) {
        let _ = sender.send(Message::Text(text.into())).await;
    }
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "unauthorized".into(),
        })))
        .await;
}

/// Register the connection, confirm with `ready`, then pump events until
/// either side goes away.
async fn run_session(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    registry: SessionRegistry,
    principal: Principal,
) {
    let user_id = principal.user_id;
    let (handle, mut events_rx) = ConnectionHandle::new();
    let conn_id = handle.conn_id;

    registry.register(user_id, handle);
    let _guard = RegistrationGuard::new(registry, user_id, conn_id);

    info!("{} ({}) connected to gateway", principal.email, user_id);

    if send_event(&mut sender, &NoteEvent::Ready { user_id }).await.is_err() {
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    // None: replaced by a newer connection, or registry cleared
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                // Clients have nothing to say after identifying
                Message::Text(text) => {
                    warn!("Ignoring {}-byte client frame from {}", text.len(), user_id);
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway (connection {})", principal.email, user_id, conn_id);
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &NoteEvent) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
