//! WebSocket Connection Handler
//!
//! `Hello -> Identify -> READY`, then heartbeats and `SendMessage` frames
//! until the socket closes or the heartbeat lapses.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use super::messages::{
    GatewayReceive, GatewaySend, HelloPayload, IdentifyPayload, MessageFailedPayload, OpCode,
    ReadyPayload, SendMessagePayload,
};
use super::session::SessionState;
use crate::application::dto::UserResponse;
use crate::presentation::middleware::verify_token;
use crate::startup::AppState;

/// Grace period on top of the heartbeat interval
const HEARTBEAT_GRACE_MS: u64 = 10_000;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_size = state.settings.websocket.max_message_size;
    ws.max_message_size(max_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let mut session_state = SessionState::new(session_id.clone());

    tracing::debug!(session_id = %session_id, "New WebSocket connection");
    state.gateway.connection_opened();

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<GatewaySend>();

    let hello = GatewaySend::control(
        OpCode::Hello,
        serde_json::to_value(HelloPayload {
            heartbeat_interval: state.gateway.heartbeat_interval(),
        })
        .ok(),
    );
    if tx.send(hello).is_err() {
        state.gateway.connection_closed();
        return;
    }

    // Writer: numbers dispatches in the order they reach this connection.
    let writer_session = session_id.clone();
    let sender_task = tokio::spawn(async move {
        let mut sequence: u64 = 0;
        while let Some(mut msg) = rx.recv().await {
            if msg.is_dispatch() {
                sequence += 1;
                msg.s = Some(sequence);
            }
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(session_id = %writer_session, error = %e, "Failed to serialize frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let identify_timeout = Duration::from_secs(state.settings.websocket.identify_timeout_secs);
    let identify = match timeout(identify_timeout, wait_for_identify(&mut receiver)).await {
        Ok(Some(identify)) => identify,
        Ok(None) => {
            tracing::debug!(session_id = %session_id, "Connection closed before Identify");
            close(&state, sender_task);
            return;
        }
        Err(_) => {
            tracing::debug!(session_id = %session_id, "Identify timeout");
            reject(&state, &tx, sender_task).await;
            return;
        }
    };

    let user = match verify_token(&identify.token, &state.settings.jwt.secret) {
        Ok(user_id) => state.users.find_by_id(user_id).await,
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "Invalid token");
            reject(&state, &tx, sender_task).await;
            return;
        }
    };
    let user = match user {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::debug!(session_id = %session_id, "Identified user does not exist");
            reject(&state, &tx, sender_task).await;
            return;
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Failed to load user");
            reject(&state, &tx, sender_task).await;
            return;
        }
    };

    session_state.identify(user.id);
    let rooms = state
        .gateway
        .register_session(session_id.clone(), user.id, tx.clone());

    let ready = ReadyPayload {
        session_id: session_id.clone(),
        user: UserResponse::from(user),
        rooms,
    };
    match serde_json::to_value(&ready) {
        Ok(d) => {
            let _ = tx.send(GatewaySend::dispatch("READY", d));
        }
        Err(e) => tracing::error!(session_id = %session_id, error = %e, "Failed to encode READY"),
    }

    tracing::info!(
        user_id = session_state.user_id,
        session_id = %session_id,
        "User connected and identified"
    );

    let heartbeat_timeout_ms = state.gateway.heartbeat_interval() + HEARTBEAT_GRACE_MS;
    let mut heartbeat_check = interval(Duration::from_millis(heartbeat_timeout_ms));
    heartbeat_check.tick().await;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_message(text.as_str(), &mut session_state, &tx, &state) {
                            tracing::debug!(session_id = %session_id, error = %e, "Error handling message");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(session_id = %session_id, "Connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            _ = heartbeat_check.tick() => {
                if !session_state.is_alive(heartbeat_timeout_ms) {
                    tracing::info!(session_id = %session_id, "Heartbeat timeout, closing connection");
                    break;
                }
            }
        }
    }

    state.gateway.unregister_session(&session_id);
    close(&state, sender_task);

    tracing::info!(
        user_id = session_state.user_id,
        session_id = %session_id,
        "User disconnected"
    );
}

/// Read frames until an Identify arrives or the socket closes
async fn wait_for_identify(
    receiver: &mut futures::stream::SplitStream<WebSocket>,
) -> Option<IdentifyPayload> {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let Ok(frame) = serde_json::from_str::<GatewayReceive>(text.as_str()) else {
                    continue;
                };
                if OpCode::from_u64(frame.op) != Some(OpCode::Identify) {
                    continue;
                }
                if let Some(identify) = frame
                    .d
                    .and_then(|d| serde_json::from_value::<IdentifyPayload>(d).ok())
                {
                    return Some(identify);
                }
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Handle a frame from an identified session
fn handle_message(
    text: &str,
    session_state: &mut SessionState,
    tx: &mpsc::UnboundedSender<GatewaySend>,
    state: &AppState,
) -> Result<(), String> {
    let frame: GatewayReceive =
        serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {}", e))?;

    match OpCode::from_u64(frame.op) {
        Some(OpCode::Heartbeat) => {
            session_state.heartbeat();
            let _ = tx.send(GatewaySend::control(OpCode::HeartbeatAck, None));
            tracing::trace!(session_id = %session_state.session_id, "Heartbeat received");
        }

        Some(OpCode::SendMessage) => {
            let payload: SendMessagePayload = frame
                .d
                .ok_or("Missing payload")
                .and_then(|d| serde_json::from_value(d).map_err(|_| "Invalid payload"))
                .map_err(|e| e.to_string())?;

            let relay = state.relay.clone();
            let tx = tx.clone();
            let sender_id = session_state.user_id;
            tokio::spawn(async move {
                let frame = match relay.send(sender_id, payload.receiver_id, &payload.content).await {
                    Ok(sent) => serde_json::to_value(sent.view())
                        .map(|d| GatewaySend::dispatch("MESSAGE_SENT", d)),
                    Err(e) => serde_json::to_value(MessageFailedPayload {
                        reason: e.to_string(),
                    })
                    .map(|d| GatewaySend::dispatch("MESSAGE_FAILED", d)),
                };
                match frame {
                    Ok(frame) => {
                        let _ = tx.send(frame);
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to encode send result"),
                }
            });
        }

        Some(OpCode::Identify) => {
            tracing::debug!(session_id = %session_state.session_id, "Duplicate Identify ignored");
        }

        _ => {
            tracing::debug!(
                session_id = %session_state.session_id,
                op = frame.op,
                "Unknown opcode"
            );
        }
    }

    Ok(())
}

/// Tell the client its session is invalid, then drop the connection
async fn reject(
    state: &AppState,
    tx: &mpsc::UnboundedSender<GatewaySend>,
    sender_task: tokio::task::JoinHandle<()>,
) {
    let _ = tx.send(GatewaySend::invalid_session());
    tokio::time::sleep(Duration::from_millis(100)).await;
    close(state, sender_task);
}

fn close(state: &AppState, sender_task: tokio::task::JoinHandle<()>) {
    sender_task.abort();
    state.gateway.connection_closed();
}
