use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::capabilities::Role;
use super::connctx::{ConnHandle, ConnReceivers, ConnSession, Control};
use super::docctx::DocKey;
use super::error::{AuthError, ProtocolError, RelayError};
use super::registry::Registry;
use super::room::Room;
use crate::models::ErrorResponse;
use crate::state::AppState;

/// Upper bound on how long a close frame may take to reach a stuck peer.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// How long a terminated connection's writer gets to flush its close frame
/// before both socket halves are dropped.
const TERMINATE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Upgrade endpoint: `/ws/:kind/:doc_id?token=<bearer>`.
pub async fn websocket_handler(
    Path((kind, doc_id)): Path<(String, String)>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let key = DocKey::new(kind, doc_id);
    let token = query.token.filter(|t| !t.trim().is_empty());

    // Refuse before upgrading when there is nothing to authenticate.
    let token = match token {
        Some(token) if key.is_valid() => token,
        _ => {
            info!("Rejecting upgrade for {}: missing document id or token", key);
            let reason = RelayError::from(AuthError::Missing).close_reason();
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    code: reason.code(),
                    status: StatusCode::BAD_REQUEST.to_string(),
                    error: reason.reason().to_string(),
                }),
            )
                .into_response();
        }
    };

    debug!("WebSocket upgrade requested for {}", key);
    ws.on_upgrade(move |socket| handle_socket(socket, state, key, token))
}

/// Drives one connection from handshake to cleanup.
async fn handle_socket(mut socket: WebSocket, state: AppState, key: DocKey, token: String) {
    let mut session = ConnSession::new(key.clone());

    let (conn, receivers, room) = match admit(&state, &key, &token, &mut session).await {
        Ok(admitted) => admitted,
        Err(e) => {
            let reason = e.close_reason();
            info!("Closing connection to {} with {}: {}", key, reason.code(), e);
            let _ = tokio::time::timeout(
                CLOSE_GRACE,
                socket.send(Message::Close(Some(reason.frame()))),
            )
            .await;
            session.closed();
            return;
        }
    };
    session.activated();
    info!(
        "Connection {} (user {}, {:?}) active on {}",
        conn.id(),
        conn.user_id(),
        conn.role(),
        key
    );

    let (sink, stream) = socket.split();
    let mut send_task = tokio::spawn(write_loop(sink, receivers));
    let mut recv_task = tokio::spawn(read_loop(
        stream,
        state.registry.clone(),
        room.clone(),
        conn.clone(),
    ));

    // Whichever side ends first takes the other one down. A termination
    // does not rely on the writer: it may be stuck on a peer that stopped
    // reading.
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
        _ = conn.terminated() => {
            if tokio::time::timeout(TERMINATE_GRACE, &mut send_task).await.is_err() {
                warn!("Writer of connection {} on {} is stuck, dropping socket", conn.id(), key);
                send_task.abort();
            }
            recv_task.abort();
        }
    };

    session.closed();
    state.registry.leave(&room, &conn).await;
    info!("Connection {} on {} terminated", conn.id(), key);
}

/// Authenticate, authorize and join. Nothing is read from the socket here.
async fn admit(
    state: &AppState,
    key: &DocKey,
    token: &str,
    session: &mut ConnSession,
) -> Result<(ConnHandle, ConnReceivers, Arc<Room>), RelayError> {
    let user_id = state.auth.verify(token).await?;
    session.authenticated(&user_id);

    let role: Role = state.access.check(&user_id, key).await?;

    let capacity = state.registry.settings().outbound_capacity;
    let (conn, receivers) = ConnHandle::new(user_id, role, capacity);
    let room = state.registry.join(key, conn.clone()).await?;
    Ok((conn, receivers, room))
}

async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: ConnReceivers) {
    loop {
        tokio::select! {
            biased;
            control = rx.control.recv() => match control {
                Some(Control::Ping) => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                Some(Control::Close(reason)) => {
                    let _ = tokio::time::timeout(
                        CLOSE_GRACE,
                        sink.send(Message::Close(Some(reason.frame()))),
                    )
                    .await;
                    break;
                }
                None => break,
            },
            frame = rx.frames.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Binary(frame.as_ref().clone())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    registry: Registry,
    room: Arc<Room>,
    conn: ConnHandle,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Binary(data)) => match registry.relay(&room, conn.id(), data).await {
                Ok(_) => {}
                // Logged by the relay; the connection stays up.
                Err(ProtocolError::Malformed(_)) | Err(ProtocolError::ReadOnly) => {}
                Err(ProtocolError::NotMember) => {
                    warn!("Connection {} is no longer in room {}", conn.id(), room.key());
                    break;
                }
            },
            Ok(Message::Pong(_)) => conn.mark_alive(),
            Ok(Message::Ping(_)) => {}
            Ok(Message::Text(_)) => {
                debug!("Ignoring text frame from {} on {}", conn.user_id(), room.key());
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!("WebSocket error from {} on {}: {}", conn.user_id(), room.key(), e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::close_code::CloseReason;

    #[test]
    fn test_close_grace_is_bounded() {
        assert!(CLOSE_GRACE <= Duration::from_secs(10));
        assert!(TERMINATE_GRACE < CLOSE_GRACE);
    }

    #[test]
    fn test_missing_token_maps_to_missing_credentials() {
        let reason = RelayError::from(AuthError::Missing).close_reason();
        assert_eq!(reason, CloseReason::MissingCredentials);
    }
}
