use crate::game::room::session::SessionIo;
use crate::game::room::Room;
use crate::protocol::{self, ClientMessage};
use crate::room_runtime::manager::RoomManager;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Drains the three outbound sources in priority order: every queued
/// priority message, then the newest snapshot, then one bulk message.
fn spawn_writer(mut sender: SplitSink<WebSocket, Message>, io: SessionIo) -> JoinHandle<()> {
    let SessionIo {
        session_id,
        outbound_state,
        mut outbound_hi_rx,
        mut outbound_lo_rx,
    } = io;

    tokio::spawn(async move {
        let mut pending_hi: VecDeque<Vec<u8>> = VecDeque::new();
        let mut pending_lo: VecDeque<Vec<u8>> = VecDeque::new();
        let mut pending_state: Option<Vec<u8>> = None;

        loop {
            // The room drops both lanes when it evicts a stalled session.
            let open = tokio::select! {
                payload = outbound_hi_rx.recv() => {
                    payload.map(|payload| pending_hi.push_back(payload)).is_some()
                }
                payload = outbound_lo_rx.recv() => {
                    payload.map(|payload| pending_lo.push_back(payload)).is_some()
                }
                _ = outbound_state.wait_for_update() => true,
            };
            if !open {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }

            while let Ok(payload) = outbound_hi_rx.try_recv() {
                pending_hi.push_back(payload);
            }
            while let Ok(payload) = outbound_lo_rx.try_recv() {
                pending_lo.push_back(payload);
            }
            if let Some(payload) = outbound_state.take_latest() {
                pending_state = Some(payload);
            }

            while let Some(payload) = pending_hi.pop_front() {
                if sender.send(Message::Binary(payload)).await.is_err() {
                    return;
                }
            }

            if let Some(payload) = pending_state.take() {
                if sender.send(Message::Binary(payload)).await.is_err() {
                    return;
                }
            }

            if let Some(payload) = pending_lo.pop_front() {
                if sender.send(Message::Binary(payload)).await.is_err() {
                    return;
                }
            }
        }
        tracing::debug!(session_id = %session_id, "writer finished");
    })
}

fn decode(message: &Message) -> Option<Result<ClientMessage, protocol::ProtocolError>> {
    match message {
        Message::Binary(data) => Some(protocol::decode_client_binary(data)),
        Message::Text(text) => Some(protocol::decode_client_text(text)),
        _ => None,
    }
}

/// One connection. The socket is unbound until its first join, at which
/// point the manager picks a room and the writer task starts.
pub async fn handle_socket(socket: WebSocket, rooms: Arc<RoomManager>) {
    let (sender, mut receiver) = socket.split();
    let session_id = Uuid::new_v4().to_string();
    let mut sender = Some(sender);
    let mut bound: Option<(Arc<Room>, JoinHandle<()>)> = None;

    while let Some(result) = receiver.next().await {
        let Ok(message) = result else { break };
        if matches!(message, Message::Close(_)) {
            break;
        }
        let Some(decoded) = decode(&message) else { continue };
        let message = match decoded {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(session_id = %session_id, %error, "dropping malformed frame");
                continue;
            }
        };

        if bound.is_none() {
            if !matches!(message, ClientMessage::Join(_)) {
                tracing::debug!(session_id = %session_id, "ignoring frame before join");
                continue;
            }
            let Some(sink) = sender.take() else { break };
            let room = rooms.assign().await;
            let io = room.add_session(&session_id).await;
            tracing::info!(session_id = %session_id, room_id = room.id(), "session bound to room");
            bound = Some((room, spawn_writer(sink, io)));
        }

        if let Some((room, writer)) = &bound {
            if writer.is_finished() {
                tracing::debug!(session_id = %session_id, "writer gone, closing reader");
                break;
            }
            room.handle_client_message(&session_id, message).await;
        }
    }

    if let Some((room, writer)) = bound {
        room.remove_session(&session_id).await;
        writer.abort();
        rooms.release_if_empty(room.id()).await;
    }
}
