use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use parley_db::MessageStore;
use parley_types::events::{ClientEvent, ServerEvent};

use crate::error::RelayError;
use crate::handshake::{self, CredentialVerifier};
use crate::registry::Registry;
use crate::router;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive a single WebSocket connection: handshake, admission, then the event
/// loop until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    registry: Registry,
    verifier: Arc<dyn CredentialVerifier>,
    store: Arc<dyn MessageStore>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Strict admission gate: nothing below runs until the token checks out.
    let identity = match handshake::authenticate(&mut receiver, &verifier).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!("WebSocket client failed handshake, closing");
            let notice = serde_json::to_string(&ServerEvent::Error(err.to_string())).unwrap();
            let _ = sender.send(Message::Text(notice.into())).await;
            let _ = sender.close().await;
            return;
        }
    };

    info!("{} ({}) connected", identity.username, identity.id);

    let (conn_id, mut rx) = registry.add(identity.clone());

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
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
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read events from the client. Each event is handled to completion before
    // the next frame is decoded, so a connection's events stay totally
    // ordered.
    let recv_registry = registry.clone();
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        router::handle_event(
                            &recv_registry,
                            &store,
                            conn_id,
                            &recv_identity,
                            event,
                        )
                        .await;
                    }
                    Err(e) => {
                        let err = RelayError::MalformedEvent(e.to_string());
                        warn!(
                            "{} ({}) {} -- raw: {}",
                            recv_identity.username,
                            recv_identity.id,
                            err,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever side finishes first tears down the other; the registry entry
    // is removed before this function returns, so no further event can reach
    // a half-closed connection.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.remove(conn_id);
    info!("{} ({}) disconnected", identity.username, identity.id);
}
