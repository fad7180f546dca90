//! Fallback transport for environments where WebSocket upgrades are blocked:
//! outbound events stream over SSE, inbound events arrive as authenticated
//! POSTs paired to the stream by connection id. Both sides share the same
//! registry and router as the WebSocket path.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use parley_db::MessageStore;
use parley_gateway::{CredentialVerifier, Registry, router};
use parley_gateway::registry::ConnectionId;
use parley_types::api::Claims;
use parley_types::events::ClientEvent;

use crate::auth::AppState;

#[derive(Debug, Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendQuery {
    pub connection: Uuid,
}

/// Removes the fallback connection from the registry when its event stream
/// is dropped — the SSE response going away is this transport's disconnect.
struct ConnectionGuard {
    registry: Registry,
    conn_id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.conn_id);
    }
}

/// `GET /gateway/sse?token=…` — handshake and outbound stream. The token
/// travels as a query parameter because EventSource clients cannot set
/// headers or send frames; absence or invalidity is an immediate 401.
pub async fn sse_events(
    State(state): State<AppState>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let token = query.token.ok_or(StatusCode::UNAUTHORIZED)?;

    let credentials = state.credentials.clone();
    let identity = tokio::task::spawn_blocking(move || credentials.verify(&token))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    info!(
        "{} ({}) connected via SSE fallback",
        identity.username, identity.id
    );

    let (conn_id, mut rx) = state.registry.add(identity);
    let guard = ConnectionGuard {
        registry: state.registry.clone(),
        conn_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        // The client pairs its POSTs to this stream with the connection id.
        yield Ok(Event::default().event("connected").data(conn_id.to_string()));
        while let Some(server_event) = rx.recv().await {
            let json = serde_json::to_string(&server_event).unwrap();
            yield Ok(Event::default().event("message").data(json));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `POST /gateway/send?connection=…` — inbound half of the fallback
/// transport, bearer-protected by the REST middleware.
pub async fn send_event(
    State(state): State<AppState>,
    Query(query): Query<SendQuery>,
    Extension(claims): Extension<Claims>,
    Json(event): Json<ClientEvent>,
) -> Result<StatusCode, StatusCode> {
    // Revalidate the pairing instead of trusting it: the connection must
    // still be admitted and must belong to the authenticated subject.
    let identity = state
        .registry
        .identity_of(query.connection)
        .ok_or(StatusCode::NOT_FOUND)?;
    if identity.id != claims.sub {
        return Err(StatusCode::FORBIDDEN);
    }

    let store: Arc<dyn MessageStore> = state.db.clone();
    router::handle_event(&state.registry, &store, query.connection, &identity, event).await;

    Ok(StatusCode::ACCEPTED)
}
