use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use parley_types::api::{Claims, MessageResponse};
use parley_types::models::MessageSender;

use crate::auth::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Message history for clients joining mid-conversation. The store returns
/// newest-first; the wire serves oldest-first so clients append in order.
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run the blocking DB query off the async runtime
    let db = state.db.clone();
    let limit = query.limit.min(200);

    let rows = tokio::task::spawn_blocking(move || db.recent_messages(limit))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .rev()
        .map(|row| {
            let timestamp = row.created_at_utc();
            MessageResponse {
                id: row.id,
                content: row.content,
                sender: MessageSender::new(row.sender_id, row.sender_username),
                timestamp,
                is_delivered: row.is_delivered,
                is_read: row.is_read,
            }
        })
        .collect();

    Ok(Json(messages))
}
