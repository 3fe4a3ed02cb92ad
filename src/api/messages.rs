use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::chain::MessageRecord;

use super::state::AppState;

#[derive(Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageRecord>,
    pub skipped: usize,
}

pub async fn list_messages(
    State(state): State<AppState>,
) -> Result<Json<MessagesResponse>, (StatusCode, Json<Value>)> {
    let listing = state.messages.list_messages().await.map_err(|e| {
        tracing::error!("Failed to load messages: {e}");
        (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() })))
    })?;

    Ok(Json(MessagesResponse {
        skipped: listing.skipped.len(),
        messages: listing.messages,
    }))
}
