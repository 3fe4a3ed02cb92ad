use std::net::SocketAddr;

use axum::{
    body::to_bytes,
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::relay::{RelayError, RelayRequest};

use super::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";
const API_KEY_PARAM: &str = "api_key";
const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Serialize)]
pub struct LikeResponse {
    pub success: bool,
    pub hash: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::InvalidId => StatusCode::BAD_REQUEST,
            RelayError::Submission(_) | RelayError::Confirmation { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = match &self {
            RelayError::Confirmation { hash, .. } => json!({
                "error": self.to_string(),
                "hash": hash.to_string(),
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

pub async fn like(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<LikeResponse>, RelayError> {
    let caller_identity = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".into());
    let supplied_key =
        header_key(request.headers()).or_else(|| query_key(request.uri()));

    // Unparseable bodies fall through to id validation after auth and quota
    let id = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|body| body.get("id").cloned())
            .unwrap_or(Value::Null),
        Err(_) => Value::Null,
    };

    let outcome = state
        .relay
        .relay_like(RelayRequest {
            id,
            caller_identity,
            supplied_key,
        })
        .await?;

    Ok(Json(LikeResponse {
        success: outcome.confirmed,
        hash: outcome.hash.to_string(),
    }))
}

fn header_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|key| !key.is_empty())
        .map(String::from)
}

/// First non-empty `api_key` parameter. A query string that cannot be parsed
/// counts as no key, so the request still reaches the auth check.
fn query_key(uri: &Uri) -> Option<String> {
    let Query(params) = Query::<Vec<(String, String)>>::try_from_uri(uri).ok()?;
    params
        .into_iter()
        .find(|(name, value)| name == API_KEY_PARAM && !value.is_empty())
        .map(|(_, value)| value)
}
