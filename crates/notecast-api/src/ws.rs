use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use notecast_gateway::connection::{handle_connection, handle_connection_authenticated};

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::bearer_token;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /ws
///
/// A token in `?token=` or the `Authorization` header is checked before the
/// upgrade, so a revoked or stale token gets a plain HTTP 401. Without one
/// the socket is upgraded and must send `identify` first.
pub async fn gateway_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let registry = state.registry.clone();
    let token = params.token.as_deref().or_else(|| bearer_token(&headers));

    match token {
        Some(token) => match state.gate.authenticate(Some(token)).await {
            Ok(principal) => ws
                .on_upgrade(move |socket| handle_connection_authenticated(socket, registry, principal))
                .into_response(),
            Err(e) => ApiError::from(e).into_response(),
        },
        None => {
            let gate = state.gate.clone();
            ws.on_upgrade(move |socket| handle_connection(socket, registry, gate))
                .into_response()
        }
    }
}
