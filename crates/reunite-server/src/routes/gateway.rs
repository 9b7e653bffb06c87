use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use reunite_gateway::connection;

use crate::AppState;
use crate::middleware::decode_claims;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    token: String,
}

/// Authenticate once at upgrade time; the connection handler receives
/// resolved claims and never re-derives identity.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let claims = decode_claims(&query.token, &state.jwt_secret).ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.db, claims)
    }))
}
