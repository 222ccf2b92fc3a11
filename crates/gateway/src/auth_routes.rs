//! Ticket issuance endpoint (`POST /auth`).
//!
//! Issuance is decoupled from the WebSocket so clients fetch a ticket over
//! plain HTTP before opening the socket.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use {
    convoy_auth::AuthError,
    convoy_protocol::{ErrorShape, TicketRequest, TicketResponse, error_codes},
};

use crate::server::AppState;

pub async fn issue_ticket(
    State(app): State<AppState>,
    Json(request): Json<TicketRequest>,
) -> Response {
    match app
        .gateway
        .tickets
        .issue(&request.user_id, &request.channel_id)
        .await
    {
        Ok(ticket) => Json(TicketResponse {
            token: ticket.token,
            expires_in_seconds: ticket.expires_in_seconds,
        })
        .into_response(),
        Err(e) => {
            let (status, code) = match &e {
                AuthError::ChannelNotFound { .. } => {
                    (StatusCode::NOT_FOUND, error_codes::CHANNEL_NOT_FOUND)
                },
                AuthError::ChannelInactive { .. } => {
                    (StatusCode::CONFLICT, error_codes::CHANNEL_INACTIVE)
                },
                _ => (StatusCode::BAD_REQUEST, error_codes::AUTH_FAILED),
            };
            (
                status,
                Json(serde_json::json!({ "error": ErrorShape::new(code, e.to_string()) })),
            )
                .into_response()
        },
    }
}
