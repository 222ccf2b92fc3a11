//! Per-connection session state machine:
//! connect → authenticate → greet → message loop → cleanup.
//!
//! Reconnection is not a state here — a client that loses the transport
//! fetches a fresh ticket and re-runs the whole handshake on a new
//! connection. The greeting ledger keyed by `(user_id, channel_id)` is what
//! keeps greetings exactly-once across those reconnects.

use std::{sync::Arc, time::Instant};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use convoy_protocol::{
    CloseReason, ClientFrame, MAX_PAYLOAD_BYTES, ServerFrame, error_codes,
};

use crate::{
    dispatch::DispatchOutcome,
    state::{ConnectedSession, GatewayState},
};

/// Drive a single WebSocket connection through its full lifecycle.
pub async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session_id = %session_id, "session: transport connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();

    // Write loop: forwards serialized frames to the socket.
    let write_session_id = session_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = frame_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                debug!(session_id = %write_session_id, "session: write loop closed");
                break;
            }
        }
    });

    send_frame(&frame_tx, &ServerFrame::Connected);

    // ── Connecting: wait for the auth frame ──────────────────────────────

    let token = match tokio::time::timeout(
        state.settings.auth_timeout,
        wait_for_auth(&mut ws_rx),
    )
    .await
    {
        Ok(Ok(token)) => token,
        Ok(Err(e)) => {
            warn!(session_id = %session_id, error = %e, "session: handshake failed");
            send_frame(
                &frame_tx,
                &ServerFrame::error(error_codes::AUTH_FAILED, e.to_string()),
            );
            close_unregistered(frame_tx, write_handle, &session_id, CloseReason::AuthFailed);
            return;
        },
        Err(_) => {
            warn!(session_id = %session_id, "session: auth timeout");
            send_frame(
                &frame_tx,
                &ServerFrame::error(error_codes::AUTH_TIMEOUT, "no auth frame received"),
            );
            close_unregistered(frame_tx, write_handle, &session_id, CloseReason::AuthTimeout);
            return;
        },
    };

    // ── Authenticating: consume the ticket ───────────────────────────────

    let claims = match state.tickets.consume(&token).await {
        Ok(claims) => claims,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "session: ticket rejected");
            send_frame(
                &frame_tx,
                &ServerFrame::error(error_codes::AUTH_FAILED, e.to_string()),
            );
            close_unregistered(frame_tx, write_handle, &session_id, CloseReason::AuthFailed);
            return;
        },
    };

    send_frame(&frame_tx, &ServerFrame::AuthSuccess {
        user_id: claims.user_id.clone(),
        channel_id: claims.channel_id.clone(),
    });

    // ── Authenticated ────────────────────────────────────────────────────

    let cancel = CancellationToken::new();
    let now = Instant::now();
    state
        .register_session(ConnectedSession {
            session_id: session_id.clone(),
            user_id: claims.user_id.clone(),
            channel_id: claims.channel_id.clone(),
            sender: frame_tx.clone(),
            connected_at: now,
            last_seen: now,
            cancel: cancel.clone(),
        })
        .await;
    info!(
        session_id = %session_id,
        user_id = %claims.user_id,
        channel_id = %claims.channel_id,
        "session: authenticated"
    );

    // Greeting is best-effort and never blocks the message loop: the task
    // races message dispatches, and a timeout only logs a warning.
    if state
        .claim_greeting(&claims.user_id, &claims.channel_id)
        .await
    {
        let greet_state = Arc::clone(&state);
        let greet_session = session_id.clone();
        let greet_user = claims.user_id.clone();
        let greet_channel = claims.channel_id.clone();
        tokio::spawn(async move {
            let result = tokio::time::timeout(
                greet_state.settings.greeting_timeout,
                greet_state
                    .dispatcher
                    .greeting(&greet_user, &greet_channel),
            )
            .await;
            match result {
                Ok(Ok(reply)) => {
                    greet_state
                        .send_to(
                            &greet_session,
                            &ServerFrame::message(reply.content, reply.timestamp_ms),
                        )
                        .await;
                    debug!(session_id = %greet_session, "session: greeting delivered");
                },
                Ok(Err(e)) => {
                    warn!(session_id = %greet_session, error = %e, "session: greeting failed");
                },
                Err(_) => {
                    warn!(session_id = %greet_session, "session: greeting timed out");
                },
            }
        });
    }

    // ── Message loop ─────────────────────────────────────────────────────

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "session: read error");
                break;
            },
        };

        if text.len() > MAX_PAYLOAD_BYTES {
            warn!(session_id = %session_id, size = text.len(), "session: payload too large");
            send_frame(
                &frame_tx,
                &ServerFrame::error(error_codes::INVALID_FRAME, "payload too large"),
            );
            continue;
        }

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "session: invalid frame");
                send_frame(
                    &frame_tx,
                    &ServerFrame::error(error_codes::INVALID_FRAME, "invalid frame"),
                );
                continue;
            },
        };

        state.touch_session(&session_id).await;

        match frame {
            ClientFrame::Message {
                content,
                message_id,
                ..
            } => {
                let dispatch_state = Arc::clone(&state);
                let dispatch_session = session_id.clone();
                let dispatch_user = claims.user_id.clone();
                let dispatch_channel = claims.channel_id.clone();
                let dispatch_cancel = cancel.clone();
                tokio::spawn(async move {
                    run_dispatch(
                        dispatch_state,
                        dispatch_session,
                        dispatch_user,
                        dispatch_channel,
                        content,
                        message_id,
                        dispatch_cancel,
                    )
                    .await;
                });
            },
            ClientFrame::Auth { .. } => {
                debug!(session_id = %session_id, "session: ignoring auth frame after handshake");
                send_frame(
                    &frame_tx,
                    &ServerFrame::error(error_codes::INVALID_FRAME, "already authenticated"),
                );
            },
        }
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    let duration = state
        .remove_session(&session_id)
        .await
        .map(|s| s.connected_at.elapsed())
        .unwrap_or_default();
    info!(
        session_id = %session_id,
        duration_secs = duration.as_secs(),
        "session: closed"
    );

    drop(frame_tx);
    write_handle.abort();
}

/// One message dispatch, bounded by the dispatch timeout and cancelled when
/// the session closes. A cancelled dispatch delivers nothing.
async fn run_dispatch(
    state: Arc<GatewayState>,
    session_id: String,
    user_id: String,
    channel_id: String,
    content: String,
    message_id: String,
    cancel: CancellationToken,
) {
    let dispatch = state.dispatcher.dispatch(
        &session_id,
        &user_id,
        &channel_id,
        &content,
        &message_id,
    );

    tokio::select! {
        () = cancel.cancelled() => {
            debug!(session_id = %session_id, message_id = %message_id, "session: dispatch cancelled");
        },
        result = tokio::time::timeout(state.settings.dispatch_timeout, dispatch) => {
            match result {
                Ok(Ok(DispatchOutcome::Reply(reply))) => {
                    state
                        .send_to(
                            &session_id,
                            &ServerFrame::message(reply.content, reply.timestamp_ms),
                        )
                        .await;
                },
                Ok(Ok(DispatchOutcome::DuplicateDropped)) => {
                    debug!(session_id = %session_id, message_id = %message_id, "session: duplicate dropped");
                },
                Ok(Err(e)) => {
                    warn!(session_id = %session_id, error = %e, "session: dispatch failed");
                    state
                        .send_to(&session_id, &ServerFrame::error(e.code(), e.to_string()))
                        .await;
                },
                Err(_) => {
                    warn!(session_id = %session_id, message_id = %message_id, "session: dispatch timed out");
                    state.dispatcher.abandon(&session_id, &message_id).await;
                    state
                        .send_to(
                            &session_id,
                            &ServerFrame::error(
                                error_codes::INTERNAL_ERROR,
                                "reply timed out, please retry",
                            ),
                        )
                        .await;
                },
            }
        },
    }
}

/// Wait for the first `auth` frame. Any other frame before auth is a
/// protocol violation that ends the handshake.
async fn wait_for_auth(
    rx: &mut futures::stream::SplitStream<WebSocket>,
) -> anyhow::Result<String> {
    while let Some(msg) = rx.next().await {
        let text = match msg? {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => anyhow::bail!("connection closed before handshake"),
            _ => continue,
        };

        let frame: ClientFrame = serde_json::from_str(&text)?;
        match frame {
            ClientFrame::Auth { token } => return Ok(token),
            ClientFrame::Message { .. } => {
                anyhow::bail!("first frame must be 'auth'");
            },
        }
    }
    anyhow::bail!("connection closed before handshake")
}

fn send_frame(tx: &mpsc::UnboundedSender<String>, frame: &ServerFrame) {
    if let Ok(json) = serde_json::to_string(frame) {
        let _ = tx.send(json);
    }
}

/// Tear down a connection that never reached the registry.
fn close_unregistered(
    frame_tx: mpsc::UnboundedSender<String>,
    write_handle: tokio::task::JoinHandle<()>,
    session_id: &str,
    reason: CloseReason,
) {
    info!(session_id = %session_id, reason = reason.as_str(), "session: closed before auth");
    drop(frame_tx);
    // Dropping the sender lets the write loop flush queued frames and exit;
    // the handle is left to finish on its own.
    drop(write_handle);
}
