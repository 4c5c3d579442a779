//! Websocket upgrade handlers for the presentation and control channels.
//!
//! Each socket is registered with the [`ConnectionHub`](crate::hub::ConnectionHub)
//! and served by two tasks:
//!
//! - **Egress** drains the hub's queue for this client into the socket.
//! - **Ingest** reads text frames and hands them to [`crate::control`].
//!
//! Whichever finishes first aborts the other, and the client is always
//! unregistered on the way out.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

use zunda_core::Channel;

use crate::control::{handle_control_message, handle_presentation_message};
use crate::state::AppState;

/// `GET /ws/presentation`
pub async fn presentation(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state, Channel::Presentation))
}

/// `GET /ws/control`
pub async fn control(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state, Channel::Control))
}

async fn serve_socket(socket: WebSocket, state: AppState, channel: Channel) {
    let (client, mut outbox) = state.hub.register(channel);
    info!(client = %client, channel = channel.as_str(), "Websocket client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // ── Egress: hub queue → socket ───────────────────────────────────────
    let mut egress = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            if ws_sender
                .send(Message::Text(message.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
        // Best effort close; the peer may already be gone.
        let _ = ws_sender.close().await;
    });

    // ── Ingest: socket → command dispatch ────────────────────────────────
    let ingest_state = state.clone();
    let mut ingest = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match channel {
                    Channel::Control => handle_control_message(&ingest_state, client, text.as_str()),
                    Channel::Presentation => {
                        handle_presentation_message(&ingest_state, client, text.as_str());
                    }
                },
                Ok(Message::Close(_)) | Err(_) => break,
                // Ping/pong are answered by axum; binary frames carry nothing for us.
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut ingest => egress.abort(),
        _ = &mut egress => ingest.abort(),
        () = state.shutdown.cancelled() => {
            ingest.abort();
            egress.abort();
        }
    }

    state.hub.unregister(client);
    debug!(client = %client, channel = channel.as_str(), "Websocket client disconnected");
}
