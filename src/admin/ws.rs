// Relaymux inbound client websocket — the single endpoint a client
// multiplexes subscriptions through. Gating mirrors spec §6: the literal
// path segment "relay" is the public surface; anything else is treated as
// AES-256-GCM ciphertext that must decrypt to the literal "relay" under
// the server's private-ws key, gating a separate feature flag so an
// operator can run public-only, private-only, or both.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc;

use crate::crypto;
use crate::router::Router;

use super::AppState;

const PUBLIC_WS_LITERAL: &str = "relay";
/// Outbound channel depth between a Router's pump and the client socket
/// writer; generous since a client reading slowly shouldn't stall the
/// pump immediately.
const CLIENT_OUTBOUND_CAPACITY: usize = 256;

pub async fn handle_upgrade(
    Path(ws_id): Path<String>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    match authorize(&state, &ws_id) {
        Ok(()) => ws.on_upgrade(move |socket| handle_socket(socket, state)),
        Err((code, message)) => (code, message).into_response(),
    }
}

fn authorize(state: &AppState, ws_id: &str) -> Result<(), (StatusCode, String)> {
    let config = state.store.load_config().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if ws_id == PUBLIC_WS_LITERAL {
        if config.public_ws {
            return Ok(());
        }
        return Err((StatusCode::FORBIDDEN, "Public websocket connections not accepted.".into()));
    }

    if !config.private_ws {
        return Err((StatusCode::FORBIDDEN, "private websocket is disabled".into()));
    }
    let key = state
        .private_ws_key
        .as_deref()
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "private websocket key not configured".into()))?;

    match crypto::decrypt_private_ws_id(key, ws_id) {
        Ok(plaintext) if plaintext == PUBLIC_WS_LITERAL => Ok(()),
        Ok(_) => Err((StatusCode::FORBIDDEN, "ws id did not decrypt to the expected literal".into())),
        Err(_) => Err((StatusCode::FORBIDDEN, "ws id is not valid ciphertext".into())),
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let router = Router::new(state.manager.clone(), state.intake.clone());

    let (client_tx, mut client_rx) = mpsc::channel::<String>(CLIENT_OUTBOUND_CAPACITY);
    let outbound_pump = tokio::spawn(router.clone().run_outbound_pump(client_tx));

    let writer = tokio::spawn(async move {
        while let Some(frame) = client_rx.recv().await {
            if sink.send(WsMessage::Text(frame)).await.is_err() {
                return;
            }
        }
        // The outbound pump's sender is dropped once `Router::stop()` runs;
        // that's our cue to close with the spec's fixed reason string.
        let _ = sink
            .send(WsMessage::Close(Some(CloseFrame {
                code: axum::extract::ws::close_code::NORMAL,
                reason: "Websocket connection closed".into(),
            })))
            .await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(WsMessage::Text(text)) => router.handle_client_frame(&text),
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
            Ok(WsMessage::Binary(_)) => debug!("[ws] ignoring binary frame from client"),
            Err(e) => {
                warn!("[ws] client read error: {e}");
                break;
            }
        }
    }

    router.stop();
    // `run_outbound_pump` notices `stopped` on its next ~100ms tick and
    // drops `client_tx` on return, which is the writer's signal to send
    // the close frame below. Give it a bounded window, then abort both.
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), writer).await;
    outbound_pump.abort();
}
