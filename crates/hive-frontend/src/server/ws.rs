//! Client websocket sessions.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use hive_core::auth::Principal;
use tracing::{debug, info, trace, warn};

use super::actions::{ActionContext, respond};
use super::extract::Authenticated;
use super::state::AppState;
use crate::session::{ClientSession, SessionSink};

const PING_INTERVAL: Duration = Duration::from_secs(30);

pub(super) async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, state, principal))
}

/// Run one client session until either side goes away.
///
/// Requests are handled in arrival order. Subscription events reach the
/// socket through the session queue, so a long subscribe never blocks them.
async fn serve(socket: WebSocket, state: AppState, principal: Principal) {
    let (session, mut outbound) = ClientSession::new(state.settings.session_queue_depth);
    let _guard = session.close_on_drop();
    let session_id = session.session_id();
    info!(%session_id, role = ?principal.role, "Websocket session opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.tick().await;
        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    if ws_tx.send(Message::Text(message.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                    trace!(%session_id, "Sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let sink: Arc<dyn SessionSink> = session.clone();
    let ctx = ActionContext::new(&state, &principal, sink);
    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => {
                if respond(&ctx, text.as_str()).await.is_err() {
                    warn!(%session_id, "Session closed while replying");
                    break;
                }
            }
            Message::Close(_) => break,
            Message::Binary(_) => debug!(%session_id, "Ignoring binary frame"),
            Message::Ping(_) | Message::Pong(_) => {}
        }
        if !session.is_open() {
            break;
        }
    }

    session.close();
    writer.abort();
    info!(%session_id, "Websocket session closed");
}
