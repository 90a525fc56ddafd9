//! WebSocket transport for deposit events
//!
//! Route: `/ws?userId=...`. Each socket holds one hub subscription for the
//! lifetime of the connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use super::NotificationHub;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub user_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(hub): State<NotificationHub>,
) -> Response {
    match params.user_id.filter(|u| !u.trim().is_empty()) {
        Some(user_id) => ws
            .on_upgrade(move |socket| handle_socket(socket, user_id, hub))
            .into_response(),
        None => (StatusCode::BAD_REQUEST, "userId is required").into_response(),
    }
}

async fn handle_socket(socket: WebSocket, user_id: String, hub: NotificationHub) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = hub.subscribe(&user_id);
    let subscription_id = subscription.id;
    debug!(user_id = %user_id, subscription_id, "WebSocket subscribed");

    let send_task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    warn!(error = %e, "Failed to encode deposit event");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    hub.unsubscribe(&user_id, subscription_id);
    debug!(user_id = %user_id, subscription_id, "WebSocket closed");
}
