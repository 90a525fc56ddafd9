//! `newHeads` WebSocket feed
//!
//! Keeps one `eth_subscribe` session open against the node and hands every
//! announced head to [`EthereumWatcher::on_new_head`]. A dropped connection
//! is retried after a fixed delay; the sweep covers the gap meanwhile.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::EthereumWatcher;
use crate::chain::ethereum::parse_head;
use crate::chain::{BlockHead, ChainError};
use crate::common::logging::log_chain_event;

/// Frame sent right after connecting
pub fn subscribe_request() -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_subscribe",
        "params": ["newHeads"]
    })
    .to_string()
}

/// Extract a head from an `eth_subscription` notification. Subscription
/// acks and unrelated frames yield `None`.
pub fn head_from_frame(text: &str) -> Result<Option<BlockHead>, ChainError> {
    let frame: Value = serde_json::from_str(text)?;

    if let Some(error) = frame.get("error") {
        return Err(ChainError::Subscription(error.to_string()));
    }
    if frame.get("method").and_then(Value::as_str) != Some("eth_subscription") {
        return Ok(None);
    }

    let result = frame
        .pointer("/params/result")
        .ok_or_else(|| ChainError::Parse("subscription frame without result".to_string()))?;
    parse_head(result).map(Some)
}

/// Run until `shutdown` flips to true
pub async fn run_head_subscription(
    ws_url: String,
    watcher: Arc<EthereumWatcher>,
    reconnect_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let currency = watcher.currency();

    loop {
        if *shutdown.borrow() {
            break;
        }

        if let Err(e) = run_session(&ws_url, &watcher, &mut shutdown).await {
            log_chain_event(
                "subscription_dropped",
                currency,
                false,
                json!({ "url": ws_url, "error": e.to_string() }),
            );
        }

        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(currency = %currency, "Head subscription stopped");
}

/// One connection lifetime. Returns `Ok` on shutdown or a clean close.
async fn run_session(
    ws_url: &str,
    watcher: &EthereumWatcher,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), ChainError> {
    let currency = watcher.currency();
    let (stream, _) = connect_async(ws_url)
        .await
        .map_err(|e| ChainError::Subscription(e.to_string()))?;
    let (mut sender, mut receiver) = stream.split();

    sender
        .send(Message::Text(subscribe_request()))
        .await
        .map_err(|e| ChainError::Subscription(e.to_string()))?;
    info!(currency = %currency, url = %ws_url, "Subscribed to newHeads");

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(frame) = frame else {
                    return Err(ChainError::Subscription("stream ended".to_string()));
                };
                match frame.map_err(|e| ChainError::Subscription(e.to_string()))? {
                    Message::Text(text) => match head_from_frame(&text) {
                        Ok(Some(head)) => handle_head(watcher, &head).await,
                        Ok(None) => debug!(currency = %currency, "Ignoring non-head frame"),
                        Err(ChainError::Subscription(msg)) => {
                            return Err(ChainError::Subscription(msg));
                        }
                        Err(e) => warn!(currency = %currency, error = %e, "Malformed head frame"),
                    },
                    Message::Ping(payload) => {
                        sender
                            .send(Message::Pong(payload))
                            .await
                            .map_err(|e| ChainError::Subscription(e.to_string()))?;
                    }
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = sender.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_head(watcher: &EthereumWatcher, head: &BlockHead) {
    match watcher.on_new_head(head).await {
        Ok(report) => debug!(
            currency = %watcher.currency(),
            number = head.number,
            resubmitted = report.resubmitted,
            errors = report.errors,
            reorg = report.reorg.is_some(),
            "Processed new head"
        ),
        Err(e) => warn!(
            currency = %watcher.currency(),
            number = head.number,
            error = %e,
            "Failed to process new head"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_request_shape() {
        let request: Value = serde_json::from_str(&subscribe_request()).unwrap();
        assert_eq!(request["method"], "eth_subscribe");
        assert_eq!(request["params"][0], "newHeads");
    }

    #[test]
    fn test_head_notification_is_parsed() {
        let frame = r#"{
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0x9ce59a13059e417087c02d3236a0b1cc",
                "result": {
                    "number": "0x1b4",
                    "hash": "0xdc0818cf78f21a8e70579cb46a43643f78291264dda342ae31049421c82d21ae",
                    "parentHash": "0x6c0f2387f9f3c3a4b4b5b4f2b8c1c8f6e0d9a7b3c2e1f0a9b8c7d6e5f4a3b2c1"
                }
            }
        }"#;

        let head = head_from_frame(frame).unwrap().unwrap();
        assert_eq!(head.number, 436);
        assert!(head.hash.starts_with("0xdc08"));
        assert!(head.parent_hash.starts_with("0x6c0f"));
    }

    #[test]
    fn test_ack_and_errors() {
        let ack = r#"{"jsonrpc":"2.0","id":1,"result":"0x9ce59a13059e417087c02d3236a0b1cc"}"#;
        assert!(head_from_frame(ack).unwrap().is_none());

        let refused = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"notifications not supported"}}"#;
        assert!(matches!(head_from_frame(refused), Err(ChainError::Subscription(_))));

        assert!(head_from_frame("not json").is_err());
    }
}
