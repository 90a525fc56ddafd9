//! API Layer Module
//!
//! HTTP read surface, address assignment and the WebSocket event feed.
//! No business logic lives here; handlers call the directory and the
//! processor's read methods.

pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, serve, ApiState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainClients, MockChainRpc};
    use crate::directory::AddressDirectory;
    use crate::notify::NotificationHub;
    use crate::processor::{ConfirmationPolicy, DepositProcessor};
    use crate::storage::{MemoryKvStore, SqliteLedgerStore};
    use crate::types::{Currency, Observation};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        processor: Arc<DepositProcessor>,
    }

    fn app() -> TestApp {
        let ledger = Arc::new(SqliteLedgerStore::in_memory().unwrap());
        let kv = MemoryKvStore::new();

        let mut chain = MockChainRpc::new();
        chain
            .expect_generate_address()
            .returning(|_| Ok("bc1qfreshaddress0001".to_string()));
        let mut chains: ChainClients = ChainClients::new();
        chains.insert(Currency::Btc, Arc::new(chain));

        let directory = Arc::new(AddressDirectory::new(ledger.clone(), Arc::new(kv.clone()), chains));
        let hub = NotificationHub::default();
        let processor = Arc::new(DepositProcessor::new(
            directory.clone(),
            ledger,
            Arc::new(kv),
            Arc::new(hub.clone()),
            ConfirmationPolicy::default(),
        ));

        let router = build_router(ApiState {
            directory,
            processor: processor.clone(),
            hub,
        });
        TestApp { router, processor }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_assign_and_list_addresses() {
        let app = app();

        let (status, body) = send(
            &app.router,
            post_json("/api/addresses", serde_json::json!({"userId": "u1", "currency": "btc"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["address"], "bc1qfreshaddress0001");
        assert_eq!(body["currency"], "BTC");

        let (status, body) = send(&app.router, get("/api/addresses/u1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn test_assign_rejects_unsupported_and_unknown_currency() {
        let app = app();

        let (status, body) = send(
            &app.router,
            post_json("/api/addresses", serde_json::json!({"userId": "u1", "currency": "ETH"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "UNSUPPORTED_CURRENCY");

        let (status, _) = send(
            &app.router,
            post_json("/api/addresses", serde_json::json!({"userId": "u1", "currency": "DOGE"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_transactions_and_balance() {
        let app = app();
        send(
            &app.router,
            post_json("/api/addresses", serde_json::json!({"userId": "u1", "currency": "BTC"})),
        )
        .await;

        let obs = Observation::new(Currency::Btc, "tx-api", 1_000_000, "bc1qfreshaddress0001", 6);
        app.processor.handle_observation(&obs).await.unwrap();

        let (status, body) = send(&app.router, get("/api/transactions?userId=u1&currency=BTC")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["transactions"][0]["status"], "confirmed");

        let (status, body) = send(&app.router, get("/api/transactions/tx-api")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["amount"], 1_000_000);

        let (status, _) = send(&app.router, get("/api/transactions/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app.router, get("/api/balances/u1/BTC")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["amount"], 1_000_000);
        assert_eq!(body["formatted"], "0.01000000");

        let (_, body) = send(&app.router, get("/api/balances/someone-else/BTC")).await;
        assert_eq!(body["amount"], 0);
    }

    #[tokio::test]
    async fn test_balances_cover_every_currency() {
        let app = app();
        send(
            &app.router,
            post_json("/api/addresses", serde_json::json!({"userId": "u1", "currency": "BTC"})),
        )
        .await;
        let obs = Observation::new(Currency::Btc, "tx-all", 250_000, "bc1qfreshaddress0001", 6);
        app.processor.handle_observation(&obs).await.unwrap();

        let (status, body) = send(&app.router, get("/api/balances/u1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["userId"], "u1");
        let balances = body["balances"].as_array().unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0]["currency"], "BTC");
        assert_eq!(balances[0]["amount"], 250_000);
        assert_eq!(balances[0]["formatted"], "0.00250000");
        assert_eq!(balances[1]["currency"], "ETH");
        assert_eq!(balances[1]["amount"], 0);
        assert!(balances[1]["updatedAt"].is_null());
    }

    #[tokio::test]
    async fn test_history_requires_user() {
        let app = app();
        let (status, body) = send(&app.router, get("/api/transactions")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let app = app();
        let (status, body) = send(&app.router, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["transactions"].is_object());
    }

    #[tokio::test]
    async fn test_ws_requires_user_id() {
        let app = app();
        let (status, _) = send(&app.router, get("/ws")).await;
        // Not an upgrade request either way; never a 200
        assert!(status.is_client_error());
    }
}
