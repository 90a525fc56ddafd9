//! API Server Module
//!
//! Application state, router assembly and the listener loop.

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::routes::{addresses, health, transactions};
use crate::directory::AddressDirectory;
use crate::notify::{websocket::ws_handler, NotificationHub};
use crate::processor::DepositProcessor;

/// Handles shared by every request
#[derive(Clone)]
pub struct ApiState {
    pub directory: Arc<AddressDirectory>,
    pub processor: Arc<DepositProcessor>,
    pub hub: NotificationHub,
}

impl FromRef<ApiState> for NotificationHub {
    fn from_ref(state: &ApiState) -> Self {
        state.hub.clone()
    }
}

pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/addresses", post(addresses::handle_assign_address))
        .route("/api/addresses/:user_id", get(addresses::handle_list_addresses))
        .route("/api/transactions", get(transactions::handle_history))
        .route("/api/transactions/:tx_hash", get(transactions::handle_get_transaction))
        .route("/api/balances/:user_id", get(transactions::handle_list_balances))
        .route(
            "/api/balances/:user_id/:currency",
            get(transactions::handle_get_balance),
        )
        .route("/api/health", get(health::handle_health))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` flips to true
pub async fn serve(
    port: u16,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}
