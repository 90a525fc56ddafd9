//! Deposit Notifications
//!
//! Best-effort, per-user push of deposit progress. The processor is the only
//! caller; delivery failures never affect ledger state.

pub mod hub;
pub mod websocket;

use serde::{Deserialize, Serialize};

use crate::types::{units_to_display, Currency};

pub use hub::{NotificationHub, Subscription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotice {
    pub tx_hash: String,
    pub currency: Currency,
    pub amount: u64,
    pub confirmations: u32,
    pub required: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedNotice {
    pub tx_hash: String,
    pub currency: Currency,
    pub amount: u64,
    pub new_balance: u64,
}

/// Events pushed to a user
///
/// Wire form: `{"event": "deposit_pending", "data": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum DepositEvent {
    DepositPending(PendingNotice),
    DepositConfirmed(ConfirmedNotice),
}

impl DepositEvent {
    pub fn tx_hash(&self) -> &str {
        match self {
            DepositEvent::DepositPending(n) => &n.tx_hash,
            DepositEvent::DepositConfirmed(n) => &n.tx_hash,
        }
    }

    /// One-line human summary for logs and CLIs
    pub fn describe(&self) -> String {
        match self {
            DepositEvent::DepositPending(n) => format!(
                "pending {} ({}/{} confirmations): {}",
                n.tx_hash,
                n.confirmations,
                n.required,
                units_to_display(n.amount, &n.currency.to_string())
            ),
            DepositEvent::DepositConfirmed(n) => format!(
                "confirmed {}: {}, balance now {}",
                n.tx_hash,
                units_to_display(n.amount, &n.currency.to_string()),
                units_to_display(n.new_balance, &n.currency.to_string())
            ),
        }
    }
}

/// Fire-and-forget delivery to a user's live connections
pub trait NotificationSink: Send + Sync {
    fn notify(&self, user_id: &str, event: DepositEvent);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _user_id: &str, _event: DepositEvent) {}
}
