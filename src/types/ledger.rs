//! Ledger Types
//!
//! Records persisted by the ledger store and the pure state-transition
//! planner shared by every store implementation:
//!
//! ```text
//! (unseen) → PENDING → CONFIRMED   (terminal, credits the balance)
//!                    ↘ FAILED      (terminal, staleness timeout)
//! ```

use serde::{Deserialize, Serialize};

use super::currency::Currency;

/// Current unix time in seconds
pub fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Status of a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Seen on chain, below the confirmation threshold
    #[default]
    Pending,
    /// Threshold reached and balance credited
    Confirmed,
    /// Dropped from the chain (zero confirmations past the staleness window)
    Failed,
}

impl TxStatus {
    /// Confirmed and failed rows are never modified again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown transaction status: {}", s)),
        }
    }
}

/// Direction of a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    #[default]
    Deposit,
    Withdrawal,
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "deposit"),
            Self::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

impl std::str::FromStr for TxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            _ => Err(format!("unknown transaction type: {}", s)),
        }
    }
}

/// A chain address assigned to exactly one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositAddress {
    pub id: String,
    pub user_id: String,
    pub currency: Currency,
    /// Normalized address (see [`Currency::normalize_address`])
    pub address: String,
    pub created_at: u64,
}

impl DepositAddress {
    pub fn new(user_id: String, currency: Currency, address: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            currency,
            address: currency.normalize_address(address),
            created_at: now_secs(),
        }
    }
}

/// A deposit (or withdrawal) as recorded in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub user_id: String,
    pub currency: Currency,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    /// Amount in 1e-8 base units
    pub amount: u64,
    pub address: String,
    pub tx_hash: String,
    pub confirmations: u32,
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub created_at: u64,
    pub confirmed_at: Option<u64>,
}

impl TransactionRecord {
    /// Build the row for the first observation of a deposit
    pub fn new_deposit(update: &LedgerUpdate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: update.user_id.clone(),
            currency: update.currency,
            tx_type: TxType::Deposit,
            amount: update.amount,
            address: update.address.clone(),
            tx_hash: update.tx_hash.clone(),
            confirmations: update.confirmations,
            status: TxStatus::Pending,
            block_number: update.block_number,
            created_at: now_secs(),
            confirmed_at: None,
        }
    }

    /// Flip to confirmed and stamp the confirmation time
    pub fn mark_confirmed(&mut self) {
        self.status = TxStatus::Confirmed;
        self.confirmed_at = Some(now_secs());
    }

    /// Seconds since the row was created
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

/// A user's credited balance in one currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRecord {
    pub user_id: String,
    pub currency: Currency,
    /// Amount in 1e-8 base units
    pub amount: u64,
    pub updated_at: u64,
}

/// A deposit sighting reported by a producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub currency: Currency,
    pub tx_hash: String,
    /// Amount in 1e-8 base units
    pub amount: u64,
    pub address: String,
    pub confirmations: u32,
    pub block_height: Option<u64>,
}

impl Observation {
    pub fn new(
        currency: Currency,
        tx_hash: impl Into<String>,
        amount: u64,
        address: impl AsRef<str>,
        confirmations: u32,
    ) -> Self {
        Self {
            currency,
            tx_hash: tx_hash.into(),
            amount,
            address: currency.normalize_address(address.as_ref()),
            confirmations,
            block_height: None,
        }
    }

    pub fn at_height(mut self, height: u64) -> Self {
        self.block_height = Some(height);
        self
    }
}

/// KV marker kept while a deposit is pending, so head-driven producers can
/// re-derive confirmations without touching the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDeposit {
    pub amount: u64,
    pub address: String,
    pub block_number: Option<u64>,
}

/// Input to the atomic ledger step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub user_id: String,
    pub currency: Currency,
    pub tx_hash: String,
    pub amount: u64,
    pub address: String,
    pub confirmations: u32,
    pub block_number: Option<u64>,
    pub required_confirmations: u32,
}

impl LedgerUpdate {
    pub fn from_observation(observation: &Observation, user_id: String, required: u32) -> Self {
        Self {
            user_id,
            currency: observation.currency,
            tx_hash: observation.tx_hash.clone(),
            amount: observation.amount,
            address: observation.address.clone(),
            confirmations: observation.confirmations,
            block_number: observation.block_height,
            required_confirmations: required,
        }
    }

    pub fn meets_threshold(&self) -> bool {
        self.confirmations >= self.required_confirmations
    }
}

/// Result of the atomic ledger step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// Row created or updated and still below the threshold
    Pending(TransactionRecord),
    /// Row flipped to confirmed in this step; balance credited
    Confirmed {
        transaction: TransactionRecord,
        new_balance: u64,
    },
    /// Row was already terminal; nothing written
    Unchanged(TransactionRecord),
}

/// What the store must do for one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No row yet; insert one, confirmed or not
    Insert { confirm: bool },
    /// Pending row; update confirmations and maybe confirm
    Update { confirm: bool },
    /// Terminal row; leave it alone
    Frozen,
}

impl Transition {
    pub fn confirms(&self) -> bool {
        matches!(
            self,
            Transition::Insert { confirm: true } | Transition::Update { confirm: true }
        )
    }
}

/// Decide the transition for an observation given the current row.
///
/// Terminal rows are frozen, so late or out-of-order observations with
/// lower confirmation counts can never regress a confirmed deposit.
pub fn plan_transition(existing: Option<&TransactionRecord>, update: &LedgerUpdate) -> Transition {
    match existing {
        None => Transition::Insert {
            confirm: update.meets_threshold(),
        },
        Some(record) if record.status.is_terminal() => Transition::Frozen,
        Some(_) => Transition::Update {
            confirm: update.meets_threshold(),
        },
    }
}
