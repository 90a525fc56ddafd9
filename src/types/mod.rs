//! Shared Types Module
//!
//! Data types shared across the deposit pipeline.

pub mod currency;
pub mod ledger;
pub mod units;

// Re-exports for convenience
pub use currency::{ChainFamily, Currency};
pub use ledger::{
    now_secs, plan_transition, BalanceRecord, DepositAddress, LedgerOutcome, LedgerUpdate,
    Observation, PendingDeposit, TransactionRecord, Transition, TxStatus, TxType,
};
pub use units::{coin_to_units, units_to_coin_string, units_to_display, wei_to_units, UNITS_PER_COIN};
