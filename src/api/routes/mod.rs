//! API Routes Module
//!
//! Route handlers organized by domain:
//! - addresses: deposit address assignment and listing
//! - transactions: history, single lookups and balances
//! - health: liveness and ledger counts

pub mod addresses;
pub mod health;
pub mod transactions;

use crate::types::Currency;

use super::error::ApiError;

pub(crate) fn parse_currency(raw: &str) -> Result<Currency, ApiError> {
    raw.parse::<Currency>().map_err(ApiError::validation)
}
