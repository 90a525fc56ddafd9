//! KV key layout
//!
//! ```text
//! deposit:lock:{CUR}:{tx}        short-lived processing lock
//! deposit:processed:{CUR}:{tx}   idempotency marker for confirmed deposits
//! deposit:pending:{CUR}:{tx}     PendingDeposit JSON while below threshold
//! wallet:address:{CUR}:{addr}    owner cache
//! {cur}:last_block_height        bitcoin-style poller cursor
//! {cur}:block_hash:{height}      block hashes for reorg checks
//! {cur}:last_scanned:{addr}      ethereum-style sweep cursor
//! ```

use crate::types::Currency;

pub fn deposit_lock(currency: Currency, tx_hash: &str) -> String {
    format!("deposit:lock:{}:{}", currency, tx_hash)
}

pub fn deposit_processed(currency: Currency, tx_hash: &str) -> String {
    format!("deposit:processed:{}:{}", currency, tx_hash)
}

pub fn deposit_pending(currency: Currency, tx_hash: &str) -> String {
    format!("{}{}", deposit_pending_prefix(currency), tx_hash)
}

pub fn deposit_pending_prefix(currency: Currency) -> String {
    format!("deposit:pending:{}:", currency)
}

pub fn address_owner(currency: Currency, address: &str) -> String {
    format!("wallet:address:{}:{}", currency, address)
}

pub fn last_block_height(currency: Currency) -> String {
    format!("{}:last_block_height", currency.key_prefix())
}

pub fn block_hash(currency: Currency, height: u64) -> String {
    format!("{}:block_hash:{}", currency.key_prefix(), height)
}

pub fn last_scanned(currency: Currency, address: &str) -> String {
    format!("{}{}", last_scanned_prefix(currency), address)
}

pub fn last_scanned_prefix(currency: Currency) -> String {
    format!("{}:last_scanned:", currency.key_prefix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(deposit_lock(Currency::Btc, "ab"), "deposit:lock:BTC:ab");
        assert_eq!(deposit_pending(Currency::Eth, "0x1"), "deposit:pending:ETH:0x1");
        assert!(deposit_pending(Currency::Eth, "0x1").starts_with(&deposit_pending_prefix(Currency::Eth)));
        assert_eq!(last_block_height(Currency::Btc), "btc:last_block_height");
        assert_eq!(block_hash(Currency::Eth, 7), "eth:block_hash:7");
        assert_eq!(last_scanned(Currency::Eth, "0xaa"), "eth:last_scanned:0xaa");
    }
}
