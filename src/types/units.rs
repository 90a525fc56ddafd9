//! Unit Conversion Utilities
//!
//! Ledger amounts are integers at 1e-8 precision for every currency:
//! satoshis for BTC, and 1e-8 ETH for ETH (wei truncated by 10^10).

/// Base units per whole coin
pub const UNITS_PER_COIN: u64 = 100_000_000;

/// Wei per ledger unit (10^18 / 10^8)
pub const WEI_PER_UNIT: u128 = 10_000_000_000;

/// Convert a whole-coin float (as reported by bitcoind) to base units
pub fn coin_to_units(coin: f64) -> u64 {
    if !coin.is_finite() || coin <= 0.0 {
        return 0;
    }
    (coin * UNITS_PER_COIN as f64).round() as u64
}

/// Convert wei to base units, truncating sub-unit dust
pub fn wei_to_units(wei: u128) -> u64 {
    u64::try_from(wei / WEI_PER_UNIT).unwrap_or(u64::MAX)
}

/// Render base units as a fixed 8-decimal coin string (e.g., "0.01000000")
pub fn units_to_coin_string(units: u64) -> String {
    format!(
        "{}.{:08}",
        units / UNITS_PER_COIN,
        units % UNITS_PER_COIN
    )
}

/// Human-readable amount, e.g. "1,000,000 units (0.01000000 BTC)"
pub fn units_to_display(units: u64, ticker: &str) -> String {
    format!(
        "{} units ({} {})",
        format_with_commas(units),
        units_to_coin_string(units),
        ticker
    )
}

/// Format number with thousands separators
fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}
