//! Supported Currencies
//!
//! Each currency maps to exactly one chain family, which decides how the
//! chain is watched and how addresses are compared.

use serde::{Deserialize, Serialize};

/// How a chain is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    /// Block-height polling with hash-based reorg detection
    Bitcoin,
    /// Head subscription plus periodic per-address sweep
    Ethereum,
}

/// Currencies with a configured chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "BTC", alias = "btc")]
    Btc,
    #[serde(rename = "ETH", alias = "eth")]
    Eth,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Btc, Currency::Eth];

    pub fn family(&self) -> ChainFamily {
        match self {
            Currency::Btc => ChainFamily::Bitcoin,
            Currency::Eth => ChainFamily::Ethereum,
        }
    }

    /// Lower-case ticker, used in KV key namespaces
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Currency::Btc => "btc",
            Currency::Eth => "eth",
        }
    }

    /// Canonical form of an address for storage and comparison.
    ///
    /// Ethereum addresses are case-insensitive (the mixed case is only an
    /// EIP-55 checksum), so they are lower-cased. Bech32 and Base58 are kept
    /// verbatim.
    pub fn normalize_address(&self, address: &str) -> String {
        let trimmed = address.trim();
        match self.family() {
            ChainFamily::Ethereum => trimmed.to_ascii_lowercase(),
            ChainFamily::Bitcoin => trimmed.to_string(),
        }
    }

    /// Shallow format check for a deposit address
    pub fn validate_address(&self, address: &str) -> bool {
        let address = address.trim();
        match self {
            Currency::Eth => {
                address.len() == 42
                    && address.starts_with("0x")
                    && address[2..].chars().all(|c| c.is_ascii_hexdigit())
            }
            Currency::Btc => {
                let lower = address.to_ascii_lowercase();
                if lower.starts_with("bc1") || lower.starts_with("tb1") || lower.starts_with("bcrt1")
                {
                    return (14..=74).contains(&address.len())
                        && address.chars().all(|c| c.is_ascii_alphanumeric());
                }
                let base58 = |c: char| c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l');
                matches!(address.chars().next(), Some('1' | '3' | 'm' | 'n' | '2'))
                    && (26..=35).contains(&address.len())
                    && address.chars().all(base58)
            }
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Currency::Btc => "BTC",
            Currency::Eth => "ETH",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BTC" => Ok(Currency::Btc),
            "ETH" => Ok(Currency::Eth),
            other => Err(format!("unsupported currency: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("btc".parse::<Currency>(), Ok(Currency::Btc));
        assert_eq!(" Eth ".parse::<Currency>(), Ok(Currency::Eth));
        assert!("doge".parse::<Currency>().is_err());
        assert_eq!(Currency::Eth.to_string(), "ETH");
    }

    #[test]
    fn test_normalize_address() {
        let mixed = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";
        assert_eq!(
            Currency::Eth.normalize_address(mixed),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
        assert_eq!(Currency::Btc.normalize_address(" bc1qXyZ "), "bc1qXyZ");
    }

    #[test]
    fn test_validate_address() {
        assert!(Currency::Eth.validate_address("0xabcdef0123456789abcdef0123456789abcdef01"));
        assert!(!Currency::Eth.validate_address("0xabc"));
        assert!(Currency::Btc.validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"));
        assert!(Currency::Btc.validate_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2"));
        assert!(!Currency::Btc.validate_address("0x1234"));
    }

    #[test]
    fn test_serde_uses_ticker() {
        let json = serde_json::to_string(&Currency::Btc).unwrap();
        assert_eq!(json, "\"BTC\"");
        let parsed: Currency = serde_json::from_str("\"eth\"").unwrap();
        assert_eq!(parsed, Currency::Eth);
    }
}
