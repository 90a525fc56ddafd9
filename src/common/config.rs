//! Environment-based Configuration for depositd
//!
//! All settings come from environment variables (optionally via a `.env`
//! file loaded by the binary). Secrets are never logged.
//!
//! # Environment Variables
//!
//! ## Network and storage
//! - `DEPOSITD_NETWORK` - "mainnet", "testnet" or "regtest" (default: "regtest")
//! - `DEPOSITD_DATABASE_PATH` - SQLite file (default: "data/depositd.db")
//! - `DEPOSITD_CURRENCIES` - comma-separated currencies to watch (default: "BTC,ETH")
//!
//! ## Chain endpoints
//! - `DEPOSITD_BTC_RPC_URL`, `DEPOSITD_BTC_RPC_USER`, `DEPOSITD_BTC_RPC_PASSWORD`
//! - `DEPOSITD_ETH_RPC_URL`, `DEPOSITD_ETH_WS_URL`
//! - `DEPOSITD_ETH_ACCOUNT_PASSPHRASE` - passphrase for node-created accounts
//!
//! ## Pipeline tuning
//! - `DEPOSITD_BTC_CONFIRMATIONS` (6), `DEPOSITD_ETH_CONFIRMATIONS` (12)
//! - `DEPOSITD_BTC_POLL_SECS` (30), `DEPOSITD_ETH_SWEEP_SECS` (120),
//!   `DEPOSITD_MONITOR_SECS` (60)
//! - `DEPOSITD_REORG_DEPTH` (12)
//! - `DEPOSITD_ETH_SWEEP_WINDOW` (100), `DEPOSITD_ETH_INITIAL_LOOKBACK` (1000)
//! - `DEPOSITD_ETH_RECONNECT_SECS` (5)
//! - `DEPOSITD_STALE_AFTER_SECS` (86400), `DEPOSITD_LOCK_TTL_SECS` (30)
//!
//! ## Service
//! - `DEPOSITD_API_PORT` (3001)
//! - `DEPOSITD_LOG_LEVEL` (info), `DEPOSITD_LOG_JSON` (on for mainnet)

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::types::Currency;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("network mismatch: expected {0}, got {1}")]
    NetworkMismatch(String, String),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" | "dev" | "local" => Ok(Network::Regtest),
            _ => Err(ConfigError::InvalidValue(
                "DEPOSITD_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Default bitcoind RPC endpoint for this network
    pub fn default_btc_rpc(&self) -> &'static str {
        match self {
            Network::Mainnet => "http://127.0.0.1:8332",
            Network::Testnet => "http://127.0.0.1:18332",
            Network::Regtest => "http://127.0.0.1:18443",
        }
    }

    pub fn default_eth_rpc(&self) -> &'static str {
        "http://127.0.0.1:8545"
    }

    pub fn default_eth_ws(&self) -> &'static str {
        "ws://127.0.0.1:8546"
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct DepositdConfig {
    pub network: Network,
    pub database_path: String,
    /// Currencies with a chain client and watchers
    pub currencies: Vec<Currency>,

    pub btc_rpc_url: String,
    pub btc_rpc_user: Option<String>,
    pub btc_rpc_password: Option<String>,

    pub eth_rpc_url: String,
    pub eth_ws_url: String,
    pub eth_account_passphrase: String,

    pub btc_confirmations: u32,
    pub eth_confirmations: u32,

    pub btc_poll_interval: Duration,
    pub eth_sweep_interval: Duration,
    pub monitor_interval: Duration,

    /// Blocks to rewind when a reorg is detected
    pub reorg_depth: u64,
    /// Max blocks scanned per address per sweep
    pub eth_sweep_window: u64,
    /// How far back a never-swept address starts
    pub eth_initial_lookback: u64,
    pub eth_reconnect_delay: Duration,

    /// Zero-confirmation deposits older than this are failed
    pub stale_after: Duration,
    pub lock_ttl: Duration,

    pub api_port: u16,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for DepositdConfig {
    fn default() -> Self {
        let network = Network::Regtest;
        Self {
            network,
            database_path: "data/depositd.db".to_string(),
            currencies: Currency::ALL.to_vec(),
            btc_rpc_url: network.default_btc_rpc().to_string(),
            btc_rpc_user: None,
            btc_rpc_password: None,
            eth_rpc_url: network.default_eth_rpc().to_string(),
            eth_ws_url: network.default_eth_ws().to_string(),
            eth_account_passphrase: String::new(),
            btc_confirmations: 6,
            eth_confirmations: 12,
            btc_poll_interval: Duration::from_secs(30),
            eth_sweep_interval: Duration::from_secs(120),
            monitor_interval: Duration::from_secs(60),
            reorg_depth: 12,
            eth_sweep_window: 100,
            eth_initial_lookback: 1000,
            eth_reconnect_delay: Duration::from_secs(5),
            stale_after: Duration::from_secs(24 * 60 * 60),
            lock_ttl: Duration::from_secs(30),
            api_port: 3001,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl DepositdConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let network: Network = match var("DEPOSITD_NETWORK") {
            Some(v) => v.parse()?,
            None => defaults.network,
        };

        let currencies = match var("DEPOSITD_CURRENCIES") {
            Some(list) => parse_currencies(&list)?,
            None => defaults.currencies,
        };

        let secs = |name: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(Duration::from_secs(parse_or(&var, name, default.as_secs())?))
        };

        let config = Self {
            network,
            database_path: var("DEPOSITD_DATABASE_PATH").unwrap_or(defaults.database_path),
            currencies,
            btc_rpc_url: var("DEPOSITD_BTC_RPC_URL")
                .unwrap_or_else(|| network.default_btc_rpc().to_string()),
            btc_rpc_user: var("DEPOSITD_BTC_RPC_USER"),
            btc_rpc_password: var("DEPOSITD_BTC_RPC_PASSWORD"),
            eth_rpc_url: var("DEPOSITD_ETH_RPC_URL")
                .unwrap_or_else(|| network.default_eth_rpc().to_string()),
            eth_ws_url: var("DEPOSITD_ETH_WS_URL")
                .unwrap_or_else(|| network.default_eth_ws().to_string()),
            eth_account_passphrase: var("DEPOSITD_ETH_ACCOUNT_PASSPHRASE").unwrap_or_default(),
            btc_confirmations: parse_or(&var, "DEPOSITD_BTC_CONFIRMATIONS", defaults.btc_confirmations)?,
            eth_confirmations: parse_or(&var, "DEPOSITD_ETH_CONFIRMATIONS", defaults.eth_confirmations)?,
            btc_poll_interval: secs("DEPOSITD_BTC_POLL_SECS", defaults.btc_poll_interval)?,
            eth_sweep_interval: secs("DEPOSITD_ETH_SWEEP_SECS", defaults.eth_sweep_interval)?,
            monitor_interval: secs("DEPOSITD_MONITOR_SECS", defaults.monitor_interval)?,
            reorg_depth: parse_or(&var, "DEPOSITD_REORG_DEPTH", defaults.reorg_depth)?,
            eth_sweep_window: parse_or(&var, "DEPOSITD_ETH_SWEEP_WINDOW", defaults.eth_sweep_window)?,
            eth_initial_lookback: parse_or(
                &var,
                "DEPOSITD_ETH_INITIAL_LOOKBACK",
                defaults.eth_initial_lookback,
            )?,
            eth_reconnect_delay: secs("DEPOSITD_ETH_RECONNECT_SECS", defaults.eth_reconnect_delay)?,
            stale_after: secs("DEPOSITD_STALE_AFTER_SECS", defaults.stale_after)?,
            lock_ttl: secs("DEPOSITD_LOCK_TTL_SECS", defaults.lock_ttl)?,
            api_port: parse_or(&var, "DEPOSITD_API_PORT", defaults.api_port)?,
            log_level: var("DEPOSITD_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: match var("DEPOSITD_LOG_JSON") {
                Some(v) => parse_bool("DEPOSITD_LOG_JSON", &v)?,
                None => network == Network::Mainnet,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn watches(&self, currency: Currency) -> bool {
        self.currencies.contains(&currency)
    }

    /// Sanity checks that apply on every network
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.currencies.is_empty() {
            return Err(invalid("DEPOSITD_CURRENCIES", "at least one currency is required"));
        }
        if self.btc_confirmations == 0 {
            return Err(invalid("DEPOSITD_BTC_CONFIRMATIONS", "must be at least 1"));
        }
        if self.eth_confirmations == 0 {
            return Err(invalid("DEPOSITD_ETH_CONFIRMATIONS", "must be at least 1"));
        }
        for (name, interval) in [
            ("DEPOSITD_BTC_POLL_SECS", self.btc_poll_interval),
            ("DEPOSITD_ETH_SWEEP_SECS", self.eth_sweep_interval),
            ("DEPOSITD_MONITOR_SECS", self.monitor_interval),
            ("DEPOSITD_LOCK_TTL_SECS", self.lock_ttl),
        ] {
            if interval.is_zero() {
                return Err(invalid(name, "must be greater than 0"));
            }
        }
        if self.eth_sweep_window == 0 {
            return Err(invalid("DEPOSITD_ETH_SWEEP_WINDOW", "must be at least 1"));
        }
        Ok(())
    }

    /// Validate configuration for production readiness
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.network != Network::Mainnet {
            return Err(ConfigError::NetworkMismatch(
                "mainnet".to_string(),
                format!("{:?}", self.network),
            ));
        }

        if self.watches(Currency::Btc) && self.btc_rpc_password.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "DEPOSITD_BTC_RPC_PASSWORD".to_string(),
            ));
        }

        if self.watches(Currency::Eth) && self.eth_account_passphrase.is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "DEPOSITD_ETH_ACCOUNT_PASSPHRASE".to_string(),
            ));
        }

        Ok(())
    }

    /// Log a configuration summary (hiding sensitive values)
    pub fn log_summary(&self) {
        let currencies: Vec<String> = self.currencies.iter().map(|c| c.to_string()).collect();
        info!(
            network = ?self.network,
            database = %self.database_path,
            currencies = %currencies.join(","),
            btc_rpc = %self.btc_rpc_url,
            btc_rpc_auth = self.btc_rpc_user.is_some(),
            eth_rpc = %self.eth_rpc_url,
            eth_ws = %self.eth_ws_url,
            btc_confirmations = self.btc_confirmations,
            eth_confirmations = self.eth_confirmations,
            reorg_depth = self.reorg_depth,
            api_port = self.api_port,
            "Loaded configuration"
        );
    }
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue(name.to_string(), reason.to_string())
}

fn parse_or<T, F>(var: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), format!("cannot parse {:?}", raw))),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, "expected a boolean")),
    }
}

fn parse_currencies(list: &str) -> Result<Vec<Currency>, ConfigError> {
    let mut currencies = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let currency: Currency = item
            .parse()
            .map_err(|e: String| ConfigError::InvalidValue("DEPOSITD_CURRENCIES".to_string(), e))?;
        if !currencies.contains(&currency) {
            currencies.push(currency);
        }
    }
    Ok(currencies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<DepositdConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DepositdConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_network_parsing() {
        assert!(matches!("mainnet".parse::<Network>(), Ok(Network::Mainnet)));
        assert!(matches!("testnet".parse::<Network>(), Ok(Network::Testnet)));
        assert!(matches!("regtest".parse::<Network>(), Ok(Network::Regtest)));
        assert!("invalid".parse::<Network>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.btc_rpc_url, "http://127.0.0.1:18443");
        assert_eq!(config.btc_confirmations, 6);
        assert_eq!(config.eth_confirmations, 12);
        assert_eq!(config.reorg_depth, 12);
        assert_eq!(config.stale_after, Duration::from_secs(86_400));
        assert!(config.watches(Currency::Btc) && config.watches(Currency::Eth));
        assert!(!config.log_json);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DEPOSITD_NETWORK", "mainnet"),
            ("DEPOSITD_CURRENCIES", "eth"),
            ("DEPOSITD_ETH_CONFIRMATIONS", "20"),
            ("DEPOSITD_ETH_SWEEP_SECS", "15"),
            ("DEPOSITD_LOG_JSON", "false"),
        ])
        .unwrap();

        assert_eq!(config.btc_rpc_url, "http://127.0.0.1:8332");
        assert_eq!(config.currencies, vec![Currency::Eth]);
        assert_eq!(config.eth_confirmations, 20);
        assert_eq!(config.eth_sweep_interval, Duration::from_secs(15));
        assert!(!config.log_json);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("DEPOSITD_BTC_CONFIRMATIONS", "six")]),
            Err(ConfigError::InvalidValue(..))
        ));
        assert!(load(&[("DEPOSITD_BTC_CONFIRMATIONS", "0")]).is_err());
        assert!(load(&[("DEPOSITD_CURRENCIES", "BTC,DOGE")]).is_err());
        assert!(load(&[("DEPOSITD_MONITOR_SECS", "0")]).is_err());
    }

    #[test]
    fn test_production_checks() {
        let config = load(&[("DEPOSITD_NETWORK", "testnet")]).unwrap();
        assert!(matches!(
            config.validate_for_production(),
            Err(ConfigError::NetworkMismatch(..))
        ));

        let config = load(&[
            ("DEPOSITD_NETWORK", "mainnet"),
            ("DEPOSITD_CURRENCIES", "BTC"),
            ("DEPOSITD_BTC_RPC_USER", "rpc"),
            ("DEPOSITD_BTC_RPC_PASSWORD", "secret"),
        ])
        .unwrap();
        assert!(config.log_json);
        assert!(config.validate_for_production().is_ok());
    }
}
