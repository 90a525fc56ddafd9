//! Structured Logging for depositd
//!
//! Components log through `tracing` macros with structured fields. Deposit
//! and chain milestones are additionally emitted as one JSON document per
//! event on stable targets, so log pipelines can index them:
//!
//! | target             | emitted by                         |
//! |--------------------|------------------------------------|
//! | `depositd::deposit`| processor, confirmation monitor    |
//! | `depositd::chain`  | watchers, head subscription        |
//! | `depositd::system` | service start and stop             |
//!
//! ```rust,ignore
//! use depositd::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?;
//! ```

use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::types::Currency;

const DEPOSIT_TARGET: &str = "depositd::deposit";
const CHAIN_TARGET: &str = "depositd::chain";
const SYSTEM_TARGET: &str = "depositd::system";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Unknown names fall back to `Info`
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    fn directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Deposit,
    Chain,
    System,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// One JSON log document
#[derive(Debug, Serialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub level: LogLevel,
    pub category: EventCategory,
    pub event: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, event: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            category,
            event: event.into(),
            data: Value::Null,
            error: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| json!({ "event": self.event, "encode_error": e.to_string() }).to_string())
    }

    /// Write the event through `tracing` on its category's target
    pub fn emit(&self) {
        let line = self.to_json();
        // `target:` must be a constant, hence one arm per category
        macro_rules! at_level {
            ($target:expr) => {
                match self.level {
                    LogLevel::Trace => tracing::trace!(target: $target, "{}", line),
                    LogLevel::Debug => tracing::debug!(target: $target, "{}", line),
                    LogLevel::Info => tracing::info!(target: $target, "{}", line),
                    LogLevel::Warn => tracing::warn!(target: $target, "{}", line),
                    LogLevel::Error => tracing::error!(target: $target, "{}", line),
                }
            };
        }
        match self.category {
            EventCategory::Deposit => at_level!(DEPOSIT_TARGET),
            EventCategory::Chain => at_level!(CHAIN_TARGET),
            EventCategory::System => at_level!(SYSTEM_TARGET),
        }
    }
}

/// Deposit lifecycle milestone; failures are logged at error level
pub fn log_deposit_event(
    event_type: &str,
    currency: Currency,
    tx_hash: &str,
    amount: u64,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Deposit, event_type).with_data(json!({
        "currency": currency,
        "tx_hash": tx_hash,
        "amount": amount,
    }));
    if let Some(err) = error {
        event = event.with_error("DEPOSIT_ERROR", err);
    }
    event.emit();
}

/// Chain-level milestone such as a reorg or a dropped subscription
pub fn log_chain_event(event_type: &str, currency: Currency, ok: bool, details: Value) {
    let level = if ok { LogLevel::Info } else { LogLevel::Warn };
    LogEvent::new(level, EventCategory::Chain, event_type)
        .with_data(json!({ "currency": currency, "details": details }))
        .emit();
}

pub fn log_system_event(message: &str, details: Value) {
    LogEvent::new(LogLevel::Info, EventCategory::System, message)
        .with_data(details)
        .emit();
}

/// Install the global subscriber. `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = level.directive();
        EnvFilter::new(format!("depositd={directive},tower_http={directive},axum=warn"))
    });

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json_format {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init()
    } else {
        registry.with(fmt::layer().compact().with_target(true)).try_init()
    };

    installed.map_err(|e| LoggingError::InitFailed(e.to_string()))
}

pub fn init_from_config(config: &super::config::DepositdConfig) -> Result<(), LoggingError> {
    init_logging(LogLevel::parse_lenient(&config.log_level), config.log_json)
}
