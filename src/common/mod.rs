//! Common Infrastructure Module
//!
//! Shared utilities and configuration for depositd.
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - Common error types

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{ConfigError, DepositdConfig, Network};
pub use error::{DepositdError, Result};
pub use logging::{
    init_from_config, init_logging, log_chain_event, log_deposit_event, log_system_event,
    ErrorDetails, EventCategory, LogEvent, LogLevel, LoggingError,
};
