//! Common Error Types for depositd
//!
//! Provides unified error handling across all modules.

use thiserror::Error;

use crate::chain::ChainError;
use crate::directory::DirectoryError;
use crate::processor::ProcessorError;
use crate::storage::StorageError;
use crate::watcher::WatcherError;

/// Root error type for depositd
#[derive(Debug, Error)]
pub enum DepositdError {
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    /// Chain node unreachable or misbehaving
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DepositdError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    /// Whether repeating the same operation later can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DepositdError::Chain(_) | DepositdError::Io(_) => true,
            DepositdError::Storage(e) => !matches!(e, StorageError::Duplicate(_)),
            DepositdError::Directory(DirectoryError::Chain(_)) => true,
            DepositdError::Directory(DirectoryError::Storage(e)) => {
                !matches!(e, StorageError::Duplicate(_))
            }
            DepositdError::Processor(_) | DepositdError::Watcher(_) => true,
            _ => false,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            DepositdError::Config(_) => "CONFIG_ERROR",
            DepositdError::Logging(_) => "LOGGING_ERROR",
            DepositdError::Chain(_) => "CHAIN_ERROR",
            DepositdError::Storage(StorageError::Duplicate(_)) => "DUPLICATE",
            DepositdError::Storage(StorageError::NotFound(_)) => "NOT_FOUND",
            DepositdError::Storage(_) => "STORAGE_ERROR",
            DepositdError::Directory(DirectoryError::UnsupportedCurrency(_)) => "UNSUPPORTED_CURRENCY",
            DepositdError::Directory(DirectoryError::Storage(StorageError::Duplicate(_))) => "DUPLICATE",
            DepositdError::Directory(_) => "DIRECTORY_ERROR",
            DepositdError::Processor(_) => "PROCESSOR_ERROR",
            DepositdError::Watcher(_) => "WATCHER_ERROR",
            DepositdError::Validation(_) => "VALIDATION_ERROR",
            DepositdError::Service(_) => "SERVICE_ERROR",
            DepositdError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using DepositdError
pub type Result<T> = std::result::Result<T, DepositdError>;
