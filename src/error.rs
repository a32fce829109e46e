use thiserror::Error;
use uuid::Uuid;

use crate::models::OrderStatus;

/// Errors surfaced by the trading engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Order {0} not found")]
    NotFound(Uuid),

    #[error("Profile {0} not found")]
    UnknownProfile(Uuid),

    #[error("No profile found for platform '{platform}' and username '{username}'")]
    ProfileNotFound { platform: String, username: String },

    #[error("Insufficient balance for {mint_address}: {available} available, {requested} requested")]
    InsufficientBalance {
        mint_address: String,
        available: f64,
        requested: f64,
    },

    /// Network or provider hiccup worth retrying
    #[error("Transient provider failure: {0}")]
    ProviderTransient(String),

    /// Rejected trade, no route, malformed response - never retried
    #[error("Provider rejected request: {0}")]
    ProviderTerminal(String),

    /// The entry swap settled but no order could be recorded for it
    #[error("Bought {received_amount} {mint_address} (tx {signature}) but could not track it: {reason}")]
    UntrackedPosition {
        mint_address: String,
        received_amount: f64,
        signature: String,
        reason: String,
    },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Order {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether a retry policy should try the operation again
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ProviderTransient(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        // Decode failures mean the provider answered with something we can't use
        if e.is_decode() {
            return EngineError::ProviderTerminal(e.to_string());
        }

        match e.status() {
            Some(status) if status.is_client_error() && status.as_u16() != 429 => {
                EngineError::ProviderTerminal(e.to_string())
            }
            _ => EngineError::ProviderTransient(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for EngineError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(e: config::ConfigError) -> Self {
        EngineError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
